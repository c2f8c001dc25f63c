//! The UDP socket behind a connection, and its multicast group membership.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use super::interface;
use crate::config::IngestConfig;
use crate::endpoint::Endpoint;
use crate::error::Result;

/// Group subscription held by a [`MulticastSocket`], released on drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Membership {
    V4 { group: Ipv4Addr, interface: Ipv4Addr },
    V6 { group: Ipv6Addr, index: u32 },
}

/// Receive socket for one ingestion endpoint.
///
/// For a multicast endpoint the socket binds the wildcard address on the
/// group's port with `SO_REUSEADDR`, joins the group and disables multicast
/// loopback. A unicast endpoint (the `udp://` fallback) binds its own
/// address. Either way the kernel receive buffer is enlarged to absorb
/// bursts, and a read timeout keeps [`recv`](Self::recv) from blocking
/// forever.
///
/// The group is left when the socket is dropped, including on error paths
/// during [`open`](Self::open).
#[derive(Debug)]
pub struct MulticastSocket {
    socket: UdpSocket,
    membership: Option<Membership>,
}

impl MulticastSocket {
    pub fn open(endpoint: &Endpoint, config: &IngestConfig) -> Result<Self> {
        let multicast = endpoint.is_multicast();
        let socket = Socket::new(
            Domain::for_address(endpoint.addr),
            Type::DGRAM,
            Some(Protocol::UDP),
        )?;

        let bind_addr = if multicast {
            socket.set_reuse_address(true)?;
            let any = match endpoint.addr {
                SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            };
            SocketAddr::new(any, endpoint.addr.port())
        } else {
            endpoint.addr
        };

        let requested = if multicast {
            config.multicast_recv_buffer
        } else {
            config.unicast_recv_buffer
        };
        socket.set_recv_buffer_size(requested)?;
        let effective = socket.recv_buffer_size()?;

        socket.bind(&bind_addr.into())?;

        let timeout = config
            .poll_interval
            .min(config.stall_timeout)
            .max(Duration::from_millis(1));
        socket.set_read_timeout(Some(timeout))?;

        let mut this = Self {
            socket: socket.into(),
            membership: None,
        };

        if multicast {
            this.join(endpoint.addr.ip(), config.interface.as_deref())?;
        }

        tracing::info!(
            %endpoint,
            local_addr = ?this.socket.local_addr().ok(),
            interface = ?this.membership,
            recv_buffer = effective,
            "socket opened"
        );

        Ok(this)
    }

    fn join(&mut self, group: IpAddr, interface_hint: Option<&str>) -> Result<()> {
        match group {
            IpAddr::V4(group) => {
                let interface = interface::select_ipv4(interface_hint)?;
                self.socket.join_multicast_v4(&group, &interface)?;
                self.membership = Some(Membership::V4 { group, interface });
                self.socket.set_multicast_loop_v4(false)?;
            }
            IpAddr::V6(group) => {
                let index = ipv6_interface_index(interface_hint);
                self.socket.join_multicast_v6(&group, index)?;
                self.membership = Some(Membership::V6 { group, index });
                self.socket.set_multicast_loop_v6(false)?;
            }
        }
        tracing::debug!(membership = ?self.membership, "joined multicast group");
        Ok(())
    }

    /// Receive one datagram into `buf`.
    ///
    /// Returns `WouldBlock`/`TimedOut` when the read timeout elapses.
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.recv(buf)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Leave the joined group, if any. Later calls are no-ops.
    pub fn leave(&mut self) -> io::Result<()> {
        match self.membership.take() {
            Some(Membership::V4 { group, interface }) => {
                self.socket.leave_multicast_v4(&group, &interface)?
            }
            Some(Membership::V6 { group, index }) => {
                self.socket.leave_multicast_v6(&group, index)?
            }
            None => return Ok(()),
        }
        tracing::debug!("left multicast group");
        Ok(())
    }
}

impl Drop for MulticastSocket {
    fn drop(&mut self) {
        if let Err(e) = self.leave() {
            tracing::warn!(error = %e, "failed to leave multicast group");
        }
    }
}

/// IPv6 joins take an interface index rather than an address. A numeric
/// hint is used as the index; anything else falls back to the default
/// interface (index 0).
fn ipv6_interface_index(hint: Option<&str>) -> u32 {
    match hint {
        None => 0,
        Some(hint) => hint.parse().unwrap_or_else(|_| {
            tracing::warn!(
                interface = hint,
                "interface hint is not an IPv6 interface index, joining on the default interface"
            );
            0
        }),
    }
}

/// Whether a receive error only means "nothing arrived yet".
pub fn is_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unicast_config() -> IngestConfig {
        IngestConfig {
            poll_interval: Duration::from_millis(50),
            unicast_recv_buffer: 256 * 1024,
            ..IngestConfig::default()
        }
    }

    #[test]
    fn unicast_fallback_receives() {
        let endpoint = Endpoint::parse("udp://127.0.0.1:0").unwrap();
        let socket = MulticastSocket::open(&endpoint, &unicast_config()).unwrap();
        let addr = socket.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(&[0x47, 1, 2, 3], addr).unwrap();

        let mut buf = [0u8; 64];
        let n = socket.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[0x47, 1, 2, 3]);
    }

    #[test]
    fn idle_recv_times_out() {
        let endpoint = Endpoint::parse("udp://127.0.0.1:0").unwrap();
        let socket = MulticastSocket::open(&endpoint, &unicast_config()).unwrap();
        let mut buf = [0u8; 64];
        let err = socket.recv(&mut buf).unwrap_err();
        assert!(is_timeout(&err), "unexpected error kind {:?}", err.kind());
    }

    #[test]
    fn ipv6_hint_must_be_an_index() {
        assert_eq!(ipv6_interface_index(None), 0);
        assert_eq!(ipv6_interface_index(Some("3")), 3);
        assert_eq!(ipv6_interface_index(Some("eth0")), 0);
    }

    #[test]
    fn joins_and_leaves_group_on_loopback() {
        let group = Ipv4Addr::new(239, 255, 12, 35);
        let endpoint = Endpoint::parse("udp://239.255.12.35:0").unwrap();
        let config = IngestConfig {
            interface: Some("127.0.0.1".to_string()),
            poll_interval: Duration::from_millis(50),
            multicast_recv_buffer: 256 * 1024,
            ..IngestConfig::default()
        };
        let mut socket = MulticastSocket::open(&endpoint, &config).unwrap();
        assert_eq!(
            socket.membership,
            Some(Membership::V4 {
                group,
                interface: Ipv4Addr::LOCALHOST
            })
        );

        let sender = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).unwrap();
        sender.set_multicast_if_v4(&Ipv4Addr::LOCALHOST).unwrap();
        sender.set_multicast_loop_v4(true).unwrap();
        let port = socket.local_addr().unwrap().port();
        let target = SocketAddr::from((group, port));
        sender.send_to(&[0x47; 188], &target.into()).unwrap();

        let mut buf = [0u8; 512];
        assert_eq!(socket.recv(&mut buf).unwrap(), 188);

        socket.leave().unwrap();
        assert!(socket.membership.is_none());
        // The kernel no longer holds the membership either.
        assert!(
            socket
                .socket
                .leave_multicast_v4(&group, &Ipv4Addr::LOCALHOST)
                .is_err()
        );
        socket.leave().unwrap();
    }

    #[test]
    fn unicast_has_no_membership() {
        let endpoint = Endpoint::parse("udp://127.0.0.1:0").unwrap();
        let socket = MulticastSocket::open(&endpoint, &unicast_config()).unwrap();
        assert!(socket.membership.is_none());
    }
}
