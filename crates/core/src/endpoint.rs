//! Ingestion URI parsing.
//!
//! Accepts `rtp://group:port` and `udp://addr:port`, including the IPTV
//! `@group` form and bracketed IPv6 literals. The port defaults to 5004.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};

use crate::config::DEFAULT_PORT;
use crate::error::{IngestError, Result, UriErrorKind};

/// Ingestion URI scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// `rtp://`: must name a multicast group.
    Rtp,
    /// `udp://`: multicast group, or a unicast address as fallback.
    Udp,
}

impl Scheme {
    fn as_str(self) -> &'static str {
        match self {
            Self::Rtp => "rtp",
            Self::Udp => "udp",
        }
    }
}

/// The address a connection listens on, derived from an ingestion URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: Scheme,
    /// Multicast group (or unicast bind address) and port.
    pub addr: SocketAddr,
}

impl Endpoint {
    /// Parse an ingestion URI.
    ///
    /// `rtp://239.1.1.1:5000`        → multicast group 239.1.1.1, port 5000
    /// `rtp://@239.1.1.1:5000`       → same (IPTV playlist form)
    /// `udp://239.1.1.1`             → port 5004
    /// `udp://[ff15::1]:5000`        → IPv6 group
    /// `udp://:1234`, `udp://@:1234` → unicast on every local address
    /// `udp://127.0.0.1:1234`        → unicast fallback
    /// `rtp://127.0.0.1:1234`        → rejected, not a multicast group
    pub fn parse(uri: &str) -> Result<Self> {
        let invalid = |kind| IngestError::InvalidUri {
            uri: uri.to_string(),
            kind,
        };

        let scheme = match uri.get(..6).map(|s| s.to_ascii_lowercase()).as_deref() {
            Some("rtp://") => Scheme::Rtp,
            Some("udp://") => Scheme::Udp,
            _ => return Err(invalid(UriErrorKind::UnsupportedScheme)),
        };
        let rest = &uri[6..];

        // Drop any path or query: rtp://239.1.1.1:5000/?ch=1
        let authority = match rest.find(['/', '?']) {
            Some(end) => &rest[..end],
            None => rest,
        };
        if authority.is_empty() {
            return Err(invalid(UriErrorKind::MissingHost));
        }

        let authority = match authority.split_once('@') {
            Some(("", host)) => host,
            Some(_) => return Err(invalid(UriErrorKind::SourceFilter)),
            None => authority,
        };

        let (host, port) = split_host_port(authority).ok_or_else(|| invalid(UriErrorKind::InvalidPort))?;

        let ip = if host.is_empty() {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        } else {
            resolve(host, port)?
        };

        if scheme == Scheme::Rtp && !ip.is_multicast() {
            return Err(IngestError::InvalidAddress(format!(
                "{ip} is not a multicast address"
            )));
        }

        Ok(Self {
            scheme,
            addr: SocketAddr::new(ip, port),
        })
    }

    pub fn is_multicast(&self) -> bool {
        self.addr.ip().is_multicast()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme.as_str(), self.addr)
    }
}

/// Split `host[:port]` / `[v6][:port]`. Returns `None` on a bad port.
fn split_host_port(authority: &str) -> Option<(&str, u16)> {
    if let Some(bracketed) = authority.strip_prefix('[') {
        let (host, tail) = bracketed.split_once(']')?;
        return match tail {
            "" => Some((host, DEFAULT_PORT)),
            _ => Some((host, tail.strip_prefix(':')?.parse().ok()?)),
        };
    }

    // Bare IPv6 literal without brackets: no port.
    if authority.matches(':').count() > 1 {
        return Some((authority, DEFAULT_PORT));
    }

    match authority.rsplit_once(':') {
        Some((host, port)) => Some((host, port.parse().ok()?)),
        None => Some((authority, DEFAULT_PORT)),
    }
}

fn resolve(host: &str, port: u16) -> Result<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }
    (host, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .map(|addr| addr.ip())
        .ok_or_else(|| IngestError::InvalidAddress(host.to_string()))
}
