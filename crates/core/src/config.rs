//! Connection tuning and defaults.

use std::time::Duration;

/// Port used when the ingestion URI does not carry one.
pub const DEFAULT_PORT: u16 = 5004;

/// Connection-level tuning for [`Connection::open_with_config`](crate::Connection::open_with_config).
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Network interface to join the group on: an interface name (`eth0`)
    /// or a local IPv4 address. When `None`, the first non-loopback,
    /// non-virtual interface is used, wired before wireless.
    pub interface: Option<String>,
    /// Silence after which the source is reported as stalled.
    pub stall_timeout: Duration,
    /// Kernel receive timeout. Bounds how long `close` waits for the
    /// receive thread to notice cancellation.
    pub poll_interval: Duration,
    /// Requested `SO_RCVBUF` for multicast sockets.
    pub multicast_recv_buffer: usize,
    /// Requested `SO_RCVBUF` for the unicast `udp://` fallback.
    pub unicast_recv_buffer: usize,
    /// Size of the single reused datagram buffer.
    pub max_datagram_size: usize,
    /// Delivery queue capacity in chunks (one chunk per RTP payload).
    pub queue_capacity: usize,
    /// Maximum number of out-of-order packets held before a gap is
    /// declared lost. A depth of 1 emits strictly in arrival order and
    /// drops anything late.
    pub reorder_depth: usize,
    /// Bounded wait used by [`Connection::read`](crate::Connection::read)
    /// before returning 0.
    pub read_timeout: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            interface: None,
            stall_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_millis(250),
            multicast_recv_buffer: 4 * 1024 * 1024,
            unicast_recv_buffer: 2 * 1024 * 1024,
            max_datagram_size: 65_535,
            queue_capacity: 2048,
            reorder_depth: 32,
            read_timeout: Duration::from_millis(100),
        }
    }
}
