//! Per-connection counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters written by the receive thread and read by anyone.
///
/// Only the receive thread increments them, so relaxed ordering is enough:
/// readers get a slightly stale but never torn view.
#[derive(Debug, Default)]
pub struct Counters {
    received: AtomicU64,
    lost: AtomicU64,
    dropped: AtomicU64,
    malformed: AtomicU64,
    late: AtomicU64,
    stalls: AtomicU64,
    bytes_delivered: AtomicU64,
}

impl Counters {
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lost(&self, count: u64) {
        if count > 0 {
            self.lost.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_late(&self) {
        self.late.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stall(&self) {
        self.stalls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self, bytes: usize) {
        self.bytes_delivered.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self, queue_depth: usize) -> Stats {
        Stats {
            received: self.received.load(Ordering::Relaxed),
            lost: self.lost.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            late: self.late.load(Ordering::Relaxed),
            stalls: self.stalls.load(Ordering::Relaxed),
            bytes_delivered: self.bytes_delivered.load(Ordering::Relaxed),
            queue_depth,
        }
    }
}

/// Point-in-time view of a connection's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Datagrams received from the socket.
    pub received: u64,
    /// RTP sequence numbers skipped over.
    pub lost: u64,
    /// Chunks evicted from a full delivery queue.
    pub dropped: u64,
    /// Datagrams discarded as unparseable or not TS-aligned.
    pub malformed: u64,
    /// Duplicate or out-of-window RTP packets discarded.
    pub late: u64,
    /// Times the source went silent for the stall timeout.
    pub stalls: u64,
    /// TS bytes handed to the delivery queue.
    pub bytes_delivered: u64,
    /// Chunks waiting to be read.
    pub queue_depth: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_records() {
        let c = Counters::default();
        c.record_received();
        c.record_received();
        c.record_lost(3);
        c.record_lost(0);
        c.record_dropped();
        c.record_malformed();
        c.record_delivered(1316);
        let s = c.snapshot(9);
        assert_eq!(s.received, 2);
        assert_eq!(s.lost, 3);
        assert_eq!(s.dropped, 1);
        assert_eq!(s.malformed, 1);
        assert_eq!(s.late, 0);
        assert_eq!(s.bytes_delivered, 1316);
        assert_eq!(s.queue_depth, 9);
    }
}
