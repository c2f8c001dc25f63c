//! Producer side of a connection: the receive thread and the per-datagram
//! pipeline it drives.
//!
//! ```text
//! socket ─► detect mode ─┬─ RTP ──► parse ─► validate TS ─► reorder ─┐
//!                        └─ raw TS ────────► validate TS ────────────┴─► queue
//! ```
//!
//! Every step runs synchronously on the receive thread. The datagram
//! buffer is reused for every `recv`; only validated TS payloads are
//! copied out.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use bytes::Bytes;

use crate::config::IngestConfig;
use crate::error::MalformedKind;
use crate::media::rtp::{RTP_HEADER_LEN, RtpPacket};
use crate::media::{self, Mode, ts};
use crate::queue::{DeliveryQueue, Push};
use crate::reorder::ReorderBuffer;
use crate::stats::Counters;
use crate::transport::MulticastSocket;
use crate::transport::multicast::is_timeout;

/// Why the receive loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The connection was closed by its owner.
    Closed,
    /// The socket returned a fatal error.
    Failed,
}

/// Turns datagrams into ordered TS chunks on the delivery queue.
#[derive(Debug)]
pub struct Pipeline {
    mode: Option<Mode>,
    ssrc: Option<u32>,
    reorder: ReorderBuffer<Option<Bytes>>,
    queue: Arc<DeliveryQueue<Bytes>>,
    counters: Arc<Counters>,
}

impl Pipeline {
    pub fn new(
        reorder_depth: usize,
        queue: Arc<DeliveryQueue<Bytes>>,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            mode: None,
            ssrc: None,
            reorder: ReorderBuffer::new(reorder_depth),
            queue,
            counters,
        }
    }

    /// Stream framing, fixed by the first recognizable datagram.
    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    pub fn handle(&mut self, datagram: &[u8]) {
        self.counters.record_received();

        let mode = match self.mode {
            Some(mode) => mode,
            None => match media::detect(datagram) {
                Ok(mode) => {
                    tracing::info!(?mode, "stream mode detected");
                    self.mode = Some(mode);
                    mode
                }
                Err(kind) => {
                    self.reject(kind, None);
                    return;
                }
            },
        };

        match mode {
            Mode::Rtp => self.handle_rtp(datagram),
            Mode::RawTs => match ts::split(datagram) {
                Ok(_) => deliver(&self.queue, &self.counters, Bytes::copy_from_slice(datagram)),
                Err(kind) => self.reject(kind, None),
            },
        }
    }

    fn handle_rtp(&mut self, datagram: &[u8]) {
        let packet = match RtpPacket::parse(datagram) {
            Ok(packet) => packet,
            Err(kind) => {
                self.reject(kind, None);
                return;
            }
        };

        if self.ssrc != Some(packet.ssrc) {
            if let Some(previous) = self.ssrc {
                tracing::warn!(
                    previous = format_args!("{:#010X}", previous),
                    current = format_args!("{:#010X}", packet.ssrc),
                    sequence = packet.sequence,
                    "SSRC changed, restarting sequence tracking"
                );
                self.flush();
                self.reorder.reset();
            }
            self.ssrc = Some(packet.ssrc);
        }

        // A bad payload still occupies its sequence slot, so it goes through
        // the reorder buffer as `None` rather than opening a false gap.
        let chunk = match ts::split(packet.payload) {
            Ok(_) => Some(Bytes::copy_from_slice(packet.payload)),
            Err(kind) => {
                self.reject(kind, Some(packet.sequence));
                None
            }
        };

        let (queue, counters) = (&self.queue, &self.counters);
        let progress = self.reorder.push(packet.sequence, chunk, |_, chunk| {
            if let Some(chunk) = chunk {
                deliver(queue, counters, chunk);
            }
        });

        counters.record_lost(progress.lost);
        if progress.late {
            counters.record_late();
            tracing::trace!(
                sequence = packet.sequence,
                next_expected = ?self.reorder.next_expected(),
                "late or duplicate packet discarded"
            );
        }
    }

    /// Deliver everything still held for reordering.
    pub fn flush(&mut self) {
        let (queue, counters) = (&self.queue, &self.counters);
        let progress = self.reorder.flush(|_, chunk| {
            if let Some(chunk) = chunk {
                deliver(queue, counters, chunk);
            }
        });
        counters.record_lost(progress.lost);
    }

    /// End of input. After a receive failure the held packets are delivered
    /// and the queue is finished, so the reader drains it before seeing
    /// `Closed`. After a close the held packets are discarded uncounted.
    pub fn finish(&mut self, exit: Exit) {
        match exit {
            Exit::Failed => self.flush(),
            Exit::Closed => self.reorder.reset(),
        }
        self.queue.finish();
    }

    fn reject(&self, kind: MalformedKind, sequence: Option<u16>) {
        self.counters.record_malformed();
        tracing::debug!(reason = %kind, ?sequence, mode = ?self.mode, "malformed datagram dropped");
    }
}

fn deliver(queue: &DeliveryQueue<Bytes>, counters: &Counters, chunk: Bytes) {
    let len = chunk.len();
    match queue.push(chunk) {
        Push::Accepted => counters.record_delivered(len),
        Push::Evicted => {
            counters.record_delivered(len);
            counters.record_dropped();
            tracing::trace!(capacity = queue.capacity(), "delivery queue full, oldest chunk dropped");
        }
        Push::Closed => {}
    }
}

/// Receive loop run on the connection's background thread.
///
/// Polls the socket in short timeout slices so that clearing `running`
/// stops it promptly even when the source is silent. Silence longer than
/// the stall timeout is reported once per stall. A fatal socket error ends
/// the loop; see [`Pipeline::finish`] for what happens to held packets.
///
/// The socket is dropped on exit, which leaves the multicast group.
pub fn receive_loop(
    socket: MulticastSocket,
    mut pipeline: Pipeline,
    config: Arc<IngestConfig>,
    running: Arc<AtomicBool>,
) {
    let mut buf = vec![0u8; config.max_datagram_size.max(RTP_HEADER_LEN)];
    let mut last_datagram = Instant::now();
    let mut stalled = false;

    let exit = loop {
        if !running.load(Ordering::SeqCst) {
            break Exit::Closed;
        }
        match socket.recv(&mut buf) {
            Ok(len) => {
                if stalled {
                    tracing::info!(silent_for = ?last_datagram.elapsed(), "source resumed");
                    stalled = false;
                }
                last_datagram = Instant::now();
                pipeline.handle(&buf[..len]);
            }
            Err(ref e) if is_timeout(e) => {
                let silent_for = last_datagram.elapsed();
                if !stalled && silent_for >= config.stall_timeout {
                    stalled = true;
                    pipeline.counters.record_stall();
                    tracing::warn!(?silent_for, "source stalled, no datagrams received");
                }
            }
            // ICMP port-unreachable surfaced on some platforms; not fatal.
            Err(ref e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionRefused
                ) =>
            {
                tracing::trace!(error = %e, "ignoring receive error");
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "receive failed, stopping");
                }
                break Exit::Failed;
            }
        }
    };

    pipeline.finish(exit);
    drop(socket);

    tracing::debug!(?exit, mode = ?pipeline.mode(), "receive loop exited");
}
