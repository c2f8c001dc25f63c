//! Consumer side of a connection: the [`Connection`] handle and its pull
//! reader.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::{Buf, Bytes};
use parking_lot::Mutex;

use crate::config::IngestConfig;
use crate::endpoint::Endpoint;
use crate::error::{IngestError, Result};
use crate::queue::{DeliveryQueue, Pop};
use crate::receiver::{self, Pipeline};
use crate::stats::{Counters, Stats};
use crate::transport::MulticastSocket;

/// One open ingestion stream.
///
/// [`open`](Self::open) binds the socket, joins the group and starts the
/// receive thread. The consumer pulls the reconstructed TS byte stream
/// with [`read`](Self::read); [`close`](Self::close) (or drop) stops the
/// thread, leaves the group and wakes any blocked reader.
///
/// `Connection` is `Send + Sync`: wrap it in an `Arc` to close it from a
/// thread other than the reader.
#[derive(Debug)]
pub struct Connection {
    endpoint: Endpoint,
    local_addr: SocketAddr,
    queue: Arc<DeliveryQueue<Bytes>>,
    counters: Arc<Counters>,
    running: Arc<AtomicBool>,
    closed: AtomicBool,
    read_timeout: Duration,
    /// Unread remainder of the last chunk taken from the queue.
    current: Mutex<Bytes>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Open `rtp://group:port` or `udp://addr:port` with default settings.
    pub fn open(uri: &str) -> Result<Self> {
        Self::open_with_config(uri, IngestConfig::default())
    }

    pub fn open_with_config(uri: &str, config: IngestConfig) -> Result<Self> {
        let endpoint = Endpoint::parse(uri)?;
        let socket = MulticastSocket::open(&endpoint, &config)?;
        let local_addr = socket.local_addr()?;

        let queue = Arc::new(DeliveryQueue::new(config.queue_capacity));
        let counters = Arc::new(Counters::default());
        let running = Arc::new(AtomicBool::new(true));
        let pipeline = Pipeline::new(config.reorder_depth, queue.clone(), counters.clone());
        let read_timeout = config.read_timeout;
        let config = Arc::new(config);

        let worker = {
            let running = running.clone();
            thread::Builder::new()
                .name(format!("rtp-recv-{}", endpoint.addr.port()))
                .spawn(move || receiver::receive_loop(socket, pipeline, config, running))?
        };

        tracing::info!(%endpoint, %local_addr, "connection opened");

        Ok(Self::from_parts(
            endpoint,
            local_addr,
            queue,
            counters,
            running,
            read_timeout,
            Some(worker),
        ))
    }

    fn from_parts(
        endpoint: Endpoint,
        local_addr: SocketAddr,
        queue: Arc<DeliveryQueue<Bytes>>,
        counters: Arc<Counters>,
        running: Arc<AtomicBool>,
        read_timeout: Duration,
        worker: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            endpoint,
            local_addr,
            queue,
            counters,
            running,
            closed: AtomicBool::new(false),
            read_timeout,
            current: Mutex::new(Bytes::new()),
            worker: Mutex::new(worker),
        }
    }

    /// Copy up to `length` bytes of TS data into `buffer[offset..]`.
    ///
    /// - `Ok(n)` with `n > 0`: bytes were copied. Once some bytes are
    ///   copied, only chunks already queued are taken; the call never waits
    ///   again.
    /// - `Ok(0)`: nothing arrived within the read timeout; try again.
    /// - `Err(Closed)`: the connection was closed, or the receiver stopped
    ///   and everything it delivered has been read.
    pub fn read(&self, buffer: &mut [u8], offset: usize, length: usize) -> Result<usize> {
        let capacity = buffer.len();
        let window = offset
            .checked_add(length)
            .and_then(|end| buffer.get_mut(offset..end))
            .ok_or(IngestError::InvalidRange {
                offset,
                length,
                capacity,
            })?;
        self.fill(window)
    }

    fn fill(&self, out: &mut [u8]) -> Result<usize> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(IngestError::Closed);
        }
        if out.is_empty() {
            return Ok(0);
        }

        let mut current = self.current.lock();
        let mut filled = 0;
        while filled < out.len() {
            if current.is_empty() {
                let wait = if filled == 0 {
                    self.read_timeout
                } else {
                    Duration::ZERO
                };
                match self.queue.pop(wait) {
                    Pop::Chunk(chunk) => *current = chunk,
                    Pop::Empty => break,
                    Pop::Closed if filled > 0 && !self.closed.load(Ordering::SeqCst) => break,
                    Pop::Closed => return Err(IngestError::Closed),
                }
            }

            let n = current.len().min(out.len() - filled);
            out[filled..filled + n].copy_from_slice(&current[..n]);
            current.advance(n);
            filled += n;
        }
        Ok(filled)
    }

    /// Stop receiving and release the socket. Idempotent.
    ///
    /// Blocked and future [`read`](Self::read) calls return `Closed`. Waits
    /// for the receive thread, which notices within one poll interval.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.running.store(false, Ordering::SeqCst);
        self.queue.close();

        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                tracing::warn!(endpoint = %self.endpoint, "receive thread panicked");
            }
        }
        *self.current.lock() = Bytes::new();

        let stats = self.stats();
        tracing::info!(
            endpoint = %self.endpoint,
            received = stats.received,
            lost = stats.lost,
            dropped = stats.dropped,
            malformed = stats.malformed,
            "connection closed"
        );
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> Stats {
        self.counters.snapshot(self.queue.len())
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Address the socket is bound to (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Blocking byte-stream view: retries until data arrives, and reports
/// end-of-file once the connection is closed.
impl io::Read for &Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            match self.fill(buf) {
                Ok(0) => continue,
                Ok(n) => return Ok(n),
                Err(IngestError::Closed) => return Ok(0),
                Err(e) => return Err(io::Error::other(e)),
            }
        }
    }
}

impl io::Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut &*self, buf)
    }
}
