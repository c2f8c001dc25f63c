//! RTP/UDP multicast ingestion of MPEG transport streams.
//!
//! A [`Connection`] joins a multicast group (or binds a unicast port for
//! `udp://`), receives RTP-encapsulated or bare MPEG-TS datagrams on a
//! background thread, restores RTP sequence order within a bounded
//! window, and hands 188-byte-aligned TS data to a pull-based reader.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod media;
pub mod queue;
pub mod receiver;
pub mod reorder;
pub mod source;
pub mod stats;
pub mod transport;

#[cfg(test)]
mod testutil;

pub use config::IngestConfig;
pub use endpoint::{Endpoint, Scheme};
pub use error::{IngestError, MalformedKind, Result};
pub use source::Connection;
pub use stats::Stats;
