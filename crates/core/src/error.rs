//! Error types for the ingestion engine.

use std::fmt;

/// Errors that can occur while opening or reading an ingestion connection.
///
/// Only connection establishment fails loudly. Once a [`Connection`](crate::Connection)
/// is streaming, per-packet problems are counted in [`Stats`](crate::Stats)
/// instead of being returned (see [`MalformedKind`]).
///
/// - **Setup**: [`InvalidUri`](Self::InvalidUri),
///   [`InvalidAddress`](Self::InvalidAddress),
///   [`InterfaceNotFound`](Self::InterfaceNotFound),
///   [`Socket`](Self::Socket).
/// - **Reading**: [`InvalidRange`](Self::InvalidRange),
///   [`Closed`](Self::Closed).
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Socket creation, bind, group join or receive failure.
    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),

    /// The ingestion URI could not be parsed.
    #[error("invalid URI {uri:?}: {kind}")]
    InvalidUri { uri: String, kind: UriErrorKind },

    /// The host is unparseable, unresolvable, or not a multicast group
    /// where one is required.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The interface hint does not name a local interface with an IPv4 address.
    #[error("network interface not found: {0}")]
    InterfaceNotFound(String),

    /// `offset + length` does not fit in the caller's buffer.
    #[error("read window {offset}+{length} exceeds buffer of {capacity} bytes")]
    InvalidRange {
        offset: usize,
        length: usize,
        capacity: usize,
    },

    /// The connection was closed, or its receiver stopped and every
    /// buffered byte has been read.
    #[error("connection closed")]
    Closed,
}

/// Specific kind of URI parse failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UriErrorKind {
    /// Scheme other than `rtp://` or `udp://`.
    UnsupportedScheme,
    /// Nothing after the scheme.
    MissingHost,
    /// Port is not a number in `0..=65535`.
    InvalidPort,
    /// Text before `@` (source-specific filters are not supported).
    SourceFilter,
}

impl fmt::Display for UriErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedScheme => write!(f, "unsupported scheme, expected rtp:// or udp://"),
            Self::MissingHost => write!(f, "missing host"),
            Self::InvalidPort => write!(f, "invalid port"),
            Self::SourceFilter => write!(f, "source filter before '@' is not supported"),
        }
    }
}

/// Reason a single datagram was discarded.
///
/// Never surfaced to the consumer: the packet is dropped and counted in
/// [`Stats::malformed`](crate::Stats::malformed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedKind {
    /// Shorter than the 12-byte RTP fixed header.
    TooShort,
    /// RTP version field is not 2.
    BadVersion(u8),
    /// CSRC list runs past the end of the datagram.
    TruncatedCsrc,
    /// Header extension runs past the end of the datagram.
    TruncatedExtension,
    /// Padding count is larger than the payload.
    BadPadding(u8),
    /// Payload length is zero or not a multiple of 188.
    Misaligned(usize),
    /// A TS frame does not start with 0x47.
    BadSync { offset: usize },
    /// The first datagram is neither RTP nor bare MPEG-TS.
    UnknownFormat,
}

impl fmt::Display for MalformedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort => write!(f, "shorter than RTP header"),
            Self::BadVersion(v) => write!(f, "RTP version {v}"),
            Self::TruncatedCsrc => write!(f, "truncated CSRC list"),
            Self::TruncatedExtension => write!(f, "truncated header extension"),
            Self::BadPadding(p) => write!(f, "padding {p} exceeds payload"),
            Self::Misaligned(len) => write!(f, "payload of {len} bytes is not 188-aligned"),
            Self::BadSync { offset } => write!(f, "missing sync byte at offset {offset}"),
            Self::UnknownFormat => write!(f, "neither RTP nor MPEG-TS"),
        }
    }
}

/// Convenience alias for `Result<T, IngestError>`.
pub type Result<T> = std::result::Result<T, IngestError>;
