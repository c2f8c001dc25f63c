//! Wire formats carried by ingested datagrams.
//!
//! A stream is either RTP-encapsulated MPEG-TS (RFC 2250) or bare MPEG-TS
//! over UDP. [`detect`] decides which from the first datagram of a
//! connection, and the choice holds for the connection's lifetime.
//!
//! | Format | Module | First byte |
//! |--------|--------|------------|
//! | RTP (RFC 3550) | [`rtp`] | `0b10xx_xxxx` (version 2) |
//! | MPEG-TS (ISO/IEC 13818-1) | [`ts`] | `0x47` |

pub mod rtp;
pub mod ts;

use crate::error::MalformedKind;

/// Framing of a connection's datagrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// RTP header followed by whole TS packets.
    Rtp,
    /// TS packets directly in the UDP payload.
    RawTs,
}

/// Classify a stream from its first datagram.
///
/// The sync byte check comes first: 0x47 has version bits `01`, so it can
/// never be mistaken for RTP.
pub fn detect(first_datagram: &[u8]) -> Result<Mode, MalformedKind> {
    match first_datagram.first() {
        Some(&ts::TS_SYNC_BYTE) => Ok(Mode::RawTs),
        Some(byte) if byte >> 6 == rtp::RTP_VERSION => Ok(Mode::Rtp),
        _ => Err(MalformedKind::UnknownFormat),
    }
}
