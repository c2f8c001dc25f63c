use crate::error::MalformedKind;

/// Length of the RTP fixed header (RFC 3550 §5.1).
pub const RTP_HEADER_LEN: usize = 12;

/// The only RTP version accepted.
pub const RTP_VERSION: u8 = 2;

/// A parsed RTP packet borrowing its payload from the receive buffer.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// |                  CSRC list (CC × 32 bits)                     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |      profile (if X)           |     length in 32-bit words    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                   extension data (length × 32 bits)           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                  payload ...   | padding | pad count (if P)   |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Only the sequence number and payload bounds matter for TS ingestion;
/// the remaining fields are kept for logging and sender-restart detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpPacket<'a> {
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub payload_type: u8,
    pub marker: bool,
    /// Bytes after the header, CSRC list and extension, minus padding.
    pub payload: &'a [u8],
}

impl<'a> RtpPacket<'a> {
    /// Parse a datagram as an RTP packet.
    ///
    /// The payload is not checked for TS alignment here: a packet with an
    /// unusable payload still carries a usable sequence number.
    pub fn parse(datagram: &'a [u8]) -> Result<Self, MalformedKind> {
        if datagram.len() < RTP_HEADER_LEN {
            return Err(MalformedKind::TooShort);
        }

        let first = datagram[0];
        let version = first >> 6;
        if version != RTP_VERSION {
            return Err(MalformedKind::BadVersion(version));
        }
        let padding = first & 0x20 != 0;
        let extension = first & 0x10 != 0;
        let csrc_count = (first & 0x0f) as usize;

        let mut header_len = RTP_HEADER_LEN + 4 * csrc_count;
        if datagram.len() < header_len {
            return Err(MalformedKind::TruncatedCsrc);
        }

        if extension {
            if datagram.len() < header_len + 4 {
                return Err(MalformedKind::TruncatedExtension);
            }
            let words = u16::from_be_bytes([datagram[header_len + 2], datagram[header_len + 3]]);
            header_len += 4 + 4 * words as usize;
            if datagram.len() < header_len {
                return Err(MalformedKind::TruncatedExtension);
            }
        }

        let mut end = datagram.len();
        if padding {
            let available = end - header_len;
            if available == 0 {
                return Err(MalformedKind::BadPadding(0));
            }
            let pad = datagram[end - 1];
            if pad as usize > available {
                return Err(MalformedKind::BadPadding(pad));
            }
            end -= pad as usize;
        }

        Ok(Self {
            sequence: u16::from_be_bytes([datagram[2], datagram[3]]),
            timestamp: u32::from_be_bytes([datagram[4], datagram[5], datagram[6], datagram[7]]),
            ssrc: u32::from_be_bytes([datagram[8], datagram[9], datagram[10], datagram[11]]),
            payload_type: datagram[1] & 0x7f,
            marker: datagram[1] & 0x80 != 0,
            payload: &datagram[header_len..end],
        })
    }
}
