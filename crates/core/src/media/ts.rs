use std::slice::ChunksExact;

use crate::error::MalformedKind;

/// MPEG-TS packet size (ISO/IEC 13818-1 §2.4.3).
pub const TS_PACKET_SIZE: usize = 188;

/// First byte of every TS packet.
pub const TS_SYNC_BYTE: u8 = 0x47;

/// Split a payload into 188-byte TS packets, validating all of them first.
///
/// The payload is rejected as a whole if it is empty, not a multiple of
/// 188 bytes, or if any packet lacks the sync byte. Emitting the good
/// packets of a bad payload would desynchronize the demultiplexer
/// downstream.
pub fn split(payload: &[u8]) -> Result<ChunksExact<'_, u8>, MalformedKind> {
    if payload.is_empty() || payload.len() % TS_PACKET_SIZE != 0 {
        return Err(MalformedKind::Misaligned(payload.len()));
    }
    let frames = payload.chunks_exact(TS_PACKET_SIZE);
    if let Some(bad) = frames.clone().position(|frame| frame[0] != TS_SYNC_BYTE) {
        return Err(MalformedKind::BadSync {
            offset: bad * TS_PACKET_SIZE,
        });
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ts_payload;

    #[test]
    fn splits_aligned_payload() {
        let payload = ts_payload(7, 12);
        let frames: Vec<&[u8]> = split(&payload).unwrap().collect();
        assert_eq!(frames.len(), 7);
        assert!(frames.iter().all(|f| f.len() == TS_PACKET_SIZE && f[0] == TS_SYNC_BYTE));
        assert_eq!(frames[6][3], 6);
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(split(&[]).unwrap_err(), MalformedKind::Misaligned(0));
    }

    #[test]
    fn rejects_misaligned() {
        let mut payload = ts_payload(2, 0);
        payload.push(0);
        assert_eq!(split(&payload).unwrap_err(), MalformedKind::Misaligned(377));
    }

    #[test]
    fn rejects_whole_payload_on_one_bad_sync() {
        let mut payload = ts_payload(7, 0);
        payload[3 * TS_PACKET_SIZE] = 0x00;
        assert_eq!(
            split(&payload).unwrap_err(),
            MalformedKind::BadSync { offset: 564 }
        );
    }
}
