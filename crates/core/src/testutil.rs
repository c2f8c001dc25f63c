//! Datagram builders shared by unit tests.

use crate::media::ts::{TS_PACKET_SIZE, TS_SYNC_BYTE};

/// Builds RTP datagrams around a payload. Payload type defaults to 33 (MP2T).
#[derive(Debug, Clone)]
pub struct RtpBuilder {
    pt: u8,
    ssrc: u32,
    marker: bool,
    timestamp: u32,
    csrcs: u8,
    extension_words: Option<u16>,
    padding: u8,
}

impl RtpBuilder {
    pub fn new(ssrc: u32) -> Self {
        Self {
            pt: 33,
            ssrc,
            marker: false,
            timestamp: 0,
            csrcs: 0,
            extension_words: None,
            padding: 0,
        }
    }

    pub fn marker(mut self) -> Self {
        self.marker = true;
        self
    }

    pub fn timestamp(mut self, timestamp: u32) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn csrcs(mut self, count: u8) -> Self {
        self.csrcs = count & 0x0f;
        self
    }

    pub fn extension_words(mut self, words: u16) -> Self {
        self.extension_words = Some(words);
        self
    }

    pub fn padding(mut self, count: u8) -> Self {
        self.padding = count;
        self
    }

    pub fn build(&self, sequence: u16, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(12 + payload.len() + 64);
        let mut first = (2u8 << 6) | self.csrcs;
        if self.padding > 0 {
            first |= 0x20;
        }
        if self.extension_words.is_some() {
            first |= 0x10;
        }
        out.push(first);
        out.push(((self.marker as u8) << 7) | self.pt);
        out.extend_from_slice(&sequence.to_be_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&self.ssrc.to_be_bytes());
        for i in 0..self.csrcs as u32 {
            out.extend_from_slice(&(0xC500_0000 | i).to_be_bytes());
        }
        if let Some(words) = self.extension_words {
            out.extend_from_slice(&0xBEDEu16.to_be_bytes());
            out.extend_from_slice(&words.to_be_bytes());
            out.extend(std::iter::repeat_n(0xEE, 4 * words as usize));
        }
        out.extend_from_slice(payload);
        if self.padding > 0 {
            out.extend(std::iter::repeat_n(0, self.padding as usize - 1));
            out.push(self.padding);
        }
        out
    }
}

/// `frames` TS packets, each tagged with `tag` in bytes 1..3 and its index
/// in byte 3, so tests can tell which datagram a chunk came from.
pub fn ts_payload(frames: usize, tag: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(frames * TS_PACKET_SIZE);
    for index in 0..frames {
        let mut frame = [0xFFu8; TS_PACKET_SIZE];
        frame[0] = TS_SYNC_BYTE;
        frame[1..3].copy_from_slice(&tag.to_be_bytes());
        frame[3] = index as u8;
        out.extend_from_slice(&frame);
    }
    out
}

/// Read back the tag written by [`ts_payload`].
pub fn tag_of(chunk: &[u8]) -> u16 {
    u16::from_be_bytes([chunk[1], chunk[2]])
}
