// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Test frame encoding and stream decoding.
//!
//! # Wire Format
//!
//! ```text
//! +--------+----------+-------------------+----------+
//! | marker | seq      | payload           | crc16    |
//! | (0xA5) | u16 (BE) | 40 bytes          | u16 (BE) |
//! +--------+----------+-------------------+----------+
//! ```
//!
//! - Every frame is exactly [`FRAME_LEN`] bytes. The serial link offers no
//!   delimiter recovery, so a fixed length is what lets the receiver
//!   resynchronize after corruption.
//! - The CRC covers `seq || payload`, not the marker.
//!
//! Both endpoints must be built with the same constants.

use super::crc::Crc16;

/// Frame marker byte.
pub const FRAME_MARKER: u8 = 0xA5;

/// Payload width in bytes.
pub const PAYLOAD_LEN: usize = 40;

/// Total encoded frame size: marker + seq + payload + crc.
pub const FRAME_LEN: usize = 1 + 2 + PAYLOAD_LEN + 2;

/// Sequence numbers wrap at this modulus (the full `u16` space).
pub const SEQ_MODULUS: u32 = 1 << 16;

/// Filler the sender puts in every payload.
pub const TEST_PATTERN: [u8; PAYLOAD_LEN] = {
    let mut pattern = [0u8; PAYLOAD_LEN];
    let mut i = 0;
    while i < PAYLOAD_LEN {
        pattern[i] = if i % 2 == 0 { b'a' } else { b'b' };
        i += 1;
    }
    pattern
};

const SEQ_OFFSET: usize = 1;
const PAYLOAD_OFFSET: usize = SEQ_OFFSET + 2;
const CRC_OFFSET: usize = PAYLOAD_OFFSET + PAYLOAD_LEN;

/// Error during frame encoding or decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Output buffer shorter than [`FRAME_LEN`].
    BufferTooSmall,
    /// Fewer than [`FRAME_LEN`] bytes available.
    Truncated,
    /// First byte is not [`FRAME_MARKER`].
    InvalidMarker,
    /// Stored CRC does not match the computed one.
    CrcMismatch { stored: u16, computed: u16 },
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BufferTooSmall => write!(f, "buffer too small for frame"),
            Self::Truncated => write!(f, "truncated frame"),
            Self::InvalidMarker => write!(f, "invalid frame marker"),
            Self::CrcMismatch { stored, computed } => write!(
                f,
                "CRC mismatch (stored {:#06x}, computed {:#06x})",
                stored, computed
            ),
        }
    }
}

impl std::error::Error for FrameError {}

/// A single test frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub seq: u16,
    pub payload: [u8; PAYLOAD_LEN],
}

impl Frame {
    /// Frame carrying the standard test pattern.
    #[must_use]
    pub fn test_pattern(seq: u16) -> Self {
        Self {
            seq,
            payload: TEST_PATTERN,
        }
    }

    /// Whether the payload still matches [`TEST_PATTERN`].
    #[must_use]
    pub fn has_test_pattern(&self) -> bool {
        self.payload == TEST_PATTERN
    }

    /// CRC over `seq || payload`.
    #[must_use]
    pub fn checksum(&self) -> u16 {
        Crc16::new()
            .update(&self.seq.to_be_bytes())
            .update(&self.payload)
            .finish()
    }

    /// Encode into a fixed-size array.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        let mut out = [0u8; FRAME_LEN];
        write_frame(self, &mut out);
        out
    }
}

fn write_frame(frame: &Frame, out: &mut [u8]) {
    out[0] = FRAME_MARKER;
    out[SEQ_OFFSET..PAYLOAD_OFFSET].copy_from_slice(&frame.seq.to_be_bytes());
    out[PAYLOAD_OFFSET..CRC_OFFSET].copy_from_slice(&frame.payload);
    out[CRC_OFFSET..FRAME_LEN].copy_from_slice(&frame.checksum().to_be_bytes());
}

/// Encode a frame into `buf`.
///
/// Returns the number of bytes written (always [`FRAME_LEN`]).
pub fn encode_frame(frame: &Frame, buf: &mut [u8]) -> Result<usize, FrameError> {
    if buf.len() < FRAME_LEN {
        return Err(FrameError::BufferTooSmall);
    }
    write_frame(frame, &mut buf[..FRAME_LEN]);
    Ok(FRAME_LEN)
}

/// Decode one frame from the start of `buf`.
///
/// Bytes past [`FRAME_LEN`] are ignored.
///
/// # Errors
///
/// - `Truncated` if fewer than [`FRAME_LEN`] bytes are given
/// - `InvalidMarker` if `buf[0]` is not the marker
/// - `CrcMismatch` if the integrity check fails
pub fn decode_frame(buf: &[u8]) -> Result<Frame, FrameError> {
    if buf.len() < FRAME_LEN {
        return Err(FrameError::Truncated);
    }
    if buf[0] != FRAME_MARKER {
        return Err(FrameError::InvalidMarker);
    }

    let seq = u16::from_be_bytes([buf[SEQ_OFFSET], buf[SEQ_OFFSET + 1]]);
    let mut payload = [0u8; PAYLOAD_LEN];
    payload.copy_from_slice(&buf[PAYLOAD_OFFSET..CRC_OFFSET]);
    let frame = Frame { seq, payload };

    let stored = u16::from_be_bytes([buf[CRC_OFFSET], buf[CRC_OFFSET + 1]]);
    let computed = frame.checksum();
    if stored != computed {
        return Err(FrameError::CrcMismatch { stored, computed });
    }

    Ok(frame)
}

/// Offset of the next marker byte, if any.
#[must_use]
pub fn find_marker(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == FRAME_MARKER)
}

/// Decoder counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecoderStats {
    /// Frames that passed the CRC.
    pub frames: u64,
    /// Candidate frames rejected by the CRC.
    pub crc_failures: u64,
    /// Bytes thrown away while hunting for a marker.
    pub bytes_discarded: u64,
}

/// Recovers frames from a byte stream that may be partial or corrupted.
///
/// Bytes are appended with [`push`](Self::push) as they arrive; frames are
/// pulled with [`next_frame`](Self::next_frame) or [`frames`](Self::frames).
/// An incomplete frame stays buffered until the rest arrives. On a CRC
/// mismatch exactly one byte is dropped and the marker hunt resumes from the
/// next position, so a corrupted frame never swallows the valid one after it.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    stats: DecoderStats,
}

impl FrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(FRAME_LEN * 4),
            stats: DecoderStats::default(),
        }
    }

    /// Append received bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes currently buffered (always less than one frame after draining).
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Next valid frame, or `None` when more bytes are needed.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match find_marker(&self.buf) {
                Some(0) => {}
                Some(offset) => self.discard(offset),
                None => {
                    let len = self.buf.len();
                    self.discard(len);
                    return None;
                }
            }

            if self.buf.len() < FRAME_LEN {
                return None;
            }

            match decode_frame(&self.buf) {
                Ok(frame) => {
                    self.buf.drain(..FRAME_LEN);
                    self.stats.frames += 1;
                    return Some(frame);
                }
                Err(err) => {
                    log::debug!("[FRAME] resync: {}", err);
                    self.stats.crc_failures += 1;
                    self.discard(1);
                }
            }
        }
    }

    /// Lazy iterator over the frames currently recoverable.
    ///
    /// Ends when the buffer runs dry; call again after the next `push`.
    pub fn frames(&mut self) -> Frames<'_> {
        Frames { decoder: self }
    }

    fn discard(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        self.buf.drain(..count);
        self.stats.bytes_discarded += count as u64;
    }
}

/// Iterator returned by [`FrameDecoder::frames`].
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
}

impl Iterator for Frames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        self.decoder.next_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_len_matches_layout() {
        assert_eq!(FRAME_LEN, 45);
        assert_eq!(CRC_OFFSET + 2, FRAME_LEN);
        assert_eq!(&TEST_PATTERN[..4], b"abab");
    }

    #[test]
    fn test_encode_decode() {
        let frame = Frame::test_pattern(0x1234);
        let bytes = frame.to_bytes();

        assert_eq!(bytes[0], FRAME_MARKER);
        assert_eq!(&bytes[1..3], &[0x12, 0x34]);

        let decoded = decode_frame(&bytes).expect("decode");
        assert_eq!(decoded, frame);
        assert!(decoded.has_test_pattern());
    }

    #[test]
    fn test_encode_buffer_too_small() {
        let mut buf = [0u8; FRAME_LEN - 1];
        assert_eq!(
            encode_frame(&Frame::test_pattern(1), &mut buf),
            Err(FrameError::BufferTooSmall)
        );
    }

    #[test]
    fn test_decode_errors() {
        let bytes = Frame::test_pattern(7).to_bytes();

        assert_eq!(decode_frame(&bytes[..10]), Err(FrameError::Truncated));

        let mut wrong_marker = bytes;
        wrong_marker[0] = 0x00;
        assert_eq!(decode_frame(&wrong_marker), Err(FrameError::InvalidMarker));

        let mut corrupted = bytes;
        corrupted[PAYLOAD_OFFSET + 3] ^= 0x10;
        assert!(matches!(
            decode_frame(&corrupted),
            Err(FrameError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn test_decoder_waits_for_partial_frame() {
        let bytes = Frame::test_pattern(3).to_bytes();
        let mut decoder = FrameDecoder::new();

        decoder.push(&bytes[..20]);
        assert_eq!(decoder.next_frame(), None);
        assert_eq!(decoder.buffered(), 20);

        decoder.push(&bytes[20..]);
        assert_eq!(decoder.next_frame(), Some(Frame::test_pattern(3)));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_decoder_byte_at_a_time() {
        let mut stream = Vec::new();
        for seq in 0..5u16 {
            stream.extend_from_slice(&Frame::test_pattern(seq).to_bytes());
        }

        let mut decoder = FrameDecoder::new();
        let mut seqs = Vec::new();
        for byte in stream {
            decoder.push(&[byte]);
            seqs.extend(decoder.frames().map(|f| f.seq));
        }
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_decoder_skips_leading_noise() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"OK\r\n+++garbage");
        decoder.push(&Frame::test_pattern(9).to_bytes());

        let frames: Vec<_> = decoder.frames().collect();
        assert_eq!(frames, vec![Frame::test_pattern(9)]);
        assert_eq!(decoder.stats().bytes_discarded, 14);
    }

    #[test]
    fn test_decoder_drops_noise_without_marker() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&[0x00; 500]);
        assert_eq!(decoder.next_frame(), None);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_decoder_resyncs_after_truncated_frame() {
        // A frame cut short by a radio dropout, followed by an intact one.
        let lost = Frame::test_pattern(1).to_bytes();
        let intact = Frame::test_pattern(2).to_bytes();

        let mut decoder = FrameDecoder::new();
        decoder.push(&lost[..30]);
        decoder.push(&intact);

        let seqs: Vec<u16> = decoder.frames().map(|f| f.seq).collect();
        assert_eq!(seqs, vec![2]);
        assert!(decoder.stats().crc_failures >= 1);
    }

    #[test]
    fn test_decoder_drops_every_single_bit_corruption() {
        let first = Frame::test_pattern(10).to_bytes();
        let middle = Frame::test_pattern(11).to_bytes();
        let last = Frame::test_pattern(12).to_bytes();

        for byte in 0..FRAME_LEN {
            for bit in 0..8 {
                let mut corrupted = middle;
                corrupted[byte] ^= 1 << bit;

                let mut decoder = FrameDecoder::new();
                decoder.push(&first);
                decoder.push(&corrupted);
                decoder.push(&last);

                let seqs: Vec<u16> = decoder.frames().map(|f| f.seq).collect();
                assert_eq!(seqs, vec![10, 12], "flip at byte {} bit {}", byte, bit);
                assert_eq!(decoder.buffered(), 0);
            }
        }
    }

    #[test]
    fn test_decoder_random_corruption_keeps_sync() {
        let mut rng = fastrand::Rng::with_seed(0x5EED);
        let mut decoder = FrameDecoder::new();
        let mut delivered = Vec::new();

        for seq in 0..200u16 {
            let mut bytes = Frame::test_pattern(seq).to_bytes();
            if seq % 5 == 0 {
                let byte = rng.usize(1..FRAME_LEN);
                bytes[byte] ^= 1 << rng.u8(0..8);
            }
            decoder.push(&bytes);
            delivered.extend(decoder.frames().map(|f| f.seq));
        }

        let expected: Vec<u16> = (0..200u16).filter(|s| s % 5 != 0).collect();
        assert_eq!(delivered, expected);
    }
}
