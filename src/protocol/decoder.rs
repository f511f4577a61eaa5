//! Resynchronizing frame decoder.
//!
//! Incoming chunks are appended to a `BytesMut` accumulation buffer and
//! complete payloads are split off its head without copying. The decoder
//! tolerates arbitrary chunk boundaries and recovers from misalignment by
//! sliding forward one byte at a time until a magic marker lines up again.
//!
//! # Example
//!
//! ```
//! use iqscope::protocol::{FrameDecoder, encode_frame};
//!
//! let mut decoder = FrameDecoder::new();
//! let wire = encode_frame(&[1, 2, 3, 4]);
//!
//! assert_eq!(decoder.feed(&wire[..5]).count(), 0);
//! let payloads: Vec<_> = decoder.feed(&wire[5..]).collect();
//! assert_eq!(&payloads[0][..], &[1, 2, 3, 4]);
//! ```

use std::iter::FusedIterator;

use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, trace, warn};

use super::header::{DEFAULT_MAX_PAYLOAD_SIZE, FrameHeader, HEADER_SIZE};

/// Initial capacity of the accumulation buffer (one socket read).
const INITIAL_CAPACITY: usize = 64 * 1024;

/// Counters describing what the decoder has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Payloads emitted.
    pub frames: u64,
    /// Payload bytes emitted (headers excluded).
    pub payload_bytes: u64,
    /// Bytes dropped while looking for the next magic marker.
    pub discarded_bytes: u64,
    /// Headers rejected because their length exceeded the ceiling.
    pub oversize_headers: u64,
}

/// Stream decoder turning arbitrary byte chunks into frame payloads.
///
/// The accumulation buffer never holds a complete, magic-valid frame after
/// a call returns `None`: such frames are split off as soon as they are seen.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_payload_size: u32,
    /// Bytes dropped since the decoder last saw a valid header.
    resync_run: u64,
    stats: DecoderStats,
}

impl FrameDecoder {
    /// Create a decoder with the default payload ceiling.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a decoder rejecting declared lengths above `max_payload_size`.
    pub fn with_max_payload(max_payload_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
            max_payload_size,
            resync_run: 0,
            stats: DecoderStats::default(),
        }
    }

    /// Append `data` and return an iterator over the payloads it completes.
    ///
    /// The iterator is lazy: payloads not pulled before it is dropped stay
    /// buffered and come out of the next `feed` or [`next_payload`] call.
    ///
    /// [`next_payload`]: FrameDecoder::next_payload
    pub fn feed(&mut self, data: &[u8]) -> Payloads<'_> {
        self.buffer.extend_from_slice(data);
        Payloads { decoder: self }
    }

    /// Append `data` without extracting anything.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Append `data` and collect every payload it completes.
    pub fn push(&mut self, data: &[u8]) -> Vec<Bytes> {
        self.feed(data).collect()
    }

    /// Extract the next complete payload from the buffered bytes.
    ///
    /// Returns `None` when more data is needed for a header or a payload.
    pub fn next_payload(&mut self) -> Option<Bytes> {
        while let Some(header) = FrameHeader::decode(&self.buffer) {
            if !header.has_valid_magic() {
                self.buffer.advance(1);
                self.resync_run += 1;
                self.stats.discarded_bytes += 1;
                continue;
            }

            // A length that cannot be addressed is as corrupt as one above
            // the ceiling.
            let total = match header.frame_size() {
                Some(total) if header.payload_length <= self.max_payload_size => total,
                _ => {
                    // Only the magic is dropped: the bytes behind it may hold
                    // the real next frame.
                    warn!(
                        "frame length {} exceeds maximum {}, dropping header magic",
                        header.payload_length, self.max_payload_size
                    );
                    self.buffer.advance(4);
                    self.resync_run += 4;
                    self.stats.discarded_bytes += 4;
                    self.stats.oversize_headers += 1;
                    continue;
                }
            };

            self.finish_resync();

            if self.buffer.len() < total {
                return None;
            }

            self.buffer.advance(HEADER_SIZE);
            let payload = self
                .buffer
                .split_to(header.payload_length as usize)
                .freeze();
            self.stats.frames += 1;
            self.stats.payload_bytes += payload.len() as u64;
            trace!("decoded frame #{} ({} bytes)", self.stats.frames, payload.len());
            return Some(payload);
        }
        None
    }

    fn finish_resync(&mut self) {
        if self.resync_run > 0 {
            debug!("resynchronized after discarding {} bytes", self.resync_run);
            self.resync_run = 0;
        }
    }

    /// Counters accumulated since creation.
    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    pub fn max_payload_size(&self) -> u32 {
        self.max_payload_size
    }

    /// Number of buffered, not yet decoded bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop all buffered bytes, returning how many were discarded.
    ///
    /// Counters are kept.
    pub fn clear(&mut self) -> usize {
        let pending = self.buffer.len();
        self.buffer.clear();
        self.resync_run = 0;
        pending
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy iterator over the payloads completed by a [`FrameDecoder::feed`].
#[derive(Debug)]
pub struct Payloads<'a> {
    decoder: &'a mut FrameDecoder,
}

impl Iterator for Payloads<'_> {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        self.decoder.next_payload()
    }
}

// The iterator holds the only handle to the decoder, so nothing can be
// appended behind its back.
impl FusedIterator for Payloads<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::header::{MAGIC, encode_frame};

    fn header_bytes(magic: u32, length: u32) -> Vec<u8> {
        let mut out = magic.to_le_bytes().to_vec();
        out.extend_from_slice(&length.to_le_bytes());
        out
    }

    #[test]
    fn test_single_complete_frame() {
        let mut decoder = FrameDecoder::new();
        let payloads = decoder.push(&encode_frame(b"hello"));

        assert_eq!(payloads.len(), 1);
        assert_eq!(&payloads[0][..], b"hello");
        assert!(decoder.is_empty());
        assert_eq!(decoder.stats().frames, 1);
        assert_eq!(decoder.stats().payload_bytes, 5);
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut decoder = FrameDecoder::new();
        let mut combined = Vec::new();
        combined.extend_from_slice(&encode_frame(b"first"));
        combined.extend_from_slice(&encode_frame(b"second"));
        combined.extend_from_slice(&encode_frame(b"third"));

        let payloads = decoder.push(&combined);

        assert_eq!(payloads.len(), 3);
        assert_eq!(&payloads[0][..], b"first");
        assert_eq!(&payloads[1][..], b"second");
        assert_eq!(&payloads[2][..], b"third");
        assert!(decoder.is_empty());
    }

    #[test]
    fn test_fragmented_header_consumes_nothing() {
        let mut decoder = FrameDecoder::new();
        let wire = encode_frame(b"test");

        assert!(decoder.push(&wire[..5]).is_empty());
        assert_eq!(decoder.len(), 5);

        let payloads = decoder.push(&wire[5..]);
        assert_eq!(payloads.len(), 1);
        assert_eq!(&payloads[0][..], b"test");
    }

    #[test]
    fn test_fragmented_payload_keeps_header() {
        let mut decoder = FrameDecoder::new();
        let payload = b"this is a longer payload that will be fragmented";
        let wire = encode_frame(payload);

        let split = HEADER_SIZE + 10;
        assert!(decoder.push(&wire[..split]).is_empty());
        assert_eq!(decoder.len(), split);

        let payloads = decoder.push(&wire[split..]);
        assert_eq!(&payloads[0][..], payload);
        assert!(decoder.is_empty());
    }

    #[test]
    fn test_empty_payload_is_a_frame() {
        let mut decoder = FrameDecoder::new();
        let payloads = decoder.push(&encode_frame(b""));

        assert_eq!(payloads.len(), 1);
        assert!(payloads[0].is_empty());
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut decoder = FrameDecoder::new();
        let wire = encode_frame(b"hi");

        let mut all = Vec::new();
        for byte in wire.iter() {
            all.extend(decoder.feed(&[*byte]));
        }

        assert_eq!(all.len(), 1);
        assert_eq!(&all[0][..], b"hi");
    }

    #[test]
    fn test_leading_garbage_is_discarded() {
        let mut decoder = FrameDecoder::new();
        let mut data = vec![0x00, 0x13, 0x37, 0xFF, 0x44, 0x52, 0x50];
        data.extend_from_slice(&encode_frame(b"payload"));

        let payloads = decoder.push(&data);

        assert_eq!(payloads.len(), 1);
        assert_eq!(&payloads[0][..], b"payload");
        assert_eq!(decoder.stats().discarded_bytes, 7);
        assert!(decoder.is_empty());
    }

    #[test]
    fn test_oversize_length_drops_only_magic() {
        let mut decoder = FrameDecoder::with_max_payload(16);
        let mut data = header_bytes(MAGIC, 17);
        data.extend_from_slice(&encode_frame(b"ok"));

        let payloads = decoder.push(&data);

        assert_eq!(payloads.len(), 1);
        assert_eq!(&payloads[0][..], b"ok");
        let stats = decoder.stats();
        assert_eq!(stats.oversize_headers, 1);
        // 4 magic bytes, then the 4 length bytes one by one
        assert_eq!(stats.discarded_bytes, 8);
    }

    #[test]
    fn test_length_at_ceiling_is_accepted() {
        let mut decoder = FrameDecoder::with_max_payload(4);
        let payloads = decoder.push(&encode_frame(&[9, 9, 9, 9]));
        assert_eq!(payloads.len(), 1);
        assert_eq!(decoder.stats().oversize_headers, 0);
    }

    #[test]
    fn test_oversize_header_does_not_grow_buffer() {
        let mut decoder = FrameDecoder::with_max_payload(1024);
        decoder.push(&header_bytes(MAGIC, u32::MAX));
        // Only the length bytes remain; nothing waits for 4 GiB of payload.
        assert!(decoder.len() < HEADER_SIZE);
    }

    #[test]
    fn test_largest_length_with_unbounded_ceiling() {
        let mut decoder = FrameDecoder::with_max_payload(u32::MAX);
        let payloads = decoder.push(&header_bytes(MAGIC, u32::MAX));

        assert!(payloads.is_empty());
        if usize::BITS > 32 {
            // Representable: the header waits for its payload.
            assert_eq!(decoder.len(), HEADER_SIZE);
            assert_eq!(decoder.stats().oversize_headers, 0);
        } else {
            assert_eq!(decoder.stats().oversize_headers, 1);
            assert!(decoder.len() < HEADER_SIZE);
        }
    }

    #[test]
    fn test_lazy_iterator_is_restartable() {
        let mut decoder = FrameDecoder::new();
        let mut data = Vec::new();
        data.extend_from_slice(&encode_frame(b"one"));
        data.extend_from_slice(&encode_frame(b"two"));

        let first = decoder.feed(&data).next().unwrap();
        assert_eq!(&first[..], b"one");

        let rest: Vec<_> = decoder.feed(&[]).collect();
        assert_eq!(rest.len(), 1);
        assert_eq!(&rest[0][..], b"two");
    }

    #[test]
    fn test_clear_discards_pending_bytes() {
        let mut decoder = FrameDecoder::new();
        let wire = encode_frame(b"test");
        decoder.push(&wire[..HEADER_SIZE + 1]);

        assert_eq!(decoder.clear(), HEADER_SIZE + 1);
        assert!(decoder.is_empty());
        assert!(decoder.push(&wire[HEADER_SIZE + 1..]).is_empty());
    }
}
