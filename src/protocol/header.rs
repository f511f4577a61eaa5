//! Frame header encoding and decoding.
//!
//! All multi-byte integers are little-endian.

use bytes::{BufMut, Bytes, BytesMut};

/// Protocol magic marker, ASCII "SPRD" (sent little-endian, so "DRPS" on the wire).
pub const MAGIC: u32 = 0x5350_5244;

/// Header size in bytes (magic + payload length).
pub const HEADER_SIZE: usize = 8;

/// Default ceiling for a declared payload length (1 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 1 << 20;

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Magic marker as read from the wire.
    pub magic: u32,
    /// Declared payload length in bytes (untrusted).
    pub payload_length: u32,
}

impl FrameHeader {
    /// Header for a payload of `payload_length` bytes with the protocol magic.
    pub fn new(payload_length: u32) -> Self {
        Self {
            magic: MAGIC,
            payload_length,
        }
    }

    /// Decode a header from the first [`HEADER_SIZE`] bytes of `buf`.
    ///
    /// Returns `None` if fewer than [`HEADER_SIZE`] bytes are available.
    /// The magic is not validated here, see [`FrameHeader::has_valid_magic`].
    #[inline]
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            magic: read_magic(buf)?,
            payload_length: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
        })
    }

    /// Encode the header to its wire representation.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[..4].copy_from_slice(&self.magic.to_le_bytes());
        out[4..].copy_from_slice(&self.payload_length.to_le_bytes());
        out
    }

    #[inline]
    pub fn has_valid_magic(&self) -> bool {
        self.magic == MAGIC
    }

    /// Total frame size on the wire (header + payload).
    ///
    /// `None` when the size does not fit in `usize` (32-bit targets with a
    /// length near `u32::MAX`).
    #[inline]
    pub fn frame_size(&self) -> Option<usize> {
        usize::try_from(self.payload_length)
            .ok()?
            .checked_add(HEADER_SIZE)
    }
}

/// Read the 4-byte little-endian magic at the start of `buf`.
#[inline]
pub(crate) fn read_magic(buf: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = buf.get(..4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

/// Encode a complete frame (header + payload).
///
/// # Panics
///
/// Panics if `payload` is longer than `u32::MAX` bytes.
pub fn encode_frame(payload: &[u8]) -> Bytes {
    let length = u32::try_from(payload.len()).expect("payload length exceeds u32::MAX");
    let mut out = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    out.put_slice(&FrameHeader::new(length).encode());
    out.put_slice(payload);
    out.freeze()
}
