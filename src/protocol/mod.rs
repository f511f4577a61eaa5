//! Wire protocol for framed I/Q payloads.
//!
//! ```text
//! ┌──────────┬──────────┬──────────────────────────────┐
//! │ Magic    │ Length   │ Payload                      │
//! │ 4 bytes  │ 4 bytes  │ `Length` bytes of Cs8 I/Q    │
//! │ uint32 LE│ uint32 LE│                              │
//! └──────────┴──────────┴──────────────────────────────┘
//! ```
//!
//! - [`header`]: fixed 8-byte header codec and frame encoder
//! - [`decoder`]: resynchronizing stream decoder

pub mod decoder;
pub mod header;

pub use decoder::{DecoderStats, FrameDecoder, Payloads};
pub use header::{DEFAULT_MAX_PAYLOAD_SIZE, FrameHeader, HEADER_SIZE, MAGIC, encode_frame};
