/// Digital Signal Processing (DSP) module.
///
/// This module turns raw Cs8 payloads into display-ready data.
///
/// # Modules
/// - [`spectrum`]: payload to log-magnitude spectrum (one FFT per payload)
/// - [`waterfall`]: fixed-height ring of clamped spectrum rows
///
/// ```text
/// payload (Cs8 I/Q) → SpectrumTransform → SpectrumFrame → Waterfall → render
/// ```
pub mod spectrum;
pub mod waterfall;

pub use spectrum::{EPSILON, SpectrumFrame, SpectrumTransform, cs8_to_complex, magnitude_db};
pub use waterfall::{DEFAULT_WATERFALL_HEIGHT, DbRange, Waterfall};
