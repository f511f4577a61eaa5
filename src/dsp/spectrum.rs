//! Log-magnitude spectrum of a Cs8 payload.
//!
//! Each payload is interpreted as interleaved signed 8-bit I/Q pairs, run
//! through one forward, unnormalized FFT over its full length, and mapped to
//! `20 * log10(|X[k]| + EPSILON)` per bin. There is no windowing, averaging
//! or scaling, and bins are kept in natural FFT order (bin 0 is DC).
//!
//! # Example
//! ```
//! use iqscope::dsp::{EPSILON, SpectrumTransform};
//!
//! let mut transform = SpectrumTransform::new();
//! let frame = transform.transform(&[0u8; 8]);
//! assert_eq!(frame.len(), 4);
//! assert!(frame.bins().iter().all(|&db| db == (20.0 * EPSILON.log10()) as f32));
//! ```

use num_complex::Complex;
use rustfft::FftPlanner;

/// Offset added to each magnitude before taking the logarithm.
pub const EPSILON: f64 = 1e-6;

/// One spectrum snapshot: `N` dB values for a payload of `2N` bytes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpectrumFrame {
    bins: Vec<f32>,
}

impl SpectrumFrame {
    pub fn from_bins(bins: Vec<f32>) -> Self {
        Self { bins }
    }

    /// Magnitudes in dB, bin 0 first.
    pub fn bins(&self) -> &[f32] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Index and value of the strongest bin.
    pub fn peak(&self) -> Option<(usize, f32)> {
        self.bins
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }
}

/// Interpret `bytes` as interleaved signed 8-bit I/Q pairs.
///
/// Values are kept on the −128..127 scale. A trailing odd byte is ignored.
pub fn cs8_to_complex(bytes: &[u8]) -> Vec<Complex<f64>> {
    bytes
        .chunks_exact(2)
        .map(|c| Complex::new((c[0] as i8) as f64, (c[1] as i8) as f64))
        .collect()
}

/// Convert an FFT magnitude to dB.
#[inline]
pub fn magnitude_db(magnitude: f64) -> f32 {
    (20.0 * (magnitude + EPSILON).log10()) as f32
}

/// Payload-to-spectrum converter.
///
/// Holds an FFT planner so repeated payload sizes reuse their plan; the
/// output depends only on the payload bytes.
pub struct SpectrumTransform {
    planner: FftPlanner<f64>,
    scratch: Vec<Complex<f64>>,
}

impl SpectrumTransform {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
            scratch: Vec::new(),
        }
    }

    /// Compute the spectrum frame of one payload.
    pub fn transform(&mut self, payload: &[u8]) -> SpectrumFrame {
        let mut buffer = cs8_to_complex(payload);
        if buffer.is_empty() {
            return SpectrumFrame::default();
        }

        let fft = self.planner.plan_fft_forward(buffer.len());
        self.scratch
            .resize(fft.get_inplace_scratch_len(), Complex::new(0.0, 0.0));
        fft.process_with_scratch(&mut buffer, &mut self.scratch);

        SpectrumFrame::from_bins(buffer.iter().map(|c| magnitude_db(c.norm())).collect())
    }
}

impl Default for SpectrumTransform {
    fn default() -> Self {
        Self::new()
    }
}
