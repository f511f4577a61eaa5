//! Test helper utilities for building framed Cs8 streams

#![allow(dead_code)]

use std::f64::consts::PI;

use iqscope::protocol::{FrameHeader, MAGIC};

/// Generate a complex tone sitting exactly on FFT bin `bin`
///
/// # Arguments
/// * `bin` - Target bin in natural FFT order
/// * `num_samples` - Number of I/Q pairs (the FFT length)
/// * `amplitude` - Peak amplitude, at most 127
///
/// # Returns
/// Interleaved I/Q bytes (format: Cs8)
pub fn generate_tone_cs8(bin: usize, num_samples: usize, amplitude: f64) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(num_samples * 2);
    let step = 2.0 * PI * bin as f64 / num_samples as f64;

    for n in 0..num_samples {
        let phase = step * n as f64;
        let i = (amplitude * phase.cos()).round() as i8;
        let q = (amplitude * phase.sin()).round() as i8;
        buffer.push(i as u8);
        buffer.push(q as u8);
    }

    buffer
}

/// Header + payload, exactly as a producer sends it
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut wire = FrameHeader::new(payload.len() as u32).encode().to_vec();
    wire.extend_from_slice(payload);
    wire
}

/// Concatenate several frames into one byte stream
pub fn frames(payloads: &[&[u8]]) -> Vec<u8> {
    payloads.iter().flat_map(|p| frame(p)).collect()
}

/// A header with a valid magic declaring `length`, without any payload
pub fn bare_header(length: u32) -> Vec<u8> {
    let mut wire = MAGIC.to_le_bytes().to_vec();
    wire.extend_from_slice(&length.to_le_bytes());
    wire
}

/// Unique scratch directory under the system temp dir
pub fn temp_dir(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("iqscope_it_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_tone_cs8_length() {
        let samples = generate_tone_cs8(3, 64, 100.0);
        assert_eq!(samples.len(), 128); // 64 samples * 2 bytes per sample
    }

    #[test]
    fn test_generate_tone_cs8_dc() {
        // Bin 0 is a constant I=amplitude, Q=0
        let samples = generate_tone_cs8(0, 8, 100.0);
        for pair in samples.chunks_exact(2) {
            assert_eq!(pair[0] as i8, 100);
            assert_eq!(pair[1] as i8, 0);
        }
    }

    #[test]
    fn test_frame_layout() {
        let wire = frame(&[1, 2, 3]);
        assert_eq!(&wire[..4], b"DRPS");
        assert_eq!(&wire[4..8], &[3, 0, 0, 0]);
        assert_eq!(&wire[8..], &[1, 2, 3]);
    }
}
