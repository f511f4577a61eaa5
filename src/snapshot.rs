//! Render consumer writing the waterfall to an image.
//!
//! [`SnapshotConsumer`] is the consumer used by the `iqscope` binary: it
//! keeps count of published frames and logs the strongest bin now and then.
//! [`write_waterfall_png`] draws the waterfall, newest row at the top, one
//! pixel per bin, using a Gqrx-style colour map over the display range.

use std::path::Path;

use plotters::prelude::*;
use tracing::{debug, info};

use crate::dsp::{SpectrumFrame, Waterfall};
use crate::error::{Error, Result};
use crate::pipeline::RenderConsumer;

/// Logs a summary every `log_every` renders.
#[derive(Debug, Clone)]
pub struct SnapshotConsumer {
    renders: u64,
    log_every: u64,
}

impl SnapshotConsumer {
    /// `log_every == 0` disables the periodic summary.
    pub fn new(log_every: u64) -> Self {
        Self {
            renders: 0,
            log_every,
        }
    }

    pub fn renders(&self) -> u64 {
        self.renders
    }
}

impl RenderConsumer for SnapshotConsumer {
    fn render(&mut self, spectrum: &SpectrumFrame, waterfall: &Waterfall) {
        self.renders += 1;
        if self.log_every == 0 || self.renders % self.log_every != 0 {
            return;
        }
        if let Some((bin, db)) = spectrum.peak() {
            debug!(
                "render #{}: {} bins, peak {:.1} dB at bin {}, waterfall {}/{} rows",
                self.renders,
                spectrum.len(),
                db,
                bin,
                waterfall.filled(),
                waterfall.height()
            );
        }
    }
}

/// Gqrx-style colour map: dark blue → yellow → white, `norm` in 0.0..=1.0.
pub fn waterfall_color(norm: f32) -> RGBColor {
    let norm = norm.clamp(0.0, 1.0);
    if norm < 0.25 {
        RGBColor(0, (norm * 4.0 * 64.0) as u8, 128)
    } else if norm < 0.5 {
        RGBColor(
            ((norm - 0.25) * 4.0 * 255.0) as u8,
            255,
            (128.0 - (norm - 0.25) * 4.0 * 128.0) as u8,
        )
    } else if norm < 0.75 {
        RGBColor(255, (255.0 - (norm - 0.5) * 4.0 * 128.0) as u8, 0)
    } else {
        RGBColor(255, 255, ((norm - 0.75) * 4.0 * 255.0) as u8)
    }
}

fn render_error<E: std::fmt::Display>(err: E) -> Error {
    Error::render(err.to_string())
}

/// Draw `waterfall` into a PNG at `path`.
///
/// The image is `width × height` pixels, with `width` taken from the most
/// recent frame. Unwritten rows stay black.
pub fn write_waterfall_png<P: AsRef<Path>>(path: P, waterfall: &Waterfall) -> Result<()> {
    let width = waterfall.width().max(1);
    let height = waterfall.height();
    let range = waterfall.range();

    let root = BitMapBackend::new(path.as_ref(), (width as u32, height as u32)).into_drawing_area();
    root.fill(&BLACK).map_err(render_error)?;

    let rows: Vec<&[f32]> = waterfall.rows_oldest_first().collect();
    for (y, row) in rows.iter().rev().enumerate() {
        for (x, &db) in row.iter().take(width).enumerate() {
            let color = waterfall_color(range.normalize(db));
            root.draw_pixel((x as i32, y as i32), &color)
                .map_err(render_error)?;
        }
    }

    root.present().map_err(render_error)?;
    info!(
        "waterfall snapshot saved to {} ({}x{})",
        path.as_ref().display(),
        width,
        height
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::DbRange;
    use std::fs;

    #[test]
    fn test_color_map_endpoints() {
        let rgb = |c: RGBColor| (c.0, c.1, c.2);
        assert_eq!(rgb(waterfall_color(0.0)), (0, 0, 128));
        assert_eq!(rgb(waterfall_color(1.0)), (255, 255, 255));
        assert_eq!(rgb(waterfall_color(-3.0)), rgb(waterfall_color(0.0)));
    }

    #[test]
    fn test_consumer_counts_renders() {
        let waterfall = Waterfall::new(2, DbRange::default()).unwrap();
        let frame = SpectrumFrame::from_bins(vec![-10.0, 0.0]);
        let mut consumer = SnapshotConsumer::new(1);
        consumer.render(&frame, &waterfall);
        consumer.render(&frame, &waterfall);
        assert_eq!(consumer.renders(), 2);
    }

    #[test]
    fn test_write_png() {
        let mut waterfall = Waterfall::new(16, DbRange::default()).unwrap();
        for i in 0..20 {
            waterfall.push(&SpectrumFrame::from_bins(vec![-150.0 + i as f32 * 8.0; 32]));
        }

        let path = std::env::temp_dir().join(format!("iqscope_snapshot_{}.png", std::process::id()));
        write_waterfall_png(&path, &waterfall).expect("Failed to write snapshot");

        let bytes = fs::read(&path).expect("Failed to read snapshot");
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");

        fs::remove_file(&path).ok();
    }
}
