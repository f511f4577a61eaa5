//! Scrolling waterfall history.
//!
//! A fixed-height ring of rows, one per pushed spectrum frame. Values are
//! clamped to a display range on the way in so downstream colour mapping
//! never sees out-of-range dB values. Rows are never reordered: `push`
//! writes the row under the cursor and moves the cursor forward by one,
//! wrapping after the last row.

use crate::dsp::spectrum::SpectrumFrame;
use crate::error::{Error, Result};

/// Default number of rows kept in the waterfall.
pub const DEFAULT_WATERFALL_HEIGHT: usize = 512;

/// Display range in dB; values outside it are clamped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DbRange {
    pub min: f32,
    pub max: f32,
}

impl DbRange {
    /// Create a range, rejecting empty, inverted or non-finite bounds.
    pub fn new(min: f32, max: f32) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() || min >= max {
            return Err(Error::config(format!(
                "invalid dB range {min}..{max}: min must be below max"
            )));
        }
        Ok(Self { min, max })
    }

    #[inline]
    pub fn clamp(&self, db: f32) -> f32 {
        db.clamp(self.min, self.max)
    }

    /// Position of `db` within the range, from 0.0 (min) to 1.0 (max).
    #[inline]
    pub fn normalize(&self, db: f32) -> f32 {
        ((self.clamp(db) - self.min) / (self.max - self.min)).clamp(0.0, 1.0)
    }
}

impl Default for DbRange {
    fn default() -> Self {
        Self {
            min: -150.0,
            max: 10.0,
        }
    }
}

/// Fixed-height circular buffer of clamped spectrum rows.
#[derive(Debug, Clone)]
pub struct Waterfall {
    rows: Vec<Vec<f32>>,
    /// Next row to be written.
    cursor: usize,
    filled: usize,
    width: usize,
    range: DbRange,
}

impl Waterfall {
    /// Fails on a zero height or on a range [`DbRange::new`] would reject.
    pub fn new(height: usize, range: DbRange) -> Result<Self> {
        if height == 0 {
            return Err(Error::config("waterfall height must be at least 1"));
        }
        let range = DbRange::new(range.min, range.max)?;
        Ok(Self {
            rows: vec![Vec::new(); height],
            cursor: 0,
            filled: 0,
            width: 0,
            range,
        })
    }

    /// Clamp `frame` into the row under the cursor and advance the cursor.
    pub fn push(&mut self, frame: &SpectrumFrame) {
        let range = self.range;
        let row = &mut self.rows[self.cursor];
        row.clear();
        row.extend(frame.bins().iter().map(|&db| range.clamp(db)));

        self.width = frame.len();
        self.cursor = (self.cursor + 1) % self.rows.len();
        self.filled = (self.filled + 1).min(self.rows.len());
    }

    /// Index of the next row to be written (the oldest row once full).
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Width of the most recently pushed frame; older rows may differ.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of rows written so far, saturating at the height.
    pub fn filled(&self) -> usize {
        self.filled
    }

    pub fn range(&self) -> DbRange {
        self.range
    }

    /// The raw ring in storage order; unwritten rows are empty.
    pub fn rows(&self) -> &[Vec<f32>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&[f32]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    /// The most recently written row.
    pub fn latest(&self) -> Option<&[f32]> {
        if self.filled == 0 {
            return None;
        }
        let index = (self.cursor + self.rows.len() - 1) % self.rows.len();
        self.row(index)
    }

    /// Written rows from oldest to newest.
    pub fn rows_oldest_first(&self) -> impl Iterator<Item = &[f32]> {
        let (newer, older) = if self.filled < self.rows.len() {
            (&self.rows[..self.filled], &self.rows[..0])
        } else {
            self.rows.split_at(self.cursor)
        };
        older.iter().chain(newer.iter()).map(Vec::as_slice)
    }
}
