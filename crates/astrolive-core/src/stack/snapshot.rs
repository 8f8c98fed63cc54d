use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ndarray::Array3;

use crate::consts::{SCIENTIFIC_SCALE, STACK_VALUE_MAX};

/// Immutable export of the running stack.
#[derive(Clone, Debug)]
pub struct StackSnapshot {
    /// Composite truncated to 8 bits.
    pub preview: Array3<u8>,
    /// Composite scaled by 257 into 16 bits.
    pub scientific: Array3<u16>,
    pub frame_count: usize,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub preview_path: Option<PathBuf>,
    pub fits_path: Option<PathBuf>,
}

impl StackSnapshot {
    pub(crate) fn from_composite(
        composite: &Array3<f32>,
        frame_count: usize,
        started_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        let clamped = composite.mapv(|v| if v.is_nan() { 0.0 } else { v.clamp(0.0, STACK_VALUE_MAX) });
        Self {
            preview: clamped.mapv(|v| v as u8),
            scientific: clamped.mapv(|v| (v * SCIENTIFIC_SCALE).clamp(0.0, u16::MAX as f32) as u16),
            frame_count,
            started_at,
            updated_at,
            preview_path: None,
            fits_path: None,
        }
    }

    /// (height, width, channels)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.preview.dim()
    }

    /// Persisted file best suited for plate solving: FITS first, then the preview.
    pub fn solve_path(&self) -> Option<&Path> {
        self.fits_path.as_deref().or(self.preview_path.as_deref())
    }
}
