use chrono::{DateTime, Utc};
use ndarray::{Array2, Array3, Axis};
use num_traits::AsPrimitive;

use crate::consts::{LUMINANCE_B, LUMINANCE_G, LUMINANCE_R, STACK_VALUE_MAX};

/// Raw pixel samples as delivered by a camera.
/// Shape = (height, width, channels); mono frames have one channel.
#[derive(Clone, Debug)]
pub enum PixelData {
    U8(Array3<u8>),
    U16(Array3<u16>),
    F32(Array3<f32>),
}

impl PixelData {
    pub fn mono_u8(data: Array2<u8>) -> Self {
        Self::U8(data.insert_axis(Axis(2)))
    }

    pub fn mono_u16(data: Array2<u16>) -> Self {
        Self::U16(data.insert_axis(Axis(2)))
    }

    pub fn mono_f32(data: Array2<f32>) -> Self {
        Self::F32(data.insert_axis(Axis(2)))
    }

    /// (height, width, channels)
    pub fn dim(&self) -> (usize, usize, usize) {
        match self {
            Self::U8(a) => a.dim(),
            Self::U16(a) => a.dim(),
            Self::F32(a) => a.dim(),
        }
    }

    pub fn is_empty(&self) -> bool {
        let (h, w, c) = self.dim();
        h == 0 || w == 0 || c == 0
    }

    pub fn bit_depth(&self) -> u8 {
        match self {
            Self::U8(_) => 8,
            Self::U16(_) => 16,
            Self::F32(_) => 32,
        }
    }

    /// Convert into the stacking domain: f32 in [0, 255].
    ///
    /// 8-bit data is taken as-is, 16-bit data is rescaled by 255/65535 and
    /// float data is passed through unchanged.
    pub fn to_stack_domain(&self) -> Array3<f32> {
        match self {
            Self::U8(a) => convert(a, 1.0),
            Self::U16(a) => convert(a, STACK_VALUE_MAX / u16::MAX as f32),
            Self::F32(a) => a.clone(),
        }
    }
}

fn convert<T: AsPrimitive<f32>>(data: &Array3<T>, scale: f32) -> Array3<f32> {
    data.mapv(|v| v.as_() * scale)
}

/// Grayscale reduction of a (h, w, c) float image.
///
/// Three- and four-channel data is reduced with BT.601 luminance weights
/// (alpha ignored); any other channel count is averaged.
pub fn luminance(data: &Array3<f32>) -> Array2<f32> {
    let (h, w, c) = data.dim();
    match c {
        1 => data.index_axis(Axis(2), 0).to_owned(),
        3 | 4 => Array2::from_shape_fn((h, w), |(row, col)| {
            LUMINANCE_R * data[[row, col, 0]]
                + LUMINANCE_G * data[[row, col, 1]]
                + LUMINANCE_B * data[[row, col, 2]]
        }),
        _ => data
            .mean_axis(Axis(2))
            .unwrap_or_else(|| Array2::zeros((h, w))),
    }
}

/// Acquisition parameters attached to a captured frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameMetadata {
    pub exposure_s: Option<f64>,
    pub gain: Option<f64>,
    pub offset: Option<i32>,
    pub binning: Option<u32>,
    pub readout_mode: Option<i32>,
    pub captured_at: Option<DateTime<Utc>>,
    /// Correlates a frame across logs and saved files.
    pub capture_id: Option<u64>,
}

/// A single captured frame plus its acquisition metadata.
#[derive(Clone, Debug)]
pub struct FrameSample {
    pub pixels: PixelData,
    pub metadata: FrameMetadata,
}

impl FrameSample {
    pub fn new(pixels: PixelData, metadata: FrameMetadata) -> Self {
        Self { pixels, metadata }
    }

    pub fn width(&self) -> usize {
        self.pixels.dim().1
    }

    pub fn height(&self) -> usize {
        self.pixels.dim().0
    }

    pub fn channels(&self) -> usize {
        self.pixels.dim().2
    }
}
