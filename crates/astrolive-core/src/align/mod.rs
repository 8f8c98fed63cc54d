//! Star-based registration of frames onto a reference.
//!
//! Stars are detected in the grayscale reduction of each frame, grouped into
//! triangles whose side ratios survive rotation, scaling and translation, and
//! matched against the reference triangles. A least-squares affine fit over
//! the consistent correspondences drives a bilinear warp of the full frame.

pub mod affine;
pub mod register;
pub mod stars;
pub mod triangles;

use ndarray::{Array2, Array3};

pub use affine::{bilinear_sample, warp_to_reference, Affine};
pub use register::{find_transform, Registration};
pub use stars::{detect_stars, Star};

use crate::consts::MAX_REGISTRATION_STARS;
use crate::error::AlignmentError;
use crate::frame::luminance;

/// Grayscale reference image and the stars detected in it.
#[derive(Clone, Debug)]
pub struct ReferenceFrame {
    pub gray: Array2<f32>,
    pub stars: Vec<Star>,
}

impl ReferenceFrame {
    pub fn from_frame(frame: &Array3<f32>) -> Self {
        let gray = luminance(frame);
        let stars = detect_stars(&gray, MAX_REGISTRATION_STARS);
        Self { gray, stars }
    }

    /// (height, width)
    pub fn dim(&self) -> (usize, usize) {
        self.gray.dim()
    }
}

/// Register `frame` against `reference` and warp it onto the reference grid.
pub fn align_to_reference(
    frame: &Array3<f32>,
    reference: &ReferenceFrame,
) -> Result<(Array3<f32>, Registration), AlignmentError> {
    let (h, w, _) = frame.dim();
    if (h, w) != reference.dim() {
        return Err(AlignmentError::ShapeMismatch {
            frame: (h, w),
            reference: reference.dim(),
        });
    }

    let gray = luminance(frame);
    let stars = detect_stars(&gray, MAX_REGISTRATION_STARS);
    let registration = find_transform(&stars, &reference.stars)?;
    let warped = warp_to_reference(frame, &registration.transform).ok_or(
        AlignmentError::Degenerate {
            scale: registration.transform.scale(),
        },
    )?;
    Ok((warped, registration))
}
