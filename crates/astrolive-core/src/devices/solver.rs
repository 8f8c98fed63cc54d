//! Plate solver capability and its result type.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::error::SolveFailure;

/// Outcome of a successful plate solve.
#[derive(Clone, Debug, PartialEq)]
pub struct SolveResult {
    /// Right ascension of the field centre (degrees).
    pub ra_deg: f64,
    /// Declination of the field centre (degrees).
    pub dec_deg: f64,
    pub fov_width_deg: f64,
    pub fov_height_deg: f64,
    /// Position angle, degrees east of north.
    pub position_angle_deg: Option<f64>,
    pub confidence: Option<f64>,
    pub star_count: Option<u32>,
    pub solving_time: Duration,
    /// Name of the solver that produced the result.
    pub method: String,
    pub flipped: Option<bool>,
}

impl SolveResult {
    pub fn new(ra_deg: f64, dec_deg: f64, method: impl Into<String>) -> Self {
        Self {
            ra_deg,
            dec_deg,
            fov_width_deg: 0.0,
            fov_height_deg: 0.0,
            position_angle_deg: None,
            confidence: None,
            star_count: None,
            solving_time: Duration::ZERO,
            method: method.into(),
            flipped: None,
        }
    }
}

impl fmt::Display for SolveResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pa = self
            .position_angle_deg
            .map_or_else(|| "None".to_string(), |pa| format!("{pa:.1}"));
        write!(
            f,
            "SolveResult(RA={:.4}°, Dec={:.4}°, FOV={:.3}°x{:.3}°, PA={}°, method={}, time={:.1}s, flipped={}",
            self.ra_deg,
            self.dec_deg,
            self.fov_width_deg,
            self.fov_height_deg,
            pa,
            self.method,
            self.solving_time.as_secs_f64(),
            if self.flipped == Some(true) { "Yes" } else { "No" },
        )?;
        if let Some(confidence) = self.confidence {
            write!(f, ", confidence={confidence:.2}")?;
        }
        write!(f, ")")
    }
}

/// External astrometric solver.
pub trait PlateSolver: Send {
    fn name(&self) -> &str;

    /// Whether the solver can run at all (binary present, index files found, ...).
    fn is_available(&self) -> bool;

    fn solve(&self, image: &Path) -> Result<SolveResult, SolveFailure>;
}
