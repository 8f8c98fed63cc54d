//! Solver wrapper for the ASTAP command line program (`astap_cli`).
//!
//! ASTAP writes its result next to the image as `<stem>.ini`, a list of
//! `KEY=value` lines carrying `PLTSOLVD` and the WCS solution.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::solver::{PlateSolver, SolveResult};
use crate::error::SolveFailure;
use crate::io::image_io::image_dimensions;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct AstapSolver {
    cli_path: PathBuf,
    timeout: Duration,
}

impl AstapSolver {
    pub fn new(cli_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            cli_path: cli_path.into(),
            timeout,
        }
    }

    pub fn cli_path(&self) -> &Path {
        &self.cli_path
    }
}

impl PlateSolver for AstapSolver {
    fn name(&self) -> &str {
        "astap"
    }

    fn is_available(&self) -> bool {
        self.cli_path.is_file()
    }

    fn solve(&self, image: &Path) -> Result<SolveResult, SolveFailure> {
        if !image.is_file() {
            return Err(SolveFailure::Failed(format!(
                "image not found: {}",
                image.display()
            )));
        }
        let start = Instant::now();

        let ini_path = image.with_extension("ini");
        // A stale result from an earlier run must not be mistaken for this one.
        let _ = std::fs::remove_file(&ini_path);

        info!(image = %image.display(), "Running astap_cli");
        let mut child = Command::new(&self.cli_path)
            .arg("-f")
            .arg(image)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SolveFailure::Unavailable(format!("failed to start astap_cli: {e}")))?;

        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!(%status, "astap_cli exited");
                    break;
                }
                Ok(None) if start.elapsed() >= self.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(SolveFailure::Timeout(self.timeout));
                }
                Ok(None) => sleep(POLL_INTERVAL),
                Err(e) => return Err(SolveFailure::Failed(format!("waiting on astap_cli: {e}"))),
            }
        }

        let text = std::fs::read_to_string(&ini_path).map_err(|e| {
            SolveFailure::Failed(format!("no result file {}: {e}", ini_path.display()))
        })?;
        let dimensions = image_dimensions(image).ok();
        let mut result = parse_astap_ini(&text, dimensions)?;
        result.solving_time = start.elapsed();
        Ok(result)
    }
}

/// Parse the contents of an ASTAP `.ini` result.
///
/// `dimensions` (width, height in pixels) turn the pixel scale into a field
/// of view; without them the FOV is reported as zero.
pub fn parse_astap_ini(
    text: &str,
    dimensions: Option<(u32, u32)>,
) -> Result<SolveResult, SolveFailure> {
    let values: HashMap<String, String> = text
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_ascii_uppercase(), v.trim().to_string()))
        .collect();

    let solved = values
        .get("PLTSOLVD")
        .is_some_and(|v| v.eq_ignore_ascii_case("T"));
    if !solved {
        let message = values
            .get("ERROR")
            .or_else(|| values.get("WARNING"))
            .cloned()
            .unwrap_or_else(|| "not solved".to_string());
        if message.to_ascii_lowercase().contains("star") {
            return Err(SolveFailure::NoStars);
        }
        return Err(SolveFailure::Failed(message));
    }

    let number = |key: &str| -> Option<f64> { values.get(key).and_then(|v| v.parse().ok()) };
    let require = |key: &str| -> Result<f64, SolveFailure> {
        number(key).ok_or_else(|| SolveFailure::Failed(format!("missing {key} in solution")))
    };

    let ra = require("CRVAL1")?;
    let dec = require("CRVAL2")?;

    let cd = match (number("CD1_1"), number("CD1_2"), number("CD2_1"), number("CD2_2")) {
        (Some(a), Some(b), Some(c), Some(d)) => Some([a, b, c, d]),
        _ => None,
    };

    let (scale_x, scale_y, flipped) = match cd {
        Some([cd11, cd12, cd21, cd22]) => (
            cd11.hypot(cd21),
            cd12.hypot(cd22),
            cd11 * cd22 - cd12 * cd21 > 0.0,
        ),
        None => {
            let cdelt1 = require("CDELT1")?;
            let cdelt2 = require("CDELT2")?;
            (cdelt1.abs(), cdelt2.abs(), cdelt1 * cdelt2 > 0.0)
        }
    };

    let position_angle = number("CROTA2").or_else(|| {
        cd.map(|[_, cd12, _, cd22]| cd12.atan2(cd22).to_degrees())
    });

    let mut result = SolveResult::new(ra, dec, "astap");
    if let Some((w, h)) = dimensions {
        result.fov_width_deg = scale_x * w as f64;
        result.fov_height_deg = scale_y * h as f64;
    }
    result.position_angle_deg = position_angle;
    result.flipped = Some(flipped);
    Ok(result)
}
