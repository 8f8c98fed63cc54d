use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AstroliveError, Result};

/// Top-level acquisition settings. Every field has a default, so a TOML file
/// only needs to list what it overrides.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub enabled: bool,
    pub capture_interval_s: f64,
    pub save_frames: bool,
    pub output_dir: PathBuf,
    pub display_format: DisplayFormat,
    /// Also write a 16-bit FITS copy of every frame.
    pub write_scientific: bool,
    pub use_timestamps: bool,
    pub use_capture_count: bool,
    pub auto_solve: bool,
    pub min_solve_interval_s: f64,
    pub stacking: StackingConfig,
    pub mount: MountConfig,
    pub solver: SolverConfig,
    pub camera: CameraConfig,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capture_interval_s: 10.0,
            save_frames: true,
            output_dir: PathBuf::from("frames"),
            display_format: DisplayFormat::default(),
            write_scientific: true,
            use_timestamps: false,
            use_capture_count: true,
            auto_solve: true,
            min_solve_interval_s: 30.0,
            stacking: StackingConfig::default(),
            mount: MountConfig::default(),
            solver: SolverConfig::default(),
            camera: CameraConfig::default(),
        }
    }
}

impl AcquisitionConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| AstroliveError::Config(e.to_string()))
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| AstroliveError::Config(e.to_string()))
    }

    pub fn capture_interval(&self) -> Duration {
        seconds(self.capture_interval_s)
    }

    pub fn min_solve_interval(&self) -> Duration {
        seconds(self.min_solve_interval_s)
    }

    /// Directory receiving rolled-over stack snapshots.
    pub fn stack_dir(&self) -> PathBuf {
        self.output_dir.join(&self.stacking.output_subdir)
    }
}

/// Negative and non-finite settings collapse to zero.
pub(crate) fn seconds(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value)
    } else {
        Duration::ZERO
    }
}

/// File format for the human-viewable copy of each frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayFormat {
    #[default]
    Png,
    Tiff,
}

impl DisplayFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Tiff => "tiff",
        }
    }
}

impl fmt::Display for DisplayFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Png => write!(f, "PNG"),
            Self::Tiff => write!(f, "TIFF"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StackingConfig {
    pub enabled: bool,
    pub method: StackMethod,
    pub sigma_clip: SigmaClipConfig,
    /// Frame cap; 0 means unbounded.
    pub max_frames: usize,
    pub write_interval_s: f64,
    pub align: AlignMode,
    pub min_frames_for_stack_solve: usize,
    /// Window age after which a rollover write also resets the stack; 0 disables.
    pub max_integration_s: f64,
    pub write_preview: bool,
    pub write_scientific: bool,
    /// Subdirectory of `output_dir` receiving stack snapshots.
    pub output_subdir: PathBuf,
}

impl Default for StackingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            method: StackMethod::default(),
            sigma_clip: SigmaClipConfig::default(),
            max_frames: 100,
            write_interval_s: 10.0,
            align: AlignMode::default(),
            min_frames_for_stack_solve: 5,
            max_integration_s: 0.0,
            write_preview: true,
            write_scientific: true,
            output_subdir: PathBuf::from("stacks"),
        }
    }
}

impl StackingConfig {
    pub fn write_interval(&self) -> Duration {
        seconds(self.write_interval_s)
    }

    pub fn max_integration(&self) -> Option<Duration> {
        let d = seconds(self.max_integration_s);
        (!d.is_zero()).then_some(d)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackMethod {
    #[default]
    Median,
    Mean,
}

impl fmt::Display for StackMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Median => write!(f, "Median"),
            Self::Mean => write!(f, "Mean"),
        }
    }
}

/// MAD-based outlier rejection applied in median mode.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SigmaClipConfig {
    pub enabled: bool,
    /// Rejection threshold in robust sigmas (1.4826 * MAD).
    pub sigma: f32,
}

impl Default for SigmaClipConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sigma: 3.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlignMode {
    None,
    #[default]
    FeatureBased,
}

impl fmt::Display for AlignMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::FeatureBased => write!(f, "Feature-based"),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MountConfig {
    pub slewing_detection: SlewingDetectionConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SlewingDetectionConfig {
    pub enabled: bool,
    pub check_before_capture: bool,
    pub wait_for_completion: bool,
    pub wait_timeout_s: f64,
    pub check_interval_s: f64,
}

impl Default for SlewingDetectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_before_capture: true,
            wait_for_completion: false,
            wait_timeout_s: 300.0,
            check_interval_s: 1.0,
        }
    }
}

impl SlewingDetectionConfig {
    pub fn wait_timeout(&self) -> Duration {
        seconds(self.wait_timeout_s)
    }

    pub fn check_interval(&self) -> Duration {
        seconds(self.check_interval_s)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SolverConfig {
    /// Path to the `astap_cli` executable; no solver is created when unset.
    pub astap_path: Option<PathBuf>,
    pub timeout_s: f64,
    /// Results reporting a lower confidence are treated as failed solves.
    pub min_confidence: Option<f64>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            astap_path: None,
            timeout_s: 60.0,
            min_confidence: None,
        }
    }
}

impl SolverConfig {
    pub fn timeout(&self) -> Duration {
        seconds(self.timeout_s)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    /// Directory of images or a SER file to replay as the camera feed.
    pub source: Option<PathBuf>,
    pub exposure_s: f64,
    pub ready_timeout_s: f64,
    /// Restart playback from the first frame after the last one.
    pub loop_playback: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: None,
            exposure_s: 1.0,
            ready_timeout_s: 30.0,
            loop_playback: true,
        }
    }
}

impl CameraConfig {
    pub fn exposure(&self) -> Duration {
        seconds(self.exposure_s)
    }

    pub fn ready_timeout(&self) -> Duration {
        seconds(self.ready_timeout_s)
    }
}
