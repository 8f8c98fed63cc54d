//! Cameras that replay recorded data, plus a factory wiring them up from
//! configuration.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::astap::AstapSolver;
use super::camera::{CameraAdapter, ExposureCamera, ExposureSettings, PollingCamera};
use super::mount::Mount;
use super::solver::PlateSolver;
use super::DeviceFactory;
use crate::acquisition::config::AcquisitionConfig;
use crate::error::{CaptureError, MountError};
use crate::frame::{FrameMetadata, FrameSample};
use crate::io::image_io::{list_images, load_image};
use crate::io::ser::SerReader;

/// Plays back the image files of a directory in name order.
pub struct DirectoryCamera {
    files: Vec<PathBuf>,
    next: usize,
    loop_playback: bool,
    exposure_s: f64,
}

impl DirectoryCamera {
    pub fn open(dir: &Path, exposure_s: f64, loop_playback: bool) -> Result<Self, CaptureError> {
        let files = list_images(dir)
            .map_err(|e| CaptureError::Device(format!("{}: {e}", dir.display())))?;
        if files.is_empty() {
            return Err(CaptureError::Device(format!(
                "no image files in {}",
                dir.display()
            )));
        }
        info!(dir = %dir.display(), frames = files.len(), "Replaying image directory");
        Ok(Self {
            files,
            next: 0,
            loop_playback,
            exposure_s,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl PollingCamera for DirectoryCamera {
    fn current_frame(&mut self) -> Result<FrameSample, CaptureError> {
        if self.next >= self.files.len() {
            if !self.loop_playback {
                return Err(CaptureError::Disconnected("end of playback".into()));
            }
            self.next = 0;
        }
        let path = &self.files[self.next];
        self.next += 1;
        let pixels = load_image(path)
            .map_err(|e| CaptureError::Device(format!("{}: {e}", path.display())))?;
        Ok(FrameSample::new(
            pixels,
            FrameMetadata {
                exposure_s: Some(self.exposure_s),
                ..FrameMetadata::default()
            },
        ))
    }
}

/// Replays a SER video through the exposure workflow: an exposure becomes
/// ready once its duration has elapsed, and the download yields the next
/// recorded frame.
pub struct SerReplayCamera {
    reader: SerReader,
    next: usize,
    loop_playback: bool,
    exposure: Option<(Instant, Duration)>,
}

impl SerReplayCamera {
    pub fn open(path: &Path, loop_playback: bool) -> Result<Self, CaptureError> {
        let reader = SerReader::open(path)
            .map_err(|e| CaptureError::Device(format!("{}: {e}", path.display())))?;
        if reader.frame_count() == 0 {
            return Err(CaptureError::Device(format!(
                "{} contains no frames",
                path.display()
            )));
        }
        info!(
            file = %path.display(),
            frames = reader.frame_count(),
            width = reader.header.width,
            height = reader.header.height,
            "Replaying SER file"
        );
        Ok(Self {
            reader,
            next: 0,
            loop_playback,
            exposure: None,
        })
    }
}

impl ExposureCamera for SerReplayCamera {
    fn start_exposure(&mut self, duration: Duration) -> Result<(), CaptureError> {
        if self.exposure.is_some() {
            return Err(CaptureError::Busy);
        }
        if self.next >= self.reader.frame_count() && !self.loop_playback {
            return Err(CaptureError::Disconnected("end of playback".into()));
        }
        self.exposure = Some((Instant::now(), duration));
        Ok(())
    }

    fn image_ready(&mut self) -> Result<bool, CaptureError> {
        match self.exposure {
            Some((started, duration)) => Ok(started.elapsed() >= duration),
            None => Err(CaptureError::NotReady),
        }
    }

    fn download(&mut self) -> Result<FrameSample, CaptureError> {
        let (_, duration) = self.exposure.take().ok_or(CaptureError::NotReady)?;
        if self.next >= self.reader.frame_count() {
            self.next = 0;
        }
        let index = self.next;
        self.next += 1;
        let pixels = self
            .reader
            .read_frame(index)
            .map_err(|e| CaptureError::Device(e.to_string()))?;
        Ok(FrameSample::new(
            pixels,
            FrameMetadata {
                exposure_s: Some(duration.as_secs_f64()),
                captured_at: self.reader.frame_timestamp(index),
                ..FrameMetadata::default()
            },
        ))
    }
}

/// Builds replay devices from `[camera]` and the ASTAP solver from `[solver]`.
/// There is no mount.
pub struct ReplayDeviceFactory {
    config: AcquisitionConfig,
}

impl ReplayDeviceFactory {
    pub fn new(config: AcquisitionConfig) -> Self {
        Self { config }
    }
}

impl DeviceFactory for ReplayDeviceFactory {
    fn connect_camera(&mut self) -> Result<CameraAdapter, CaptureError> {
        let camera = &self.config.camera;
        let source = camera
            .source
            .as_deref()
            .ok_or_else(|| CaptureError::Device("no camera source configured".into()))?;

        let is_ser = source
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("ser"));

        if is_ser {
            let replay = SerReplayCamera::open(source, camera.loop_playback)?;
            Ok(CameraAdapter::exposure(
                replay,
                ExposureSettings::new(camera.exposure(), camera.ready_timeout()),
            ))
        } else if source.is_dir() {
            let replay = DirectoryCamera::open(source, camera.exposure_s, camera.loop_playback)?;
            Ok(CameraAdapter::polling(replay))
        } else {
            Err(CaptureError::Device(format!(
                "unsupported camera source {}",
                source.display()
            )))
        }
    }

    fn connect_mount(&mut self) -> Result<Option<Box<dyn Mount>>, MountError> {
        Ok(None)
    }

    fn create_solver(&mut self) -> Option<Box<dyn PlateSolver>> {
        let solver = &self.config.solver;
        let path = solver.astap_path.as_ref()?;
        let astap = AstapSolver::new(path, solver.timeout());
        if !astap.is_available() {
            warn!(path = %path.display(), "astap_cli not found");
        }
        Some(Box::new(astap))
    }
}
