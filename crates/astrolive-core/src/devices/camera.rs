use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::debug;

use crate::consts::EXPOSURE_POLL_INTERVAL;
use crate::error::CaptureError;
use crate::frame::FrameSample;

/// Camera that always holds a current frame (video feeds, replay).
pub trait PollingCamera: Send {
    fn current_frame(&mut self) -> Result<FrameSample, CaptureError>;

    fn disconnect(&mut self) {}
}

/// Camera driven by explicit exposures: start, poll until ready, download.
pub trait ExposureCamera: Send {
    fn start_exposure(&mut self, duration: Duration) -> Result<(), CaptureError>;

    fn image_ready(&mut self) -> Result<bool, CaptureError>;

    fn download(&mut self) -> Result<FrameSample, CaptureError>;

    fn disconnect(&mut self) {}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExposureSettings {
    pub exposure: Duration,
    /// How long past the exposure time to wait for the image before giving up.
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
}

impl ExposureSettings {
    pub fn new(exposure: Duration, ready_timeout: Duration) -> Self {
        Self {
            exposure,
            ready_timeout,
            poll_interval: EXPOSURE_POLL_INTERVAL,
        }
    }
}

/// The camera capability, fixed to one of two access styles at construction.
pub enum CameraAdapter {
    Polling(Box<dyn PollingCamera>),
    Exposure(Box<dyn ExposureCamera>, ExposureSettings),
}

impl CameraAdapter {
    pub fn polling(camera: impl PollingCamera + 'static) -> Self {
        Self::Polling(Box::new(camera))
    }

    pub fn exposure(camera: impl ExposureCamera + 'static, settings: ExposureSettings) -> Self {
        Self::Exposure(Box::new(camera), settings)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Polling(_) => "polling",
            Self::Exposure(..) => "exposure",
        }
    }

    /// Obtain one frame. Exposure cameras run a full exposure and wait until
    /// the image is ready or `exposure + ready_timeout` has passed.
    pub fn get_current_frame(&mut self) -> Result<FrameSample, CaptureError> {
        let mut frame = match self {
            Self::Polling(camera) => camera.current_frame()?,
            Self::Exposure(camera, settings) => {
                let mut frame = expose(camera.as_mut(), settings)?;
                frame.metadata.exposure_s.get_or_insert(settings.exposure.as_secs_f64());
                frame
            }
        };
        frame.metadata.captured_at.get_or_insert_with(Utc::now);
        Ok(frame)
    }

    pub fn disconnect(&mut self) {
        match self {
            Self::Polling(camera) => camera.disconnect(),
            Self::Exposure(camera, _) => camera.disconnect(),
        }
    }
}

fn expose(
    camera: &mut dyn ExposureCamera,
    settings: &ExposureSettings,
) -> Result<FrameSample, CaptureError> {
    camera.start_exposure(settings.exposure)?;
    let deadline = Instant::now() + settings.exposure + settings.ready_timeout;
    loop {
        if camera.image_ready()? {
            return camera.download();
        }
        if Instant::now() >= deadline {
            debug!(timeout = ?settings.ready_timeout, "Exposure never became ready");
            return Err(CaptureError::Timeout(settings.ready_timeout));
        }
        thread::sleep(settings.poll_interval);
    }
}
