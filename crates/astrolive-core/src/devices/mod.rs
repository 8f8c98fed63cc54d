//! Capabilities the acquisition loop drives: camera, mount, frame writer and
//! plate solver, plus the factory that constructs them for a run.

pub mod astap;
pub mod camera;
pub mod mount;
pub mod replay;
pub mod solver;
pub mod writer;

pub use astap::AstapSolver;
pub use camera::{CameraAdapter, ExposureCamera, ExposureSettings, PollingCamera};
pub use mount::Mount;
pub use replay::{DirectoryCamera, ReplayDeviceFactory, SerReplayCamera};
pub use solver::{PlateSolver, SolveResult};
pub use writer::{DiskFrameWriter, FrameWriter};

use crate::error::{CaptureError, MountError};

/// Connects the devices for one acquisition run. Called once per `start()`.
pub trait DeviceFactory: Send {
    fn connect_camera(&mut self) -> Result<CameraAdapter, CaptureError>;

    /// `Ok(None)` when no mount is configured.
    fn connect_mount(&mut self) -> Result<Option<Box<dyn Mount>>, MountError>;

    fn create_solver(&mut self) -> Option<Box<dyn PlateSolver>>;

    fn create_writer(&mut self) -> Box<dyn FrameWriter> {
        Box::new(DiskFrameWriter)
    }
}
