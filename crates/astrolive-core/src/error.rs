use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AstroliveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Invalid FITS file: {0}")]
    InvalidFits(String),

    #[error("Invalid SER file: {0}")]
    InvalidSer(String),

    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Frame index {index} out of range (total: {total})")]
    FrameIndexOutOfRange { index: usize, total: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
}

pub type Result<T> = std::result::Result<T, AstroliveError>;

/// Failure to obtain a frame from the camera.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("Camera busy")]
    Busy,

    #[error("No frame ready")]
    NotReady,

    #[error("Exposure not ready after {0:?}")]
    Timeout(Duration),

    #[error("Camera disconnected: {0}")]
    Disconnected(String),

    #[error("Camera error: {0}")]
    Device(String),
}

impl CaptureError {
    /// Busy / not-ready conditions resolve on their own by the next cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Busy | Self::NotReady)
    }
}

/// Failure to query or wait on the mount.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Mount error: {0}")]
pub struct MountError(pub String);

/// Failure to persist a frame or stack snapshot.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("Cannot write {channels}-channel data as {format}")]
    UnsupportedLayout { format: &'static str, channels: usize },

    #[error("Failed to move temporary file into place: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Structured reason a plate solve did not produce a result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolveFailure {
    #[error("no stars detected")]
    NoStars,

    #[error("solver timed out after {0:?}")]
    Timeout(Duration),

    #[error("confidence {confidence:.2} below minimum {minimum:.2}")]
    LowConfidence { confidence: f64, minimum: f64 },

    #[error("solver unavailable: {0}")]
    Unavailable(String),

    #[error("solve failed: {0}")]
    Failed(String),
}

/// Frame-to-reference registration failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlignmentError {
    #[error("too few stars for registration: reference={reference}, frame={frame}")]
    TooFewStars { reference: usize, frame: usize },

    #[error("no consistent triangle match between frame and reference")]
    NoMatch,

    #[error("estimated transform is degenerate (scale {scale:.3})")]
    Degenerate { scale: f64 },

    #[error("frame shape {frame:?} does not match reference shape {reference:?}")]
    ShapeMismatch {
        frame: (usize, usize),
        reference: (usize, usize),
    },
}

/// Lifecycle misuse and start-up failures of the acquisition loop.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AcquisitionError {
    #[error("acquisition loop already running")]
    AlreadyRunning,

    #[error("initialization failed: {0}")]
    Initialization(String),

    #[error("unhandled error in acquisition cycle: {0}")]
    Iteration(String),
}
