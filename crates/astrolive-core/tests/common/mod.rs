#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use ndarray::{Array2, Array3};

use astrolive_core::acquisition::AcquisitionConfig;
use astrolive_core::devices::{
    CameraAdapter, DeviceFactory, DiskFrameWriter, ExposureCamera, FrameWriter, Mount,
    PlateSolver, PollingCamera, SolveResult,
};
use astrolive_core::error::{CaptureError, MountError, SolveFailure, WriteError};
use astrolive_core::frame::{FrameMetadata, FrameSample, PixelData};
use astrolive_core::io::ser::SER_HEADER_SIZE;

// ---------------------------------------------------------------------------
// Synthetic images
// ---------------------------------------------------------------------------

/// Star positions (x, y, peak) used by the registration tests.
pub const STARS: &[(f64, f64, f64)] = &[
    (20.0, 18.0, 200.0),
    (75.0, 22.0, 180.0),
    (48.0, 50.0, 160.0),
    (15.0, 80.0, 150.0),
    (88.0, 70.0, 140.0),
    (60.0, 95.0, 130.0),
    (35.0, 35.0, 120.0),
    (100.0, 40.0, 110.0),
    (95.0, 105.0, 100.0),
    (28.0, 108.0, 90.0),
];

/// Render Gaussian stars on a flat background, with each star position
/// passed through `place` first.
pub fn star_field<F>(h: usize, w: usize, stars: &[(f64, f64, f64)], place: F) -> Array2<f32>
where
    F: Fn(f64, f64) -> (f64, f64),
{
    let sigma = 1.5f64;
    let placed: Vec<(f64, f64, f64)> = stars
        .iter()
        .map(|&(x, y, peak)| {
            let (px, py) = place(x, y);
            (px, py, peak)
        })
        .collect();
    Array2::from_shape_fn((h, w), |(row, col)| {
        let mut v = 10.0f64;
        for &(x, y, peak) in &placed {
            let dx = col as f64 - x;
            let dy = row as f64 - y;
            v += peak * (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
        }
        v.min(255.0) as f32
    })
}

/// Mono 8-bit frame filled with a constant.
pub fn flat_u8(h: usize, w: usize, value: u8) -> PixelData {
    PixelData::mono_u8(Array2::from_elem((h, w), value))
}

/// Mono float frame in the stacking domain.
pub fn flat_f32(h: usize, w: usize, value: f32) -> PixelData {
    PixelData::F32(Array3::from_elem((h, w, 1), value))
}

/// Small gradient frame with enough structure for PNG/FITS writes.
pub fn gradient_frame(h: usize, w: usize) -> FrameSample {
    let data = Array2::from_shape_fn((h, w), |(r, c)| ((r * 7 + c * 3) % 256) as u8);
    FrameSample::new(
        PixelData::mono_u8(data),
        FrameMetadata {
            exposure_s: Some(2.0),
            gain: Some(100.0),
            offset: Some(10),
            binning: Some(1),
            readout_mode: Some(0),
            ..FrameMetadata::default()
        },
    )
}

// ---------------------------------------------------------------------------
// Fake devices
// ---------------------------------------------------------------------------

/// Polling camera returning the same frame every call.
pub struct FakeCamera {
    pub frame: FrameSample,
    pub calls: Arc<AtomicUsize>,
    pub disconnected: Arc<AtomicBool>,
    /// Call indices (0-based) that fail with the given error.
    pub failures: Vec<(usize, CaptureError)>,
    /// Call index that panics.
    pub panic_on: Option<usize>,
    /// Call index that blocks for the given time before returning.
    pub block_on: Option<(usize, Duration)>,
}

impl FakeCamera {
    pub fn new(frame: FrameSample) -> Self {
        Self {
            frame,
            calls: Arc::new(AtomicUsize::new(0)),
            disconnected: Arc::new(AtomicBool::new(false)),
            failures: Vec::new(),
            panic_on: None,
            block_on: None,
        }
    }
}

impl PollingCamera for FakeCamera {
    fn current_frame(&mut self) -> Result<FrameSample, CaptureError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_on == Some(call) {
            panic!("camera exploded");
        }
        if let Some((_, delay)) = self.block_on.filter(|(i, _)| *i == call) {
            thread::sleep(delay);
        }
        if let Some((_, err)) = self.failures.iter().find(|(i, _)| *i == call) {
            return Err(err.clone());
        }
        Ok(self.frame.clone())
    }

    fn disconnect(&mut self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }
}

/// Exposure camera that becomes ready after `ready_after` polls.
pub struct FakeExposureCamera {
    pub frame: FrameSample,
    pub ready_after: usize,
    polls: usize,
    exposing: bool,
    pub started: Arc<Mutex<Vec<Duration>>>,
}

impl FakeExposureCamera {
    pub fn new(frame: FrameSample, ready_after: usize) -> Self {
        Self {
            frame,
            ready_after,
            polls: 0,
            exposing: false,
            started: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl ExposureCamera for FakeExposureCamera {
    fn start_exposure(&mut self, duration: Duration) -> Result<(), CaptureError> {
        if self.exposing {
            return Err(CaptureError::Busy);
        }
        self.exposing = true;
        self.polls = 0;
        self.started.lock().unwrap().push(duration);
        Ok(())
    }

    fn image_ready(&mut self) -> Result<bool, CaptureError> {
        self.polls += 1;
        Ok(self.polls > self.ready_after)
    }

    fn download(&mut self) -> Result<FrameSample, CaptureError> {
        self.exposing = false;
        Ok(self.frame.clone())
    }
}

/// Mount answering `is_slewing` from a script; the last answer repeats.
pub struct FakeMount {
    pub slewing: VecDeque<Result<bool, MountError>>,
    pub wait_result: Result<bool, MountError>,
    pub queries: Arc<AtomicUsize>,
    pub waits: Arc<AtomicUsize>,
}

impl FakeMount {
    pub fn new(slewing: Vec<Result<bool, MountError>>, wait_result: Result<bool, MountError>) -> Self {
        Self {
            slewing: slewing.into(),
            wait_result,
            queries: Arc::new(AtomicUsize::new(0)),
            waits: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn always(slewing: bool) -> Self {
        Self::new(vec![Ok(slewing)], Ok(true))
    }
}

impl Mount for FakeMount {
    fn is_slewing(&mut self) -> Result<bool, MountError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.slewing.len() > 1 {
            self.slewing.pop_front().unwrap()
        } else {
            self.slewing.front().cloned().unwrap_or(Ok(false))
        }
    }

    fn wait_for_slewing_complete(
        &mut self,
        _timeout: Duration,
        _check_interval: Duration,
    ) -> Result<bool, MountError> {
        self.waits.fetch_add(1, Ordering::SeqCst);
        self.wait_result.clone()
    }
}

/// Solver returning a fixed outcome and recording every solved path.
#[derive(Clone)]
pub struct FakeSolver {
    pub available: bool,
    pub outcome: Result<SolveResult, SolveFailure>,
    pub solved: Arc<Mutex<Vec<PathBuf>>>,
}

impl FakeSolver {
    pub fn solving(ra: f64, dec: f64) -> Self {
        let mut result = SolveResult::new(ra, dec, "fake");
        result.fov_width_deg = 1.2;
        result.fov_height_deg = 0.8;
        Self {
            available: true,
            outcome: Ok(result),
            solved: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(reason: SolveFailure) -> Self {
        Self {
            available: true,
            outcome: Err(reason),
            solved: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn solved_paths(&self) -> Vec<PathBuf> {
        self.solved.lock().unwrap().clone()
    }
}

impl PlateSolver for FakeSolver {
    fn name(&self) -> &str {
        "fake"
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn solve(&self, image: &Path) -> Result<SolveResult, SolveFailure> {
        self.solved.lock().unwrap().push(image.to_path_buf());
        self.outcome.clone()
    }
}

/// Writer rejecting every frame.
pub struct FailingWriter;

impl FrameWriter for FailingWriter {
    fn save(
        &self,
        _frame: &FrameSample,
        path: &Path,
        _metadata: &FrameMetadata,
    ) -> Result<PathBuf, WriteError> {
        Err(WriteError::UnsupportedFormat(format!("disk full: {}", path.display())))
    }
}

type CameraFn = Box<dyn FnMut() -> Result<CameraAdapter, CaptureError> + Send>;
type MountFn = Box<dyn FnMut() -> Result<Option<Box<dyn Mount>>, MountError> + Send>;

/// Factory handing out fakes; cameras and mounts are built fresh per `start()`.
pub struct FakeFactory {
    camera: CameraFn,
    mount: MountFn,
    solver: Option<FakeSolver>,
    failing_writes: bool,
}

impl FakeFactory {
    pub fn new(camera: impl FnMut() -> Result<CameraAdapter, CaptureError> + Send + 'static) -> Self {
        Self {
            camera: Box::new(camera),
            mount: Box::new(|| Ok(None)),
            solver: None,
            failing_writes: false,
        }
    }

    /// Factory whose polling camera always returns `frame`.
    pub fn with_frame(frame: FrameSample) -> Self {
        Self::new(move || Ok(CameraAdapter::polling(FakeCamera::new(frame.clone()))))
    }

    pub fn mount(
        mut self,
        mount: impl FnMut() -> Result<Option<Box<dyn Mount>>, MountError> + Send + 'static,
    ) -> Self {
        self.mount = Box::new(mount);
        self
    }

    pub fn solver(mut self, solver: FakeSolver) -> Self {
        self.solver = Some(solver);
        self
    }

    pub fn failing_writes(mut self) -> Self {
        self.failing_writes = true;
        self
    }
}

impl DeviceFactory for FakeFactory {
    fn connect_camera(&mut self) -> Result<CameraAdapter, CaptureError> {
        (self.camera)()
    }

    fn connect_mount(&mut self) -> Result<Option<Box<dyn Mount>>, MountError> {
        (self.mount)()
    }

    fn create_solver(&mut self) -> Option<Box<dyn PlateSolver>> {
        self.solver
            .clone()
            .map(|s| Box::new(s) as Box<dyn PlateSolver>)
    }

    fn create_writer(&mut self) -> Box<dyn FrameWriter> {
        if self.failing_writes {
            Box::new(FailingWriter)
        } else {
            Box::new(DiskFrameWriter)
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration and timing helpers
// ---------------------------------------------------------------------------

/// Config writing into `dir`, capturing back to back, solving every cycle.
pub fn fast_config(dir: &Path) -> AcquisitionConfig {
    let mut config = AcquisitionConfig::default();
    config.capture_interval_s = 0.0;
    config.output_dir = dir.to_path_buf();
    config.min_solve_interval_s = 0.0;
    config.mount.slewing_detection.check_interval_s = 0.01;
    config.mount.slewing_detection.wait_timeout_s = 0.05;
    config
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

// ---------------------------------------------------------------------------
// SER builders
// ---------------------------------------------------------------------------

/// SER file header with configurable bit depth and color mode.
///
/// `color_id`: 0=MONO, 100=RGB, 101=BGR
pub fn build_ser_header(
    width: u32,
    height: u32,
    bit_depth: u32,
    num_frames: usize,
    color_id: i32,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(SER_HEADER_SIZE);

    // Magic (14 bytes)
    buf.extend_from_slice(b"LUCAM-RECORDER");
    // LuID
    buf.extend_from_slice(&0i32.to_le_bytes());
    // ColorID
    buf.extend_from_slice(&color_id.to_le_bytes());
    // LittleEndian = 0 (little-endian per Siril convention)
    buf.extend_from_slice(&0i32.to_le_bytes());
    buf.extend_from_slice(&(width as i32).to_le_bytes());
    buf.extend_from_slice(&(height as i32).to_le_bytes());
    buf.extend_from_slice(&(bit_depth as i32).to_le_bytes());
    buf.extend_from_slice(&(num_frames as i32).to_le_bytes());
    // Observer (40 bytes)
    let mut observer = [0u8; 40];
    observer[..4].copy_from_slice(b"Test");
    buf.extend_from_slice(&observer);
    // Instrument, Telescope (40 bytes each)
    buf.extend_from_slice(&[0u8; 40]);
    buf.extend_from_slice(&[0u8; 40]);
    // DateTime, DateTimeUTC
    buf.extend_from_slice(&0u64.to_le_bytes());
    buf.extend_from_slice(&0u64.to_le_bytes());

    assert_eq!(buf.len(), SER_HEADER_SIZE);
    buf
}

/// Complete SER file: header, frames, and optional per-frame timestamps
/// (.NET ticks).
pub fn build_ser(
    width: u32,
    height: u32,
    bit_depth: u32,
    color_id: i32,
    frames: &[Vec<u8>],
    timestamps: &[u64],
) -> Vec<u8> {
    let mut buf = build_ser_header(width, height, bit_depth, frames.len(), color_id);
    for frame in frames {
        buf.extend_from_slice(frame);
    }
    for ticks in timestamps {
        buf.extend_from_slice(&ticks.to_le_bytes());
    }
    buf
}

/// Write bytes to a temporary file kept alive by the returned handle.
pub fn write_temp(data: &[u8], suffix: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("create temp file");
    f.write_all(data).expect("write data");
    f.flush().expect("flush");
    f
}
