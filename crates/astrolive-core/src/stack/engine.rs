use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use image::ImageFormat;
use ndarray::Array3;
use tracing::{debug, info, warn};

use super::median::median_compose;
use super::snapshot::StackSnapshot;
use crate::acquisition::config::{AlignMode, StackMethod, StackingConfig};
use crate::align::{align_to_reference, ReferenceFrame};
use crate::error::WriteError;
use crate::frame::PixelData;
use crate::io::fits::{write_fits_u16, FitsHeader, HeaderValue};
use crate::io::image_io::encode_u8;
use crate::io::naming::{snapshot_stem, with_extension};
use crate::io::write_atomically;

/// How a frame was registered when it entered the stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameAlignment {
    /// Alignment is switched off.
    Disabled,
    /// The frame became the alignment reference.
    Reference,
    Aligned,
    /// Registration failed; the frame went in unaligned and replaced the reference.
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddOutcome {
    /// Frames contributing to the composite after this addition.
    pub frame_count: usize,
    pub alignment: FrameAlignment,
    /// The frame's shape differed from the window and restarted it.
    pub restarted: bool,
}

enum Accumulator {
    Median(VecDeque<Array3<f32>>),
    Mean {
        sum: Option<Array3<f32>>,
        count: usize,
    },
}

impl Accumulator {
    fn new(method: StackMethod) -> Self {
        match method {
            StackMethod::Median => Self::Median(VecDeque::new()),
            StackMethod::Mean => Self::Mean { sum: None, count: 0 },
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Median(frames) => frames.len(),
            Self::Mean { count, .. } => *count,
        }
    }
}

struct EngineState {
    accumulator: Accumulator,
    shape: Option<(usize, usize, usize)>,
    reference: Option<ReferenceFrame>,
    started_at: DateTime<Utc>,
    started: Instant,
    last_write: Option<Instant>,
    last_snapshot: Option<StackSnapshot>,
}

impl EngineState {
    fn new(method: StackMethod) -> Self {
        Self {
            accumulator: Accumulator::new(method),
            shape: None,
            reference: None,
            started_at: Utc::now(),
            started: Instant::now(),
            last_write: None,
            last_snapshot: None,
        }
    }
}

/// Running statistical composite of accepted frames.
///
/// All operations serialize on one internal lock, so the engine can be shared
/// between the acquisition loop and readers on other threads.
pub struct StackingEngine {
    config: StackingConfig,
    output_dir: PathBuf,
    state: Mutex<EngineState>,
}

impl StackingEngine {
    pub fn new(config: StackingConfig, output_dir: impl Into<PathBuf>) -> Self {
        let state = EngineState::new(config.method);
        Self {
            config,
            output_dir: output_dir.into(),
            state: Mutex::new(state),
        }
    }

    pub fn config(&self) -> &StackingConfig {
        &self.config
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop all accumulated frames and restart the integration window.
    /// The alignment reference is kept.
    pub fn reset(&self) {
        let mut state = self.lock();
        reset_window(&mut state, self.config.method);
        debug!("Stack reset");
    }

    /// Add a frame to the running stack. Empty frames are ignored.
    pub fn add_frame(&self, pixels: &PixelData) -> Option<AddOutcome> {
        if pixels.is_empty() {
            debug!("Ignoring empty frame");
            return None;
        }
        let mut data = pixels.to_stack_domain();
        let shape = data.dim();

        let mut guard = self.lock();
        let state = &mut *guard;

        let restarted = match state.shape {
            Some(current) if current != shape => {
                warn!(
                    previous = ?current,
                    incoming = ?shape,
                    "Frame shape changed, restarting stack"
                );
                reset_window(state, self.config.method);
                state.reference = None;
                true
            }
            _ => false,
        };
        state.shape = Some(shape);

        let alignment = match self.config.align {
            AlignMode::None => FrameAlignment::Disabled,
            AlignMode::FeatureBased => match state.reference.as_ref() {
                None => {
                    state.reference = Some(ReferenceFrame::from_frame(&data));
                    FrameAlignment::Reference
                }
                Some(reference) => match align_to_reference(&data, reference) {
                    Ok((warped, registration)) => {
                        debug!(
                            correspondences = registration.correspondences,
                            scale = registration.transform.scale(),
                            "Frame aligned to reference"
                        );
                        data = warped;
                        FrameAlignment::Aligned
                    }
                    Err(e) => {
                        warn!(error = %e, "Alignment failed, stacking frame unaligned");
                        state.reference = Some(ReferenceFrame::from_frame(&data));
                        FrameAlignment::Failed
                    }
                },
            },
        };

        let max_frames = self.config.max_frames;
        match &mut state.accumulator {
            Accumulator::Median(frames) => {
                frames.push_back(data);
                while max_frames > 0 && frames.len() > max_frames {
                    frames.pop_front();
                }
            }
            Accumulator::Mean { sum, count } => {
                // Exceeding the cap restarts the sum from this frame.
                let rollover = max_frames > 0 && *count >= max_frames;
                match sum {
                    Some(total) if !rollover => {
                        *total += &data;
                        *count += 1;
                    }
                    _ => {
                        *sum = Some(data);
                        *count = 1;
                    }
                }
            }
        }

        Some(AddOutcome {
            frame_count: state.accumulator.len(),
            alignment,
            restarted,
        })
    }

    /// Compose the current stack. `None` while no frame has been added.
    pub fn get_snapshot(&self) -> Option<StackSnapshot> {
        let state = self.lock();
        self.snapshot_locked(&state)
    }

    fn snapshot_locked(&self, state: &EngineState) -> Option<StackSnapshot> {
        let composite = match &state.accumulator {
            Accumulator::Median(frames) => {
                let sigma = self
                    .config
                    .sigma_clip
                    .enabled
                    .then_some(self.config.sigma_clip.sigma);
                median_compose(frames, sigma)?
            }
            Accumulator::Mean { sum, count } => {
                let total = sum.as_ref().filter(|_| *count > 0)?;
                total.mapv(|v| v / *count as f32)
            }
        };
        Some(StackSnapshot::from_composite(
            &composite,
            state.accumulator.len(),
            state.started_at,
            Utc::now(),
        ))
    }

    /// Compose and persist the stack as `<base>_<YYYYmmdd_HHMMSS>.png` and
    /// `.fits` in the output directory.
    ///
    /// Returns `Ok(None)` when the stack is empty. On error no snapshot is
    /// recorded and the accumulated frames are untouched.
    pub fn write_snapshot(
        &self,
        base_name: &str,
        write_preview: bool,
        write_scientific: bool,
    ) -> Result<Option<StackSnapshot>, WriteError> {
        let mut state = self.lock();
        let Some(mut snapshot) = self.snapshot_locked(&state) else {
            return Ok(None);
        };

        let stem = snapshot_stem(base_name, &snapshot.updated_at);

        if write_preview {
            let path = with_extension(&self.output_dir, &stem, "png");
            let preview = &snapshot.preview;
            snapshot.preview_path = Some(write_atomically(&path, |w| {
                encode_u8(preview, ImageFormat::Png, w)
            })?);
        }

        if write_scientific {
            let path = with_extension(&self.output_dir, &stem, "fits");
            let header = stack_header(&snapshot);
            let data = &snapshot.scientific;
            snapshot.fits_path = Some(write_atomically(&path, |w| {
                write_fits_u16(w, data, &header)?;
                Ok(())
            })?);
        }

        info!(
            frames = snapshot.frame_count,
            preview = ?snapshot.preview_path,
            fits = ?snapshot.fits_path,
            "Stack snapshot written"
        );

        state.last_write = Some(Instant::now());
        state.last_snapshot = Some(snapshot.clone());
        Ok(Some(snapshot))
    }

    /// Most recently written snapshot, if any since the last reset.
    pub fn last_snapshot(&self) -> Option<StackSnapshot> {
        self.lock().last_snapshot.clone()
    }

    pub fn frame_count(&self) -> usize {
        self.lock().accumulator.len()
    }

    /// Start of the current integration window.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.lock().started_at
    }

    /// Age of the current integration window.
    pub fn window_age(&self) -> Duration {
        self.lock().started.elapsed()
    }

    /// Time since the last snapshot write, or since the window started when
    /// nothing has been written yet.
    pub fn since_last_write(&self) -> Duration {
        let state = self.lock();
        state.last_write.unwrap_or(state.started).elapsed()
    }
}

fn reset_window(state: &mut EngineState, method: StackMethod) {
    state.accumulator = Accumulator::new(method);
    state.shape = None;
    state.started_at = Utc::now();
    state.started = Instant::now();
    state.last_snapshot = None;
}

fn epoch_seconds(at: &DateTime<Utc>) -> f64 {
    at.timestamp() as f64 + at.timestamp_subsec_micros() as f64 / 1e6
}

fn stack_header(snapshot: &StackSnapshot) -> FitsHeader {
    let mut header = FitsHeader::new();
    header.set(
        "NFRAMES",
        HeaderValue::Int(snapshot.frame_count as i64),
        Some("Frames in stack"),
    );
    header.set(
        "STACKST",
        HeaderValue::Float(epoch_seconds(&snapshot.started_at)),
        Some("Stack started at epoch seconds"),
    );
    header.set(
        "STACKEND",
        HeaderValue::Float(epoch_seconds(&snapshot.updated_at)),
        Some("Stack ended at epoch seconds"),
    );
    header.set(
        "DATE",
        HeaderValue::Str(snapshot.updated_at.format("%Y-%m-%dT%H:%M:%S").to_string()),
        Some("UTC time of composition"),
    );
    header
}
