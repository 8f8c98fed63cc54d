//! One acquisition cycle: gate, capture, persist, stack, roll over, solve.

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::config::AcquisitionConfig;
use super::gate::{self, GateDecision};
use super::orchestrator::Shared;
use super::telemetry::{millis, Stage};
use crate::consts::TELEMETRY_LOG_EVERY;
use crate::devices::{CameraAdapter, FrameWriter, Mount, PlateSolver, SolveResult};
use crate::error::{CaptureError, SolveFailure};
use crate::frame::FrameSample;
use crate::io::naming::{capture_base_name, stack_base_name, with_extension};
use crate::stack::{StackSnapshot, StackingEngine};

/// Devices connected for one run. Owned by the loop thread.
pub(crate) struct Devices {
    pub camera: CameraAdapter,
    pub mount: Option<Box<dyn Mount>>,
    pub solver: Option<Box<dyn PlateSolver>>,
    pub writer: Box<dyn FrameWriter>,
}

impl Devices {
    fn disconnect(&mut self) {
        self.camera.disconnect();
        if let Some(mount) = self.mount.as_mut() {
            mount.disconnect();
        }
    }
}

#[derive(Debug)]
pub(crate) enum CycleOutcome {
    Skipped(GateDecision),
    NoFrame(CaptureError),
    Completed { capture_id: u64 },
}

/// Files written for a single frame.
#[derive(Default)]
struct SavedFrame {
    attempted: bool,
    display: Option<PathBuf>,
    scientific: Option<PathBuf>,
}

impl SavedFrame {
    /// Saving was attempted and every write failed.
    fn all_failed(&self) -> bool {
        self.attempted && self.display.is_none() && self.scientific.is_none()
    }
}

pub(crate) struct CycleRunner {
    config: AcquisitionConfig,
    devices: Devices,
    /// Cleared for the run when the solver reports itself unavailable.
    auto_solve: bool,
    stacking: Option<Arc<StackingEngine>>,
    last_solve_attempt: Option<Instant>,
    rolled_over: Option<StackSnapshot>,
}

impl CycleRunner {
    pub fn new(
        config: AcquisitionConfig,
        devices: Devices,
        auto_solve: bool,
        stacking: Option<Arc<StackingEngine>>,
    ) -> Self {
        Self {
            config,
            devices,
            auto_solve,
            stacking,
            last_solve_attempt: None,
            rolled_over: None,
        }
    }

    pub fn shutdown(&mut self) {
        self.devices.disconnect();
    }

    pub fn run(&mut self, shared: &Shared) -> CycleOutcome {
        let decision = gate::evaluate(
            self.devices.mount.as_deref_mut(),
            &self.config.mount.slewing_detection,
        );
        if !decision.proceeds() {
            shared.skipped_cycles.fetch_add(1, Ordering::Relaxed);
            return CycleOutcome::Skipped(decision);
        }

        let capture_start = Instant::now();
        let mut frame = match self.devices.camera.get_current_frame() {
            Ok(frame) => frame,
            Err(e) => {
                if e.is_transient() {
                    debug!(error = %e, "No frame available");
                } else {
                    warn!(error = %e, "Failed to obtain frame");
                }
                return CycleOutcome::NoFrame(e);
            }
        };
        let capture_time = capture_start.elapsed();

        let capture_id = shared.capture_count.fetch_add(1, Ordering::Relaxed) + 1;
        frame.metadata.capture_id = Some(capture_id);
        shared.record_capture(capture_time);
        info!(
            capture_id,
            exp = ?frame.metadata.exposure_s,
            gain = ?frame.metadata.gain,
            offset = ?frame.metadata.offset,
            readout = ?frame.metadata.readout_mode,
            dims = ?(frame.width(), frame.height()),
            "Frame captured"
        );
        shared.observer().on_capture_frame(&frame);

        let save_start = Instant::now();
        let saved = if self.config.save_frames {
            self.save_frame(&frame, capture_id)
        } else {
            SavedFrame::default()
        };
        let save_time = save_start.elapsed();
        shared.record(Stage::Save, save_time);

        if let Some(engine) = self.stacking.clone() {
            if let Some(outcome) = engine.add_frame(&frame.pixels) {
                debug!(
                    frames = outcome.frame_count,
                    alignment = ?outcome.alignment,
                    restarted = outcome.restarted,
                    "Frame stacked"
                );
            }
            self.maybe_roll_over(&engine, shared);
        }

        let solve_time = self.maybe_solve(&saved, shared);
        if let Some(elapsed) = solve_time {
            shared.record(Stage::Solve, elapsed);
        }

        info!(
            "capture_id={} timings_ms capture={:.1} save={:.1} solve={:.1}",
            capture_id,
            millis(capture_time),
            millis(save_time),
            millis(solve_time.unwrap_or_default()),
        );
        if capture_id % TELEMETRY_LOG_EVERY == 0 {
            info!("capture_id={} rolling timings_ms {}", capture_id, shared.telemetry_summary());
        }

        CycleOutcome::Completed { capture_id }
    }

    fn save_frame(&self, frame: &FrameSample, capture_id: u64) -> SavedFrame {
        let config = &self.config;
        let timestamp = config
            .use_timestamps
            .then(|| frame.metadata.captured_at.unwrap_or_else(Utc::now));
        let count = config.use_capture_count.then_some(capture_id);
        let base = capture_base_name(&frame.metadata, timestamp.as_ref(), count);

        let display_path = with_extension(
            &config.output_dir,
            &base,
            config.display_format.extension(),
        );
        let display = self.write_one(frame, &display_path);

        let scientific = if config.write_scientific {
            let fits_path = with_extension(&config.output_dir, &base, "fits");
            self.write_one(frame, &fits_path)
        } else {
            None
        };

        SavedFrame {
            attempted: true,
            display,
            scientific,
        }
    }

    fn write_one(&self, frame: &FrameSample, path: &Path) -> Option<PathBuf> {
        let start = Instant::now();
        match self.devices.writer.save(frame, path, &frame.metadata) {
            Ok(written) => {
                info!(
                    path = %written.display(),
                    save_ms = millis(start.elapsed()),
                    "Frame saved"
                );
                Some(written)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to save frame");
                None
            }
        }
    }

    fn maybe_roll_over(&mut self, engine: &StackingEngine, shared: &Shared) {
        let stacking = engine.config();
        if engine.frame_count() == 0 || engine.since_last_write() < stacking.write_interval() {
            return;
        }

        let centre = shared
            .last_result()
            .map(|result| (result.ra_deg, result.dec_deg));
        let base = stack_base_name(centre);
        match engine.write_snapshot(&base, stacking.write_preview, stacking.write_scientific) {
            Ok(Some(snapshot)) => {
                debug!(frames = snapshot.frame_count, base = %base, "Stack rolled over");
                self.rolled_over = Some(snapshot);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Failed to write stack snapshot");
                return;
            }
        }

        if let Some(max) = stacking.max_integration() {
            if engine.window_age() > max {
                info!(
                    max_integration_s = stacking.max_integration_s,
                    "Integration limit reached, resetting stack"
                );
                engine.reset();
            }
        }
    }

    /// Pick the file to solve: a rolled-over stack with enough frames, else
    /// the single frame. Scientific copies are preferred over display copies.
    fn solve_target(&self, saved: &SavedFrame) -> Option<PathBuf> {
        let min_frames = self.config.stacking.min_frames_for_stack_solve;
        let stacked = self
            .stacking
            .as_ref()
            .and(self.rolled_over.as_ref())
            .filter(|snapshot| snapshot.frame_count >= min_frames)
            .and_then(StackSnapshot::solve_path)
            .filter(|path| path.is_file());
        if let Some(path) = stacked {
            info!(path = %path.display(), "Solving rolled-over stack");
            return Some(path.to_path_buf());
        }

        if let Some(fits) = saved.scientific.as_ref().filter(|p| p.is_file()) {
            return Some(fits.clone());
        }
        if let Some(display_path) = saved.display.as_ref().filter(|p| p.is_file()) {
            warn!(path = %display_path.display(), "FITS not available, solving display image");
            return Some(display_path.clone());
        }
        None
    }

    /// Returns the solve duration when a solve was attempted.
    fn maybe_solve(&mut self, saved: &SavedFrame, shared: &Shared) -> Option<Duration> {
        if !self.auto_solve {
            return None;
        }
        if saved.all_failed() {
            debug!("Frame was not written, skipping plate solve");
            return None;
        }
        let solver = self.devices.solver.as_deref()?;
        let interval = self.config.min_solve_interval();
        if self
            .last_solve_attempt
            .is_some_and(|last| last.elapsed() < interval)
        {
            return None;
        }
        let Some(target) = self.solve_target(saved) else {
            warn!("No suitable file to plate-solve");
            return None;
        };

        let start = Instant::now();
        self.last_solve_attempt = Some(start);
        shared.solve_count.fetch_add(1, Ordering::Relaxed);

        let min_confidence = self.config.solver.min_confidence;
        let outcome = solver.solve(&target).and_then(|result| {
            match (min_confidence, result.confidence) {
                (Some(minimum), Some(confidence)) if confidence < minimum => {
                    Err(SolveFailure::LowConfidence {
                        confidence,
                        minimum,
                    })
                }
                _ => Ok(result),
            }
        });
        let elapsed = start.elapsed();

        match outcome {
            Ok(result) => {
                info!(solver = solver.name(), "{result}");
                self.accept_solution(result, shared);
            }
            Err(SolveFailure::Unavailable(reason)) => {
                warn!(
                    solver = solver.name(),
                    %reason,
                    "Solver unavailable, auto-solve disabled for this run"
                );
                self.auto_solve = false;
            }
            Err(reason) => {
                warn!(solver = solver.name(), target = %target.display(), %reason, "Plate solve failed");
            }
        }
        Some(elapsed)
    }

    fn accept_solution(&self, result: SolveResult, shared: &Shared) {
        shared.successful_solves.fetch_add(1, Ordering::Relaxed);
        shared.store_result(&result);
        shared.observer().on_solve_result(&result);
    }
}
