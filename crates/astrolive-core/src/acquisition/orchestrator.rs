use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::config::AcquisitionConfig;
use super::cycle::{CycleOutcome, CycleRunner, Devices};
use super::observer::{AcquisitionObserver, NoOpObserver};
use super::telemetry::{Stage, TelemetrySummary, TelemetryWindow};
use crate::consts::{DISABLED_POLL_INTERVAL, ITERATION_BACKOFF, MIN_LOOP_WAIT, STOP_JOIN_TIMEOUT};
use crate::devices::{DeviceFactory, SolveResult};
use crate::error::AcquisitionError;
use crate::stack::StackingEngine;

const THREAD_NAME: &str = "astrolive-acquisition";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Point-in-time view of the loop's counters and telemetry.
#[derive(Clone, Debug, Default)]
pub struct AcquisitionStatistics {
    pub capture_count: u64,
    /// Solve attempts, successful or not.
    pub solve_count: u64,
    pub successful_solves: u64,
    /// Cycles skipped by the mount gate.
    pub skipped_cycles: u64,
    pub is_running: bool,
    pub last_capture_at: Option<DateTime<Utc>>,
    pub last_solve_at: Option<DateTime<Utc>>,
    pub last_result: Option<SolveResult>,
    pub timings: TelemetrySummary,
}

/// Result of [`AcquisitionOrchestrator::stop`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StopReport {
    pub was_running: bool,
    /// The loop thread finished within the join bound. When false the thread
    /// is detached and releases its devices once the in-flight call returns;
    /// `start()` reports `AlreadyRunning` until then.
    pub joined: bool,
}

/// Cancellation flag that also wakes interval sleeps.
pub(crate) struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    fn new() -> Self {
        Self {
            stopped: Mutex::new(false),
            wake: Condvar::new(),
        }
    }

    fn raise(&self) {
        *lock(&self.stopped) = true;
        self.wake.notify_all();
    }

    fn is_raised(&self) -> bool {
        *lock(&self.stopped)
    }

    /// Sleep up to `timeout`; returns early with `true` once stopped.
    fn wait(&self, timeout: Duration) -> bool {
        let guard = lock(&self.stopped);
        let (guard, _) = self
            .wake
            .wait_timeout_while(guard, timeout, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

/// State shared between the orchestrator handle and its loop thread.
pub(crate) struct Shared {
    enabled: AtomicBool,
    running: AtomicBool,
    pub(crate) capture_count: AtomicU64,
    pub(crate) solve_count: AtomicU64,
    pub(crate) successful_solves: AtomicU64,
    pub(crate) skipped_cycles: AtomicU64,
    telemetry: Mutex<TelemetryWindow>,
    last_result: Mutex<Option<SolveResult>>,
    last_capture_at: Mutex<Option<DateTime<Utc>>>,
    last_solve_at: Mutex<Option<DateTime<Utc>>>,
    observer: Mutex<Arc<dyn AcquisitionObserver>>,
}

impl Shared {
    fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            running: AtomicBool::new(false),
            capture_count: AtomicU64::new(0),
            solve_count: AtomicU64::new(0),
            successful_solves: AtomicU64::new(0),
            skipped_cycles: AtomicU64::new(0),
            telemetry: Mutex::new(TelemetryWindow::default()),
            last_result: Mutex::new(None),
            last_capture_at: Mutex::new(None),
            last_solve_at: Mutex::new(None),
            observer: Mutex::new(Arc::new(NoOpObserver)),
        }
    }

    pub(crate) fn observer(&self) -> Arc<dyn AcquisitionObserver> {
        Arc::clone(&lock(&self.observer))
    }

    pub(crate) fn record(&self, stage: Stage, duration: Duration) {
        lock(&self.telemetry).record(stage, duration);
    }

    pub(crate) fn record_capture(&self, duration: Duration) {
        self.record(Stage::Capture, duration);
        *lock(&self.last_capture_at) = Some(Utc::now());
    }

    pub(crate) fn telemetry_summary(&self) -> TelemetrySummary {
        lock(&self.telemetry).summary()
    }

    pub(crate) fn last_result(&self) -> Option<SolveResult> {
        lock(&self.last_result).clone()
    }

    pub(crate) fn store_result(&self, result: &SolveResult) {
        *lock(&self.last_result) = Some(result.clone());
        *lock(&self.last_solve_at) = Some(Utc::now());
    }
}

struct LoopHandle {
    thread: JoinHandle<()>,
    done: mpsc::Receiver<()>,
    stop: Arc<StopSignal>,
}

/// Owns the acquisition loop: connects devices on `start()`, runs cycles on a
/// dedicated thread, and tears everything down on `stop()`.
///
/// All methods take `&self`, so the orchestrator can sit in an `Arc` and be
/// queried from any thread while the loop runs.
pub struct AcquisitionOrchestrator {
    config: AcquisitionConfig,
    factory: Mutex<Box<dyn DeviceFactory>>,
    stacking: Option<Arc<StackingEngine>>,
    shared: Arc<Shared>,
    handle: Mutex<Option<LoopHandle>>,
    /// Completion signal of a loop that outlived the join bound in `stop()`.
    detached: Mutex<Option<mpsc::Receiver<()>>>,
}

impl AcquisitionOrchestrator {
    pub fn new(config: AcquisitionConfig, factory: Box<dyn DeviceFactory>) -> Self {
        let stacking = config
            .stacking
            .enabled
            .then(|| Arc::new(StackingEngine::new(config.stacking.clone(), config.stack_dir())));
        let shared = Arc::new(Shared::new(config.enabled));
        Self {
            config,
            factory: Mutex::new(factory),
            stacking,
            shared,
            handle: Mutex::new(None),
            detached: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// The live stack fed by the loop, when stacking is enabled.
    pub fn stacking_engine(&self) -> Option<&Arc<StackingEngine>> {
        self.stacking.as_ref()
    }

    /// Connect the devices and spawn the loop thread. Returns immediately.
    pub fn start(&self) -> Result<(), AcquisitionError> {
        let mut handle = lock(&self.handle);
        if handle.is_some() || self.detached_loop_alive() {
            return Err(AcquisitionError::AlreadyRunning);
        }

        let (devices, auto_solve) = self.connect_devices()?;
        let runner = CycleRunner::new(
            self.config.clone(),
            devices,
            auto_solve,
            self.stacking.clone(),
        );

        let stop = Arc::new(StopSignal::new());
        let (done_tx, done_rx) = mpsc::channel();
        let shared = Arc::clone(&self.shared);
        let loop_stop = Arc::clone(&stop);
        let interval = self.config.capture_interval();

        self.shared.running.store(true, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name(THREAD_NAME.into())
            .spawn(move || {
                run_loop(runner, &shared, &loop_stop, interval);
                let _ = done_tx.send(());
            });
        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                return Err(AcquisitionError::Initialization(format!(
                    "failed to spawn acquisition thread: {e}"
                )));
            }
        };

        *handle = Some(LoopHandle {
            thread,
            done: done_rx,
            stop,
        });
        info!(
            interval_s = self.config.capture_interval_s,
            auto_solve,
            stacking = self.stacking.is_some(),
            "Acquisition loop started"
        );
        Ok(())
    }

    /// Whether a loop detached by `stop()` is still finishing its cycle.
    fn detached_loop_alive(&self) -> bool {
        let mut detached = lock(&self.detached);
        let alive = detached
            .as_ref()
            .is_some_and(|done| matches!(done.try_recv(), Err(TryRecvError::Empty)));
        if !alive {
            *detached = None;
        }
        alive
    }

    fn connect_devices(&self) -> Result<(Devices, bool), AcquisitionError> {
        let mut factory = lock(&self.factory);

        let camera = factory
            .connect_camera()
            .map_err(|e| AcquisitionError::Initialization(format!("camera: {e}")))?;
        debug!(kind = camera.kind(), "Camera connected");

        let mount = match factory.connect_mount() {
            Ok(Some(mount)) => Some(mount),
            Ok(None) => {
                debug!("No mount configured");
                None
            }
            Err(e) => {
                warn!(error = %e, "Mount unavailable, slewing detection disabled");
                None
            }
        };

        let solver = factory.create_solver();
        let mut auto_solve = self.config.auto_solve;
        match solver.as_deref() {
            Some(solver) if !solver.is_available() => {
                warn!(solver = solver.name(), "Plate solver unavailable, auto-solve disabled");
                auto_solve = false;
            }
            None if auto_solve => {
                info!("No plate solver configured");
                auto_solve = false;
            }
            _ => {}
        }

        let writer = factory.create_writer();
        Ok((
            Devices {
                camera,
                mount,
                solver,
                writer,
            },
            auto_solve,
        ))
    }

    /// Signal the loop to stop and wait for it up to the join bound.
    /// Always succeeds, also when nothing is running.
    pub fn stop(&self) -> StopReport {
        let Some(handle) = lock(&self.handle).take() else {
            return StopReport {
                was_running: false,
                joined: true,
            };
        };

        handle.stop.raise();
        let joined = match handle.done.recv_timeout(STOP_JOIN_TIMEOUT) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = handle.thread.join();
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(timeout = ?STOP_JOIN_TIMEOUT, "Acquisition loop did not stop in time");
                *lock(&self.detached) = Some(handle.done);
                false
            }
        };
        info!(joined, "Acquisition stopped");
        StopReport {
            was_running: true,
            joined,
        }
    }

    /// Register the observer receiving loop events. Replaces any previous one.
    pub fn set_callbacks(&self, observer: Arc<dyn AcquisitionObserver>) {
        *lock(&self.shared.observer) = observer;
    }

    /// Pause or resume capturing without stopping the loop.
    pub fn set_enabled(&self, enabled: bool) {
        self.shared.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn get_statistics(&self) -> AcquisitionStatistics {
        let shared = &self.shared;
        AcquisitionStatistics {
            capture_count: shared.capture_count.load(Ordering::Relaxed),
            solve_count: shared.solve_count.load(Ordering::Relaxed),
            successful_solves: shared.successful_solves.load(Ordering::Relaxed),
            skipped_cycles: shared.skipped_cycles.load(Ordering::Relaxed),
            is_running: self.is_running(),
            last_capture_at: *lock(&shared.last_capture_at),
            last_solve_at: *lock(&shared.last_solve_at),
            last_result: shared.last_result(),
            timings: shared.telemetry_summary(),
        }
    }
}

impl Drop for AcquisitionOrchestrator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(mut runner: CycleRunner, shared: &Shared, stop: &StopSignal, interval: Duration) {
    let mut last_cycle_end: Option<Instant> = None;

    while !stop.is_raised() {
        if !shared.enabled.load(Ordering::SeqCst) {
            stop.wait(DISABLED_POLL_INTERVAL);
            continue;
        }

        if let Some(elapsed) = last_cycle_end.map(|end| end.elapsed()) {
            if elapsed < interval {
                stop.wait((interval - elapsed).max(MIN_LOOP_WAIT));
                continue;
            }
        }

        match panic::catch_unwind(AssertUnwindSafe(|| runner.run(shared))) {
            Ok(CycleOutcome::Completed { capture_id }) => {
                debug!(capture_id, "Cycle completed");
            }
            Ok(CycleOutcome::Skipped(decision)) => {
                debug!(?decision, "Cycle skipped by mount gate");
            }
            Ok(CycleOutcome::NoFrame(_)) => {}
            Err(payload) => {
                let err = AcquisitionError::Iteration(panic_message(payload.as_ref()));
                error!(error = %err, "Error in acquisition loop");
                shared.observer().on_error(&err);
                stop.wait(ITERATION_BACKOFF);
            }
        }
        last_cycle_end = Some(Instant::now());
    }

    runner.shutdown();
    shared.running.store(false, Ordering::SeqCst);
    debug!("Acquisition loop exited");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
