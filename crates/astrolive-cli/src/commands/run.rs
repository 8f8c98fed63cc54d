use std::path::PathBuf;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use astrolive_core::acquisition::{AcquisitionEvent, ChannelObserver};
use astrolive_core::devices::ReplayDeviceFactory;
use astrolive_core::{AcquisitionConfig, AcquisitionOrchestrator};
use clap::Args;
use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::summary;

const EVENT_POLL: Duration = Duration::from_millis(200);

#[derive(Args)]
pub struct RunArgs {
    /// Directory of images or a SER file replayed as the camera
    pub source: Option<PathBuf>,

    /// Acquisition config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output directory for frames and stacks
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Seconds between captures
    #[arg(long)]
    pub interval: Option<f64>,

    /// Path to the astap_cli executable
    #[arg(long)]
    pub astap: Option<PathBuf>,

    /// Enable live stacking
    #[arg(long)]
    pub stack: bool,

    /// Stop after this many seconds
    #[arg(long)]
    pub duration: Option<f64>,

    /// Stop after this many captures
    #[arg(long)]
    pub frames: Option<u64>,
}

/// Run the acquisition loop until `--duration` or `--frames` is reached, or
/// until interrupted.
pub fn run(args: &RunArgs) -> Result<()> {
    let config = load_config(args)?;
    summary::print_run_summary(&config);

    let factory = ReplayDeviceFactory::new(config.clone());
    let orchestrator = AcquisitionOrchestrator::new(config, Box::new(factory));
    let (observer, events) = ChannelObserver::channel();
    orchestrator.set_callbacks(Arc::new(observer));
    orchestrator
        .start()
        .context("Failed to start acquisition")?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner} {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(120));

    let deadline = args
        .duration
        .filter(|d| d.is_finite() && *d > 0.0)
        .map(Duration::from_secs_f64);
    let started = Instant::now();

    loop {
        match events.recv_timeout(EVENT_POLL) {
            Ok(event) => report(&pb, event),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let stats = orchestrator.get_statistics();
        pb.set_message(format!(
            "{} captured, {}/{} solved, {} skipped",
            stats.capture_count, stats.successful_solves, stats.solve_count, stats.skipped_cycles
        ));

        let timed_out = deadline.is_some_and(|d| started.elapsed() >= d);
        let enough = args.frames.is_some_and(|n| stats.capture_count >= n);
        if timed_out || enough || !stats.is_running {
            break;
        }
    }

    let stop = orchestrator.stop();
    pb.finish_and_clear();
    for event in events.try_iter() {
        report(&pb, event);
    }
    if !stop.joined {
        warn!("Acquisition thread did not stop in time; devices are released when it exits");
    }

    summary::print_statistics(&orchestrator.get_statistics());
    Ok(())
}

fn load_config(args: &RunArgs) -> Result<AcquisitionConfig> {
    let mut config = match args.config {
        Some(ref path) => AcquisitionConfig::from_toml_file(path)
            .with_context(|| format!("Invalid acquisition config {}", path.display()))?,
        None => AcquisitionConfig::default(),
    };

    if let Some(ref source) = args.source {
        config.camera.source = Some(source.clone());
    }
    if let Some(ref output) = args.output {
        config.output_dir = output.clone();
    }
    if let Some(interval) = args.interval {
        config.capture_interval_s = interval;
    }
    if let Some(ref astap) = args.astap {
        config.solver.astap_path = Some(astap.clone());
    }
    if args.stack {
        config.stacking.enabled = true;
    }
    info!(
        source = ?config.camera.source,
        output = %config.output_dir.display(),
        "Acquisition config loaded"
    );

    if config.camera.source.is_none() {
        bail!("No camera source: pass a directory or SER file, or set camera.source in the config");
    }
    Ok(config)
}

fn report(pb: &ProgressBar, event: AcquisitionEvent) {
    match event {
        AcquisitionEvent::FrameCaptured { metadata, dim } => {
            let (h, w, _) = dim;
            pb.println(format!(
                "  {} #{} {}x{}",
                Style::new().dim().apply_to("frame"),
                metadata.capture_id.unwrap_or_default(),
                w,
                h
            ));
        }
        AcquisitionEvent::Solved(result) => {
            pb.println(format!("  {} {}", Style::new().green().apply_to("solved"), result));
        }
        AcquisitionEvent::Error(err) => {
            pb.println(format!("  {} {}", Style::new().red().bold().apply_to("error"), err));
        }
    }
}
