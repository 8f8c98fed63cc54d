//! The acquisition loop: mount gating, capture, persistence, live stacking
//! and rate-limited plate solving on a dedicated thread.

pub mod config;
mod cycle;
pub mod gate;
pub mod observer;
pub mod orchestrator;
pub mod telemetry;

pub use config::AcquisitionConfig;
pub use gate::GateDecision;
pub use observer::{AcquisitionEvent, AcquisitionObserver, ChannelObserver};
pub use orchestrator::{AcquisitionOrchestrator, AcquisitionStatistics, StopReport};
pub use telemetry::{Stage, StageSummary, TelemetrySummary, TelemetryWindow};
