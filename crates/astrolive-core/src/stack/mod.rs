//! Live stacking of accepted frames into a running composite.

pub mod engine;
pub mod median;
pub mod snapshot;

pub use engine::{AddOutcome, FrameAlignment, StackingEngine};
pub use snapshot::StackSnapshot;
