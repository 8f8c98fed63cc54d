use std::sync::mpsc;

use crate::devices::SolveResult;
use crate::error::AcquisitionError;
use crate::frame::{FrameMetadata, FrameSample};

/// Callbacks fired from the acquisition loop thread.
///
/// All methods have default no-op implementations. They run synchronously
/// inside the cycle, so implementations should return quickly.
pub trait AcquisitionObserver: Send + Sync {
    /// A frame was obtained. `frame.metadata.capture_id` carries the cycle's id.
    fn on_capture_frame(&self, _frame: &FrameSample) {}

    fn on_solve_result(&self, _result: &SolveResult) {}

    /// An error escaped a cycle and was contained at the iteration boundary.
    fn on_error(&self, _error: &AcquisitionError) {}
}

/// Observer that ignores everything; installed until `set_callbacks` is called.
pub(crate) struct NoOpObserver;
impl AcquisitionObserver for NoOpObserver {}

/// Event forwarded by [`ChannelObserver`].
#[derive(Clone, Debug)]
pub enum AcquisitionEvent {
    FrameCaptured {
        metadata: FrameMetadata,
        /// (height, width, channels)
        dim: (usize, usize, usize),
    },
    Solved(SolveResult),
    Error(AcquisitionError),
}

/// Forwards loop events over an mpsc channel, so consumers on other threads
/// never run code on the loop thread.
pub struct ChannelObserver {
    tx: mpsc::Sender<AcquisitionEvent>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::Sender<AcquisitionEvent>) -> Self {
        Self { tx }
    }

    /// Observer plus the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::Receiver<AcquisitionEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self::new(tx), rx)
    }
}

impl AcquisitionObserver for ChannelObserver {
    fn on_capture_frame(&self, frame: &FrameSample) {
        let _ = self.tx.send(AcquisitionEvent::FrameCaptured {
            metadata: frame.metadata.clone(),
            dim: frame.pixels.dim(),
        });
    }

    fn on_solve_result(&self, result: &SolveResult) {
        let _ = self.tx.send(AcquisitionEvent::Solved(result.clone()));
    }

    fn on_error(&self, error: &AcquisitionError) {
        let _ = self.tx.send(AcquisitionEvent::Error(error.clone()));
    }
}
