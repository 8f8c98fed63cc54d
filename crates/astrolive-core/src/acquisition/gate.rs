//! Mount gate: decides whether a cycle may capture while the mount moves.

use tracing::{debug, info, warn};

use super::config::SlewingDetectionConfig;
use crate::devices::Mount;

/// Outcome of the pre-capture slewing check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateDecision {
    /// Slewing detection is off, no mount is connected, or checks before
    /// capture are disabled.
    Disabled,
    NotSlewing,
    /// Mount is slewing and waiting is disabled.
    Skip,
    /// Mount was slewing and settled within the wait timeout.
    WaitProceed,
    WaitTimeoutSkip,
    /// Waiting failed; capture proceeds anyway.
    WaitErrorProceed,
    /// The slewing state could not be read; capture proceeds anyway.
    QueryFailedProceed,
}

impl GateDecision {
    pub fn proceeds(self) -> bool {
        !matches!(self, Self::Skip | Self::WaitTimeoutSkip)
    }
}

/// Run the mount gate for one cycle.
pub fn evaluate<M: Mount + ?Sized>(
    mount: Option<&mut M>,
    config: &SlewingDetectionConfig,
) -> GateDecision {
    if !config.enabled || !config.check_before_capture {
        return GateDecision::Disabled;
    }
    let Some(mount) = mount else {
        return GateDecision::Disabled;
    };

    match mount.is_slewing() {
        Err(e) => {
            warn!(error = %e, "Could not check slewing status, capturing anyway");
            GateDecision::QueryFailedProceed
        }
        Ok(false) => GateDecision::NotSlewing,
        Ok(true) if !config.wait_for_completion => {
            debug!("Mount is slewing, skipping capture");
            GateDecision::Skip
        }
        Ok(true) => {
            info!("Mount is slewing, waiting for completion");
            match mount.wait_for_slewing_complete(config.wait_timeout(), config.check_interval()) {
                Ok(true) => GateDecision::WaitProceed,
                Ok(false) => {
                    warn!(
                        timeout_s = config.wait_timeout_s,
                        "Slewing did not complete in time, skipping capture"
                    );
                    GateDecision::WaitTimeoutSkip
                }
                Err(e) => {
                    warn!(error = %e, "Slewing wait failed, capturing anyway");
                    GateDecision::WaitErrorProceed
                }
            }
        }
    }
}
