use std::thread;
use std::time::{Duration, Instant};

use tracing::info;

use crate::error::MountError;

/// Telescope mount, as far as acquisition gating needs it.
pub trait Mount: Send {
    fn is_slewing(&mut self) -> Result<bool, MountError>;

    /// Poll `is_slewing` every `check_interval` until the mount settles.
    ///
    /// `Ok(true)` once it stopped slewing, `Ok(false)` when `timeout` passed
    /// first.
    fn wait_for_slewing_complete(
        &mut self,
        timeout: Duration,
        check_interval: Duration,
    ) -> Result<bool, MountError> {
        let start = Instant::now();
        info!(timeout = ?timeout, "Waiting for slewing to complete");
        loop {
            if !self.is_slewing()? {
                info!(elapsed = ?start.elapsed(), "Slewing completed");
                return Ok(true);
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Ok(false);
            }
            thread::sleep(check_interval.min(timeout - elapsed));
        }
    }

    fn disconnect(&mut self) {}
}
