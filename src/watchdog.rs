//! Parent process liveness watchdog
//!
//! Editors that spawn the server pass their own pid at initialize. When the
//! editor dies without sending `exit`, the watchdog notices and asks the
//! dispatcher to exit.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why the watchdog loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogOutcome {
    /// The parent process is gone and exit was requested
    ParentExited,
    /// The server exited first
    Cancelled,
}

pub struct ParentWatchdog {
    pid: u32,
    interval: Duration,
    /// Cancelled by the watchdog to request exit, or by the server when it exits
    exit_token: CancellationToken,
}

impl ParentWatchdog {
    pub fn new(pid: u32, interval: Duration, exit_token: CancellationToken) -> Self {
        Self {
            pid,
            interval,
            exit_token,
        }
    }

    /// Run on a background task; dropping the handle does not stop it
    pub fn spawn(self) -> JoinHandle<WatchdogOutcome> {
        tokio::spawn(self.run(is_process_alive))
    }

    /// Check, then wait one interval, until the parent is gone or the token fires
    pub async fn run(self, is_alive: impl Fn(u32) -> bool) -> WatchdogOutcome {
        info!(
            "Watching parent process {} every {:?}",
            self.pid, self.interval
        );

        loop {
            if self.exit_token.is_cancelled() {
                return WatchdogOutcome::Cancelled;
            }

            if !is_alive(self.pid) {
                warn!("Parent process {} is gone, exiting", self.pid);
                self.exit_token.cancel();
                return WatchdogOutcome::ParentExited;
            }
            debug!("Parent process {} is alive", self.pid);

            tokio::select! {
                _ = self.exit_token.cancelled() => return WatchdogOutcome::Cancelled,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

/// Whether a process with this pid currently exists
///
/// A process this one may not signal counts as gone, the same as one that
/// does not exist.
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    // pid 0 and negative values address process groups, not a process
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }

    // Signal 0 performs the existence and permission checks without signalling
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    debug!(
        "Process {} is not reachable: {}",
        pid,
        std::io::Error::last_os_error()
    );
    false
}

#[cfg(not(unix))]
pub fn is_process_alive(pid: u32) -> bool {
    warn!(
        "Parent process checks are not supported on this platform; assuming {} is alive",
        pid
    );
    true
}
