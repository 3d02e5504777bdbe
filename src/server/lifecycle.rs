//! Shutdown/exit state machine

use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Running,
    ShuttingDown,
    Exited,
}

/// What the dispatcher may do with an inbound method in the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accept,
    /// Fail requests, drop notifications
    Reject,
}

#[derive(Debug)]
pub struct Lifecycle {
    state: LifecycleState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Running,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn admit(&self, method: &str) -> Admission {
        match self.state {
            LifecycleState::Running => Admission::Accept,
            LifecycleState::ShuttingDown if method == "exit" => Admission::Accept,
            LifecycleState::ShuttingDown | LifecycleState::Exited => Admission::Reject,
        }
    }

    /// `Running -> ShuttingDown`; returns false from any other state
    pub fn begin_shutdown(&mut self) -> bool {
        if self.state != LifecycleState::Running {
            return false;
        }
        info!("Shutdown requested");
        self.state = LifecycleState::ShuttingDown;
        true
    }

    /// Move to `Exited` and return the process exit status
    ///
    /// Exiting after a shutdown request is a clean exit (0); exiting without
    /// one is reported as a failure (1).
    pub fn exit(&mut self) -> i32 {
        let code = match self.state {
            LifecycleState::ShuttingDown => 0,
            LifecycleState::Running | LifecycleState::Exited => 1,
        };
        if self.state != LifecycleState::Exited {
            info!("Exiting with status {}", code);
        }
        self.state = LifecycleState::Exited;
        code
    }
}
