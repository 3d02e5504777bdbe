//! Server configuration carried in `initializationOptions`

use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

use crate::workspace::DEFAULT_MARKERS;

/// Characters of text before the cursor handed to the backend
pub const DEFAULT_CONTEXT_WINDOW: usize = 1024;

/// Upper bound on concurrently running deferred handlers
pub const DEFAULT_MAX_WORKERS: usize = 16;

/// Seconds between parent process liveness checks
pub const DEFAULT_PARENT_PROCESS_WATCH_INTERVAL: u64 = 10;

/// Words the backend generates per completion
pub const DEFAULT_GENERATION_LENGTH: usize = 20;

/// Options a client may set at initialize; every field has a default
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub context_window: usize,
    pub markers: Vec<String>,
    pub max_workers: usize,
    pub parent_process_watch_interval: u64,
    pub generation_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            context_window: DEFAULT_CONTEXT_WINDOW,
            markers: DEFAULT_MARKERS.iter().map(|m| m.to_string()).collect(),
            max_workers: DEFAULT_MAX_WORKERS,
            parent_process_watch_interval: DEFAULT_PARENT_PROCESS_WATCH_INTERVAL,
            generation_length: DEFAULT_GENERATION_LENGTH,
        }
    }
}

impl ServerConfig {
    /// Build from raw `initializationOptions`
    ///
    /// Absent options give the defaults. Options that do not deserialize are
    /// logged and replaced by the defaults rather than failing initialize.
    pub fn from_initialization_options(options: Option<&Value>) -> Self {
        let Some(options) = options.filter(|value| !value.is_null()) else {
            return Self::default();
        };

        match Self::deserialize(options) {
            Ok(config) => config.sanitized(),
            Err(e) => {
                warn!("Ignoring malformed initializationOptions: {}", e);
                Self::default()
            }
        }
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.parent_process_watch_interval)
    }

    /// A pool needs at least one worker and the watchdog a non-zero period
    fn sanitized(mut self) -> Self {
        if self.max_workers == 0 {
            warn!("maxWorkers must be positive, using {}", DEFAULT_MAX_WORKERS);
            self.max_workers = DEFAULT_MAX_WORKERS;
        }
        if self.parent_process_watch_interval == 0 {
            warn!(
                "parentProcessWatchInterval must be positive, using {}",
                DEFAULT_PARENT_PROCESS_WATCH_INTERVAL
            );
            self.parent_process_watch_interval = DEFAULT_PARENT_PROCESS_WATCH_INTERVAL;
        }
        self
    }
}
