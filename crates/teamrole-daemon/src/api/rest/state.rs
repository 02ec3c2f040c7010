//! Application state for API handlers

use crate::scheduler::Scheduler;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub version: String,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self {
            scheduler,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Utc::now(),
        }
    }

    /// Whole seconds since the API came up
    pub fn uptime_secs(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DaemonConfig;
    use crate::directory::InMemoryDirectory;
    use crate::roster::StaticRoster;
    use crate::scheduler::Reconciler;

    #[test]
    fn test_uptime_counts_from_start() {
        let config = DaemonConfig::development();
        let reconciler = Reconciler::new(
            Arc::new(InMemoryDirectory::new(config.guild())),
            Arc::new(StaticRoster::new()),
            &config,
        );
        let (scheduler, _rx) = Scheduler::new(config.scheduler.clone(), Arc::new(reconciler));

        let mut state = AppState::new(scheduler);
        assert!(state.uptime_secs() < 5);

        state.started_at = Utc::now() - chrono::Duration::seconds(90);
        assert!((90..95).contains(&state.uptime_secs()));
    }
}
