//! Roster sources
//!
//! A roster reports, per team name, the entries (player names) currently on
//! that team. The engine only reads it.

mod file;
mod memory;

pub use file::FileRoster;
pub use memory::StaticRoster;

use crate::config::RosterConfig;
use crate::error::RosterResult;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Read-only view of team membership
#[async_trait]
pub trait Roster: Send + Sync {
    /// Entries on a team. Unknown teams yield an empty set.
    async fn entries(&self, team: &str) -> RosterResult<BTreeSet<String>>;
}

/// Build the roster described by the configuration
pub fn from_config(config: &RosterConfig) -> Arc<dyn Roster> {
    match config {
        RosterConfig::File { path } => Arc::new(FileRoster::new(path.clone())),
        RosterConfig::Static { teams } => Arc::new(StaticRoster::from_teams(teams.clone())),
    }
}
