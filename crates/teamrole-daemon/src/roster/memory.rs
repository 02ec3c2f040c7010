//! In-memory roster

use super::Roster;
use crate::error::RosterResult;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

/// Roster held in memory, for static configuration and tests
#[derive(Debug, Default)]
pub struct StaticRoster {
    teams: RwLock<HashMap<String, BTreeSet<String>>>,
}

impl StaticRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_teams(teams: HashMap<String, BTreeSet<String>>) -> Self {
        Self {
            teams: RwLock::new(teams),
        }
    }

    /// Replace the entries of one team
    pub async fn set_team<I, S>(&self, team: &str, entries: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut teams = self.teams.write().await;
        teams.insert(
            team.to_string(),
            entries.into_iter().map(Into::into).collect(),
        );
    }
}

#[async_trait]
impl Roster for StaticRoster {
    /// Exact team name first, then a case-insensitive match
    async fn entries(&self, team: &str) -> RosterResult<BTreeSet<String>> {
        let teams = self.teams.read().await;
        let entries = teams.get(team).or_else(|| {
            teams
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(team))
                .map(|(_, entries)| entries)
        });
        Ok(entries.cloned().unwrap_or_default())
    }
}
