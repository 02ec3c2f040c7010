//! Per-tick reconciliation
//!
//! A tick reads both rosters, provisions both managed roles, resolves every
//! entry to directory members and dispatches the role changes that move each
//! member toward its team's role. Nothing dispatched here is awaited.

use super::dispatch::Dispatcher;
use super::provisioner::RoleProvisioner;
use super::resolver::{EntryResolver, Resolution};
use crate::config::{DaemonConfig, OverlapPolicy};
use crate::directory::{Directory, Guild};
use crate::error::DaemonResult;
use crate::roster::Roster;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use teamrole_types::{GuildId, Member, Role, RoleId, TeamBinding, TeamSide};

/// A single role mutation for one member
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleChange {
    Add(RoleId),
    Remove(RoleId),
}

/// Compute the changes that give `member` its own team's role and strip the
/// opposing team's roles.
///
/// Only the first of `own` is ever granted, and only when the member holds
/// none of them. Every opposing role the member holds is removed. An empty
/// `own` (creation still pending) yields no grant.
pub fn plan_assignment(member: &Member, own: &[Role], opposing: &[Role]) -> Vec<RoleChange> {
    let mut changes = Vec::new();

    if let Some(first) = own.first() {
        if !member.has_any_role(own) {
            changes.push(RoleChange::Add(first.id.clone()));
        }
    }

    if member.has_any_role(opposing) {
        changes.extend(opposing.iter().map(|role| RoleChange::Remove(role.id.clone())));
    }

    changes
}

/// What a tick did for one team
#[derive(Debug, Clone, Default, Serialize)]
pub struct TeamTickSummary {
    /// Entries listed in the roster
    pub entries: usize,
    /// Directory roles carrying the team's role name
    pub roles: usize,
    /// A create-role request was dispatched this tick
    pub role_creation_requested: bool,
    /// Entries resolved from the member cache
    pub cache_hits: usize,
    /// Directory searches started
    pub searches: usize,
    /// Entries whose search from an earlier tick was still running
    pub searches_in_flight: usize,
    /// Role changes dispatched for cache-resolved members
    pub changes_dispatched: usize,
}

/// What a tick did
#[derive(Debug, Clone, Serialize)]
pub struct TickSummary {
    pub started_at: DateTime<Utc>,
    /// False when the guild could not be resolved and the tick did nothing
    pub guild_available: bool,
    pub red: TeamTickSummary,
    pub blue: TeamTickSummary,
    /// Entries listed in both rosters
    pub overlapping_entries: Vec<String>,
}

impl TickSummary {
    fn skipped(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            guild_available: false,
            red: TeamTickSummary::default(),
            blue: TeamTickSummary::default(),
            overlapping_entries: Vec::new(),
        }
    }

    pub fn team(&self, side: TeamSide) -> &TeamTickSummary {
        match side {
            TeamSide::Red => &self.red,
            TeamSide::Blue => &self.blue,
        }
    }
}

/// The reconciliation engine
pub struct Reconciler {
    directory: Arc<dyn Directory>,
    roster: Arc<dyn Roster>,
    guild_id: GuildId,
    red: TeamBinding,
    blue: TeamBinding,
    overlap_policy: OverlapPolicy,
    dispatcher: Dispatcher,
    provisioner: RoleProvisioner,
    resolver: EntryResolver,
}

impl Reconciler {
    pub fn new(
        directory: Arc<dyn Directory>,
        roster: Arc<dyn Roster>,
        config: &DaemonConfig,
    ) -> Self {
        let dispatcher = Dispatcher::new();
        Self {
            directory,
            roster,
            guild_id: config.guild(),
            red: config.binding(TeamSide::Red),
            blue: config.binding(TeamSide::Blue),
            overlap_policy: config.scheduler.overlap_policy,
            provisioner: RoleProvisioner::new(dispatcher.clone()),
            resolver: EntryResolver::new(dispatcher.clone()),
            dispatcher,
        }
    }

    pub fn binding(&self, side: TeamSide) -> &TeamBinding {
        match side {
            TeamSide::Red => &self.red,
            TeamSide::Blue => &self.blue,
        }
    }

    pub fn guild_id(&self) -> &GuildId {
        &self.guild_id
    }

    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    /// Dispatcher carrying this engine's searches and mutations
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Run one reconciliation pass.
    ///
    /// Returns once every change has been dispatched. Roster and role lookup
    /// failures abort the tick with an error; an unresolvable guild is a
    /// silent no-op.
    pub async fn tick(&self) -> DaemonResult<TickSummary> {
        let started_at = Utc::now();

        let Some(guild) = self.directory.guild(&self.guild_id).await else {
            tracing::debug!(guild_id = %self.guild_id, "Guild unavailable, skipping tick");
            return Ok(TickSummary::skipped(started_at));
        };

        let mut red_entries = self.roster.entries(&self.red.team).await?;
        let mut blue_entries = self.roster.entries(&self.blue.team).await?;

        let red_roles = self.provisioner.ensure(&guild, &self.red).await?;
        let blue_roles = self.provisioner.ensure(&guild, &self.blue).await?;

        let mut red = TeamTickSummary {
            entries: red_entries.len(),
            roles: red_roles.roles.len(),
            role_creation_requested: red_roles.creation_requested,
            ..Default::default()
        };
        let mut blue = TeamTickSummary {
            entries: blue_entries.len(),
            roles: blue_roles.roles.len(),
            role_creation_requested: blue_roles.creation_requested,
            ..Default::default()
        };

        let overlapping: Vec<String> = red_entries.intersection(&blue_entries).cloned().collect();
        if !overlapping.is_empty() {
            tracing::warn!(
                entries = ?overlapping,
                policy = ?self.overlap_policy,
                "Entries listed in both teams"
            );
            for entry in &overlapping {
                red_entries.remove(entry);
                if self.overlap_policy == OverlapPolicy::Skip {
                    blue_entries.remove(entry);
                }
            }
        }

        self.process_team(
            &guild,
            TeamSide::Red,
            &red_entries,
            &red_roles.roles,
            &blue_roles.roles,
            &mut red,
        );
        self.process_team(
            &guild,
            TeamSide::Blue,
            &blue_entries,
            &blue_roles.roles,
            &red_roles.roles,
            &mut blue,
        );

        tracing::debug!(
            red_entries = red.entries,
            blue_entries = blue.entries,
            searches = red.searches + blue.searches,
            changes = red.changes_dispatched + blue.changes_dispatched,
            "Tick dispatched"
        );

        Ok(TickSummary {
            started_at,
            guild_available: true,
            red,
            blue,
            overlapping_entries: overlapping,
        })
    }

    fn process_team(
        &self,
        guild: &Arc<dyn Guild>,
        side: TeamSide,
        entries: &BTreeSet<String>,
        own: &Arc<[Role]>,
        opposing: &Arc<[Role]>,
        summary: &mut TeamTickSummary,
    ) {
        for entry in entries {
            let dispatched = Arc::new(AtomicUsize::new(0));
            let continuation = {
                let guild = guild.clone();
                let dispatcher = self.dispatcher.clone();
                let own = own.clone();
                let opposing = opposing.clone();
                let dispatched = dispatched.clone();
                move |members: Vec<Member>| {
                    for member in &members {
                        let count =
                            apply_assignment(&guild, &dispatcher, side, member, &own, &opposing);
                        dispatched.fetch_add(count, Ordering::Relaxed);
                    }
                }
            };

            match self.resolver.resolve(guild, entry, continuation) {
                Resolution::Cached(_) => {
                    summary.cache_hits += 1;
                    summary.changes_dispatched += dispatched.load(Ordering::Relaxed);
                }
                Resolution::Searching => summary.searches += 1,
                Resolution::AlreadySearching => summary.searches_in_flight += 1,
            }
        }
    }
}

/// Dispatch the planned changes for one member, returning how many were sent
fn apply_assignment(
    guild: &Arc<dyn Guild>,
    dispatcher: &Dispatcher,
    side: TeamSide,
    member: &Member,
    own: &[Role],
    opposing: &[Role],
) -> usize {
    let changes = plan_assignment(member, own, opposing);

    for change in &changes {
        let guild = guild.clone();
        let member_id = member.id.clone();
        match change.clone() {
            RoleChange::Add(role) => {
                tracing::info!(
                    team = %side,
                    member = %member_id,
                    name = member.display_name(),
                    role = %role,
                    "Granting team role"
                );
                dispatcher.dispatch("add_role", async move {
                    guild.add_role(&member_id, &role).await
                });
            }
            RoleChange::Remove(role) => {
                tracing::info!(
                    team = %side,
                    member = %member_id,
                    name = member.display_name(),
                    role = %role,
                    "Revoking opposing team role"
                );
                dispatcher.dispatch("remove_role", async move {
                    guild.remove_role(&member_id, &role).await
                });
            }
        }
    }

    changes.len()
}
