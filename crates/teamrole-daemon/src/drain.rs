//! Shutdown drain
//!
//! On teardown every member of the guild loses both managed roles. The drain
//! bypasses the roster entirely: whoever holds a managed role is stripped,
//! whether or not the daemon granted it. Operations a tick left in flight
//! finish first, so none of them can re-grant a role after the strip.

use crate::directory::Directory;
use crate::error::{DirectoryError, DirectoryResult};
use crate::scheduler::Dispatcher;
use serde::Serialize;
use std::time::Duration;
use teamrole_types::{GuildId, Role};

/// What a drain did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// False when the guild could not be resolved and nothing was done
    pub guild_available: bool,
    /// Roles matching either managed name
    pub roles_stripped: usize,
    pub members_seen: usize,
    /// Members holding neither role, left untouched
    pub members_unchanged: usize,
    pub members_updated: usize,
    pub members_failed: usize,
}

/// How a bounded drain ended
#[derive(Debug)]
pub enum DrainOutcome {
    Completed(DrainReport),
    Failed(DirectoryError),
    TimedOut(Duration),
}

/// Strip both managed roles from every member of the guild.
///
/// Each member update is awaited in turn and a failure for one member never
/// stops the others. Members holding neither role are not written. A failure to enumerate members or look up roles is
/// returned.
pub async fn drain_managed_roles(
    directory: &dyn Directory,
    guild_id: &GuildId,
    red_role: &str,
    blue_role: &str,
) -> DirectoryResult<DrainReport> {
    let Some(guild) = directory.guild(guild_id).await else {
        tracing::debug!(guild_id = %guild_id, "Guild unavailable, nothing to drain");
        return Ok(DrainReport::default());
    };

    let members = guild.load_members().await?;

    let mut roles_to_strip: Vec<Role> = guild.roles_by_name(red_role).await?;
    roles_to_strip.extend(guild.roles_by_name(blue_role).await?);

    let mut report = DrainReport {
        guild_available: true,
        roles_stripped: roles_to_strip.len(),
        members_seen: members.len(),
        ..Default::default()
    };

    for member in &members {
        let remaining = member.roles_without(&roles_to_strip);
        if remaining == member.roles {
            report.members_unchanged += 1;
            continue;
        }
        match guild.set_member_roles(&member.id, &remaining).await {
            Ok(()) => report.members_updated += 1,
            Err(e) => {
                tracing::debug!(member = %member.id, error = %e, "Failed to strip managed roles");
                report.members_failed += 1;
            }
        }
    }

    Ok(report)
}

/// Wait for `in_flight` to settle and run the drain, both bounded by
/// `timeout`, then close the directory connection.
///
/// Timeout and failure are logged; teardown always proceeds.
pub async fn drain_and_disconnect(
    directory: &dyn Directory,
    in_flight: &Dispatcher,
    guild_id: &GuildId,
    red_role: &str,
    blue_role: &str,
    timeout: Duration,
) -> DrainOutcome {
    tracing::info!(guild_id = %guild_id, timeout_secs = timeout.as_secs(), "Draining managed roles");

    let drain = async {
        in_flight.settle().await;
        drain_managed_roles(directory, guild_id, red_role, blue_role).await
    };

    let outcome = match tokio::time::timeout(timeout, drain).await {
        Ok(Ok(report)) => {
            tracing::info!(
                members_seen = report.members_seen,
                members_unchanged = report.members_unchanged,
                members_updated = report.members_updated,
                members_failed = report.members_failed,
                "Drain completed"
            );
            DrainOutcome::Completed(report)
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Drain failed");
            DrainOutcome::Failed(e)
        }
        Err(_) => {
            tracing::warn!(timeout_secs = timeout.as_secs(), "Drain timed out");
            DrainOutcome::TimedOut(timeout)
        }
    };

    directory.shutdown_now();
    outcome
}
