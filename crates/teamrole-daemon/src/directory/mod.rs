//! Directory client facade
//!
//! The reconciliation engine only needs the capability surface described by
//! [`Directory`] and [`Guild`]. Two backends implement it: the Discord REST
//! client used in production and an in-memory directory for development and
//! tests.

mod discord;
mod memory;

pub use discord::{DiscordDirectory, DiscordGuild};
pub use memory::{DirectoryCall, InMemoryDirectory, InMemoryGuild};

use crate::config::DirectoryConfig;
use crate::error::{DaemonError, DaemonResult, DirectoryResult};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use teamrole_types::{GuildId, Member, MemberId, Role, RoleColor, RoleId};

/// A connection to the directory service
#[async_trait]
pub trait Directory: Send + Sync {
    /// Resolve a guild handle. `None` means the guild is not reachable right now.
    async fn guild(&self, id: &GuildId) -> Option<Arc<dyn Guild>>;

    /// Terminate the connection immediately. Later calls fail with
    /// [`DirectoryError::Unavailable`](crate::error::DirectoryError::Unavailable).
    fn shutdown_now(&self);
}

/// Role and member primitives scoped to one guild
#[async_trait]
pub trait Guild: Send + Sync {
    fn id(&self) -> &GuildId;

    /// All roles whose name matches exactly (case-sensitive)
    async fn roles_by_name(&self, name: &str) -> DirectoryResult<Vec<Role>>;

    /// Create a role with the given name and color
    async fn create_role(&self, name: &str, color: RoleColor) -> DirectoryResult<Role>;

    /// Cache-only lookup of members whose nickname matches, ignoring case
    fn members_by_nickname(&self, name: &str) -> Vec<Member>;

    /// Network search for members whose name starts with `prefix`
    async fn search_members_by_prefix(
        &self,
        prefix: &str,
        limit: usize,
    ) -> DirectoryResult<Vec<Member>>;

    /// Grant a role to a member
    async fn add_role(&self, member: &MemberId, role: &RoleId) -> DirectoryResult<()>;

    /// Revoke a role from a member
    async fn remove_role(&self, member: &MemberId, role: &RoleId) -> DirectoryResult<()>;

    /// Enumerate every member of the guild
    async fn load_members(&self) -> DirectoryResult<Vec<Member>>;

    /// Replace a member's full role set
    async fn set_member_roles(
        &self,
        member: &MemberId,
        roles: &BTreeSet<RoleId>,
    ) -> DirectoryResult<()>;
}

/// Establish the directory connection described by the configuration.
///
/// A failure here is fatal: the daemon never starts reconciling.
pub async fn connect(config: &DirectoryConfig, guild_id: &GuildId) -> DaemonResult<Arc<dyn Directory>> {
    match config {
        DirectoryConfig::Discord {
            token,
            api_base,
            request_timeout_secs,
            member_refresh_secs,
        } => {
            let directory = DiscordDirectory::connect(
                api_base,
                token,
                Duration::from_secs(*request_timeout_secs),
            )
            .await
            .map_err(DaemonError::Connection)?
            .with_member_refresh(Duration::from_secs(*member_refresh_secs));
            Ok(Arc::new(directory))
        }
        DirectoryConfig::Memory => {
            tracing::warn!("Using in-memory directory; no external roles will be managed");
            Ok(Arc::new(InMemoryDirectory::new(guild_id.clone())))
        }
    }
}
