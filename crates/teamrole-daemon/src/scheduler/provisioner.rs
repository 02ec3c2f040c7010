//! Role provisioning
//!
//! Makes sure each managed role exists, creating it with the team color when
//! the name lookup comes back empty. Creation is dispatched and never awaited;
//! a role still missing on the next tick is simply requested again.

use super::dispatch::Dispatcher;
use crate::directory::Guild;
use crate::error::DirectoryResult;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use teamrole_types::{Role, TeamBinding};

/// Result of provisioning one role name
#[derive(Debug, Clone)]
pub struct ProvisionedRoles {
    /// Every role currently carrying the name; empty while creation is pending
    pub roles: Arc<[Role]>,
    /// Whether this call dispatched a create-role request
    pub creation_requested: bool,
}

/// Ensures managed roles exist
pub struct RoleProvisioner {
    dispatcher: Dispatcher,
    pending: Arc<Mutex<HashSet<String>>>,
}

impl RoleProvisioner {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            pending: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Look up the binding's role by name, requesting creation if absent.
    ///
    /// Existing roles are never recolored and never duplicated. While a
    /// creation for the same name is still in flight no second request is
    /// made.
    pub async fn ensure(
        &self,
        guild: &Arc<dyn Guild>,
        binding: &TeamBinding,
    ) -> DirectoryResult<ProvisionedRoles> {
        let roles = guild.roles_by_name(&binding.role).await?;
        if !roles.is_empty() {
            return Ok(ProvisionedRoles {
                roles: roles.into(),
                creation_requested: false,
            });
        }

        if !self.pending.lock().insert(binding.role.clone()) {
            tracing::debug!(role = %binding.role, "Role creation already in flight");
            return Ok(ProvisionedRoles {
                roles: Arc::from(Vec::new()),
                creation_requested: false,
            });
        }

        tracing::info!(
            team = %binding.side,
            role = %binding.role,
            color = %binding.color,
            "Requesting missing role"
        );

        let guild = guild.clone();
        let name = binding.role.clone();
        let color = binding.color;
        let pending = self.pending.clone();
        self.dispatcher.dispatch("create_role", async move {
            let result = guild.create_role(&name, color).await.map(|_| ());
            pending.lock().remove(&name);
            result
        });

        Ok(ProvisionedRoles {
            roles: Arc::from(Vec::new()),
            creation_requested: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{Directory, DirectoryCall, InMemoryDirectory};
    use teamrole_types::{GuildId, RoleColor, TeamSide};

    async fn setup() -> (InMemoryDirectory, Arc<dyn Guild>) {
        let directory = InMemoryDirectory::new(GuildId::new("g"));
        let guild = directory.guild(&GuildId::new("g")).await.unwrap();
        (directory, guild)
    }

    #[tokio::test]
    async fn test_existing_role_is_returned_without_creation() {
        let (directory, guild) = setup().await;
        let existing = directory.guild_state().insert_role("Red", RoleColor::BLUE);
        let provisioner = RoleProvisioner::new(Dispatcher::new());

        let provisioned = provisioner
            .ensure(&guild, &TeamBinding::new(TeamSide::Red, "Red", "Red"))
            .await
            .unwrap();

        assert_eq!(provisioned.roles.to_vec(), vec![existing]);
        assert!(!provisioned.creation_requested);
        assert!(directory.guild_state().mutation_calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_role_is_created_with_team_color() {
        let (directory, guild) = setup().await;
        let dispatcher = Dispatcher::new();
        let provisioner = RoleProvisioner::new(dispatcher.clone());

        let provisioned = provisioner
            .ensure(&guild, &TeamBinding::new(TeamSide::Blue, "Blue", "Blue Team"))
            .await
            .unwrap();
        assert!(provisioned.roles.is_empty());
        assert!(provisioned.creation_requested);

        dispatcher.settle().await;
        assert_eq!(
            directory.guild_state().calls(),
            vec![DirectoryCall::CreateRole {
                name: "Blue Team".to_string(),
                color: RoleColor::BLUE,
            }]
        );
    }

    #[tokio::test]
    async fn test_back_to_back_calls_create_once() {
        let (directory, guild) = setup().await;
        let dispatcher = Dispatcher::new();
        let provisioner = RoleProvisioner::new(dispatcher.clone());
        let binding = TeamBinding::new(TeamSide::Red, "Red", "Red");

        // Second call runs before the first creation has executed
        provisioner.ensure(&guild, &binding).await.unwrap();
        let second = provisioner.ensure(&guild, &binding).await.unwrap();
        assert!(!second.creation_requested);

        dispatcher.settle().await;
        let third = provisioner.ensure(&guild, &binding).await.unwrap();
        assert_eq!(third.roles.len(), 1);

        dispatcher.settle().await;
        assert_eq!(directory.guild_state().mutation_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_role_deleted_externally_is_recreated() {
        let (directory, guild) = setup().await;
        let dispatcher = Dispatcher::new();
        let provisioner = RoleProvisioner::new(dispatcher.clone());
        let binding = TeamBinding::new(TeamSide::Red, "Red", "Red");
        let state = directory.guild_state();
        let role = state.insert_role("Red", RoleColor::RED);

        state.delete_role(&role.id);
        let provisioned = provisioner.ensure(&guild, &binding).await.unwrap();
        assert!(provisioned.creation_requested);

        dispatcher.settle().await;
        assert_eq!(state.roles().len(), 1);
    }
}
