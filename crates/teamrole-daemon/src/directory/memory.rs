//! In-memory directory implementation

use super::{Directory, Guild};
use crate::error::{DirectoryError, DirectoryResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use teamrole_types::{GuildId, Member, MemberId, Role, RoleColor, RoleId};

/// A call received by the in-memory guild, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryCall {
    CreateRole { name: String, color: RoleColor },
    SearchMembers { query: String, limit: usize },
    AddRole { member: MemberId, role: RoleId },
    RemoveRole { member: MemberId, role: RoleId },
    LoadMembers,
    SetMemberRoles { member: MemberId, roles: BTreeSet<RoleId> },
}

impl DirectoryCall {
    /// Whether the call changes directory state
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            DirectoryCall::CreateRole { .. }
                | DirectoryCall::AddRole { .. }
                | DirectoryCall::RemoveRole { .. }
                | DirectoryCall::SetMemberRoles { .. }
        )
    }
}

/// In-memory directory for development and testing
///
/// Holds a single guild. Mutations take effect as soon as the returned future
/// runs, and every call is recorded.
pub struct InMemoryDirectory {
    guild: Arc<InMemoryGuild>,
    guild_available: AtomicBool,
}

impl InMemoryDirectory {
    pub fn new(guild_id: GuildId) -> Self {
        Self {
            guild: Arc::new(InMemoryGuild::new(guild_id)),
            guild_available: AtomicBool::new(true),
        }
    }

    /// Direct access to the guild state
    pub fn guild_state(&self) -> Arc<InMemoryGuild> {
        self.guild.clone()
    }

    /// Make the guild unresolvable, as if it were temporarily unavailable
    pub fn set_guild_available(&self, available: bool) {
        self.guild_available.store(available, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.guild.connected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn guild(&self, id: &GuildId) -> Option<Arc<dyn Guild>> {
        if !self.is_connected() || !self.guild_available.load(Ordering::SeqCst) {
            return None;
        }
        if id != &self.guild.id {
            return None;
        }
        Some(self.guild.clone())
    }

    fn shutdown_now(&self) {
        self.guild.connected.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct GuildState {
    roles: Vec<Role>,
    members: BTreeMap<MemberId, Member>,
    cached: BTreeSet<MemberId>,
    calls: Vec<DirectoryCall>,
    failing_members: BTreeSet<MemberId>,
    fail_load: bool,
    load_delay: Option<Duration>,
    search_delay: Option<Duration>,
}

/// Guild state of an [`InMemoryDirectory`]
pub struct InMemoryGuild {
    id: GuildId,
    state: Mutex<GuildState>,
    next_id: AtomicU64,
    connected: AtomicBool,
}

impl InMemoryGuild {
    fn new(id: GuildId) -> Self {
        Self {
            id,
            state: Mutex::new(GuildState::default()),
            next_id: AtomicU64::new(1),
            connected: AtomicBool::new(true),
        }
    }

    fn allocate_id(&self, kind: &str) -> String {
        format!("{}-{}", kind, self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn ensure_connected(&self) -> DirectoryResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DirectoryError::Unavailable("connection shut down".to_string()))
        }
    }

    fn record(&self, call: DirectoryCall) {
        self.state.lock().calls.push(call);
    }

    /// Add a role directly, bypassing the call log
    pub fn insert_role(&self, name: &str, color: RoleColor) -> Role {
        let role = Role::new(self.allocate_id("role"), name, color);
        self.state.lock().roles.push(role.clone());
        role
    }

    /// Delete a role and strip it from every member
    pub fn delete_role(&self, id: &RoleId) {
        let mut state = self.state.lock();
        state.roles.retain(|r| &r.id != id);
        for member in state.members.values_mut() {
            member.roles.remove(id);
        }
    }

    /// Add a member. Cached members are visible to nickname lookups.
    pub fn insert_member(&self, member: Member, cached: bool) {
        let mut state = self.state.lock();
        if cached {
            state.cached.insert(member.id.clone());
        }
        state.members.insert(member.id.clone(), member);
    }

    pub fn member(&self, id: &MemberId) -> Option<Member> {
        self.state.lock().members.get(id).cloned()
    }

    pub fn roles(&self) -> Vec<Role> {
        self.state.lock().roles.clone()
    }

    pub fn is_cached(&self, id: &MemberId) -> bool {
        self.state.lock().cached.contains(id)
    }

    pub fn calls(&self) -> Vec<DirectoryCall> {
        self.state.lock().calls.clone()
    }

    pub fn mutation_calls(&self) -> Vec<DirectoryCall> {
        self.calls().into_iter().filter(|c| c.is_mutation()).collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Make `set_member_roles` fail for this member
    pub fn fail_member_updates(&self, id: &MemberId) {
        self.state.lock().failing_members.insert(id.clone());
    }

    /// Make `load_members` fail
    pub fn fail_member_load(&self) {
        self.state.lock().fail_load = true;
    }

    /// Delay `load_members` by the given duration
    pub fn delay_member_load(&self, delay: Duration) {
        self.state.lock().load_delay = Some(delay);
    }

    /// Delay `search_members_by_prefix` by the given duration
    pub fn delay_searches(&self, delay: Duration) {
        self.state.lock().search_delay = Some(delay);
    }
}

#[async_trait]
impl Guild for InMemoryGuild {
    fn id(&self) -> &GuildId {
        &self.id
    }

    async fn roles_by_name(&self, name: &str) -> DirectoryResult<Vec<Role>> {
        self.ensure_connected()?;
        let state = self.state.lock();
        Ok(state.roles.iter().filter(|r| r.name == name).cloned().collect())
    }

    async fn create_role(&self, name: &str, color: RoleColor) -> DirectoryResult<Role> {
        self.ensure_connected()?;
        self.record(DirectoryCall::CreateRole {
            name: name.to_string(),
            color,
        });
        Ok(self.insert_role(name, color))
    }

    fn members_by_nickname(&self, name: &str) -> Vec<Member> {
        let state = self.state.lock();
        state
            .cached
            .iter()
            .filter_map(|id| state.members.get(id))
            .filter(|m| m.nickname_matches(name))
            .cloned()
            .collect()
    }

    async fn search_members_by_prefix(
        &self,
        prefix: &str,
        limit: usize,
    ) -> DirectoryResult<Vec<Member>> {
        self.ensure_connected()?;
        self.record(DirectoryCall::SearchMembers {
            query: prefix.to_string(),
            limit,
        });

        let delay = self.state.lock().search_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let prefix = prefix.to_lowercase();
        let mut state = self.state.lock();
        let found: Vec<Member> = state
            .members
            .values()
            .filter(|m| {
                m.username.to_lowercase().starts_with(&prefix)
                    || m.nickname
                        .as_deref()
                        .is_some_and(|n| n.to_lowercase().starts_with(&prefix))
            })
            .take(limit)
            .cloned()
            .collect();

        for member in &found {
            state.cached.insert(member.id.clone());
        }
        Ok(found)
    }

    async fn add_role(&self, member: &MemberId, role: &RoleId) -> DirectoryResult<()> {
        self.ensure_connected()?;
        self.record(DirectoryCall::AddRole {
            member: member.clone(),
            role: role.clone(),
        });

        let mut state = self.state.lock();
        if !state.roles.iter().any(|r| &r.id == role) {
            return Err(DirectoryError::NotFound(role.to_string()));
        }
        let target = state
            .members
            .get_mut(member)
            .ok_or_else(|| DirectoryError::NotFound(member.to_string()))?;
        target.roles.insert(role.clone());
        Ok(())
    }

    async fn remove_role(&self, member: &MemberId, role: &RoleId) -> DirectoryResult<()> {
        self.ensure_connected()?;
        self.record(DirectoryCall::RemoveRole {
            member: member.clone(),
            role: role.clone(),
        });

        let mut state = self.state.lock();
        let target = state
            .members
            .get_mut(member)
            .ok_or_else(|| DirectoryError::NotFound(member.to_string()))?;
        target.roles.remove(role);
        Ok(())
    }

    async fn load_members(&self) -> DirectoryResult<Vec<Member>> {
        self.ensure_connected()?;
        self.record(DirectoryCall::LoadMembers);

        let (delay, fail) = {
            let state = self.state.lock();
            (state.load_delay, state.fail_load)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(DirectoryError::Api {
                status: 500,
                message: "member enumeration failed".to_string(),
            });
        }

        let mut state = self.state.lock();
        let members: Vec<Member> = state.members.values().cloned().collect();
        let ids: Vec<MemberId> = state.members.keys().cloned().collect();
        state.cached.extend(ids);
        Ok(members)
    }

    async fn set_member_roles(
        &self,
        member: &MemberId,
        roles: &BTreeSet<RoleId>,
    ) -> DirectoryResult<()> {
        self.ensure_connected()?;
        self.record(DirectoryCall::SetMemberRoles {
            member: member.clone(),
            roles: roles.clone(),
        });

        let mut state = self.state.lock();
        if state.failing_members.contains(member) {
            return Err(DirectoryError::Api {
                status: 403,
                message: "Missing Permissions".to_string(),
            });
        }
        let target = state
            .members
            .get_mut(member)
            .ok_or_else(|| DirectoryError::NotFound(member.to_string()))?;
        target.roles = roles.clone();
        Ok(())
    }
}
