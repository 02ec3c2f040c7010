//! Directory members

use crate::ids::{MemberId, RoleId};
use crate::role::Role;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A resolved directory member
///
/// `roles` is a point-in-time snapshot taken when the handle was fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub username: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub roles: BTreeSet<RoleId>,
}

impl Member {
    pub fn new(id: impl Into<MemberId>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            nickname: None,
            roles: BTreeSet::new(),
        }
    }

    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<RoleId>) -> Self {
        self.roles.insert(role.into());
        self
    }

    /// Nickname if set, otherwise the username
    pub fn display_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or(&self.username)
    }

    /// Case-insensitive nickname match. Members without a nickname never match.
    pub fn nickname_matches(&self, name: &str) -> bool {
        self.nickname
            .as_deref()
            .is_some_and(|nick| nick.to_lowercase() == name.to_lowercase())
    }

    pub fn has_role(&self, role: &RoleId) -> bool {
        self.roles.contains(role)
    }

    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.iter().any(|r| self.roles.contains(&r.id))
    }

    /// Current roles minus every role in `strip`
    pub fn roles_without(&self, strip: &[Role]) -> BTreeSet<RoleId> {
        self.roles
            .iter()
            .filter(|id| !strip.iter().any(|r| &r.id == *id))
            .cloned()
            .collect()
    }
}
