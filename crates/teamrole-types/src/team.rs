//! The two mutually exclusive teams and their role bindings

use crate::role::RoleColor;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two managed teams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamSide {
    Red,
    Blue,
}

impl TeamSide {
    /// Processing order within a tick
    pub const ALL: [TeamSide; 2] = [TeamSide::Red, TeamSide::Blue];

    /// Color a role for this side is created with
    pub fn color(&self) -> RoleColor {
        match self {
            TeamSide::Red => RoleColor::RED,
            TeamSide::Blue => RoleColor::BLUE,
        }
    }
}

impl fmt::Display for TeamSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeamSide::Red => write!(f, "red"),
            TeamSide::Blue => write!(f, "blue"),
        }
    }
}

/// Maps a roster team to its directory role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamBinding {
    pub side: TeamSide,
    /// Team name in the roster
    pub team: String,
    /// Role name in the directory
    pub role: String,
    pub color: RoleColor,
}

impl TeamBinding {
    pub fn new(side: TeamSide, team: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            side,
            team: team.into(),
            role: role.into(),
            color: side.color(),
        }
    }
}
