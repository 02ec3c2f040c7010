//! Directory roles and their display colors

use crate::ids::RoleId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 24-bit RGB display color of a role
///
/// Serialized as the packed integer the directory uses on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleColor(u32);

impl RoleColor {
    pub const RED: RoleColor = RoleColor(0xFF_00_00);
    pub const BLUE: RoleColor = RoleColor(0x00_00_FF);

    pub const fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self(((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }

    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for RoleColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:06X}", self.0)
    }
}

/// A resolved directory role
///
/// Two handles are the same role when their ids match; names are not unique
/// in the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    #[serde(default)]
    pub color: RoleColor,
}

impl Role {
    pub fn new(id: impl Into<RoleId>, name: impl Into<String>, color: RoleColor) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color,
        }
    }
}
