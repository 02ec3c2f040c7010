//! Strongly-typed identifiers for directory entities
//!
//! Directory ids are opaque snowflake strings. They are wrapped in newtype
//! structs so a role id can never be passed where a member id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

snowflake_id!(
    /// Identifier of a guild (the directory scope all roles and members live in)
    GuildId,
    "guild"
);

snowflake_id!(
    /// Identifier of a directory role
    RoleId,
    "role"
);

snowflake_id!(
    /// Identifier of a directory member (the user id of the member)
    MemberId,
    "member"
);
