//! teamrole Types - Core types for roster/directory role synchronization
//!
//! teamrole keeps two independently maintained group systems converged: a
//! local roster of two teams and a remote directory (a Discord guild) where
//! team membership is expressed as roles.
//!
//! ## Key Concepts
//!
//! - **TeamSide**: One of the two mutually exclusive teams (red or blue)
//! - **TeamBinding**: Which roster team maps to which directory role, and its color
//! - **Role**: A directory role handle (id, name, color)
//! - **Member**: A directory participant with a point-in-time role snapshot

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod ids;
pub mod member;
pub mod role;
pub mod team;

pub use ids::{GuildId, MemberId, RoleId};
pub use member::Member;
pub use role::{Role, RoleColor};
pub use team::{TeamBinding, TeamSide};
