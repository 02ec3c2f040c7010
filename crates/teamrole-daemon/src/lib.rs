//! teamrole daemon library
//!
//! Keeps two roster teams mirrored onto two directory roles:
//! - Directory facade with Discord REST and in-memory backends
//! - File and static roster sources
//! - Scheduler driving the reconciliation engine
//! - Bounded shutdown drain
//! - Status API

pub mod api;
pub mod config;
pub mod directory;
pub mod drain;
pub mod error;
pub mod roster;
pub mod scheduler;
pub mod server;

pub use config::{DaemonConfig, OverlapPolicy};
pub use directory::{Directory, Guild, InMemoryDirectory};
pub use drain::{drain_and_disconnect, drain_managed_roles, DrainOutcome, DrainReport};
pub use error::{ApiError, DaemonError, DirectoryError, RosterError};
pub use roster::{Roster, StaticRoster};
pub use scheduler::{Reconciler, Scheduler, TickSummary};
pub use server::Server;
