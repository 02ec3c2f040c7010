//! Entry to member resolution
//!
//! Cache first: a nickname hit in the directory's member cache is handed to
//! the continuation immediately. On a miss a single-result prefix search is
//! spawned and the continuation runs when it completes. Exactly one of the two
//! paths runs per call.

use super::dispatch::Dispatcher;
use crate::directory::Guild;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use teamrole_types::Member;

/// How an entry was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Found in the member cache; the continuation already ran
    Cached(usize),
    /// A directory search was spawned
    Searching,
    /// A search for this entry from an earlier call is still running
    AlreadySearching,
}

/// Resolves roster entries to directory members
pub struct EntryResolver {
    dispatcher: Dispatcher,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

/// Clears an in-flight marker when the search task ends, however it ends
struct InFlightGuard {
    entry: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.entry);
    }
}

impl EntryResolver {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Resolve `entry` and hand the members to `on_resolved`.
    pub fn resolve<F>(&self, guild: &Arc<dyn Guild>, entry: &str, on_resolved: F) -> Resolution
    where
        F: FnOnce(Vec<Member>) + Send + 'static,
    {
        let cached = guild.members_by_nickname(entry);
        if !cached.is_empty() {
            let count = cached.len();
            on_resolved(cached);
            return Resolution::Cached(count);
        }

        if !self.in_flight.lock().insert(entry.to_string()) {
            tracing::trace!(entry, "Search already in flight");
            return Resolution::AlreadySearching;
        }

        let guard = InFlightGuard {
            entry: entry.to_string(),
            in_flight: self.in_flight.clone(),
        };
        let guild = guild.clone();
        self.dispatcher.spawn(async move {
            let entry = &guard.entry;
            match guild.search_members_by_prefix(entry, 1).await {
                Ok(members) => {
                    tracing::trace!(entry = %entry, found = members.len(), "Search completed");
                    on_resolved(members);
                }
                Err(e) => {
                    tracing::debug!(entry = %entry, error = %e, "Member search failed");
                }
            }
        });

        Resolution::Searching
    }
}
