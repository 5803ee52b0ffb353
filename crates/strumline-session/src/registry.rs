//! Shared registry of verified players currently in a room.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// A process-wide set of names, injected into rooms.
///
/// Rooms insert a verified player's account name on join and remove it on
/// removal. Other services (the account service's rename flow, for one)
/// consult `contains` to learn whether the account is in a game.
pub trait PresenceRegistry: Send + Sync + 'static {
    fn insert(&self, name: &str);
    fn remove(&self, name: &str);
    fn contains(&self, name: &str) -> bool;
}

/// In-process [`PresenceRegistry`].
///
/// Counts entries, so an account seated in two rooms stays present until
/// it has left both.
#[derive(Debug, Default)]
pub struct InMemoryPresence {
    names: Mutex<HashMap<String, usize>>,
}

impl InMemoryPresence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of present names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl PresenceRegistry for InMemoryPresence {
    fn insert(&self, name: &str) {
        *self
            .names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_owned())
            .or_insert(0) += 1;
    }

    fn remove(&self, name: &str) {
        let mut names = self.names.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = names.get_mut(name) {
            *count -= 1;
            if *count == 0 {
                names.remove(name);
            }
        }
    }

    fn contains(&self, name: &str) -> bool {
        self.names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }
}
