//! State manager for thread-safe state access.
//!
//! The [`StateManager`] wraps [`OrganState`] in a single mutex. Every router
//! and registry operation runs inside one `with_state_mut` call, so a stop
//! toggle and a key event are never interleaved mid-computation.

use std::sync::Arc;

use parking_lot::Mutex;

use super::model::OrganState;

/// Thread-safe handle to the organ state.
#[derive(Clone, Default)]
pub struct StateManager {
    state: Arc<Mutex<OrganState>>,
}

impl StateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the state with a closure.
    pub fn with_state<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&OrganState) -> R,
    {
        let state = self.state.lock();
        f(&state)
    }

    /// Mutate the state with a closure.
    ///
    /// The lock is held for the duration of the closure.
    pub fn with_state_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut OrganState) -> R,
    {
        let mut state = self.state.lock();
        f(&mut state)
    }

    /// Get a clone of the current state.
    pub fn snapshot(&self) -> OrganState {
        self.with_state(|s| s.clone())
    }

    pub fn version(&self) -> u64 {
        self.with_state(|s| s.version)
    }
}

impl std::fmt::Debug for StateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateManager")
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Division;

    #[test]
    fn test_state_manager_write() {
        let manager = StateManager::new();
        manager.with_state_mut(|s| {
            s.keys.press(Division::Great, 60);
            s.bump_version();
        });
        assert_eq!(manager.version(), 1);
        assert!(manager.with_state(|s| s.keys.is_held(Division::Great, 60)));
    }

    #[test]
    fn test_snapshot_is_detached() {
        let manager = StateManager::new();
        let snapshot = manager.snapshot();
        manager.with_state_mut(|s| {
            s.keys.press(Division::Pedal, 36);
        });
        assert!(snapshot.keys.is_empty());
        assert_eq!(manager.with_state(|s| s.keys.len()), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let manager = StateManager::new();
        let other = manager.clone();
        let handle = std::thread::spawn(move || {
            for note in 0..100u8 {
                other.with_state_mut(|s| {
                    s.keys.press(Division::Swell, note);
                });
            }
        });
        handle.join().unwrap();
        assert_eq!(manager.with_state(|s| s.keys.len()), 100);
    }
}
