//! # Cancellation registry.
//!
//! Concurrent map from [`TaskId`] to the task's cancellation control.
//!
//! ## Rules
//! - At most one live entry per id: `register` never overwrites
//! - Between `register(id, f)` and the matching `remove(id)`, `lookup(id)` returns `f`
//! - `remove` is idempotent
//! - The lock guards map operations only; controls are invoked outside of it
//!
//! One instance is shared by the runner (writer/deleter) and the subscriber
//! (reader/invoker) through an `Arc`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::cancel::{CancelRef, TaskId};
use crate::error::RegistryError;

/// Registry of live cancellation controls, keyed by task identity.
#[derive(Default)]
pub struct CancellationRegistry {
    entries: Mutex<HashMap<TaskId, CancelRef>>,
}

impl CancellationRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `control` under `id`.
    ///
    /// Fails with [`RegistryError::AlreadyRegistered`] if `id` has a live entry.
    pub fn register(&self, id: TaskId, control: CancelRef) -> Result<(), RegistryError> {
        let mut entries = self.lock();
        if entries.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered(id));
        }
        debug!(task = %id, "registered cancellation control");
        entries.insert(id, control);
        Ok(())
    }

    /// Returns the control registered under `id`.
    ///
    /// Fails with [`RegistryError::NotFound`] if absent.
    pub fn lookup(&self, id: &TaskId) -> Result<CancelRef, RegistryError> {
        self.lock()
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    /// Removes the entry for `id`. Returns whether an entry was present.
    pub fn remove(&self, id: &TaskId) -> bool {
        let removed = self.lock().remove(id).is_some();
        if removed {
            debug!(task = %id, "removed cancellation control");
        }
        removed
    }

    /// True if `id` has a live entry.
    pub fn contains(&self, id: &TaskId) -> bool {
        self.lock().contains_key(id)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True if there are no live entries.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns the sorted list of registered ids.
    pub fn ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.lock().keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Drains the registry and invokes every control. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<(TaskId, CancelRef)> = self.lock().drain().collect();
        for (_, control) in &drained {
            control.cancel();
        }
        drained.len()
    }

    /// Entries stay consistent across a panicking holder: every critical
    /// section is a single map operation.
    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, CancelRef>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::{Cancel, CancelFn};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn counting() -> (Arc<AtomicUsize>, CancelRef) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let control: CancelRef = CancelFn::arc(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        (hits, control)
    }

    #[test]
    fn test_register_then_lookup_returns_same_control() {
        let reg = CancellationRegistry::new();
        let (_, f) = counting();
        reg.register(TaskId::from(1u64), f.clone()).unwrap();

        let found = reg.lookup(&TaskId::from(1u64)).unwrap();
        assert!(Arc::ptr_eq(&found, &f));
    }

    #[test]
    fn test_second_register_is_rejected_and_keeps_first() {
        let reg = CancellationRegistry::new();
        let (_, f) = counting();
        let (_, g) = counting();
        let id = TaskId::from("job-a");

        reg.register(id.clone(), f.clone()).unwrap();
        assert_eq!(
            reg.register(id.clone(), g),
            Err(RegistryError::AlreadyRegistered(id.clone()))
        );
        assert!(Arc::ptr_eq(&reg.lookup(&id).unwrap(), &f));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let reg = CancellationRegistry::new();
        let (_, f) = counting();
        let id = TaskId::from(3u64);
        reg.register(id.clone(), f).unwrap();

        assert!(reg.remove(&id));
        assert!(!reg.remove(&id));
        assert!(matches!(reg.lookup(&id), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn test_register_after_remove_is_allowed() {
        let reg = CancellationRegistry::new();
        let (_, f) = counting();
        let (_, g) = counting();
        let id = TaskId::from(9u64);

        reg.register(id.clone(), f).unwrap();
        reg.remove(&id);
        reg.register(id.clone(), g.clone()).unwrap();
        assert!(Arc::ptr_eq(&reg.lookup(&id).unwrap(), &g));
    }

    #[test]
    fn test_cancel_all_drains_and_cancels() {
        let reg = CancellationRegistry::new();
        let token = CancellationToken::new();
        let (hits, f) = counting();
        reg.register(TaskId::from(1u64), Arc::new(token.clone())).unwrap();
        reg.register(TaskId::from(2u64), f).unwrap();

        assert_eq!(reg.cancel_all(), 2);
        assert!(reg.is_empty());
        assert!(token.is_cancelled());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ids_are_sorted() {
        let reg = CancellationRegistry::new();
        for id in ["c", "a", "b"] {
            let (_, f) = counting();
            reg.register(TaskId::from(id), f).unwrap();
        }
        let ids: Vec<String> = reg.ids().iter().map(|id| id.to_string()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn test_concurrent_registration_admits_exactly_one() {
        let reg = Arc::new(CancellationRegistry::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let reg = reg.clone();
                std::thread::spawn(move || {
                    let control: CancelRef = CancelFn::arc(|| {});
                    reg.register(TaskId::from(42u64), control).is_ok()
                })
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 1);
    }

    #[test]
    fn test_control_is_idempotent_through_token() {
        let token = CancellationToken::new();
        let control: CancelRef = Arc::new(token.clone());
        control.cancel();
        control.cancel();
        assert!(token.is_cancelled());
    }
}
