use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Notify;

/// Outstanding reliable pushes keyed by push msg id.
///
/// Each entry is a one-shot signal: an incoming `ack` fulfils it and the
/// push's retry loop stops. Acks for unknown ids are ignored.
#[derive(Debug, Default)]
pub struct AckRegistry {
    pending: RwLock<HashMap<u64, Arc<Notify>>>,
}

impl AckRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `push_id` and returns the signal its ack will fire.
    ///
    /// Returns `None` if the id is already outstanding.
    #[must_use]
    pub fn register(&self, push_id: u64) -> Option<Arc<Notify>> {
        let mut pending = self.pending.write().unwrap_or_else(PoisonError::into_inner);
        if pending.contains_key(&push_id) {
            return None;
        }
        let signal = Arc::new(Notify::new());
        pending.insert(push_id, Arc::clone(&signal));
        Some(signal)
    }

    /// Fires the signal for `push_id`. Returns `false` if no push with that
    /// id is outstanding.
    pub fn fulfill(&self, push_id: u64) -> bool {
        let pending = self.pending.read().unwrap_or_else(PoisonError::into_inner);
        match pending.get(&push_id) {
            Some(signal) => {
                // Stores a permit if the retry loop is not currently waiting.
                signal.notify_one();
                true
            }
            None => false,
        }
    }

    /// Drops the entry for `push_id`.
    pub fn remove(&self, push_id: u64) {
        self.pending
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&push_id);
    }

    /// Number of outstanding pushes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if no push is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
