use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone)]
enum Slot {
    InFlight,
    Done(Vec<u8>),
}

/// Result of [`DedupCache::claim`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// First sighting of the id; the caller must execute and then
    /// [`DedupCache::insert`] the reply.
    Fresh,
    /// A copy of the id is still executing. The duplicate is dropped and the
    /// client's next retry is answered from the cache.
    InFlight,
    /// The reply sent for the earlier copy.
    Replay(Vec<u8>),
}

/// Encoded replies keyed by request msg id.
///
/// Every reply the server sends is stored here before it goes out, so a
/// repeated request can be answered with byte-identical output instead of
/// running the operation again. Capacity is bounded; the least recently
/// used reply is evicted first.
#[derive(Debug)]
pub struct DedupCache {
    replies: Mutex<LruCache<u64, Slot>>,
}

impl DedupCache {
    /// Creates a cache holding at most `capacity` replies (minimum one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            replies: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<u64, Slot>> {
        self.replies.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the reply previously sent for `msg_id`.
    #[must_use]
    pub fn get(&self, msg_id: u64) -> Option<Vec<u8>> {
        match self.lock().get(&msg_id) {
            Some(Slot::Done(reply)) => Some(reply.clone()),
            _ => None,
        }
    }

    /// Looks up `msg_id` and, if it is new, marks it as executing.
    ///
    /// Lookup and marking happen under one lock, so two concurrent copies of
    /// the same request cannot both come back [`Claim::Fresh`].
    pub fn claim(&self, msg_id: u64) -> Claim {
        let mut replies = self.lock();
        match replies.get(&msg_id) {
            Some(Slot::Done(reply)) => Claim::Replay(reply.clone()),
            Some(Slot::InFlight) => Claim::InFlight,
            None => {
                replies.put(msg_id, Slot::InFlight);
                Claim::Fresh
            }
        }
    }

    /// Records the reply sent for `msg_id`, replacing any earlier one.
    pub fn insert(&self, msg_id: u64, reply: Vec<u8>) {
        self.lock().put(msg_id, Slot::Done(reply));
    }

    /// Number of cached entries, executing ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_on_missing_id_returns_none() {
        let cache = DedupCache::new(4);
        assert!(cache.get(1).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn insert_then_get_returns_same_bytes() {
        let cache = DedupCache::new(4);
        cache.insert(7, b"7,\"ok\"".to_vec());
        assert_eq!(cache.get(7).unwrap(), b"7,\"ok\"");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn later_reply_replaces_earlier() {
        let cache = DedupCache::new(4);
        cache.insert(7, b"first".to_vec());
        cache.insert(7, b"second".to_vec());
        assert_eq!(cache.get(7).unwrap(), b"second");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn claim_moves_from_fresh_to_in_flight_to_replay() {
        let cache = DedupCache::new(4);
        assert_eq!(cache.claim(5), Claim::Fresh);
        assert_eq!(cache.claim(5), Claim::InFlight);
        assert!(cache.get(5).is_none());
        cache.insert(5, b"5,\"ok\"".to_vec());
        assert_eq!(cache.claim(5), Claim::Replay(b"5,\"ok\"".to_vec()));
    }

    #[test]
    fn least_recently_used_reply_is_evicted() {
        let cache = DedupCache::new(2);
        cache.insert(1, b"a".to_vec());
        cache.insert(2, b"b".to_vec());
        let _ = cache.get(1);
        cache.insert(3, b"c".to_vec());
        assert!(cache.get(2).is_none());
        assert!(cache.get(1).is_some());
        assert!(cache.get(3).is_some());
    }

    #[test]
    fn zero_capacity_still_holds_one_reply() {
        let cache = DedupCache::new(0);
        cache.insert(1, b"a".to_vec());
        assert_eq!(cache.len(), 1);
    }
}
