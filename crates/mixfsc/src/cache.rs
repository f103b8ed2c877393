use std::collections::HashMap;
use std::time::{Duration, Instant};

/// The last read of one file.
#[derive(Debug, Clone)]
struct CachedRead {
    offset: u64,
    length: u64,
    content: Vec<u8>,
    mtime: u64,
    validated_at: Instant,
}

/// What the cache can do for a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Served without asking the server.
    Fresh(Vec<u8>),
    /// The range is cached but old; valid if the file's mtime still equals
    /// the one given.
    Stale {
        /// Modification time the cached bytes were read at.
        mtime: u64,
    },
    /// Nothing usable is cached.
    Miss,
}

/// Per-path cache of the most recent read.
///
/// A read is answered from the cache when its range lies inside the cached
/// one. Entries younger than the freshness interval are used as is; older
/// ones must be revalidated against the file's modification time.
#[derive(Debug)]
pub struct ReadCache {
    interval: Duration,
    entries: HashMap<String, CachedRead>,
}

impl ReadCache {
    /// Creates an empty cache with the given freshness interval.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            entries: HashMap::new(),
        }
    }

    /// Looks up `length` bytes at `offset` of `path`.
    #[must_use]
    pub fn lookup(&self, path: &str, offset: u64, length: u64, now: Instant) -> Lookup {
        let Some(entry) = self.entries.get(path) else {
            return Lookup::Miss;
        };
        let covers = entry.offset <= offset
            && entry.offset.saturating_add(entry.length) >= offset.saturating_add(length);
        if !covers {
            return Lookup::Miss;
        }
        if now.saturating_duration_since(entry.validated_at) < self.interval {
            Lookup::Fresh(slice(entry, offset, length))
        } else {
            Lookup::Stale { mtime: entry.mtime }
        }
    }

    /// Marks the entry for `path` as just validated and returns the
    /// requested range from it.
    pub fn revalidate(&mut self, path: &str, offset: u64, length: u64, now: Instant) -> Option<Vec<u8>> {
        let entry = self.entries.get_mut(path)?;
        entry.validated_at = now;
        Some(slice(entry, offset, length))
    }

    /// Records a read the server answered.
    pub fn store(&mut self, path: &str, offset: u64, length: u64, content: Vec<u8>, mtime: u64, now: Instant) {
        self.entries.insert(
            path.to_owned(),
            CachedRead {
                offset,
                length,
                content,
                mtime,
                validated_at: now,
            },
        );
    }

    /// Drops the entry for `path`.
    pub fn invalidate(&mut self, path: &str) {
        self.entries.remove(path);
    }
}

fn slice(entry: &CachedRead, offset: u64, length: u64) -> Vec<u8> {
    let len = entry.content.len();
    let start = usize::try_from(offset.saturating_sub(entry.offset)).map_or(len, |s| s.min(len));
    let end = usize::try_from(length).map_or(len, |l| start.saturating_add(l).min(len));
    entry.content[start..end].to_vec()
}
