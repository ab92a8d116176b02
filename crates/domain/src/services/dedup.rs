use std::collections::HashSet;

/// Bounded memory of transaction hashes a session already acted upon.
///
/// Once the set grows past `capacity` it is cleared wholesale rather than
/// evicted entry by entry. A hash seen before a reset can therefore be
/// reported again; memory stays bounded regardless of session length.
#[derive(Debug, Clone)]
pub struct DedupWindow {
    capacity: usize,
    seen: HashSet<String>,
    resets: u64,
}

impl DedupWindow {
    pub const DEFAULT_CAPACITY: usize = 1000;

    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            seen: HashSet::with_capacity(capacity.min(4096)),
            resets: 0,
        }
    }

    pub fn seen(&self, hash: &str) -> bool {
        self.seen.contains(&hash.to_ascii_lowercase())
    }

    /// Records `hash`. When this pushes the window over capacity the window
    /// restarts holding only `hash`.
    pub fn mark(&mut self, hash: &str) {
        let key = hash.to_ascii_lowercase();
        self.seen.insert(key.clone());
        if self.seen.len() > self.capacity {
            self.seen.clear();
            self.seen.insert(key);
            self.resets += 1;
        }
    }

    /// Returns `true` and marks the hash when it was not seen yet.
    pub fn check_and_mark(&mut self, hash: &str) -> bool {
        if self.seen(hash) {
            return false;
        }
        self.mark(hash);
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn resets(&self) -> u64 {
        self.resets
    }
}

impl Default for DedupWindow {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
