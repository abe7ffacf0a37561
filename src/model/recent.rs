//! Bounded most-recently-accessed list of search ids

use std::collections::VecDeque;

use super::SearchId;

/// Default number of search ids kept
pub const DEFAULT_RECENT_CAPACITY: usize = 20;

/// Most-recent-first list of search ids, bounded by `capacity` on insertion
#[derive(Debug, Clone)]
pub struct RecentSearches {
    capacity: usize,
    ids: VecDeque<SearchId>,
}

impl RecentSearches {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ids: VecDeque::with_capacity(capacity + 1),
        }
    }

    /// Move `id` to the front. An id already present is moved without a
    /// capacity check; a new id evicts the oldest entry when over capacity.
    pub fn touch(&mut self, id: SearchId) {
        if let Some(index) = self.ids.iter().position(|&existing| existing == id) {
            self.ids.remove(index);
            self.ids.push_front(id);
            return;
        }

        self.ids.push_front(id);
        if self.ids.len() > self.capacity {
            self.ids.pop_back();
        }
    }

    /// The first `n` ids, most recent first
    pub fn current(&self, n: usize) -> Vec<SearchId> {
        self.ids.iter().take(n).copied().collect()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for RecentSearches {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest_over_capacity() {
        let mut recent = RecentSearches::new(3);
        for id in 1..=4 {
            recent.touch(id);
        }
        assert_eq!(recent.len(), 3);
        assert_eq!(recent.current(10), vec![4, 3, 2]);
    }

    #[test]
    fn test_touch_existing_moves_to_front() {
        let mut recent = RecentSearches::new(3);
        recent.touch(1);
        recent.touch(2);
        recent.touch(3);
        recent.touch(1);
        assert_eq!(recent.current(10), vec![1, 3, 2]);
    }

    #[test]
    fn test_default_capacity() {
        let mut recent = RecentSearches::default();
        for id in 0..=DEFAULT_RECENT_CAPACITY as u64 {
            recent.touch(id);
        }
        assert_eq!(recent.len(), DEFAULT_RECENT_CAPACITY);
        assert_eq!(recent.current(1), vec![DEFAULT_RECENT_CAPACITY as u64]);
        assert!(!recent.current(DEFAULT_RECENT_CAPACITY).contains(&0));
    }
}
