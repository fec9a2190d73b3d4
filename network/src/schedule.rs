//! Deadline table evaluated once per tick.
//!
//! Each timer key has at most one pending deadline. [`Schedule::take_due`]
//! removes and returns every key whose deadline has passed, in deadline
//! order, so a single loop can drive all periodic work.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug)]
pub struct Schedule<K> {
    due: HashMap<K, u64>,
}

impl<K: Copy + Eq + Hash + Ord> Schedule<K> {
    pub fn new() -> Self {
        Self {
            due: HashMap::new(),
        }
    }

    /// Set (or move) the deadline of `key` to `at_ms`.
    pub fn set(&mut self, key: K, at_ms: u64) {
        self.due.insert(key, at_ms);
    }

    pub fn is_pending(&self, key: K) -> bool {
        self.due.contains_key(&key)
    }

    pub fn deadline(&self, key: K) -> Option<u64> {
        self.due.get(&key).copied()
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<u64> {
        self.due.values().min().copied()
    }

    pub fn take_due(&mut self, now_ms: u64) -> Vec<K> {
        let mut fired: Vec<(u64, K)> = self
            .due
            .iter()
            .filter(|(_, at)| **at <= now_ms)
            .map(|(&k, &at)| (at, k))
            .collect();
        fired.sort();
        for (_, k) in &fired {
            self.due.remove(k);
        }
        fired.into_iter().map(|(_, k)| k).collect()
    }

    pub fn clear(&mut self) {
        self.due.clear();
    }
}

impl<K: Copy + Eq + Hash + Ord> Default for Schedule<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
    enum T {
        A,
        B,
        C,
    }

    #[test]
    fn fires_in_deadline_order() {
        let mut s = Schedule::new();
        s.set(T::A, 30);
        s.set(T::B, 10);
        s.set(T::C, 50);
        assert_eq!(s.take_due(40), vec![T::B, T::A]);
        assert_eq!(s.next_deadline(), Some(50));
        assert!(s.take_due(40).is_empty());
    }

    #[test]
    fn set_moves_the_deadline() {
        let mut s = Schedule::new();
        s.set(T::A, 30);
        assert_eq!(s.deadline(T::A), Some(30));
        s.set(T::A, 5);
        assert_eq!(s.take_due(5), vec![T::A]);
        assert!(!s.is_pending(T::A));
    }
}
