//! Recency tracking for the link cache

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// Least-recently-used order over a set of keys
///
/// Touching a key pushes a new queue entry instead of moving the old one;
/// stale entries are recognised by their generation and skipped on pop.
pub struct LruTracker<K: Clone + Eq + Hash> {
    /// Access order (front = oldest), tagged with the generation at push
    order: VecDeque<(K, u64)>,
    /// Latest generation per live key
    generations: HashMap<K, u64>,
    generation: u64,
}

impl<K: Clone + Eq + Hash> LruTracker<K> {
    pub fn new() -> Self {
        LruTracker {
            order: VecDeque::new(),
            generations: HashMap::new(),
            generation: 0,
        }
    }

    /// Mark a key as most recently used, adding it if new
    pub fn touch(&mut self, key: &K) {
        self.generation += 1;
        self.generations.insert(key.clone(), self.generation);
        self.order.push_back((key.clone(), self.generation));

        // Keep the queue from growing without bound under repeated touches
        if self.order.len() > self.generations.len() * 2 + 16 {
            self.compact();
        }
    }

    pub fn remove(&mut self, key: &K) {
        self.generations.remove(key);
    }

    /// Pop the least recently used key
    pub fn pop_oldest(&mut self) -> Option<K> {
        while let Some((key, gen)) = self.order.pop_front() {
            if self.generations.get(&key) == Some(&gen) {
                self.generations.remove(&key);
                return Some(key);
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.generations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generations.is_empty()
    }

    /// Drop stale queue entries
    fn compact(&mut self) {
        let generations = &self.generations;
        self.order
            .retain(|(key, gen)| generations.get(key) == Some(gen));
    }
}

impl<K: Clone + Eq + Hash> Default for LruTracker<K> {
    fn default() -> Self {
        Self::new()
    }
}
