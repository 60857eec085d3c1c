//! Bounded best-of-N candidate pool.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::host::ProcessSnapshot;

/// Upper bound for victims selected by one scan.
pub const MAX_VICTIMS: usize = 8;
/// Victims selected by one scan unless configured otherwise.
pub const DEFAULT_VICTIMS: usize = 3;

/// A process admitted to the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSlot {
    pub pid: u32,
    pub name: String,
    pub priority_score: i32,
    pub resident_pages: u64,
}

impl CandidateSlot {
    /// Ranking key: higher priority first, then larger footprint.
    fn rank(&self, other: &Self) -> Ordering {
        self.priority_score
            .cmp(&other.priority_score)
            .then(self.resident_pages.cmp(&other.resident_pages))
    }

    /// Strictly better than `other`.
    pub fn outranks(&self, other: &Self) -> bool {
        self.rank(other) == Ordering::Greater
    }
}

impl From<&ProcessSnapshot> for CandidateSlot {
    fn from(p: &ProcessSnapshot) -> Self {
        Self {
            pid: p.pid,
            name: p.name.clone(),
            priority_score: p.priority_score,
            resident_pages: p.resident_pages,
        }
    }
}

/// Holds the K highest-ranked candidates seen so far.
#[derive(Debug, Clone)]
pub struct CandidatePool {
    slots: Vec<CandidateSlot>,
    capacity: usize,
    weakest: usize,
}

impl CandidatePool {
    /// Capacity is clamped to `1..=MAX_VICTIMS`.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_VICTIMS);
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            weakest: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.capacity
    }

    /// Current weakest member, once the pool has anything in it.
    pub fn weakest(&self) -> Option<&CandidateSlot> {
        self.slots.get(self.weakest)
    }

    /// Offers a candidate. Returns whether it was admitted.
    pub fn try_insert(&mut self, candidate: CandidateSlot) -> bool {
        if !self.is_full() {
            self.slots.push(candidate);
            if self.is_full() {
                self.rescan_weakest();
            }
            return true;
        }

        if !candidate.outranks(&self.slots[self.weakest]) {
            return false;
        }
        self.slots[self.weakest] = candidate;
        self.rescan_weakest();
        true
    }

    fn rescan_weakest(&mut self) {
        self.weakest = self
            .slots
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.rank(b))
            .map(|(i, _)| i)
            .unwrap_or(0);
    }

    /// Members ordered best-first. Exact ties fall back to pid order.
    pub fn into_ranked(mut self) -> Vec<CandidateSlot> {
        self.slots.sort_by(|a, b| b.rank(a).then(a.pid.cmp(&b.pid)));
        self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(pid: u32, priority: i32, pages: u64) -> CandidateSlot {
        CandidateSlot {
            pid,
            name: format!("proc{}", pid),
            priority_score: priority,
            resident_pages: pages,
        }
    }

    fn keys(pool: CandidatePool) -> Vec<(i32, u64)> {
        pool.into_ranked()
            .into_iter()
            .map(|s| (s.priority_score, s.resident_pages))
            .collect()
    }

    #[test]
    fn test_pool_keeps_top_k() {
        let mut pool = CandidatePool::new(3);
        assert!(pool.try_insert(slot(1, 5, 100)));
        assert!(pool.try_insert(slot(2, 8, 50)));
        assert!(pool.try_insert(slot(3, 8, 200)));
        assert!(pool.is_full());
        assert!(!pool.try_insert(slot(4, 3, 900)));
        assert_eq!(keys(pool), vec![(8, 200), (8, 50), (5, 100)]);
    }

    #[test]
    fn test_pool_replaces_weakest_only_when_strictly_better() {
        let mut pool = CandidatePool::new(2);
        pool.try_insert(slot(1, 5, 100));
        pool.try_insert(slot(2, 6, 100));
        assert_eq!(pool.weakest().map(|s| s.pid), Some(1));

        // identical rank to the weakest is not admitted
        assert!(!pool.try_insert(slot(3, 5, 100)));
        // same priority, bigger footprint is
        assert!(pool.try_insert(slot(4, 5, 101)));
        assert_eq!(pool.weakest().map(|s| s.pid), Some(4));
        assert!(pool.try_insert(slot(5, 7, 1)));
        assert_eq!(pool.weakest().map(|s| s.pid), Some(2));
    }

    #[test]
    fn test_pool_capacity_is_clamped() {
        assert_eq!(CandidatePool::new(0).capacity(), 1);
        assert_eq!(CandidatePool::new(100).capacity(), MAX_VICTIMS);
    }

    #[test]
    fn test_pool_every_arrival_order_gives_same_result() {
        let items = [
            slot(1, 5, 100),
            slot(2, 8, 50),
            slot(3, 8, 200),
            slot(4, 3, 900),
        ];
        let expected = vec![(8, 200), (8, 50), (5, 100)];

        // all 24 permutations via Heap's algorithm
        let mut idx: Vec<usize> = (0..items.len()).collect();
        let mut c = vec![0usize; items.len()];
        let check = |order: &[usize]| {
            let mut pool = CandidatePool::new(3);
            for &i in order {
                pool.try_insert(items[i].clone());
            }
            assert_eq!(keys(pool), expected, "order {:?}", order);
        };
        check(&idx);
        let mut i = 0;
        while i < idx.len() {
            if c[i] < i {
                if i % 2 == 0 {
                    idx.swap(0, i);
                } else {
                    idx.swap(c[i], i);
                }
                check(&idx);
                c[i] += 1;
                i = 0;
            } else {
                c[i] = 0;
                i += 1;
            }
        }
    }

    #[test]
    fn test_outranks() {
        assert!(slot(1, 2, 1).outranks(&slot(2, 1, 1000)));
        assert!(slot(1, 2, 10).outranks(&slot(2, 2, 9)));
        assert!(!slot(1, 2, 10).outranks(&slot(2, 2, 10)));
    }
}
