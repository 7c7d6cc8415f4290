// src/dedup.rs
//
// Process-wide ledger of content fingerprints seen since start. An item
// whose fingerprint is already marked is dropped silently from the refresh
// output; a restart resets the ledger. Capacity is optional: the default is
// unbounded, a non-zero cap evicts oldest-first.

use std::collections::{HashSet, VecDeque};

use crate::item::Fingerprint;

#[derive(Debug, Default)]
pub struct DedupLedger {
    seen: HashSet<Fingerprint>,
    order: VecDeque<Fingerprint>,
    capacity: Option<usize>,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// `capacity == 0` means unbounded.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            capacity: (capacity > 0).then_some(capacity),
        }
    }

    pub fn seen(&self, fp: &Fingerprint) -> bool {
        self.seen.contains(fp)
    }

    pub fn mark_seen(&mut self, fp: Fingerprint) {
        if !self.seen.insert(fp.clone()) {
            return;
        }
        self.order.push_back(fp);
        if let Some(cap) = self.capacity {
            while self.order.len() > cap {
                if let Some(oldest) = self.order.pop_front() {
                    self.seen.remove(&oldest);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(n: u32) -> Fingerprint {
        Fingerprint::of(&format!("title-{n}"), "body")
    }

    #[test]
    fn marked_fingerprints_are_seen() {
        let mut ledger = DedupLedger::new();
        assert!(!ledger.seen(&fp(1)));
        ledger.mark_seen(fp(1));
        assert!(ledger.seen(&fp(1)));
        assert!(!ledger.seen(&fp(2)));
    }

    #[test]
    fn marking_twice_does_not_grow_the_ledger() {
        let mut ledger = DedupLedger::new();
        ledger.mark_seen(fp(1));
        ledger.mark_seen(fp(1));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn bounded_ledger_evicts_oldest_first() {
        let mut ledger = DedupLedger::with_capacity(2);
        ledger.mark_seen(fp(1));
        ledger.mark_seen(fp(2));
        ledger.mark_seen(fp(3));
        assert_eq!(ledger.len(), 2);
        assert!(!ledger.seen(&fp(1)));
        assert!(ledger.seen(&fp(2)));
        assert!(ledger.seen(&fp(3)));
    }

    #[test]
    fn zero_capacity_means_unbounded() {
        let mut ledger = DedupLedger::with_capacity(0);
        for n in 0..100 {
            ledger.mark_seen(fp(n));
        }
        assert_eq!(ledger.len(), 100);
    }
}
