//! Dense event-set algebra.
//!
//! `EventSet` is a fixed-universe bitset over `EventId`s, stored as `u64`
//! words. Every set belonging to one graph shares the graph's universe size,
//! so word-wise operations and equality are well defined without
//! normalization. Cloning a set copies a handful of words, which is what
//! makes the snapshot-heavy recursion in replay and alignment cheap.
//!
//! # Determinism
//! Iteration is by ascending `EventId`, independent of insertion history.

use crate::arena::EventId;
use std::fmt;

const WORD_BITS: usize = 64;

/// A set of `EventId`s over a fixed universe.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct EventSet {
    bits: Vec<u64>,
    universe: usize,
}

impl EventSet {
    /// Creates an empty set over a universe of `universe` events.
    pub fn empty(universe: usize) -> Self {
        Self {
            bits: vec![0; universe.div_ceil(WORD_BITS)],
            universe,
        }
    }

    /// Creates the full set over a universe of `universe` events.
    pub fn full(universe: usize) -> Self {
        let mut set = Self::empty(universe);
        for i in 0..universe {
            set.bits[i / WORD_BITS] |= 1u64 << (i % WORD_BITS);
        }
        set
    }

    /// The universe size this set was created with.
    #[inline]
    pub fn universe(&self) -> usize {
        self.universe
    }

    /// Inserts `e`. Returns `true` if the set changed.
    #[inline]
    pub fn insert(&mut self, e: EventId) -> bool {
        let (w, b) = Self::slot(e);
        let mask = 1u64 << b;
        let was = self.bits[w] & mask != 0;
        self.bits[w] |= mask;
        !was
    }

    /// Removes `e`. Returns `true` if the set changed.
    #[inline]
    pub fn remove(&mut self, e: EventId) -> bool {
        let (w, b) = Self::slot(e);
        let mask = 1u64 << b;
        let was = self.bits[w] & mask != 0;
        self.bits[w] &= !mask;
        was
    }

    /// Membership test.
    #[inline]
    pub fn contains(&self, e: EventId) -> bool {
        let (w, b) = Self::slot(e);
        self.bits.get(w).is_some_and(|word| word & (1u64 << b) != 0)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// True if no member is set.
    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&w| w == 0)
    }

    /// Removes every member.
    pub fn clear(&mut self) {
        self.bits.iter_mut().for_each(|w| *w = 0);
    }

    /// In-place union: `self ∪= other`.
    pub fn union_with(&mut self, other: &EventSet) {
        debug_assert_eq!(self.universe, other.universe);
        for (a, b) in self.bits.iter_mut().zip(&other.bits) {
            *a |= b;
        }
    }

    /// In-place intersection: `self ∩= other`.
    pub fn intersect_with(&mut self, other: &EventSet) {
        debug_assert_eq!(self.universe, other.universe);
        for (a, b) in self.bits.iter_mut().zip(&other.bits) {
            *a &= b;
        }
    }

    /// In-place difference: `self ∖= other`.
    pub fn difference_with(&mut self, other: &EventSet) {
        debug_assert_eq!(self.universe, other.universe);
        for (a, b) in self.bits.iter_mut().zip(&other.bits) {
            *a &= !b;
        }
    }

    /// By-value union.
    pub fn union(&self, other: &EventSet) -> EventSet {
        let mut out = self.clone();
        out.union_with(other);
        out
    }

    /// By-value intersection.
    pub fn intersection(&self, other: &EventSet) -> EventSet {
        let mut out = self.clone();
        out.intersect_with(other);
        out
    }

    /// By-value difference.
    pub fn difference(&self, other: &EventSet) -> EventSet {
        let mut out = self.clone();
        out.difference_with(other);
        out
    }

    /// True if every member of `self` is in `other`.
    pub fn is_subset(&self, other: &EventSet) -> bool {
        debug_assert_eq!(self.universe, other.universe);
        self.bits.iter().zip(&other.bits).all(|(a, b)| a & !b == 0)
    }

    /// True if `self ∩ other = ∅`.
    pub fn is_disjoint(&self, other: &EventSet) -> bool {
        debug_assert_eq!(self.universe, other.universe);
        self.bits.iter().zip(&other.bits).all(|(a, b)| a & b == 0)
    }

    /// Iterates members in ascending `EventId` order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            set: self,
            word: 0,
            current: self.bits.first().copied().unwrap_or(0),
        }
    }

    #[inline]
    fn slot(e: EventId) -> (usize, usize) {
        (e.index() / WORD_BITS, e.index() % WORD_BITS)
    }
}

/// Ascending-order member iterator.
pub struct Iter<'a> {
    set: &'a EventSet,
    word: usize,
    current: u64,
}

impl Iterator for Iter<'_> {
    type Item = EventId;

    fn next(&mut self) -> Option<EventId> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                return Some(EventId::new((self.word * WORD_BITS + bit) as u32));
            }
            self.word += 1;
            if self.word >= self.set.bits.len() {
                return None;
            }
            self.current = self.set.bits[self.word];
        }
    }
}

impl<'a> IntoIterator for &'a EventSet {
    type Item = EventId;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

impl fmt::Debug for EventSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<EventId> for EventSet {
    /// Collects ids into a set sized to the largest id seen.
    ///
    /// Mostly a test convenience; graph code sizes sets by the event
    /// universe instead.
    fn from_iter<I: IntoIterator<Item = EventId>>(iter: I) -> Self {
        let ids: Vec<EventId> = iter.into_iter().collect();
        let universe = ids.iter().map(|e| e.index() + 1).max().unwrap_or(0);
        let mut set = EventSet::empty(universe);
        for e in ids {
            set.insert(e);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u32]) -> Vec<EventId> {
        raw.iter().map(|&i| EventId::new(i)).collect()
    }

    #[test]
    fn insert_remove_contains() {
        let mut set = EventSet::empty(130);
        assert!(set.insert(EventId::new(0)));
        assert!(set.insert(EventId::new(129)));
        assert!(!set.insert(EventId::new(129)));
        assert!(set.contains(EventId::new(0)));
        assert!(set.contains(EventId::new(129)));
        assert!(!set.contains(EventId::new(64)));
        assert_eq!(set.len(), 2);
        assert!(set.remove(EventId::new(0)));
        assert!(!set.remove(EventId::new(0)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn algebra() {
        let universe = 8;
        let mut a = EventSet::empty(universe);
        let mut b = EventSet::empty(universe);
        for e in ids(&[1, 2, 5]) {
            a.insert(e);
        }
        for e in ids(&[2, 3, 5]) {
            b.insert(e);
        }
        assert_eq!(a.union(&b).iter().collect::<Vec<_>>(), ids(&[1, 2, 3, 5]));
        assert_eq!(a.intersection(&b).iter().collect::<Vec<_>>(), ids(&[2, 5]));
        assert_eq!(a.difference(&b).iter().collect::<Vec<_>>(), ids(&[1]));
        assert!(a.intersection(&b).is_subset(&a));
        assert!(!a.is_disjoint(&b));
        assert!(a.difference(&b).is_disjoint(&b));
    }

    #[test]
    fn iteration_is_ascending_regardless_of_insertion() {
        let mut set = EventSet::empty(100);
        for e in ids(&[77, 3, 64, 12, 63]) {
            set.insert(e);
        }
        let order: Vec<_> = set.iter().map(|e| e.as_u32()).collect();
        assert_eq!(order, vec![3, 12, 63, 64, 77]);
    }

    #[test]
    fn full_and_clear() {
        let mut set = EventSet::full(70);
        assert_eq!(set.len(), 70);
        set.clear();
        assert!(set.is_empty());
    }

    #[test]
    fn clone_is_independent() {
        let mut a = EventSet::empty(10);
        a.insert(EventId::new(4));
        let snapshot = a.clone();
        a.insert(EventId::new(5));
        a.remove(EventId::new(4));
        assert!(snapshot.contains(EventId::new(4)));
        assert!(!snapshot.contains(EventId::new(5)));
    }
}
