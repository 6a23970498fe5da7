//! Per-caller invocation tally
//!
//! Deliberately not shared: two callers hitting the same unit keep two
//! independent counts, so each caller drives promotion from its own view.

use crate::core::UnitId;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct InvocationCounter {
    counts: HashMap<UnitId, u64>,
}

impl InvocationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one invocation and return the updated count.
    #[inline]
    pub fn increment(&mut self, unit: UnitId) -> u64 {
        let count = self.counts.entry(unit).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    pub fn count(&self, unit: UnitId) -> u64 {
        self.counts.get(&unit).copied().unwrap_or(0)
    }

    /// Number of distinct units this caller has invoked.
    pub fn tracked(&self) -> usize {
        self.counts.len()
    }

    /// Units sorted by descending count.
    pub fn hottest(&self, limit: usize) -> Vec<(UnitId, u64)> {
        let mut units: Vec<_> = self.counts.iter().map(|(u, c)| (*u, *c)).collect();
        units.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        units.truncate(limit);
        units
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_by_one() {
        let mut counter = InvocationCounter::new();
        let unit = UnitId::new(1);

        assert_eq!(counter.count(unit), 0);
        for expected in 1..=5 {
            assert_eq!(counter.increment(unit), expected);
        }
        assert_eq!(counter.count(unit), 5);
    }

    #[test]
    fn test_counters_are_independent() {
        let mut a = InvocationCounter::new();
        let b = InvocationCounter::new();
        let unit = UnitId::new(9);

        a.increment(unit);
        a.increment(unit);

        assert_eq!(a.count(unit), 2);
        assert_eq!(b.count(unit), 0);
    }

    #[test]
    fn test_hottest() {
        let mut counter = InvocationCounter::new();
        for _ in 0..3 {
            counter.increment(UnitId::new(1));
        }
        counter.increment(UnitId::new(2));
        for _ in 0..5 {
            counter.increment(UnitId::new(3));
        }

        let hot = counter.hottest(2);
        assert_eq!(hot, vec![(UnitId::new(3), 5), (UnitId::new(1), 3)]);
        assert_eq!(counter.tracked(), 3);
    }
}
