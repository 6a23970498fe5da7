//! Process-wide tier cache
//!
//! Maps each unit to the best artifact compiled for it so far. The level for a
//! unit never goes down: `install_if_better` compares and writes under the
//! owning shard's write lock, so racing installers see one linear order.

use crate::core::{OptimizationLevel, UnitId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// An artifact together with the level it was compiled at
pub struct Installed<A> {
    pub artifact: Arc<A>,
    pub level: OptimizationLevel,
}

impl<A> Installed<A> {
    fn new(artifact: A, level: OptimizationLevel) -> Self {
        Self {
            artifact: Arc::new(artifact),
            level,
        }
    }
}

impl<A> Clone for Installed<A> {
    fn clone(&self) -> Self {
        Self {
            artifact: Arc::clone(&self.artifact),
            level: self.level,
        }
    }
}

impl<A> fmt::Debug for Installed<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Installed").field("level", &self.level).finish_non_exhaustive()
    }
}

pub struct TierCache<A> {
    entries: DashMap<UnitId, Installed<A>>,
}

impl<A> TierCache<A> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Best installed level, `Interpreted` when nothing is cached.
    #[inline]
    pub fn best_level(&self, unit: UnitId) -> OptimizationLevel {
        self.entries
            .get(&unit)
            .map(|entry| entry.level)
            .unwrap_or(OptimizationLevel::Interpreted)
    }

    #[inline]
    pub fn best_artifact(&self, unit: UnitId) -> Option<Arc<A>> {
        self.entries.get(&unit).map(|entry| Arc::clone(&entry.artifact))
    }

    /// Artifact and level read together.
    #[inline]
    pub fn best(&self, unit: UnitId) -> Option<Installed<A>> {
        self.entries.get(&unit).map(|entry| entry.clone())
    }

    /// Install `artifact` only if `level` is strictly better than what is cached.
    ///
    /// Returns true iff the install took effect. Ties and regressions are
    /// rejected silently.
    pub fn install_if_better(&self, unit: UnitId, artifact: A, level: OptimizationLevel) -> bool {
        if !level.is_compiled() {
            trace!(%unit, "refusing to install an interpreted artifact");
            return false;
        }

        let previous = match self.entries.entry(unit) {
            Entry::Occupied(mut slot) => {
                let current = slot.get().level;
                if !level.is_better_than(current) {
                    trace!(%unit, %level, %current, "install rejected");
                    return false;
                }
                slot.insert(Installed::new(artifact, level));
                current
            }
            Entry::Vacant(slot) => {
                slot.insert(Installed::new(artifact, level));
                OptimizationLevel::Interpreted
            }
        };

        debug!(%unit, from = %previous, to = %level, "artifact installed");
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Units whose best level is exactly `level`.
    pub fn units_at(&self, level: OptimizationLevel) -> Vec<UnitId> {
        let mut units: Vec<UnitId> = self
            .entries
            .iter()
            .filter(|entry| entry.level == level)
            .map(|entry| *entry.key())
            .collect();
        units.sort();
        units
    }

    /// Level of every cached unit, sorted by unit.
    pub fn levels(&self) -> Vec<(UnitId, OptimizationLevel)> {
        let mut levels: Vec<_> = self
            .entries
            .iter()
            .map(|entry| (*entry.key(), entry.level))
            .collect();
        levels.sort();
        levels
    }
}

impl<A> Default for TierCache<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for TierCache<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TierCache").field("units", &self.entries.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_empty_cache_reports_interpreted() {
        let cache: TierCache<&str> = TierCache::new();
        let unit = UnitId::new(1);

        assert_eq!(cache.best_level(unit), OptimizationLevel::Interpreted);
        assert!(cache.best_artifact(unit).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_install_upgrades_only() {
        let cache = TierCache::new();
        let unit = UnitId::new(1);

        assert!(cache.install_if_better(unit, "l1", OptimizationLevel::L1));
        assert!(!cache.install_if_better(unit, "l1-again", OptimizationLevel::L1));
        assert!(cache.install_if_better(unit, "l2", OptimizationLevel::L2));
        assert!(!cache.install_if_better(unit, "late-l1", OptimizationLevel::L1));

        let best = cache.best(unit).unwrap();
        assert_eq!(best.level, OptimizationLevel::L2);
        assert_eq!(*best.artifact, "l2");
    }

    #[test]
    fn test_interpreted_install_rejected() {
        let cache = TierCache::new();
        assert!(!cache.install_if_better(UnitId::new(3), "x", OptimizationLevel::Interpreted));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_units_at() {
        let cache = TierCache::new();
        cache.install_if_better(UnitId::new(2), (), OptimizationLevel::L1);
        cache.install_if_better(UnitId::new(1), (), OptimizationLevel::L1);
        cache.install_if_better(UnitId::new(3), (), OptimizationLevel::L2);

        assert_eq!(cache.units_at(OptimizationLevel::L1), vec![UnitId::new(1), UnitId::new(2)]);
        assert_eq!(cache.units_at(OptimizationLevel::L2), vec![UnitId::new(3)]);
    }

    #[test]
    fn test_racing_installers_single_winner_per_level() {
        let cache = Arc::new(TierCache::new());
        let unit = UnitId::new(5);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let cache = Arc::clone(&cache);
                let level = if i % 2 == 0 { OptimizationLevel::L1 } else { OptimizationLevel::L2 };
                thread::spawn(move || cache.install_if_better(unit, i, level))
            })
            .collect();

        let wins = handles.into_iter().map(|h| h.join().unwrap()).filter(|won| *won).count();

        // At most one L1 and one L2 install can ever succeed.
        assert!(wins >= 1 && wins <= 2);
        assert_eq!(cache.best_level(unit), OptimizationLevel::L2);
    }
}
