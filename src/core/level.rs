//! Optimization levels
//!
//! Levels form a total order, `Interpreted < L1 < L2`. The derived `Ord` on the
//! discriminant is the single source of truth for "better than".

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Execution quality of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum OptimizationLevel {
    /// No artifact installed; the unit runs in the interpreter.
    Interpreted = 0,
    /// Cheap baseline compilation.
    L1 = 1,
    /// Fully optimized compilation.
    L2 = 2,
}

impl OptimizationLevel {
    /// Levels that a compiler can be asked to produce, cheapest first.
    pub const fn compiled_levels() -> [OptimizationLevel; 2] {
        [OptimizationLevel::L1, OptimizationLevel::L2]
    }

    #[inline]
    pub const fn rank(self) -> u8 {
        self as u8
    }

    #[inline]
    pub fn is_better_than(self, other: OptimizationLevel) -> bool {
        self > other
    }

    #[inline]
    pub fn is_compiled(self) -> bool {
        self != OptimizationLevel::Interpreted
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Interpreted => "interpreted",
            Self::L1 => "l1",
            Self::L2 => "l2",
        }
    }
}

impl Default for OptimizationLevel {
    fn default() -> Self {
        OptimizationLevel::Interpreted
    }
}

impl fmt::Display for OptimizationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OptimizationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "interpreted" | "0" => Ok(Self::Interpreted),
            "l1" | "1" => Ok(Self::L1),
            "l2" | "2" => Ok(Self::L2),
            other => Err(format!("unknown optimization level: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(OptimizationLevel::Interpreted < OptimizationLevel::L1);
        assert!(OptimizationLevel::L1 < OptimizationLevel::L2);
        assert!(OptimizationLevel::L2.is_better_than(OptimizationLevel::L1));
        assert!(!OptimizationLevel::L1.is_better_than(OptimizationLevel::L1));
    }

    #[test]
    fn test_rank_matches_order() {
        let ranks: Vec<u8> = [
            OptimizationLevel::Interpreted,
            OptimizationLevel::L1,
            OptimizationLevel::L2,
        ]
        .iter()
        .map(|l| l.rank())
        .collect();
        assert_eq!(ranks, vec![0, 1, 2]);
    }

    #[test]
    fn test_compiled_levels_exclude_interpreter() {
        let levels = OptimizationLevel::compiled_levels();
        assert_eq!(levels, [OptimizationLevel::L1, OptimizationLevel::L2]);
        assert!(levels.iter().all(|level| level.is_compiled()));
    }

    #[test]
    fn test_parse_roundtrip_names() {
        let all = [
            OptimizationLevel::Interpreted,
            OptimizationLevel::L1,
            OptimizationLevel::L2,
        ];
        for level in all {
            assert_eq!(level.name().parse::<OptimizationLevel>().unwrap(), level);
        }
        assert!("l3".parse::<OptimizationLevel>().is_err());
    }
}
