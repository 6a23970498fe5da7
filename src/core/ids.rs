//! Compilable unit identity
//!
//! A `UnitId` is an opaque handle for a method or function. Nothing inside the
//! tiering layer looks past equality and hashing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a compilable unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitId(u64);

impl UnitId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Derive a stable id from a symbolic name (FNV-1a).
    pub fn from_name(name: &str) -> Self {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;

        let hash = name
            .bytes()
            .fold(OFFSET, |acc, byte| (acc ^ byte as u64).wrapping_mul(PRIME));
        Self(hash)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for UnitId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_is_stable() {
        assert_eq!(UnitId::from_name("main"), UnitId::from_name("main"));
        assert_ne!(UnitId::from_name("main"), UnitId::from_name("mainx"));
    }

    #[test]
    fn test_display() {
        assert_eq!(UnitId::new(42).to_string(), "unit#42");
    }
}
