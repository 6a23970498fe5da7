//! Core identity types
//!
//! Opaque unit identities and the ordered optimization levels that every
//! other component compares against.

pub mod ids;
pub mod level;

pub use ids::UnitId;
pub use level::OptimizationLevel;
