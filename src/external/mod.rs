//! Boundary to the execution substrate
//!
//! The tiering layer never interprets or compiles anything itself. It drives
//! these two capabilities, which must be safe to call from many threads.

use crate::core::{OptimizationLevel, UnitId};
use crate::errors::CompileError;
use std::sync::Arc;

/// Turns a unit into an executable artifact at a given level.
///
/// May be slow. Must not touch tiering state and must tolerate being invoked
/// twice concurrently for the same `(unit, level)`.
pub trait Compiler: Send + Sync + 'static {
    type Artifact: Send + Sync + 'static;

    /// Only called with `L1` or `L2`.
    fn compile(
        &self,
        unit: UnitId,
        level: OptimizationLevel,
    ) -> Result<Self::Artifact, CompileError>;
}

/// Runs artifacts or falls back to interpretation.
pub trait Executor: Send + Sync {
    type Artifact;
    type Output;

    fn execute(&self, artifact: &Self::Artifact) -> Self::Output;

    fn interpret(&self, unit: UnitId) -> Self::Output;
}

impl<C: Compiler> Compiler for Arc<C> {
    type Artifact = C::Artifact;

    fn compile(
        &self,
        unit: UnitId,
        level: OptimizationLevel,
    ) -> Result<Self::Artifact, CompileError> {
        (**self).compile(unit, level)
    }
}

impl<E: Executor> Executor for Arc<E> {
    type Artifact = E::Artifact;
    type Output = E::Output;

    fn execute(&self, artifact: &Self::Artifact) -> Self::Output {
        (**self).execute(artifact)
    }

    fn interpret(&self, unit: UnitId) -> Self::Output {
        (**self).interpret(unit)
    }
}
