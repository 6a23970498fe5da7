//! Command-line frontend
//!
//! The `tierup` binary drives a synthetic workload through the tiering layer
//! and reports what the policy did.

pub mod cli;
pub mod harness;

pub use cli::main as cli_main;
pub use harness::{
    ExecutionResult, Simulation, SimulationReport, SyntheticCompiler, SyntheticExecutor,
};
