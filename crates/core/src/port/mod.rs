// Port Layer - Interfaces for external dependencies

pub mod id_provider; // For deterministic testing
pub mod time_provider;
pub mod unit_runner;

// Re-exports
pub use id_provider::IdProvider;
pub use time_provider::TimeProvider;
pub use unit_runner::{
    ExecutionError, ExecutionResult, ExecutionStatus, NotebookRun, ScriptRun, UnitRunner,
};
