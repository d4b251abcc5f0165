// Harvest Infrastructure - System Adapters
// Implements: UnitRunner over child processes

pub mod subprocess_runner;

pub use subprocess_runner::{SubprocessConfig, SubprocessRunner};
