// Unit Runner Port
// Abstraction over the engines that actually execute analysis units
// (a notebook kernel, a python interpreter)

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Result of running one unit
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub duration_ms: i64,
    pub exit_code: Option<i32>,
    /// Captured error stream; standard output goes straight to the terminal
    pub stderr: Option<String>,
}

impl ExecutionResult {
    /// Last non-empty stderr line, handy as a one-line failure cause
    pub fn stderr_tail(&self) -> Option<&str> {
        self.stderr
            .as_deref()?
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
    }
}

/// Execution status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Success,
    Failed,
}

/// Execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Process timeout after {0}ms")]
    Timeout(i64),

    #[error("IO error: {0}")]
    IoError(String),
}

/// Execute a notebook document in place
#[derive(Debug, Clone)]
pub struct NotebookRun {
    /// Instrumented document; overwritten with the executed version
    pub document: PathBuf,
    /// Directory the kernel should run in
    pub work_dir: PathBuf,
    pub env: HashMap<String, String>,
}

/// Run a python driver program as an isolated process
#[derive(Debug, Clone)]
pub struct ScriptRun {
    /// Driver source passed to the interpreter
    pub driver: String,
    /// Unit the driver executes (for logging)
    pub script: PathBuf,
    pub work_dir: PathBuf,
    pub env: HashMap<String, String>,
}

/// Unit Runner trait
///
/// Implementations:
/// - SubprocessRunner (infra-system): jupyter nbconvert / python interpreter
/// - MockUnitRunner: scripted behaviour for tests
///
/// Neither call imposes a time limit unless the implementation was
/// configured with one; a hung unit blocks the caller.
#[async_trait]
pub trait UnitRunner: Send + Sync {
    /// Execute every cell of a notebook, writing outputs back into the document
    ///
    /// # Errors
    /// - ExecutionError::SpawnFailed if the engine cannot be started
    /// - ExecutionError::Timeout if a configured limit elapsed
    async fn execute_notebook(&self, run: &NotebookRun) -> Result<ExecutionResult, ExecutionError>;

    /// Run a driver program and wait for it to exit
    ///
    /// A non-zero exit is reported through `ExecutionResult::status`, not as an error.
    async fn run_script(&self, run: &ScriptRun) -> Result<ExecutionResult, ExecutionError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    /// Mock runner behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Always succeed
        Success,
        /// Exit with the given non-zero code
        ExitCode(i32),
        /// Fail to spawn with message
        Fail(String),
        /// Panic with message (for isolation testing)
        Panic(String),
        /// Timeout after N ms
        Timeout(i64),
    }

    /// Side effect applied to the working directory before returning,
    /// standing in for whatever the unit would write
    pub type Effect = Arc<dyn Fn(&Path) + Send + Sync>;

    /// Mock Unit Runner for testing
    pub struct MockUnitRunner {
        behavior: MockBehavior,
        effect: Option<Effect>,
        notebook_runs: Arc<Mutex<Vec<NotebookRun>>>,
        script_runs: Arc<Mutex<Vec<ScriptRun>>>,
    }

    impl MockUnitRunner {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior,
                effect: None,
                notebook_runs: Arc::new(Mutex::new(Vec::new())),
                script_runs: Arc::new(Mutex::new(Vec::new())),
            }
        }
        pub fn new_success() -> Self {
            Self::new(MockBehavior::Success)
        }
        pub fn new_fail(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Fail(message.into()))
        }
        pub fn new_panic_inducing(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Panic(message.into()))
        }
        pub fn with_effect(mut self, effect: impl Fn(&Path) + Send + Sync + 'static) -> Self {
            self.effect = Some(Arc::new(effect));
            self
        }
        pub fn call_count(&self) -> usize {
            self.notebook_runs.lock().unwrap().len() + self.script_runs.lock().unwrap().len()
        }
        pub fn notebook_runs(&self) -> Vec<NotebookRun> {
            self.notebook_runs.lock().unwrap().clone()
        }
        pub fn script_runs(&self) -> Vec<ScriptRun> {
            self.script_runs.lock().unwrap().clone()
        }

        fn respond(&self, work_dir: &Path) -> Result<ExecutionResult, ExecutionError> {
            let behavior = self.behavior.clone();

            match behavior {
                MockBehavior::Success | MockBehavior::ExitCode(_) => {
                    if let Some(effect) = &self.effect {
                        effect(work_dir);
                    }
                    let code = match behavior {
                        MockBehavior::ExitCode(code) => code,
                        _ => 0,
                    };
                    Ok(ExecutionResult {
                        status: if code == 0 {
                            ExecutionStatus::Success
                        } else {
                            ExecutionStatus::Failed
                        },
                        duration_ms: 100,
                        exit_code: Some(code),
                        stderr: (code != 0).then(|| format!("mock failure\nexit {code}")),
                    })
                }
                MockBehavior::Fail(msg) => Err(ExecutionError::SpawnFailed(msg)),
                MockBehavior::Panic(msg) => {
                    panic!("{}", msg); // Actually panic for isolation testing
                }
                MockBehavior::Timeout(ms) => Err(ExecutionError::Timeout(ms)),
            }
        }
    }

    #[async_trait]
    impl UnitRunner for MockUnitRunner {
        async fn execute_notebook(
            &self,
            run: &NotebookRun,
        ) -> Result<ExecutionResult, ExecutionError> {
            self.notebook_runs.lock().unwrap().push(run.clone());
            self.respond(&run.work_dir)
        }

        async fn run_script(&self, run: &ScriptRun) -> Result<ExecutionResult, ExecutionError> {
            self.script_runs.lock().unwrap().push(run.clone());
            self.respond(&run.work_dir)
        }
    }
}
