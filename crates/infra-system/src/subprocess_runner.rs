// Subprocess runner implementation
// reason: tokio::process for async child management
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use harvest_core::application::constants::DEFAULT_KERNEL;
use harvest_core::port::unit_runner::{
    ExecutionError, ExecutionResult, ExecutionStatus, NotebookRun, ScriptRun, UnitRunner,
};
use harvest_core::port::TimeProvider;

/// Engine commands and limits
#[derive(Debug, Clone)]
pub struct SubprocessConfig {
    /// Interpreter used for script drivers
    pub python: String,
    /// `jupyter` launcher used for notebooks
    pub jupyter: String,
    /// Kernel notebooks execute in
    pub kernel: String,
    /// None = wait forever (the default: long analyses are expected)
    pub timeout: Option<Duration>,
}

impl Default for SubprocessConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            jupyter: "jupyter".to_string(),
            kernel: DEFAULT_KERNEL.to_string(),
            timeout: None,
        }
    }
}

/// Runs units as isolated child processes
///
/// Notebooks go through `jupyter nbconvert --execute --inplace`; scripts are
/// run as `<python> -c <driver>`. Each child gets the unit's directory as its
/// working directory and is killed if a configured timeout elapses.
pub struct SubprocessRunner {
    time_provider: Arc<dyn TimeProvider>,
    config: SubprocessConfig,
}

impl SubprocessRunner {
    /// Create a new subprocess runner
    ///
    /// # Example
    /// ```ignore
    /// let runner = SubprocessRunner::new(
    ///     Arc::new(SystemTimeProvider),
    ///     SubprocessConfig::default(),
    /// );
    /// ```
    pub fn new(time_provider: Arc<dyn TimeProvider>, config: SubprocessConfig) -> Self {
        Self {
            time_provider,
            config,
        }
    }

    /// nbconvert arguments executing `document` in place, no cell time limit
    fn notebook_args(&self, document: &Path) -> Vec<String> {
        vec![
            "nbconvert".to_string(),
            "--to".to_string(),
            "notebook".to_string(),
            "--execute".to_string(),
            "--inplace".to_string(),
            "--ExecutePreprocessor.timeout=-1".to_string(),
            format!("--ExecutePreprocessor.kernel_name={}", self.config.kernel),
            document.to_string_lossy().into_owned(),
        ]
    }

    /// Spawn child process and wait for it
    ///
    /// Standard output is inherited so unit prints reach the terminal as they
    /// happen; standard error is captured for the failure report.
    async fn spawn_and_wait(
        &self,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        working_dir: &Path,
    ) -> Result<std::process::Output, ExecutionError> {
        let child = Command::new(command)
            .args(args)
            .envs(env)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecutionError::SpawnFailed(format!("{command}: {e}")))?;

        if let Some(limit) = self.config.timeout {
            match timeout(limit, child.wait_with_output()).await {
                Ok(Ok(output)) => Ok(output),
                Ok(Err(e)) => Err(ExecutionError::IoError(e.to_string())),
                // Dropping the future drops the child, which kills it
                Err(_) => Err(ExecutionError::Timeout(limit.as_millis() as i64)),
            }
        } else {
            child
                .wait_with_output()
                .await
                .map_err(|e| ExecutionError::IoError(e.to_string()))
        }
    }

    /// Build execution result from process output
    fn build_result(&self, output: std::process::Output, duration_ms: i64) -> ExecutionResult {
        let status = if output.status.success() {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Failed
        };

        ExecutionResult {
            status,
            exit_code: output.status.code(),
            duration_ms,
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        }
    }

    async fn execute_internal(
        &self,
        label: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        working_dir: &Path,
    ) -> Result<ExecutionResult, ExecutionError> {
        let start_time = self.time_provider.now_millis();

        info!(
            unit = %label,
            command = %command,
            working_dir = %working_dir.display(),
            timeout_ms = ?self.config.timeout.map(|t| t.as_millis()),
            "Starting subprocess execution"
        );

        let output = self.spawn_and_wait(command, args, env, working_dir).await?;

        let duration_ms = self.time_provider.now_millis() - start_time;
        let result = self.build_result(output, duration_ms);

        if result.status == ExecutionStatus::Success {
            info!(
                unit = %label,
                duration_ms = %duration_ms,
                exit_code = ?result.exit_code,
                "Subprocess execution completed"
            );
            if let Some(stderr) = result.stderr.as_deref().filter(|s| !s.is_empty()) {
                debug!(unit = %label, stderr = %stderr, "Subprocess diagnostics");
            }
        } else {
            warn!(
                unit = %label,
                duration_ms = %duration_ms,
                exit_code = ?result.exit_code,
                stderr = %result.stderr.as_deref().unwrap_or_default(),
                "Subprocess exited unsuccessfully"
            );
        }

        Ok(result)
    }
}

#[async_trait]
impl UnitRunner for SubprocessRunner {
    async fn execute_notebook(&self, run: &NotebookRun) -> Result<ExecutionResult, ExecutionError> {
        let args = self.notebook_args(&run.document);
        let label = run.document.display().to_string();
        self.execute_internal(&label, &self.config.jupyter, &args, &run.env, &run.work_dir)
            .await
    }

    async fn run_script(&self, run: &ScriptRun) -> Result<ExecutionResult, ExecutionError> {
        let args = vec!["-c".to_string(), run.driver.clone()];
        let label = run.script.display().to_string();
        self.execute_internal(&label, &self.config.python, &args, &run.env, &run.work_dir)
            .await
    }
}
