//! `ManagedProcess`: spawn, observe and stop one supervised child.

use crate::output::spawn_output_drainers;
use crate::state::{ProcessState, ProcessStateMachine};
use crate::terminate::{force_kill, terminate_gracefully};
use devserve_common::{SupervisorError, SupervisorResult};
use std::collections::HashMap;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

const FORCE_KILL_TIMEOUT: Duration = Duration::from_secs(3);
const DRAINER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// One supervised child process.
///
/// Owned exclusively by the orchestrator, which is the only actor permitted
/// to request termination. Output pipes are drained by two background tasks
/// for the life of the process.
pub struct ManagedProcess {
    name: String,
    command: Vec<String>,
    child: Option<Child>,
    pid: Option<u32>,
    state_machine: ProcessStateMachine,
    output_tasks: Vec<JoinHandle<()>>,
    last_exit_status: Option<std::process::ExitStatus>,
}

impl ManagedProcess {
    /// Spawn a child from a command line, merging `env_overrides` onto the
    /// inherited environment (override wins on key collision).
    ///
    /// The command line must be non-empty. Spawn failure (binary not found,
    /// permission denied) is fatal and reported to the caller.
    pub fn spawn(
        name: &str,
        command: &[String],
        env_overrides: &HashMap<String, String>,
    ) -> SupervisorResult<Self> {
        let executable = command.first().ok_or_else(|| {
            SupervisorError::configuration(name, "command line must not be empty")
        })?;

        let mut state_machine = ProcessStateMachine::new(name);
        state_machine.transition_to_starting()?;

        info!("Starting process '{}': {}", name, command.join(" "));

        let mut cmd = Command::new(executable);
        cmd.args(&command[1..])
            .envs(env_overrides)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            SupervisorError::spawn_failed(name, format!("{}: {}", executable, e))
        })?;

        let pid = child.id();
        let output_tasks = spawn_output_drainers(name, &mut child);

        state_machine.transition_to_running()?;
        debug!("Process '{}' running with pid {:?}", name, pid);

        Ok(Self {
            name: name.to_string(),
            command: command.to_vec(),
            child: Some(child),
            pid,
            state_machine,
            output_tasks,
            last_exit_status: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> ProcessState {
        self.state_machine.current_state()
    }

    /// Exit status of the child, once observed.
    pub fn exit_status(&self) -> Option<std::process::ExitStatus> {
        self.last_exit_status
    }

    /// Non-blocking liveness query.
    ///
    /// An exit observed here while the process was not asked to stop moves
    /// the state to `Failed`; the caller learns about the death through this
    /// query rather than through an asynchronous error.
    pub fn is_running(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };

        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                self.last_exit_status = Some(status);
                if self.state_machine.can_stop() {
                    warn!(
                        "Process '{}' exited unexpectedly: {}",
                        self.name, status
                    );
                    let _ = self
                        .state_machine
                        .transition_to_failed(format!("exited unexpectedly: {}", status));
                }
                false
            }
            Err(e) => {
                warn!("Failed to query process '{}': {}", self.name, e);
                false
            }
        }
    }

    /// Stop the process: graceful signal, bounded wait, then force kill.
    ///
    /// Idempotent — stopping an already-stopped (or failed) process is a
    /// no-op, not an error.
    pub async fn stop(&mut self, grace: Duration) -> SupervisorResult<()> {
        if self.state().is_terminal() {
            debug!("Process '{}' already {}, nothing to stop", self.name, self.state());
            return Ok(());
        }

        self.state_machine.transition_to_stopping()?;

        if let Some(mut child) = self.child.take() {
            match child.try_wait() {
                Ok(Some(status)) => {
                    // Already exited between the last query and this stop
                    self.last_exit_status = Some(status);
                }
                _ => {
                    if let Some(pid) = self.pid {
                        if let Err(e) = terminate_gracefully(pid) {
                            warn!("Failed to signal process '{}': {}", self.name, e);
                        }
                    }

                    match timeout(grace, child.wait()).await {
                        Ok(Ok(status)) => {
                            info!("Process '{}' exited: {}", self.name, status);
                            self.last_exit_status = Some(status);
                        }
                        Ok(Err(e)) => {
                            warn!("Failed to wait for process '{}': {}", self.name, e);
                        }
                        Err(_) => {
                            warn!(
                                "Process '{}' did not exit within {:?}, force killing",
                                self.name, grace
                            );
                            if let Some(pid) = self.pid {
                                if let Err(e) = force_kill(pid) {
                                    warn!("Failed to force kill process '{}': {}", self.name, e);
                                }
                            }
                            if let Ok(Ok(status)) = timeout(FORCE_KILL_TIMEOUT, child.wait()).await
                            {
                                self.last_exit_status = Some(status);
                            }
                        }
                    }
                }
            }
        }

        // Let the drainers flush whatever the child wrote before exiting
        for task in self.output_tasks.drain(..) {
            let _ = timeout(DRAINER_JOIN_TIMEOUT, task).await;
        }

        self.state_machine.transition_to_stopped()?;
        info!("Process '{}' stopped", self.name);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env() -> HashMap<String, String> {
        HashMap::new()
    }

    #[tokio::test]
    async fn test_spawn_failure_is_fatal() {
        let command = vec!["/nonexistent/definitely-not-a-binary".to_string()];
        let result = ManagedProcess::spawn("ghost", &command, &no_env());
        match result {
            Err(SupervisorError::SpawnFailed { name, .. }) => assert_eq!(name, "ghost"),
            other => panic!("expected SpawnFailed, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_empty_command_rejected() {
        let result = ManagedProcess::spawn("empty", &[], &no_env());
        assert!(matches!(
            result,
            Err(SupervisorError::Configuration { .. })
        ));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_stop_is_idempotent() {
        let command = vec!["sleep".to_string(), "30".to_string()];
        let mut process = ManagedProcess::spawn("sleeper", &command, &no_env()).unwrap();
        assert_eq!(process.state(), ProcessState::Running);
        assert!(process.is_running());

        process.stop(Duration::from_secs(5)).await.unwrap();
        assert_eq!(process.state(), ProcessState::Stopped);

        // Second stop: no error, no duplicate side effects
        process.stop(Duration::from_secs(5)).await.unwrap();
        assert_eq!(process.state(), ProcessState::Stopped);
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_unexpected_exit_reported_as_failed() {
        let command = vec!["sh".to_string(), "-c".to_string(), "exit 3".to_string()];
        let mut process = ManagedProcess::spawn("flaky", &command, &no_env()).unwrap();

        // Poll liveness until the exit is observed
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while process.is_running() {
            assert!(tokio::time::Instant::now() < deadline, "child never exited");
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        assert_eq!(process.state(), ProcessState::Failed);
        assert_eq!(process.exit_status().and_then(|s| s.code()), Some(3));

        // Stopping a failed process is still a no-op
        process.stop(Duration::from_secs(1)).await.unwrap();
        assert_eq!(process.state(), ProcessState::Failed);
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_env_override_reaches_child() {
        let mut env = HashMap::new();
        env.insert("DEVSERVE_TEST_PORT".to_string(), "3999".to_string());
        let command = vec![
            "sh".to_string(),
            "-c".to_string(),
            "test \"$DEVSERVE_TEST_PORT\" = 3999".to_string(),
        ];
        let mut process = ManagedProcess::spawn("env-check", &command, &env).unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while process.is_running() {
            assert!(tokio::time::Instant::now() < deadline, "child never exited");
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        // `test` exits 0 only when the override was visible
        assert!(process.exit_status().map(|s| s.success()).unwrap_or(false));
    }
}
