//! Process state machine.
//!
//! A supervised child moves through a small, validated set of states. Stop is
//! only ever initiated by the orchestrator; an exit observed while the state
//! is `Running` or `Starting` means the child died on its own and the state
//! becomes `Failed`.

use chrono::{DateTime, Utc};
use devserve_common::{SupervisorError, SupervisorResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Process state enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
    /// Process is not yet started
    Stopped,
    /// Process is in the process of starting
    Starting,
    /// Process is running normally
    Running,
    /// Process is in the process of stopping
    Stopping,
    /// Process exited on its own before being told to stop
    Failed,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::Stopped => write!(f, "stopped"),
            ProcessState::Starting => write!(f, "starting"),
            ProcessState::Running => write!(f, "running"),
            ProcessState::Stopping => write!(f, "stopping"),
            ProcessState::Failed => write!(f, "failed"),
        }
    }
}

impl ProcessState {
    /// Check if the process is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessState::Stopped | ProcessState::Failed)
    }

    /// Check if the process is active (running or transitional).
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

/// Represents a state transition with timestamp and optional reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from_state: ProcessState,
    pub to_state: ProcessState,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

/// State machine that validates transitions between process states.
#[derive(Debug, Clone)]
pub struct ProcessStateMachine {
    process_name: String,
    current_state: ProcessState,
    state_history: Vec<StateTransition>,
}

impl ProcessStateMachine {
    /// Create a new state machine for a process.
    pub fn new(process_name: &str) -> Self {
        Self {
            process_name: process_name.to_string(),
            current_state: ProcessState::Stopped,
            state_history: Vec::new(),
        }
    }

    /// Get the current state.
    pub fn current_state(&self) -> ProcessState {
        self.current_state
    }

    /// Get the state history.
    pub fn state_history(&self) -> &[StateTransition] {
        &self.state_history
    }

    /// Check if a transition from the current state to the target is valid.
    pub fn is_valid_transition(&self, target_state: ProcessState) -> bool {
        match (self.current_state, target_state) {
            (ProcessState::Stopped, ProcessState::Starting) => true,

            (ProcessState::Starting, ProcessState::Running) => true,
            (ProcessState::Starting, ProcessState::Failed) => true,
            (ProcessState::Starting, ProcessState::Stopping) => true, // Cancel startup

            (ProcessState::Running, ProcessState::Stopping) => true,
            (ProcessState::Running, ProcessState::Failed) => true,

            (ProcessState::Stopping, ProcessState::Stopped) => true,
            (ProcessState::Stopping, ProcessState::Failed) => true,

            // Same state (no-op)
            (state, target) if state == target => true,

            _ => false,
        }
    }

    /// Transition to a new state with optional reason.
    pub fn transition_to(
        &mut self,
        target_state: ProcessState,
        reason: Option<String>,
    ) -> SupervisorResult<()> {
        if !self.is_valid_transition(target_state) {
            return Err(SupervisorError::invalid_state(
                &self.process_name,
                format!("{:?}", target_state),
                format!("{:?}", self.current_state),
            ));
        }

        let transition = StateTransition {
            from_state: self.current_state,
            to_state: target_state,
            timestamp: Utc::now(),
            reason,
        };

        tracing::debug!(
            "Process {} transitioned from {} to {}",
            self.process_name,
            self.current_state,
            target_state
        );

        self.current_state = target_state;
        self.state_history.push(transition);

        Ok(())
    }

    pub fn transition_to_starting(&mut self) -> SupervisorResult<()> {
        self.transition_to(ProcessState::Starting, Some("start requested".to_string()))
    }

    pub fn transition_to_running(&mut self) -> SupervisorResult<()> {
        self.transition_to(ProcessState::Running, Some("spawned".to_string()))
    }

    pub fn transition_to_stopping(&mut self) -> SupervisorResult<()> {
        self.transition_to(ProcessState::Stopping, Some("stop requested".to_string()))
    }

    pub fn transition_to_stopped(&mut self) -> SupervisorResult<()> {
        self.transition_to(ProcessState::Stopped, Some("stopped".to_string()))
    }

    pub fn transition_to_failed(&mut self, reason: String) -> SupervisorResult<()> {
        self.transition_to(ProcessState::Failed, Some(reason))
    }

    /// Check if the process can be stopped.
    pub fn can_stop(&self) -> bool {
        matches!(
            self.current_state,
            ProcessState::Running | ProcessState::Starting
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_lifecycle() {
        let mut sm = ProcessStateMachine::new("test-process");
        assert_eq!(sm.current_state(), ProcessState::Stopped);

        assert!(sm.transition_to_starting().is_ok());
        assert!(sm.transition_to_running().is_ok());
        assert!(sm.transition_to_stopping().is_ok());
        assert!(sm.transition_to_stopped().is_ok());

        assert_eq!(sm.state_history().len(), 4);
        assert_eq!(sm.state_history()[0].from_state, ProcessState::Stopped);
        assert_eq!(sm.state_history()[3].to_state, ProcessState::Stopped);
    }

    #[test]
    fn test_unexpected_exit_becomes_failed() {
        let mut sm = ProcessStateMachine::new("test-process");
        sm.transition_to_starting().unwrap();
        sm.transition_to_running().unwrap();

        assert!(sm
            .transition_to_failed("exited with code 1".to_string())
            .is_ok());
        assert_eq!(sm.current_state(), ProcessState::Failed);
        assert!(sm.current_state().is_terminal());
    }

    #[test]
    fn test_invalid_transitions() {
        let mut sm = ProcessStateMachine::new("test-process");

        // Stopped -> Running (invalid, must go through Starting)
        assert!(!sm.is_valid_transition(ProcessState::Running));
        assert!(sm.transition_to(ProcessState::Running, None).is_err());

        // Stopped -> Stopping (invalid)
        assert!(sm.transition_to(ProcessState::Stopping, None).is_err());
    }

    #[test]
    fn test_can_stop() {
        let mut sm = ProcessStateMachine::new("test-process");
        assert!(!sm.can_stop());

        sm.transition_to_starting().unwrap();
        sm.transition_to_running().unwrap();
        assert!(sm.can_stop());

        sm.transition_to_stopping().unwrap();
        sm.transition_to_stopped().unwrap();
        assert!(!sm.can_stop());
    }
}
