//! # devserve-process
//!
//! Child process lifecycle management:
//! - `ManagedProcess`: spawn with environment overrides, liveness queries,
//!   graceful-then-forced stop
//! - Validated process state machine with timestamped transitions
//! - Cross-platform termination primitives
//! - Background draining of child stdout/stderr as prefixed line streams
//!
//! The supervisor owns exactly one `ManagedProcess` per child; the output
//! drainer tasks own the pipe handles and nothing else.

pub mod output;
pub mod state;
pub mod supervisor;
pub mod terminate;

pub use output::StreamType;
pub use state::{ProcessState, ProcessStateMachine, StateTransition};
pub use supervisor::ManagedProcess;
pub use terminate::{force_kill, process_exists, terminate_gracefully};
