//! # devserve-common
//!
//! Shared error and result types used by every devserve crate.

pub mod errors;

pub use errors::{SupervisorError, SupervisorResult};
