//! Build execution backends for the Cinder build server.
//!
//! Provides runner implementations for build commands:
//! - Local processes through `sh -c`

pub mod local;

pub use cinder_core::runner::{BuildOutcome, BuildRunner, BuildSpec};
pub use local::LocalProcessRunner;
