//! Core domain types and traits for the Cinder build server.
//!
//! This crate contains:
//! - Revision and build records
//! - Build labels and project states
//! - The source control and build runner traits
//! - The test output parser

pub mod build;
pub mod error;
pub mod label;
pub mod log_parser;
pub mod revision;
pub mod runner;
pub mod source_control;
pub mod state;

pub use build::{Build, BuildStatus, TestErrorEntry, TestErrorKind};
pub use error::{Error, Result};
pub use label::BuildLabel;
pub use revision::Revision;
pub use runner::{BuildOutcome, BuildRunner, BuildSpec};
pub use source_control::{SourceControl, SourceControlConfig, VcsKind};
pub use state::ProjectState;
