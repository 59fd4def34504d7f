//! KDL configuration for the Cinder build server.
//!
//! This crate handles parsing of:
//! - Project metadata (`project.kdl`, the project marker file)
//! - Server configuration

pub mod error;
mod nodes;
pub mod project;
pub mod system;

pub use error::{ConfigError, ConfigResult};
pub use project::{
    DEFAULT_BUILD_COMMAND, PROJECT_FILE, ProjectSettings, load_project, parse_project,
    render_project, save_project,
};
pub use system::{ServerConfig, load_server_config, parse_server_config};
