//! Server configuration parsing.
//!
//! ```kdl
//! builds-root "/var/lib/cinder/projects"
//! poll-interval 30
//! request-check-interval 5
//! ```

use kdl::KdlDocument;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::nodes::{require_seconds_arg, require_string_arg};
use crate::{ConfigError, ConfigResult};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_REQUEST_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Server-wide configuration, passed explicitly to the registry and scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Directory holding one subdirectory per project.
    pub builds_root: PathBuf,
    /// How often each project asks source control for new revisions.
    pub poll_interval: Duration,
    /// How often each project looks for a force-build request between polls.
    pub request_check_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            builds_root: PathBuf::from("projects"),
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_check_interval: DEFAULT_REQUEST_CHECK_INTERVAL,
        }
    }
}

impl ServerConfig {
    pub fn with_builds_root(builds_root: impl Into<PathBuf>) -> Self {
        Self {
            builds_root: builds_root.into(),
            ..Self::default()
        }
    }
}

/// Parse server configuration from KDL text. Missing values take defaults.
pub fn parse_server_config(kdl: &str) -> ConfigResult<ServerConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = ServerConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "builds-root" => {
                config.builds_root = PathBuf::from(require_string_arg(node, "builds-root")?);
            }
            "poll-interval" => {
                config.poll_interval = require_seconds_arg(node, "poll-interval")?;
            }
            "request-check-interval" => {
                config.request_check_interval =
                    require_seconds_arg(node, "request-check-interval")?;
            }
            _ => {}
        }
    }

    Ok(config)
}

/// Read server configuration from a file.
pub fn load_server_config(path: &Path) -> ConfigResult<ServerConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
    parse_server_config(&content)
}
