//! CLI command implementations.

pub mod projects;
pub mod serve;

use anyhow::{Context, Result};
use cinder_config::ServerConfig;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "cinder.kdl";

/// Resolve server configuration: an explicit file, else `cinder.kdl` in the
/// current directory if present, else defaults. `--builds-root` wins over
/// the file.
pub fn server_config(path: Option<&Path>, builds_root: Option<PathBuf>) -> Result<ServerConfig> {
    let mut config = match path {
        Some(path) => cinder_config::load_server_config(path)
            .with_context(|| format!("Failed to load server config: {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
            cinder_config::load_server_config(Path::new(DEFAULT_CONFIG_FILE))
                .context("Failed to load cinder.kdl")?
        }
        None => ServerConfig::default(),
    };

    if let Some(root) = builds_root {
        config.builds_root = root;
    }
    Ok(config)
}

pub fn parse_log(path: &Path) -> Result<()> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read log: {}", path.display()))?;
    let output = String::from_utf8_lossy(&bytes);
    let errors = cinder_core::log_parser::parse(&output);

    if errors.is_empty() {
        println!("No test errors found");
        return Ok(());
    }

    for (idx, entry) in errors.iter().enumerate() {
        println!("{}) {} in {}", idx + 1, entry.kind, entry.test_name);
        println!("   {}", entry.message);
        for line in entry.stacktrace.lines() {
            println!("     {}", line.trim());
        }
    }
    println!("\n{} test error(s)", errors.len());
    Ok(())
}

pub fn validate(path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    match cinder_config::parse_project(&content) {
        Ok(settings) => {
            println!("Configuration is valid");
            println!(
                "  {} {}",
                settings.source_control.kind(),
                settings.source_control.repository()
            );
            println!("  build command: {}", settings.build_command);
            Ok(())
        }
        Err(e) => {
            println!("Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}
