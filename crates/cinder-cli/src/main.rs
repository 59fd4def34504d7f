//! Cinder CLI tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "cinder")]
#[command(about = "Cinder continuous integration server", long_about = None)]
struct Cli {
    /// Server configuration file
    #[arg(long, global = true, env = "CINDER_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding one subdirectory per project
    #[arg(long, global = true, env = "CINDER_BUILDS_ROOT")]
    builds_root: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll and build every project until interrupted
    Serve {
        /// Seconds between source control polls
        #[arg(
            long,
            env = "CINDER_POLL_INTERVAL",
            value_parser = clap::value_parser!(u64).range(1..)
        )]
        poll_interval: Option<u64>,
        /// Seconds between checks for build requests
        #[arg(
            long,
            env = "CINDER_REQUEST_CHECK_INTERVAL",
            value_parser = clap::value_parser!(u64).range(1..)
        )]
        request_check_interval: Option<u64>,
    },
    /// Register a project and check out its working copy
    Add {
        /// Project name (also its directory name)
        name: String,
        /// Repository URL
        #[arg(long)]
        url: String,
        /// Source control system
        #[arg(long, default_value = "git")]
        vcs: String,
        /// Branch to track (git only)
        #[arg(long)]
        branch: Option<String>,
        /// Build command
        #[arg(long)]
        command: Option<String>,
    },
    /// Unregister a project and delete its directory
    Remove {
        /// Project name
        name: String,
    },
    /// List projects
    List,
    /// Show a project and its recent builds
    Show {
        /// Project name
        name: String,
        /// Maximum number of builds to show
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// Request a build on the next poll
    Build {
        /// Project name
        name: String,
    },
    /// Print the test errors found in a build log
    ParseLog {
        /// Path to the log file
        path: PathBuf,
    },
    /// Validate a project configuration
    Validate {
        /// Path to the configuration file
        #[arg(default_value = "project.kdl")]
        path: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let mut config = commands::server_config(cli.config.as_deref(), cli.builds_root)?;

    match cli.command {
        Commands::Serve {
            poll_interval,
            request_check_interval,
        } => {
            if let Some(secs) = poll_interval {
                config.poll_interval = std::time::Duration::from_secs(secs);
            }
            if let Some(secs) = request_check_interval {
                config.request_check_interval = std::time::Duration::from_secs(secs);
            }
            commands::serve::run(config).await?;
        }
        Commands::Add {
            name,
            url,
            vcs,
            branch,
            command,
        } => {
            commands::projects::add(&config, &name, &url, &vcs, branch, command).await?;
        }
        Commands::Remove { name } => {
            commands::projects::remove(&config, &name).await?;
        }
        Commands::List => {
            commands::projects::list(&config).await?;
        }
        Commands::Show { name, limit } => {
            commands::projects::show(&config, &name, limit, cli.json).await?;
        }
        Commands::Build { name } => {
            commands::projects::build(&config, &name)?;
        }
        Commands::ParseLog { path } => {
            commands::parse_log(&path)?;
        }
        Commands::Validate { path } => {
            commands::validate(&path)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_rejects_zero_intervals() {
        assert!(Cli::try_parse_from(["cinder", "serve", "--poll-interval", "0"]).is_err());
        assert!(Cli::try_parse_from(["cinder", "serve", "--request-check-interval", "0"]).is_err());
    }

    #[test]
    fn test_serve_accepts_positive_intervals() {
        let cli = Cli::try_parse_from([
            "cinder",
            "serve",
            "--poll-interval",
            "30",
            "--request-check-interval",
            "1",
        ])
        .unwrap();
        match cli.command {
            Commands::Serve {
                poll_interval,
                request_check_interval,
            } => {
                assert_eq!(poll_interval, Some(30));
                assert_eq!(request_check_interval, Some(1));
            }
            _ => panic!("expected serve"),
        }
    }
}
