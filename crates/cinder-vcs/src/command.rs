//! Running VCS command-line clients.
//!
//! Each invocation gets explicit argument arrays (never a shell string) and a
//! scratch file that collects stderr for the duration of the command. The
//! file is removed once the command has finished, after its content has been
//! folded into the returned error.

use cinder_core::{Error, Result};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Name of the scratch file that collects VCS stderr inside the project dir.
pub const ERROR_LOG_FILE: &str = "source_control.err";

// Prefixes VCS clients put on their real diagnostics, as opposed to progress
// chatter ("Cloning into ...", "remote: Counting objects").
const DIAGNOSTIC_PREFIXES: &[&str] = &["fatal:", "error:", "svn: e", "svn:"];

/// Run `program args...` in `cwd` and return its stdout.
///
/// Non-zero exit becomes [`Error::VcsCommand`] carrying the most specific
/// diagnostic line found on stderr.
pub async fn run(program: &str, args: &[&str], cwd: &Path, scratch_dir: &Path) -> Result<String> {
    let err_path = scratch_dir.join(ERROR_LOG_FILE);
    let err_file = std::fs::File::create(&err_path).map_err(|e| Error::io(&err_path, e))?;

    debug!(program, ?args, cwd = %cwd.display(), "Running VCS command");

    let spawned = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::from(err_file))
        .kill_on_drop(true)
        .spawn();

    let child = match spawned {
        Ok(child) => child,
        Err(e) => {
            remove_scratch(&err_path);
            return Err(match e.kind() {
                std::io::ErrorKind::NotFound => Error::ToolNotFound(program.to_string()),
                _ => Error::Internal(format!("failed to run {}: {}", program, e)),
            });
        }
    };

    let output = child.wait_with_output().await;
    let stderr = std::fs::read(&err_path)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default();
    remove_scratch(&err_path);

    let output = output.map_err(|e| Error::Internal(format!("failed to wait for {}: {}", program, e)))?;

    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }

    let diagnostic = most_specific_diagnostic(&stderr).unwrap_or_else(|| match output.status.code() {
        Some(code) => format!("exited with status {}", code),
        None => "terminated by signal".to_string(),
    });
    warn!(program, ?args, diagnostic = %diagnostic, "VCS command failed");

    Err(Error::VcsCommand {
        command: format!("{} {}", program, args.join(" ")),
        diagnostic,
    })
}

fn remove_scratch(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove VCS error log");
        }
    }
}

/// Pick the single most useful line from a VCS client's stderr.
///
/// Best effort: the first line carrying a known diagnostic prefix wins;
/// otherwise the last non-empty line. Banner lines vary between client
/// versions, so no fixed line index is assumed.
pub fn most_specific_diagnostic(stderr: &str) -> Option<String> {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    lines
        .iter()
        .find(|line| {
            let lower = line.to_lowercase();
            DIAGNOSTIC_PREFIXES.iter().any(|p| lower.starts_with(p))
        })
        .or_else(|| lines.last())
        .map(|line| line.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_skips_banner() {
        let stderr = "Cloning into 'work'...\nfatal: repository '/nope' does not exist\n";
        assert_eq!(
            most_specific_diagnostic(stderr).as_deref(),
            Some("fatal: repository '/nope' does not exist")
        );
    }

    #[test]
    fn test_diagnostic_svn_error_code() {
        let stderr = "svn: E170013: Unable to connect to a repository at URL 'svn://nope'\nsvn: E000111: Can't connect to host 'nope': Connection refused\n";
        assert_eq!(
            most_specific_diagnostic(stderr).as_deref(),
            Some("svn: E170013: Unable to connect to a repository at URL 'svn://nope'")
        );
    }

    #[test]
    fn test_diagnostic_falls_back_to_last_line() {
        let stderr = "\nsomething odd happened\n  and then this  \n\n";
        assert_eq!(
            most_specific_diagnostic(stderr).as_deref(),
            Some("and then this")
        );
        assert_eq!(most_specific_diagnostic("   \n"), None);
    }

    #[tokio::test]
    async fn test_failed_command_removes_scratch_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = run("sh", &["-c", "echo 'fatal: nope' >&2; exit 3"], dir.path(), dir.path()).await;

        match result {
            Err(Error::VcsCommand { diagnostic, .. }) => assert_eq!(diagnostic, "fatal: nope"),
            other => panic!("expected VcsCommand error, got {:?}", other),
        }
        assert!(!dir.path().join(ERROR_LOG_FILE).exists());
    }

    #[tokio::test]
    async fn test_successful_command_returns_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let out = run("sh", &["-c", "echo hello; echo noise >&2"], dir.path(), dir.path())
            .await
            .unwrap();
        assert_eq!(out.trim(), "hello");
        assert!(!dir.path().join(ERROR_LOG_FILE).exists());
    }

    #[tokio::test]
    async fn test_missing_tool() {
        let dir = tempfile::tempdir().unwrap();
        let result = run("cinder-no-such-vcs", &[], dir.path(), dir.path()).await;
        assert!(matches!(result, Err(Error::ToolNotFound(_))));
    }
}
