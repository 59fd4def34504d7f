//! Append-only build history.
//!
//! Each finished build is one JSON line in `<project>/history.jsonl`. Loading
//! replays the file in order; lines that do not parse are skipped.

use cinder_core::Build;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{ProjectError, Result};

pub const HISTORY_FILE: &str = "history.jsonl";

#[derive(Debug)]
pub struct BuildHistory {
    path: PathBuf,
    builds: Vec<Build>,
}

impl BuildHistory {
    /// An empty history stored in `project_dir`.
    pub fn empty(project_dir: &Path) -> Self {
        Self {
            path: project_dir.join(HISTORY_FILE),
            builds: Vec::new(),
        }
    }

    /// Replay the history file of `project_dir`. A missing file is an empty
    /// history.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join(HISTORY_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(ProjectError::io(&path, e)),
        };

        let mut builds = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Build>(line) {
                Ok(build) => builds.push(build),
                Err(e) => {
                    warn!(path = %path.display(), line = idx + 1, error = %e, "Skipping corrupt build record");
                }
            }
        }

        Ok(Self { path, builds })
    }

    /// Record a finished build. Running builds are never written.
    pub fn append(&mut self, build: Build) -> Result<()> {
        if !build.is_complete() {
            return Err(cinder_core::Error::InvalidInput(format!(
                "build {} is still running",
                build.label
            ))
            .into());
        }

        let record = serde_json::to_string(&build).map_err(|e| ProjectError::History {
            path: self.path.clone(),
            source: e,
        })?;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| ProjectError::io(&self.path, e))?;

        // A torn last line from an interrupted write must not swallow this record.
        let mut line = String::with_capacity(record.len() + 2);
        if !ends_with_newline(&mut file).map_err(|e| ProjectError::io(&self.path, e))? {
            warn!(path = %self.path.display(), "Terminating partial build record");
            line.push('\n');
        }
        line.push_str(&record);
        line.push('\n');

        file.write_all(line.as_bytes())
            .and_then(|_| file.sync_data())
            .map_err(|e| ProjectError::io(&self.path, e))?;

        self.builds.push(build);
        Ok(())
    }

    /// All recorded builds, oldest first.
    pub fn builds(&self) -> &[Build] {
        &self.builds
    }

    /// The most recent build that reached a terminal status.
    pub fn last_complete(&self) -> Option<&Build> {
        self.builds.iter().rev().find(|b| b.is_complete())
    }

    pub fn len(&self) -> usize {
        self.builds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builds.is_empty()
    }
}

// Empty files count as terminated.
fn ends_with_newline(file: &mut std::fs::File) -> std::io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cinder_core::{BuildLabel, BuildStatus, Revision};

    fn finished(label: &str, status: BuildStatus) -> Build {
        let revision = Revision::new(label, "dev", Utc::now(), "msg");
        let mut build = Build::start(BuildLabel::from(label), revision);
        build.finish(status, format!("output of {label}"), vec![]);
        build
    }

    #[test]
    fn test_append_and_replay() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = BuildHistory::load(dir.path()).unwrap();
        assert!(history.is_empty());

        history.append(finished("aaa", BuildStatus::Success)).unwrap();
        history.append(finished("bbb", BuildStatus::Failure)).unwrap();

        let replayed = BuildHistory::load(dir.path()).unwrap();
        let labels: Vec<&str> = replayed.builds().iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["aaa", "bbb"]);
        assert_eq!(replayed.last_complete().unwrap().status, BuildStatus::Failure);
        assert_eq!(replayed.builds()[0].output, "output of aaa");
    }

    #[test]
    fn test_running_build_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = BuildHistory::empty(dir.path());
        let running = Build::start(
            BuildLabel::from("ccc"),
            Revision::new("ccc", "dev", Utc::now(), ""),
        );
        assert!(history.append(running).is_err());
        assert!(history.is_empty());
        assert!(!dir.path().join(HISTORY_FILE).exists());
    }

    #[test]
    fn test_append_after_torn_record_keeps_new_build() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = BuildHistory::empty(dir.path());
        history.append(finished("aaa", BuildStatus::Success)).unwrap();

        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join(HISTORY_FILE))
            .unwrap();
        write!(file, "{{\"label\":\"half").unwrap();
        drop(file);

        history.append(finished("bbb", BuildStatus::Failure)).unwrap();

        let replayed = BuildHistory::load(dir.path()).unwrap();
        let labels: Vec<&str> = replayed.builds().iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["aaa", "bbb"]);
    }

    #[test]
    fn test_corrupt_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = BuildHistory::empty(dir.path());
        history.append(finished("aaa", BuildStatus::Success)).unwrap();

        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join(HISTORY_FILE))
            .unwrap();
        writeln!(file, "{{ this is not json").unwrap();
        drop(file);

        history.append(finished("bbb", BuildStatus::Error)).unwrap();

        let replayed = BuildHistory::load(dir.path()).unwrap();
        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed.last_complete().unwrap().label.as_str(), "bbb");
    }
}
