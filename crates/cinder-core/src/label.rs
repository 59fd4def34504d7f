//! Build labels.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Identifies one build within a project's history.
///
/// Labels are derived from the revision being built. A second build of the
/// same revision gets a numeric suffix (`abc1234.1`, `abc1234.2`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{_0}")]
#[serde(transparent)]
pub struct BuildLabel(String);

impl BuildLabel {
    /// Pick the label for a new build of `revision`, given the labels already
    /// in use.
    pub fn next<'a>(revision: &str, existing: impl IntoIterator<Item = &'a BuildLabel>) -> Self {
        let taken: Vec<&str> = existing.into_iter().map(BuildLabel::as_str).collect();
        if !taken.contains(&revision) {
            return Self(revision.to_string());
        }

        let mut rebuild = 1u32;
        loop {
            let candidate = format!("{revision}.{rebuild}");
            if !taken.contains(&candidate.as_str()) {
                return Self(candidate);
            }
            rebuild += 1;
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The revision part of the label, without any rebuild suffix.
    pub fn revision(&self) -> &str {
        match self.0.rsplit_once('.') {
            Some((rev, suffix)) if suffix.chars().all(|c| c.is_ascii_digit()) => rev,
            _ => &self.0,
        }
    }
}

impl From<String> for BuildLabel {
    fn from(label: String) -> Self {
        Self(label)
    }
}

impl From<&str> for BuildLabel {
    fn from(label: &str) -> Self {
        Self(label.to_string())
    }
}
