//! Source control revisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable point in a project's version-control history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    /// VCS-specific identifier (commit hash, svn revision number).
    pub number: String,
    /// Who committed it.
    pub committed_by: String,
    /// When it was committed.
    pub time: DateTime<Utc>,
    /// Changelog between the last built revision and this one.
    pub message: String,
}

impl Revision {
    pub fn new(
        number: impl Into<String>,
        committed_by: impl Into<String>,
        time: DateTime<Utc>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            number: number.into(),
            committed_by: committed_by.into(),
            time,
            message: message.into(),
        }
    }

    /// Abbreviated identifier used for labels and display. Hashes are cut to
    /// 7 characters; short ids (svn revision numbers) are returned whole.
    pub fn short_id(&self) -> &str {
        match self.number.char_indices().nth(7) {
            Some((idx, _)) => &self.number[..idx],
            None => &self.number,
        }
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} by {}", self.short_id(), self.committed_by)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id() {
        let rev = Revision::new("abc1234567890def", "dev", Utc::now(), "");
        assert_eq!(rev.short_id(), "abc1234");

        let svn = Revision::new("1042", "dev", Utc::now(), "");
        assert_eq!(svn.short_id(), "1042");
    }
}
