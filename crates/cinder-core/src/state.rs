//! Project builder states.

use serde::{Deserialize, Serialize};

/// Where a project is in its poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectState {
    /// Waiting for the next poll.
    #[default]
    Idle,
    /// Asking source control for new revisions.
    Checking,
    /// Running the build command.
    Building,
    /// Recording the build result.
    Publishing,
}

impl ProjectState {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: ProjectState) -> bool {
        use ProjectState::*;
        matches!(
            (self, next),
            (Idle, Checking)
                | (Checking, Idle)
                | (Checking, Building)
                | (Building, Publishing)
                | (Publishing, Idle)
        )
    }
}

impl std::fmt::Display for ProjectState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectState::Idle => write!(f, "idle"),
            ProjectState::Checking => write!(f, "checking"),
            ProjectState::Building => write!(f, "building"),
            ProjectState::Publishing => write!(f, "publishing"),
        }
    }
}

impl std::str::FromStr for ProjectState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "idle" => Ok(ProjectState::Idle),
            "checking" => Ok(ProjectState::Checking),
            "building" => Ok(ProjectState::Building),
            "publishing" => Ok(ProjectState::Publishing),
            _ => Err(format!("Unknown project state: {}", s)),
        }
    }
}
