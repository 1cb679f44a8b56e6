//! Loadout, run, and practice-session identity types.
//!
//! A loadout has two identities: the surrogate `LoadoutId` assigned by the
//! store, and the `LoadoutUuid` that survives renames and re-imports.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Surrogate key of a stored loadout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoadoutId(pub i64);

impl fmt::Display for LoadoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for LoadoutId {
    fn from(id: i64) -> Self {
        LoadoutId(id)
    }
}

/// Surrogate key of a recorded run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub i64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RunId {
    fn from(id: i64) -> Self {
        RunId(id)
    }
}

/// Stable loadout identity (random v4 UUID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoadoutUuid(pub uuid::Uuid);

impl LoadoutUuid {
    /// Generate a fresh identity.
    pub fn new() -> Self {
        LoadoutUuid(uuid::Uuid::new_v4())
    }

    /// Parse a hyphenated UUID string.
    pub fn parse(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s).ok().map(LoadoutUuid)
    }
}

impl Default for LoadoutUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LoadoutUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for LoadoutUuid {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s).map(LoadoutUuid)
    }
}

/// Practice session ID, recorded in the session marker.
///
/// Format: `prac-<date>-<time>-<random>`
/// Example: `prac-20260115-143022-abc123`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PracticeSessionId(pub String);

impl PracticeSessionId {
    /// Generate a new session ID.
    pub fn new() -> Self {
        let now = chrono::Utc::now();
        let random: String = uuid::Uuid::new_v4()
            .to_string()
            .chars()
            .take(6)
            .collect();
        PracticeSessionId(format!("prac-{}-{}", now.format("%Y%m%d-%H%M%S"), random))
    }

    /// Parse an existing session ID string.
    pub fn parse(s: &str) -> Option<Self> {
        if s.starts_with("prac-") && s.len() > 20 {
            Some(PracticeSessionId(s.to_string()))
        } else {
            None
        }
    }
}

impl Default for PracticeSessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PracticeSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
