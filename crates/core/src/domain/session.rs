use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::invocation::Invocation;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// What the dispatcher hands to conversation state; the store stamps ordering.
#[derive(Clone, Debug, PartialEq)]
pub struct TurnRecord {
    pub instruction: String,
    pub invocation: Invocation,
    pub contacts: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub session_id: SessionId,
    /// Per-session logical timestamp, strictly increasing.
    pub sequence: u64,
    pub recorded_at: DateTime<Utc>,
    pub instruction: String,
    pub invocation: Invocation,
    #[serde(default)]
    pub contacts: Vec<String>,
}
