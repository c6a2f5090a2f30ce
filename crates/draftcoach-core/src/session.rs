// Session identity shared by both controllers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authority-assigned identifier for one draft instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        SessionId(id.into())
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

/// Delivery mode of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// One-way push replay of a historical draft.
    Stream,
    /// Two-way turn protocol against a simulated opponent.
    Negotiation,
}

/// One live draft instance, owned by exactly one controller.
///
/// Lifecycle status lives on the controller that owns the session, since
/// the two modes have different state machines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub mode: SessionMode,
    pub started_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: SessionId, mode: SessionMode) -> Self {
        Session {
            id,
            mode,
            started_at: Utc::now(),
        }
    }
}
