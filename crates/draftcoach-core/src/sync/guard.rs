// Staleness guard: decides whether an asynchronous response may touch the
// displayed state.
//
// Responses are applied in arrival order, not issue order, so two requests
// in flight can resolve backwards. The guard compares the session id and
// action count a response carries against what is on screen right now.
// It is a pure function: callers log the verdict and drop rejected
// responses silently.

use std::fmt;

use crate::session::SessionId;

/// Outcome of checking one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    /// Describes a state version that is not the one required.
    Stale { incoming: u32, displayed: u32 },
    /// Belongs to a session other than the active one.
    ForeignSession,
    /// No session is active.
    NoSession,
}

impl Verdict {
    pub fn is_accept(self) -> bool {
        self == Verdict::Accept
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Accept => f.write_str("accepted"),
            Verdict::Stale {
                incoming,
                displayed,
            } => write!(f, "stale (incoming {incoming}, displayed {displayed})"),
            Verdict::ForeignSession => f.write_str("foreign session"),
            Verdict::NoSession => f.write_str("no active session"),
        }
    }
}

/// Snapshot of what is displayed, against which responses are checked.
#[derive(Debug, Clone, Copy)]
pub struct StalenessGuard<'a> {
    active: Option<&'a SessionId>,
    displayed: u32,
}

impl<'a> StalenessGuard<'a> {
    pub fn new(active: Option<&'a SessionId>, displayed: u32) -> Self {
        StalenessGuard { active, displayed }
    }

    /// For state updates: accept only a strictly newer version of the
    /// active session's state.
    pub fn check_newer(&self, session: &SessionId, action_count: u32) -> Verdict {
        match self.check_session(session) {
            Verdict::Accept if action_count > self.displayed => Verdict::Accept,
            Verdict::Accept => Verdict::Stale {
                incoming: action_count,
                displayed: self.displayed,
            },
            other => other,
        }
    }

    /// For turn-specific data (recommendations, commentary): accept only a
    /// result computed for exactly the displayed version.
    pub fn check_current(&self, session: &SessionId, action_count: u32) -> Verdict {
        match self.check_session(session) {
            Verdict::Accept if action_count == self.displayed => Verdict::Accept,
            Verdict::Accept => Verdict::Stale {
                incoming: action_count,
                displayed: self.displayed,
            },
            other => other,
        }
    }

    /// Session-only check, for responses that carry no version.
    pub fn check_session(&self, session: &SessionId) -> Verdict {
        match self.active {
            None => Verdict::NoSession,
            Some(active) if active == session => Verdict::Accept,
            Some(_) => Verdict::ForeignSession,
        }
    }
}
