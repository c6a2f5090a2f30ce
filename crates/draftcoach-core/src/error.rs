// Error taxonomy for calls against the draft authority.

use thiserror::Error;

/// Failure of one request or subscription against the authority.
///
/// Carries rendered messages rather than source errors so results can be
/// cloned into controller events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorityError {
    #[error("network error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    /// The authority understood the request and refused it (illegal
    /// action, unknown session, wrong phase). The message is the
    /// authority's own and is shown to the user as-is.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected response from authority: {0}")]
    Decode(String),

    #[error("subscription closed: {0}")]
    Closed(String),

    /// Refused locally before anything was sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl AuthorityError {
    /// Business-rule rejection: the session stays as it was.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AuthorityError::Rejected { .. } | AuthorityError::InvalidRequest(_)
        )
    }

    /// Network-level failure that may succeed if tried again.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AuthorityError::Transport(_) | AuthorityError::Timeout | AuthorityError::Closed(_)
        )
    }
}
