// The remote contract consumed by the session controllers.
//
// `DraftAuthority` covers every request/response call; `StreamTransport`
// covers the push subscription of a replay. Controllers hold both as
// `Arc<dyn ...>` so the HTTP/WebSocket implementations and the scripted
// stub are interchangeable.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use draftcoach_core::draft::recommendation::{Commentary, RecommendationSet};
use draftcoach_core::draft::state::Side;
use draftcoach_core::error::AuthorityError;
use draftcoach_core::protocol::{
    NegotiationConfig, NegotiationSnapshot, SeriesUpdate, StreamHandle, StreamMessage,
    StreamOptions, StreamTarget, TurnResponse,
};
use draftcoach_core::session::SessionId;

/// Push messages of one replay subscription, in arrival order. The stream
/// ends when the authority closes the subscription.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamMessage, AuthorityError>> + Send>>;

#[async_trait]
pub trait DraftAuthority: Send + Sync {
    /// Create a negotiation session and return its first game's state.
    async fn create_negotiation(
        &self,
        config: &NegotiationConfig,
    ) -> Result<NegotiationSnapshot, AuthorityError>;

    /// Submit the human's ban or pick.
    async fn submit_action(
        &self,
        session: &SessionId,
        champion: &str,
    ) -> Result<TurnResponse, AuthorityError>;

    /// Ask the simulated opponent to act.
    async fn request_opponent_action(
        &self,
        session: &SessionId,
    ) -> Result<TurnResponse, AuthorityError>;

    /// Recommendations for whatever turn the authority considers current.
    async fn fetch_recommendations(
        &self,
        session: &SessionId,
    ) -> Result<RecommendationSet, AuthorityError>;

    /// Commentary for the state at `action_count`. Long-running.
    async fn fetch_insight(
        &self,
        session: &SessionId,
        action_count: u32,
        api_key: Option<&str>,
    ) -> Result<Commentary, AuthorityError>;

    /// Record the winner of the current game.
    async fn record_winner(
        &self,
        session: &SessionId,
        winner: Side,
    ) -> Result<SeriesUpdate, AuthorityError>;

    /// Move the series on to its next game.
    async fn next_game(&self, session: &SessionId) -> Result<NegotiationSnapshot, AuthorityError>;

    /// Delete a negotiation session. Idempotent on the authority side.
    async fn end_session(&self, session: &SessionId) -> Result<(), AuthorityError>;

    /// Create a replay and return where to subscribe for its pushes.
    async fn create_stream(
        &self,
        target: &StreamTarget,
        options: &StreamOptions,
    ) -> Result<StreamHandle, AuthorityError>;

    /// Stop a replay. Idempotent on the authority side.
    async fn stop_stream(&self, session: &SessionId) -> Result<(), AuthorityError>;
}

#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Open the push subscription described by `handle`.
    async fn subscribe(&self, handle: &StreamHandle) -> Result<EventStream, AuthorityError>;
}
