// Best-effort commentary side channel.
//
// A fetch is never aborted once issued: commentary is expensive to
// generate and the authority finishes it even if we stop caring. Instead,
// each fetch gets a request id and only the most recent one may land. Its
// result is then checked against the displayed action count, so commentary
// for a turn that has already passed is dropped.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use draftcoach_client::DraftAuthority;
use draftcoach_core::draft::recommendation::Commentary;
use draftcoach_core::error::AuthorityError;
use draftcoach_core::session::SessionId;
use draftcoach_core::sync::StalenessGuard;

/// Completion of one commentary fetch.
#[derive(Debug, Clone)]
pub struct InsightEvent {
    pub request_id: u64,
    pub session_id: SessionId,
    pub action_count: u32,
    pub result: Result<Commentary, AuthorityError>,
}

/// What the side channel has to show for a given action count.
#[derive(Debug, Clone, PartialEq)]
pub enum InsightOutcome {
    Ready(Commentary),
    /// The fetch failed. Never blocks the turn protocol.
    Unavailable { action_count: u32, reason: String },
}

impl InsightOutcome {
    pub fn action_count(&self) -> u32 {
        match self {
            InsightOutcome::Ready(c) => c.action_count,
            InsightOutcome::Unavailable { action_count, .. } => *action_count,
        }
    }
}

#[derive(Debug, Default)]
pub struct InsightFetcher {
    latest_request: u64,
    loading: bool,
    outcome: Option<InsightOutcome>,
}

impl InsightFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fetch for `action_count`, superseding any earlier one. The
    /// completion is delivered through `tx` as an [`InsightEvent`].
    pub fn fetch<E>(
        &mut self,
        authority: Arc<dyn DraftAuthority>,
        session_id: SessionId,
        action_count: u32,
        api_key: Option<String>,
        tx: mpsc::Sender<E>,
    ) where
        E: From<InsightEvent> + Send + 'static,
    {
        self.latest_request += 1;
        self.loading = true;
        let request_id = self.latest_request;
        info!(
            "Requesting commentary for {} at action {} (request {})",
            session_id, action_count, request_id
        );

        tokio::spawn(async move {
            let result = authority
                .fetch_insight(&session_id, action_count, api_key.as_deref())
                .await;
            let event = InsightEvent {
                request_id,
                session_id,
                action_count,
                result,
            };
            let _ = tx.send(E::from(event)).await;
        });
    }

    /// Apply a completion. Returns `true` if anything visible changed.
    pub fn handle(&mut self, event: InsightEvent, guard: StalenessGuard<'_>) -> bool {
        if event.request_id != self.latest_request {
            debug!(
                "Discarding superseded commentary (request {}, latest {})",
                event.request_id, self.latest_request
            );
            return false;
        }
        self.loading = false;

        let verdict = guard.check_current(&event.session_id, event.action_count);
        if !verdict.is_accept() {
            debug!(
                "Discarding commentary for action {}: {}",
                event.action_count, verdict
            );
            return true;
        }

        self.outcome = Some(match event.result {
            Ok(commentary) => InsightOutcome::Ready(commentary),
            Err(e) => {
                warn!("Commentary unavailable for action {}: {}", event.action_count, e);
                InsightOutcome::Unavailable {
                    action_count: event.action_count,
                    reason: e.to_string(),
                }
            }
        });
        true
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// The outcome, if it describes the displayed action count.
    pub fn current(&self, displayed: u32) -> Option<&InsightOutcome> {
        self.outcome
            .as_ref()
            .filter(|o| o.action_count() == displayed)
    }

    /// Forget everything and make any fetch still in flight land as
    /// superseded.
    pub fn reset(&mut self) {
        self.latest_request += 1;
        self.loading = false;
        self.outcome = None;
    }
}
