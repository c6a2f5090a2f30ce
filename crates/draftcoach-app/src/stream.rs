// Stream session controller: one-way replay of a historical draft.
//
// `start` creates the replay and opens the push subscription inside one
// task under the current cancellation scope; the task forwards every push
// as a `StreamEvent`. Cancelling the scope drops the subscription. Pushes
// already queued when that happens are rejected by generation in
// `handle_event`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use draftcoach_client::{DraftAuthority, StreamTransport};
use draftcoach_core::draft::action::{Action, ActionHistory};
use draftcoach_core::draft::recommendation::{Commentary, RecommendationSet};
use draftcoach_core::draft::state::{DraftState, TeamInfo};
use draftcoach_core::error::AuthorityError;
use draftcoach_core::protocol::{
    DraftSummary, StreamHandle, StreamMessage, StreamOptions, StreamTarget,
};
use draftcoach_core::session::{Session, SessionId, SessionMode};
use draftcoach_core::sync::{Generation, ScopeLineage, StalenessGuard};

const CLOSED_EARLY: &str = "stream closed before draft completed";

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Idle,
    Connecting,
    Playing,
    Paused,
    Complete,
    Failed,
}

/// Commentary state for one action count.
#[derive(Debug, Clone, PartialEq)]
pub enum CommentarySlot {
    Waiting,
    Ready(Commentary),
    /// Permanently unavailable; never retried.
    TimedOut,
}

impl CommentarySlot {
    fn is_final(&self) -> bool {
        !matches!(self, CommentarySlot::Waiting)
    }
}

/// Commentary keyed by action count. A slot that reached `Ready` or
/// `TimedOut` is never overwritten.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentaryBook {
    slots: BTreeMap<u32, CommentarySlot>,
}

impl CommentaryBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, action_count: u32) -> Option<&CommentarySlot> {
        self.slots.get(&action_count)
    }

    /// Mark a vacant slot as waiting.
    pub fn waiting(&mut self, action_count: u32) -> bool {
        if self.slots.contains_key(&action_count) {
            return false;
        }
        self.slots.insert(action_count, CommentarySlot::Waiting);
        true
    }

    pub fn ready(&mut self, commentary: Commentary) -> bool {
        let count = commentary.action_count;
        self.finalize(count, CommentarySlot::Ready(commentary))
    }

    pub fn time_out(&mut self, action_count: u32) -> bool {
        self.finalize(action_count, CommentarySlot::TimedOut)
    }

    /// Time out a slot only if it is still waiting.
    pub fn expire(&mut self, action_count: u32) -> bool {
        match self.slots.get(&action_count) {
            Some(CommentarySlot::Waiting) => self.time_out(action_count),
            _ => false,
        }
    }

    pub fn is_waiting(&self, action_count: u32) -> bool {
        matches!(self.slots.get(&action_count), Some(CommentarySlot::Waiting))
    }

    /// The most recent commentary that arrived.
    pub fn latest_ready(&self) -> Option<&Commentary> {
        self.slots.values().rev().find_map(|slot| match slot {
            CommentarySlot::Ready(c) => Some(c),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    fn finalize(&mut self, action_count: u32, slot: CommentarySlot) -> bool {
        if self.slots.get(&action_count).is_some_and(CommentarySlot::is_final) {
            debug!("Commentary for action {} already final", action_count);
            return false;
        }
        self.slots.insert(action_count, slot);
        true
    }
}

/// Output of the creation request, the subscription task and the
/// commentary wait timer.
#[derive(Debug)]
pub enum StreamEvent {
    /// The authority answered the creation request.
    Opened {
        generation: Generation,
        result: Result<StreamHandle, AuthorityError>,
    },
    Message {
        generation: Generation,
        message: StreamMessage,
    },
    /// The subscription ended, with the error that ended it, if any.
    Closed {
        generation: Generation,
        error: Option<AuthorityError>,
    },
    CommentaryDeadline {
        generation: Generation,
        session_id: SessionId,
        action_count: u32,
    },
}

/// Read-only snapshot for display.
#[derive(Debug, Clone)]
pub struct StreamView {
    pub session_id: Option<SessionId>,
    pub target: Option<StreamTarget>,
    pub status: StreamStatus,
    pub draft_state: DraftState,
    pub last_action: Option<Action>,
    pub actions_seen: usize,
    pub total_actions: Option<u32>,
    pub blue_team: Option<TeamInfo>,
    pub red_team: Option<TeamInfo>,
    pub recommendations: Option<RecommendationSet>,
    pub commentary: Option<CommentarySlot>,
    pub holding: bool,
    pub summary: Option<DraftSummary>,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// StreamController
// ---------------------------------------------------------------------------

pub struct StreamController {
    authority: Arc<dyn DraftAuthority>,
    transport: Arc<dyn StreamTransport>,
    events: mpsc::Sender<StreamEvent>,
    lineage: ScopeLineage,
    commentary_wait: Duration,

    session: Option<Session>,
    target: Option<StreamTarget>,
    options: StreamOptions,
    status: StreamStatus,
    draft_state: DraftState,
    history: ActionHistory,
    blue_team: Option<TeamInfo>,
    red_team: Option<TeamInfo>,
    total_actions: Option<u32>,
    recommendations: Option<RecommendationSet>,
    commentary: CommentaryBook,
    summary: Option<DraftSummary>,
    error: Option<String>,
}

impl StreamController {
    pub fn new(
        authority: Arc<dyn DraftAuthority>,
        transport: Arc<dyn StreamTransport>,
        commentary_wait: Duration,
        events: mpsc::Sender<StreamEvent>,
    ) -> Self {
        StreamController {
            authority,
            transport,
            events,
            lineage: ScopeLineage::new(),
            commentary_wait,
            session: None,
            target: None,
            options: StreamOptions::default(),
            status: StreamStatus::Idle,
            draft_state: DraftState::empty(),
            history: ActionHistory::new(),
            blue_team: None,
            red_team: None,
            total_actions: None,
            recommendations: None,
            commentary: CommentaryBook::new(),
            summary: None,
            error: None,
        }
    }

    // -- Accessors --

    pub fn status(&self) -> StreamStatus {
        self.status
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session.as_ref().map(|s| &s.id)
    }

    pub fn target(&self) -> Option<&StreamTarget> {
        self.target.as_ref()
    }

    pub fn draft_state(&self) -> &DraftState {
        &self.draft_state
    }

    pub fn history(&self) -> &[Action] {
        self.history.as_slice()
    }

    pub fn recommendations(&self) -> Option<&RecommendationSet> {
        self.recommendations.as_ref()
    }

    pub fn commentary(&self) -> &CommentaryBook {
        &self.commentary
    }

    pub fn summary(&self) -> Option<&DraftSummary> {
        self.summary.as_ref()
    }

    pub fn teams(&self) -> (Option<&TeamInfo>, Option<&TeamInfo>) {
        (self.blue_team.as_ref(), self.red_team.as_ref())
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            StreamStatus::Connecting | StreamStatus::Playing | StreamStatus::Paused
        )
    }

    /// Whether forward progress is held for commentary on the displayed
    /// action.
    pub fn is_holding(&self) -> bool {
        self.options.wait_for_commentary
            && self.commentary.is_waiting(self.draft_state.action_count)
    }

    pub fn view(&self) -> StreamView {
        StreamView {
            session_id: self.session_id().cloned(),
            target: self.target.clone(),
            status: self.status,
            draft_state: self.draft_state.clone(),
            last_action: self.history.last().cloned(),
            actions_seen: self.history.len(),
            total_actions: self.total_actions,
            blue_team: self.blue_team.clone(),
            red_team: self.red_team.clone(),
            recommendations: self.recommendations.clone(),
            commentary: self.commentary.get(self.draft_state.action_count).cloned(),
            holding: self.is_holding(),
            summary: self.summary.clone(),
            error: self.error.clone(),
        }
    }

    fn guard(&self) -> StalenessGuard<'_> {
        StalenessGuard::new(self.session_id(), self.draft_state.action_count)
    }

    // -- Operations --

    /// Start replaying `target`, superseding any current replay. The
    /// previous view stays on screen until the new replay's first push.
    pub fn start(&mut self, target: StreamTarget, options: StreamOptions) {
        self.lineage.renew();
        if let Some(previous) = self.session.take() {
            self.stop_remote(previous.id);
        }
        self.status = StreamStatus::Connecting;
        self.error = None;
        self.target = Some(target.clone());
        self.options = options.clone();

        let generation = self.lineage.generation();
        info!(
            "Starting replay of {} game {} at {}x (gen: {})",
            target.series_id, target.game_number, options.speed, generation
        );

        // Not scoped: a replay created after it was abandoned must still be
        // stopped, so the handle always comes back to `handle_event`.
        let authority = Arc::clone(&self.authority);
        let tx = self.events.clone();
        tokio::spawn(async move {
            let result = authority.create_stream(&target, &options).await;
            let _ = tx.send(StreamEvent::Opened { generation, result }).await;
        });
    }

    /// Close the subscription and go idle, keeping the last view.
    pub fn stop(&mut self) {
        self.lineage.cancel();
        if let Some(session) = self.session.take() {
            info!("Stopping replay {}", session.id);
            self.stop_remote(session.id);
        }
        self.status = StreamStatus::Idle;
    }

    /// Stop and discard everything accumulated for the previous target.
    pub fn change_target(&mut self, target: StreamTarget) {
        self.stop();
        self.reset_view();
        self.error = None;
        info!(
            "Replay target changed to {} game {}",
            target.series_id, target.game_number
        );
        self.target = Some(target);
    }

    // -- Event handling --

    /// Apply a completion or push. Returns `true` if the displayed state
    /// changed.
    pub fn handle_event(&mut self, event: StreamEvent) -> bool {
        let generation = match &event {
            StreamEvent::Opened { generation, .. }
            | StreamEvent::Message { generation, .. }
            | StreamEvent::Closed { generation, .. }
            | StreamEvent::CommentaryDeadline { generation, .. } => *generation,
        };
        if !self.lineage.is_current(generation) {
            debug!(
                "Discarding stream event from dead scope (event gen: {}, current gen: {})",
                generation,
                self.lineage.generation()
            );
            if let StreamEvent::Opened {
                result: Ok(handle), ..
            } = event
            {
                info!("Stopping abandoned replay {}", handle.session_id);
                self.stop_remote(handle.session_id);
            }
            return false;
        }

        match event {
            StreamEvent::Opened { result, .. } => self.on_opened(result),
            StreamEvent::Message { message, .. } => self.on_message(message),
            StreamEvent::Closed { error, .. } => self.on_closed(error),
            StreamEvent::CommentaryDeadline {
                session_id,
                action_count,
                ..
            } => {
                if !self.guard().check_session(&session_id).is_accept() {
                    return false;
                }
                let expired = self.commentary.expire(action_count);
                if expired {
                    info!("Gave up waiting for commentary on action {}", action_count);
                }
                expired
            }
        }
    }

    fn on_opened(&mut self, result: Result<StreamHandle, AuthorityError>) -> bool {
        match result {
            Ok(handle) => {
                info!("Replay {} opened", handle.session_id);
                self.session = Some(Session::new(
                    handle.session_id.clone(),
                    SessionMode::Stream,
                ));
                self.subscribe(handle);
                false
            }
            Err(e) => {
                self.fail(e.to_string());
                true
            }
        }
    }

    fn on_message(&mut self, message: StreamMessage) -> bool {
        let verdict = self.guard().check_session(message.session_id());
        if !verdict.is_accept() {
            debug!("Discarding replay push: {}", verdict);
            return false;
        }

        match message {
            StreamMessage::SessionStart {
                blue_team,
                red_team,
                total_actions,
                patch,
                ..
            } => {
                if self.status != StreamStatus::Connecting {
                    debug!("Ignoring repeated session start");
                    return false;
                }
                info!(
                    "Replay started: {} vs {} (patch {})",
                    blue_team.name,
                    red_team.name,
                    patch.as_deref().unwrap_or("unknown")
                );
                self.reset_view();
                self.blue_team = Some(blue_team);
                self.red_team = Some(red_team);
                self.total_actions = total_actions;
                self.status = StreamStatus::Playing;
                true
            }
            StreamMessage::DraftAction {
                session_id,
                action,
                draft_state,
                recommendations,
            } => {
                if self.status == StreamStatus::Connecting {
                    // No session start was pushed; begin from a clean view.
                    self.reset_view();
                    self.status = StreamStatus::Playing;
                }
                let verdict = self
                    .guard()
                    .check_newer(&session_id, draft_state.action_count);
                if !verdict.is_accept() {
                    debug!("Discarding replay action: {}", verdict);
                    return false;
                }
                debug!(
                    "{} {} {} (#{})",
                    action.side, action.kind, action.champion, action.sequence
                );
                if !self.history.append(action) {
                    warn!("Replay action out of sequence; history unchanged");
                }
                self.draft_state = draft_state;
                self.recommendations = recommendations;
                true
            }
            StreamMessage::DraftComplete {
                draft_state,
                summary,
                ..
            } => {
                if draft_state.action_count < self.draft_state.action_count {
                    debug!(
                        "Discarding completion for action {} (displayed {})",
                        draft_state.action_count, self.draft_state.action_count
                    );
                    return false;
                }
                info!("Replay complete after {} actions", draft_state.action_count);
                self.draft_state = draft_state;
                self.summary = summary;
                self.status = StreamStatus::Complete;
                true
            }
            StreamMessage::CommentaryReady { commentary, .. } => self.commentary.ready(commentary),
            StreamMessage::CommentaryWaiting { action_count, .. } => {
                let marked = self.commentary.waiting(action_count);
                if marked && self.options.wait_for_commentary {
                    self.schedule_commentary_deadline(action_count);
                }
                marked
            }
            StreamMessage::CommentaryTimeout { action_count, .. } => {
                self.commentary.time_out(action_count)
            }
            StreamMessage::Paused { .. } => {
                if self.status != StreamStatus::Playing {
                    return false;
                }
                self.status = StreamStatus::Paused;
                true
            }
            StreamMessage::Resumed { .. } => {
                if self.status != StreamStatus::Paused {
                    return false;
                }
                self.status = StreamStatus::Playing;
                true
            }
            StreamMessage::Error { message, .. } => {
                self.fail(message);
                true
            }
        }
    }

    fn on_closed(&mut self, error: Option<AuthorityError>) -> bool {
        if self.status == StreamStatus::Complete {
            debug!("Replay subscription closed after completion");
            self.lineage.cancel();
            return false;
        }
        match error {
            Some(e) => self.fail(e.to_string()),
            None => self.fail(CLOSED_EARLY.to_string()),
        }
        true
    }

    // -- Helpers --

    /// Forward pushes for `handle` under the current scope until the
    /// subscription ends.
    fn subscribe(&self, handle: StreamHandle) {
        let transport = Arc::clone(&self.transport);
        let tx = self.events.clone();
        let generation = self.lineage.generation();
        self.lineage.current().spawn(async move {
            let mut events = match transport.subscribe(&handle).await {
                Ok(events) => events,
                Err(e) => {
                    let _ = tx
                        .send(StreamEvent::Closed {
                            generation,
                            error: Some(e),
                        })
                        .await;
                    return;
                }
            };
            while let Some(item) = events.next().await {
                match item {
                    Ok(message) => {
                        if tx
                            .send(StreamEvent::Message {
                                generation,
                                message,
                            })
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx
                            .send(StreamEvent::Closed {
                                generation,
                                error: Some(e),
                            })
                            .await;
                        return;
                    }
                }
            }
            let _ = tx
                .send(StreamEvent::Closed {
                    generation,
                    error: None,
                })
                .await;
        });
    }

    fn schedule_commentary_deadline(&self, action_count: u32) {
        let Some(session_id) = self.session_id().cloned() else {
            return;
        };
        let tx = self.events.clone();
        let generation = self.lineage.generation();
        self.lineage
            .current()
            .spawn_after(self.commentary_wait, async move {
                let _ = tx
                    .send(StreamEvent::CommentaryDeadline {
                        generation,
                        session_id,
                        action_count,
                    })
                    .await;
            });
    }

    fn fail(&mut self, message: String) {
        warn!("Replay failed: {}", message);
        self.lineage.cancel();
        self.status = StreamStatus::Failed;
        self.error = Some(message);
    }

    fn stop_remote(&self, session_id: SessionId) {
        let authority = Arc::clone(&self.authority);
        tokio::spawn(async move {
            if let Err(e) = authority.stop_stream(&session_id).await {
                warn!("Failed to stop replay {}: {}", session_id, e);
            }
        });
    }

    fn reset_view(&mut self) {
        self.draft_state = DraftState::empty();
        self.history.clear();
        self.blue_team = None;
        self.red_team = None;
        self.total_actions = None;
        self.recommendations = None;
        self.commentary.clear();
        self.summary = None;
    }
}
