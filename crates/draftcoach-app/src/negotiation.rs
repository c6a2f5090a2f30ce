// Negotiation session controller: the two-way turn protocol.
//
// The human submits bans and picks; the simulated opponent is asked to act
// after a think delay. Every request runs as a task under the current
// cancellation scope and reports back through `NegotiationEvent`s tagged
// with the scope's generation. `handle_event` is the only place the
// displayed state changes. It drops events from dead scopes, runs every
// state-bearing response through the staleness guard, and then decides
// from the authority's turn flag what to schedule next.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use draftcoach_client::DraftAuthority;
use draftcoach_core::config::Config;
use draftcoach_core::draft::action::{Action, ActionHistory};
use draftcoach_core::draft::recommendation::{Evaluation, RecommendationSet};
use draftcoach_core::draft::state::{DraftState, Side, TeamInfo};
use draftcoach_core::error::AuthorityError;
use draftcoach_core::protocol::{NegotiationConfig, NegotiationSnapshot, SeriesUpdate, TurnResponse};
use draftcoach_core::session::{Session, SessionId, SessionMode};
use draftcoach_core::sync::{Generation, ScopeLineage, StalenessGuard};

use crate::insight::{InsightEvent, InsightFetcher, InsightOutcome};

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationStatus {
    Idle,
    Starting,
    AwaitingOurTurn,
    AwaitingOpponentTurn,
    Complete,
    Failed,
}

/// Timing and side-channel settings, taken from `[negotiation]`.
#[derive(Debug, Clone)]
pub struct NegotiationSettings {
    pub think_delay: Duration,
    pub poll_delay: Duration,
    pub opponent_retry_limit: u32,
    pub auto_insight: bool,
    pub api_key: Option<String>,
}

impl NegotiationSettings {
    pub fn from_config(config: &Config) -> Self {
        NegotiationSettings {
            think_delay: config.negotiation.think_delay(),
            poll_delay: config.negotiation.poll_delay(),
            opponent_retry_limit: config.negotiation.opponent_retry_limit,
            auto_insight: config.negotiation.auto_insight,
            api_key: config.insight_api_key(),
        }
    }
}

/// Completion of a background operation.
#[derive(Debug)]
pub enum NegotiationEvent {
    Started {
        generation: Generation,
        result: Result<NegotiationSnapshot, AuthorityError>,
    },
    OurActionApplied {
        generation: Generation,
        result: Result<TurnResponse, AuthorityError>,
    },
    OpponentActed {
        generation: Generation,
        result: Result<TurnResponse, AuthorityError>,
    },
    RecommendationsFetched {
        generation: Generation,
        session_id: SessionId,
        result: Result<RecommendationSet, AuthorityError>,
    },
    OutcomeRecorded {
        generation: Generation,
        result: Result<SeriesUpdate, AuthorityError>,
    },
    GameAdvanced {
        generation: Generation,
        result: Result<NegotiationSnapshot, AuthorityError>,
    },
    Insight(InsightEvent),
}

impl From<InsightEvent> for NegotiationEvent {
    fn from(event: InsightEvent) -> Self {
        NegotiationEvent::Insight(event)
    }
}

/// Read-only snapshot for display.
#[derive(Debug, Clone)]
pub struct NegotiationView {
    pub session_id: Option<SessionId>,
    pub status: NegotiationStatus,
    pub coaching_side: Option<Side>,
    pub game_number: u8,
    pub draft_state: DraftState,
    pub last_action: Option<Action>,
    pub blue_team: Option<TeamInfo>,
    pub red_team: Option<TeamInfo>,
    pub recommendations: Option<RecommendationSet>,
    pub evaluation: Option<Evaluation>,
    pub series: Option<SeriesUpdate>,
    pub blocked_champions: BTreeSet<String>,
    pub insight: Option<InsightOutcome>,
    pub insight_loading: bool,
    pub submitting: bool,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// NegotiationController
// ---------------------------------------------------------------------------

pub struct NegotiationController {
    authority: Arc<dyn DraftAuthority>,
    settings: NegotiationSettings,
    events: mpsc::Sender<NegotiationEvent>,
    lineage: ScopeLineage,

    session: Option<Session>,
    config: Option<NegotiationConfig>,
    status: NegotiationStatus,
    game_number: u8,
    draft_state: DraftState,
    history: ActionHistory,
    blue_team: Option<TeamInfo>,
    red_team: Option<TeamInfo>,
    recommendations: Option<RecommendationSet>,
    evaluation: Option<Evaluation>,
    series: Option<SeriesUpdate>,
    blocked_champions: BTreeSet<String>,
    error: Option<String>,

    submitting: bool,
    opponent_in_flight: bool,
    opponent_failures: u32,
    outcome_in_flight: bool,
    outcome_recorded: bool,
    advancing: bool,

    insight: InsightFetcher,
}

impl NegotiationController {
    pub fn new(
        authority: Arc<dyn DraftAuthority>,
        settings: NegotiationSettings,
        events: mpsc::Sender<NegotiationEvent>,
    ) -> Self {
        NegotiationController {
            authority,
            settings,
            events,
            lineage: ScopeLineage::new(),
            session: None,
            config: None,
            status: NegotiationStatus::Idle,
            game_number: 1,
            draft_state: DraftState::empty(),
            history: ActionHistory::new(),
            blue_team: None,
            red_team: None,
            recommendations: None,
            evaluation: None,
            series: None,
            blocked_champions: BTreeSet::new(),
            error: None,
            submitting: false,
            opponent_in_flight: false,
            opponent_failures: 0,
            outcome_in_flight: false,
            outcome_recorded: false,
            advancing: false,
            insight: InsightFetcher::new(),
        }
    }

    // -- Accessors --

    pub fn status(&self) -> NegotiationStatus {
        self.status
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session.as_ref().map(|s| &s.id)
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

    pub fn evaluation(&self) -> Option<&Evaluation> {
        self.evaluation.as_ref()
    }

    pub fn series(&self) -> Option<&SeriesUpdate> {
        self.series.as_ref()
    }

    pub fn blocked_champions(&self) -> &BTreeSet<String> {
        &self.blocked_champions
    }

    pub fn game_number(&self) -> u8 {
        self.game_number
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn insight(&self) -> Option<&InsightOutcome> {
        self.insight.current(self.draft_state.action_count)
    }

    pub fn is_insight_loading(&self) -> bool {
        self.insight.is_loading()
    }

    /// Whether a session exists or is being created.
    pub fn is_active(&self) -> bool {
        self.session.is_some() || self.status == NegotiationStatus::Starting
    }

    pub fn view(&self) -> NegotiationView {
        NegotiationView {
            session_id: self.session_id().cloned(),
            status: self.status,
            coaching_side: self.config.as_ref().map(|c| c.coaching_side),
            game_number: self.game_number,
            draft_state: self.draft_state.clone(),
            last_action: self.history.last().cloned(),
            blue_team: self.blue_team.clone(),
            red_team: self.red_team.clone(),
            recommendations: self.recommendations.clone(),
            evaluation: self.evaluation.clone(),
            series: self.series.clone(),
            blocked_champions: self.blocked_champions.clone(),
            insight: self.insight().cloned(),
            insight_loading: self.insight.is_loading(),
            submitting: self.submitting,
            error: self.error.clone(),
        }
    }

    fn guard(&self) -> StalenessGuard<'_> {
        StalenessGuard::new(self.session_id(), self.draft_state.action_count)
    }

    // -- Operations --

    /// Create a new session, superseding any current one. Returns the
    /// validation message if `config` is refused locally, leaving the
    /// current session untouched.
    pub fn start(&mut self, config: NegotiationConfig) -> Result<(), String> {
        config.validate()?;

        self.lineage.renew();
        if let Some(previous) = self.session.take() {
            self.delete_remote(previous.id);
        }
        self.reset_view();
        self.status = NegotiationStatus::Starting;
        self.config = Some(config.clone());

        info!(
            "Starting negotiation {} vs {} (coaching {}, best of {}, gen: {})",
            config.blue_team_id,
            config.red_team_id,
            config.coaching_side,
            config.series_length,
            self.lineage.generation()
        );

        // Not scoped: a session created after it was abandoned must still
        // be deleted, so the snapshot always comes back to `handle_event`.
        let authority = Arc::clone(&self.authority);
        let tx = self.events.clone();
        let generation = self.lineage.generation();
        tokio::spawn(async move {
            let result = authority.create_negotiation(&config).await;
            let _ = tx.send(NegotiationEvent::Started { generation, result }).await;
        });
        Ok(())
    }

    /// Submit the human's action. No-op unless it is our turn and no other
    /// submission is outstanding.
    pub fn submit_our_action(&mut self, champion: &str) -> bool {
        if self.status != NegotiationStatus::AwaitingOurTurn || self.submitting {
            debug!(
                "Ignoring submission of {} (status {:?}, submitting: {})",
                champion, self.status, self.submitting
            );
            return false;
        }
        let Some(session_id) = self.session_id().cloned() else {
            return false;
        };

        self.submitting = true;
        self.error = None;
        info!("Submitting {} at action {}", champion, self.draft_state.action_count);

        let authority = Arc::clone(&self.authority);
        let tx = self.events.clone();
        let generation = self.lineage.generation();
        let champion = champion.to_string();
        self.lineage.current().spawn(async move {
            let result = authority.submit_action(&session_id, &champion).await;
            let _ = tx
                .send(NegotiationEvent::OurActionApplied { generation, result })
                .await;
        })
    }

    /// Ask the opponent to act now. No-op unless we are waiting on the
    /// opponent and no opponent request is already scheduled or in flight.
    pub fn trigger_opponent_turn(&mut self) -> bool {
        if self.status != NegotiationStatus::AwaitingOpponentTurn || self.opponent_in_flight {
            debug!(
                "Ignoring opponent trigger (status {:?}, in flight: {})",
                self.status, self.opponent_in_flight
            );
            return false;
        }
        self.error = None;
        self.schedule_opponent_turn(Duration::ZERO)
    }

    /// Fetch recommendations for the displayed turn. Best-effort.
    pub fn fetch_recommendations(&mut self) -> bool {
        let Some(session_id) = self.session_id().cloned() else {
            return false;
        };
        debug!(
            "Fetching recommendations for action {}",
            self.draft_state.action_count
        );

        let authority = Arc::clone(&self.authority);
        let tx = self.events.clone();
        let generation = self.lineage.generation();
        self.lineage.current().spawn(async move {
            let result = authority.fetch_recommendations(&session_id).await;
            let _ = tx
                .send(NegotiationEvent::RecommendationsFetched {
                    generation,
                    session_id,
                    result,
                })
                .await;
        })
    }

    /// Record the winner of the finished game. Single-flight.
    pub fn record_outcome(&mut self, winner: Side) -> bool {
        if self.status != NegotiationStatus::Complete
            || self.outcome_in_flight
            || self.outcome_recorded
        {
            debug!(
                "Ignoring outcome (status {:?}, in flight: {}, recorded: {})",
                self.status, self.outcome_in_flight, self.outcome_recorded
            );
            return false;
        }
        let Some(session_id) = self.session_id().cloned() else {
            return false;
        };

        self.outcome_in_flight = true;
        self.error = None;
        info!("Recording {} win for game {}", winner, self.game_number);

        let authority = Arc::clone(&self.authority);
        let tx = self.events.clone();
        let generation = self.lineage.generation();
        self.lineage.current().spawn(async move {
            let result = authority.record_winner(&session_id, winner).await;
            let _ = tx
                .send(NegotiationEvent::OutcomeRecorded { generation, result })
                .await;
        })
    }

    /// Move on to the next game of the series. Valid once the current
    /// game's outcome is recorded and the series is still open.
    pub fn advance_game(&mut self) -> bool {
        let series_open = self.series.as_ref().is_some_and(|s| !s.series_complete);
        if !self.outcome_recorded || !series_open || self.advancing {
            debug!(
                "Ignoring next game (recorded: {}, series open: {}, advancing: {})",
                self.outcome_recorded, series_open, self.advancing
            );
            return false;
        }
        let Some(session_id) = self.session_id().cloned() else {
            return false;
        };

        self.advancing = true;
        self.error = None;

        let authority = Arc::clone(&self.authority);
        let tx = self.events.clone();
        let generation = self.lineage.generation();
        self.lineage.current().spawn(async move {
            let result = authority.next_game(&session_id).await;
            let _ = tx
                .send(NegotiationEvent::GameAdvanced { generation, result })
                .await;
        })
    }

    /// Fetch commentary for the displayed action count.
    pub fn request_insight(&mut self) -> bool {
        let Some(session_id) = self.session_id().cloned() else {
            return false;
        };
        self.insight.fetch(
            Arc::clone(&self.authority),
            session_id,
            self.draft_state.action_count,
            self.settings.api_key.clone(),
            self.events.clone(),
        );
        true
    }

    /// Abandon the session: cancel everything, delete it remotely, reset.
    pub fn end_session(&mut self) {
        self.lineage.cancel();
        if let Some(session) = self.session.take() {
            info!("Ending negotiation {}", session.id);
            self.delete_remote(session.id);
        }
        self.reset_view();
        self.config = None;
        self.status = NegotiationStatus::Idle;
    }

    // -- Event handling --

    /// Apply a completion. Returns `true` if the displayed state changed.
    pub fn handle_event(&mut self, event: NegotiationEvent) -> bool {
        if let NegotiationEvent::Insight(event) = event {
            let guard = StalenessGuard::new(
                self.session.as_ref().map(|s| &s.id),
                self.draft_state.action_count,
            );
            return self.insight.handle(event, guard);
        }

        let generation = match &event {
            NegotiationEvent::Started { generation, .. }
            | NegotiationEvent::OurActionApplied { generation, .. }
            | NegotiationEvent::OpponentActed { generation, .. }
            | NegotiationEvent::RecommendationsFetched { generation, .. }
            | NegotiationEvent::OutcomeRecorded { generation, .. }
            | NegotiationEvent::GameAdvanced { generation, .. } => *generation,
            NegotiationEvent::Insight(_) => return false,
        };
        if !self.lineage.is_current(generation) {
            debug!(
                "Discarding negotiation event from dead scope (event gen: {}, current gen: {})",
                generation,
                self.lineage.generation()
            );
            // Created after it was abandoned: nobody else knows its id.
            if let NegotiationEvent::Started {
                result: Ok(snapshot),
                ..
            } = event
            {
                info!("Deleting abandoned negotiation {}", snapshot.session_id);
                self.delete_remote(snapshot.session_id);
            }
            return false;
        }

        match event {
            NegotiationEvent::Started { result, .. } => self.on_started(result),
            NegotiationEvent::OurActionApplied { result, .. } => self.on_our_action(result),
            NegotiationEvent::OpponentActed { result, .. } => self.on_opponent_action(result),
            NegotiationEvent::RecommendationsFetched {
                session_id, result, ..
            } => self.on_recommendations(session_id, result),
            NegotiationEvent::OutcomeRecorded { result, .. } => self.on_outcome(result),
            NegotiationEvent::GameAdvanced { result, .. } => self.on_game_advanced(result),
            NegotiationEvent::Insight(_) => false,
        }
    }

    fn on_started(&mut self, result: Result<NegotiationSnapshot, AuthorityError>) -> bool {
        if self.status != NegotiationStatus::Starting {
            return false;
        }
        match result {
            Ok(snapshot) => {
                info!(
                    "Negotiation {} created (our turn: {})",
                    snapshot.session_id, snapshot.our_turn
                );
                self.session = Some(Session::new(
                    snapshot.session_id.clone(),
                    SessionMode::Negotiation,
                ));
                self.apply_snapshot(snapshot);
            }
            Err(e) => self.fail(&e),
        }
        true
    }

    fn on_our_action(&mut self, result: Result<TurnResponse, AuthorityError>) -> bool {
        self.submitting = false;
        match result {
            Ok(turn) => {
                if !self.accept_turn(&turn) {
                    return true;
                }
                self.apply_turn(turn);
            }
            Err(e) => {
                warn!("Submission failed: {}", e);
                self.error = Some(e.to_string());
            }
        }
        true
    }

    fn on_opponent_action(&mut self, result: Result<TurnResponse, AuthorityError>) -> bool {
        self.opponent_in_flight = false;
        match result {
            Ok(turn) => {
                if !self.accept_turn(&turn) {
                    info!(
                        "Opponent cascade stopped on a discarded response at action {}",
                        self.draft_state.action_count
                    );
                    return false;
                }
                self.opponent_failures = 0;
                self.apply_turn(turn);
            }
            Err(e) if e.is_rejection() => {
                warn!("Opponent turn rejected: {}", e);
                self.error = Some(e.to_string());
            }
            Err(e) => {
                self.opponent_failures += 1;
                if self.opponent_failures > self.settings.opponent_retry_limit {
                    warn!(
                        "Opponent turn failed {} times, giving up: {}",
                        self.opponent_failures, e
                    );
                    self.fail(&e);
                } else {
                    warn!(
                        "Opponent turn failed (attempt {}), retrying: {}",
                        self.opponent_failures, e
                    );
                    self.error = Some(format!("{e} (retrying)"));
                    self.schedule_opponent_turn(self.settings.poll_delay);
                }
            }
        }
        true
    }

    fn on_recommendations(
        &mut self,
        session_id: SessionId,
        result: Result<RecommendationSet, AuthorityError>,
    ) -> bool {
        match result {
            Ok(set) => {
                let verdict = self.guard().check_current(&session_id, set.action_count);
                if !verdict.is_accept() {
                    debug!("Discarding recommendations: {}", verdict);
                    return false;
                }
                self.recommendations = Some(set);
                true
            }
            Err(e) => {
                warn!("Recommendation fetch failed: {}", e);
                false
            }
        }
    }

    fn on_outcome(&mut self, result: Result<SeriesUpdate, AuthorityError>) -> bool {
        self.outcome_in_flight = false;
        match result {
            Ok(update) => {
                let verdict = self.guard().check_session(&update.session_id);
                if !verdict.is_accept() {
                    debug!("Discarding series update: {}", verdict);
                    return true;
                }
                info!(
                    "Series score {}-{} (complete: {})",
                    update.blue_wins, update.red_wins, update.series_complete
                );
                self.blocked_champions = update.blocked_champions.clone();
                self.series = Some(update);
                self.outcome_recorded = true;
            }
            Err(e) => {
                warn!("Recording outcome failed: {}", e);
                self.error = Some(e.to_string());
            }
        }
        true
    }

    fn on_game_advanced(&mut self, result: Result<NegotiationSnapshot, AuthorityError>) -> bool {
        self.advancing = false;
        match result {
            Ok(snapshot) => {
                let verdict = self.guard().check_session(&snapshot.session_id);
                if !verdict.is_accept() {
                    debug!("Discarding next game: {}", verdict);
                    return true;
                }
                info!(
                    "Advancing {} to game {} (gen: {})",
                    snapshot.session_id,
                    snapshot.game_number,
                    self.lineage.generation() + 1
                );
                // The new game restarts the action count, so it gets its own
                // lineage rather than going through the ordering guard.
                self.lineage.renew();
                self.reset_game();
                self.apply_snapshot(snapshot);
            }
            Err(e) => {
                warn!("Advancing to the next game failed: {}", e);
                self.error = Some(e.to_string());
            }
        }
        true
    }

    // -- Helpers --

    fn accept_turn(&self, turn: &TurnResponse) -> bool {
        let verdict = self
            .guard()
            .check_newer(&turn.session_id, turn.draft_state.action_count);
        if !verdict.is_accept() {
            debug!("Discarding turn response: {}", verdict);
        }
        verdict.is_accept()
    }

    /// Replace the state with an accepted turn response and schedule what
    /// comes next.
    fn apply_turn(&mut self, turn: TurnResponse) {
        if let Some(action) = turn.action {
            debug!(
                "{} {} {} (#{})",
                action.side, action.kind, action.champion, action.sequence
            );
            if !self.history.append(action) {
                debug!("Action already in history");
            }
        }
        self.draft_state = turn.draft_state;
        self.recommendations = None;
        self.evaluation = None;
        self.error = None;
        if let Some(evaluation) = turn.evaluation {
            if evaluation.action_count == self.draft_state.action_count {
                self.evaluation = Some(evaluation);
            }
        }
        self.continue_turns(turn.our_turn, turn.recommendations);
    }

    fn apply_snapshot(&mut self, snapshot: NegotiationSnapshot) {
        self.game_number = snapshot.game_number;
        self.draft_state = snapshot.draft_state;
        if snapshot.blue_team.is_some() {
            self.blue_team = snapshot.blue_team;
        }
        if snapshot.red_team.is_some() {
            self.red_team = snapshot.red_team;
        }
        if !snapshot.blocked_champions.is_empty() {
            self.blocked_champions = snapshot.blocked_champions;
        }
        self.continue_turns(snapshot.our_turn, snapshot.recommendations);
    }

    /// Decide the next background operation from the authority's turn flag.
    fn continue_turns(&mut self, our_turn: bool, attached: Option<RecommendationSet>) {
        if self.draft_state.is_complete() {
            info!(
                "Draft complete after {} actions",
                self.draft_state.action_count
            );
            self.status = NegotiationStatus::Complete;
            return;
        }

        if our_turn {
            self.status = NegotiationStatus::AwaitingOurTurn;
            let count = self.draft_state.action_count;
            match attached.filter(|set| set.action_count == count) {
                Some(set) => self.recommendations = Some(set),
                None => {
                    self.fetch_recommendations();
                }
            }
            if self.settings.auto_insight {
                self.request_insight();
            }
        } else {
            self.status = NegotiationStatus::AwaitingOpponentTurn;
            self.schedule_opponent_turn(self.settings.think_delay);
        }
    }

    /// Request the opponent's action after `delay`, under the current scope.
    fn schedule_opponent_turn(&mut self, delay: Duration) -> bool {
        let Some(session_id) = self.session_id().cloned() else {
            return false;
        };
        let authority = Arc::clone(&self.authority);
        let tx = self.events.clone();
        let generation = self.lineage.generation();
        let scheduled = self.lineage.current().spawn_after(delay, async move {
            let result = authority.request_opponent_action(&session_id).await;
            let _ = tx
                .send(NegotiationEvent::OpponentActed { generation, result })
                .await;
        });
        self.opponent_in_flight = scheduled;
        scheduled
    }

    fn fail(&mut self, error: &AuthorityError) {
        warn!("Negotiation failed: {}", error);
        self.lineage.cancel();
        self.status = NegotiationStatus::Failed;
        self.error = Some(error.to_string());
        self.submitting = false;
        self.opponent_in_flight = false;
    }

    /// Fire-and-forget deletion. Not tied to any scope: it must outlive
    /// the session it deletes.
    fn delete_remote(&self, session_id: SessionId) {
        let authority = Arc::clone(&self.authority);
        tokio::spawn(async move {
            if let Err(e) = authority.end_session(&session_id).await {
                warn!("Failed to delete negotiation {}: {}", session_id, e);
            }
        });
    }

    /// Clear the per-game state.
    fn reset_game(&mut self) {
        self.draft_state = DraftState::empty();
        self.history.clear();
        self.recommendations = None;
        self.evaluation = None;
        self.error = None;
        self.submitting = false;
        self.opponent_in_flight = false;
        self.opponent_failures = 0;
        self.outcome_in_flight = false;
        self.outcome_recorded = false;
        self.advancing = false;
        self.insight.reset();
    }

    /// Clear everything the session accumulated.
    fn reset_view(&mut self) {
        self.reset_game();
        self.game_number = 1;
        self.blue_team = None;
        self.red_team = None;
        self.series = None;
        self.blocked_champions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use draftcoach_client::stub::StubAuthority;
    use draftcoach_core::draft::state::DraftPhase;

    fn settings() -> NegotiationSettings {
        NegotiationSettings {
            think_delay: Duration::from_millis(500),
            poll_delay: Duration::from_millis(200),
            opponent_retry_limit: 2,
            auto_insight: false,
            api_key: None,
        }
    }

    fn state(action_count: u32, phase: DraftPhase) -> DraftState {
        DraftState {
            action_count,
            phase,
            ..DraftState::empty()
        }
    }

    fn snapshot(our_turn: bool) -> NegotiationSnapshot {
        NegotiationSnapshot {
            session_id: SessionId::new("sim-1"),
            game_number: 1,
            draft_state: state(0, DraftPhase::BanPhase1),
            our_turn,
            blue_team: None,
            red_team: None,
            recommendations: None,
            blocked_champions: BTreeSet::new(),
        }
    }

    fn controller(stub: Arc<StubAuthority>) -> (NegotiationController, mpsc::Receiver<NegotiationEvent>) {
        let (tx, rx) = mpsc::channel(64);
        (NegotiationController::new(stub, settings(), tx), rx)
    }

    #[tokio::test]
    async fn invalid_config_leaves_controller_idle() {
        let stub = Arc::new(StubAuthority::new());
        let (mut ctl, _rx) = controller(Arc::clone(&stub));

        let err = ctl
            .start(NegotiationConfig::new("T1", "T1", Side::Blue))
            .unwrap_err();
        assert!(err.contains("itself"));
        assert_eq!(ctl.status(), NegotiationStatus::Idle);
        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn start_failure_surfaces_message_verbatim() {
        let stub = Arc::new(StubAuthority::new());
        stub.script_create(
            Duration::ZERO,
            Err(AuthorityError::Rejected {
                status: 404,
                message: "Unknown team GEN".into(),
            }),
        );
        let (mut ctl, mut rx) = controller(Arc::clone(&stub));

        ctl.start(NegotiationConfig::new("T1", "GEN", Side::Blue)).unwrap();
        assert_eq!(ctl.status(), NegotiationStatus::Starting);
        let event = rx.recv().await.unwrap();
        assert!(ctl.handle_event(event));

        assert_eq!(ctl.status(), NegotiationStatus::Failed);
        assert_eq!(ctl.error(), Some("Unknown team GEN"));
    }

    #[tokio::test]
    async fn submission_is_ignored_outside_our_turn() {
        let stub = Arc::new(StubAuthority::new());
        let (mut ctl, _rx) = controller(Arc::clone(&stub));
        assert!(!ctl.submit_our_action("Ahri"));
        assert!(!ctl.record_outcome(Side::Blue));
        assert!(!ctl.advance_game());
        assert!(!ctl.request_insight());
        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn start_on_our_turn_fetches_recommendations() {
        let stub = Arc::new(StubAuthority::new());
        stub.script_create(Duration::ZERO, Ok(snapshot(true)));
        stub.script_recommendations(
            Duration::ZERO,
            Ok(RecommendationSet {
                action_count: 0,
                for_side: Some(Side::Blue),
                action: None,
                candidates: vec![],
            }),
        );
        let (mut ctl, mut rx) = controller(Arc::clone(&stub));

        ctl.start(NegotiationConfig::new("T1", "GEN", Side::Blue)).unwrap();
        let started = rx.recv().await.unwrap();
        ctl.handle_event(started);
        assert_eq!(ctl.status(), NegotiationStatus::AwaitingOurTurn);

        let recs = rx.recv().await.unwrap();
        assert!(ctl.handle_event(recs));
        assert_eq!(ctl.recommendations().map(|r| r.action_count), Some(0));
        assert_eq!(stub.recommendation_calls(), 1);
    }

    #[tokio::test]
    async fn end_session_resets_and_deletes_remote() {
        let stub = Arc::new(StubAuthority::new());
        stub.script_create(Duration::ZERO, Ok(snapshot(true)));
        let (mut ctl, mut rx) = controller(Arc::clone(&stub));

        ctl.start(NegotiationConfig::new("T1", "GEN", Side::Blue)).unwrap();
        let started = rx.recv().await.unwrap();
        ctl.handle_event(started);
        ctl.end_session();
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        assert_eq!(ctl.status(), NegotiationStatus::Idle);
        assert!(ctl.session_id().is_none());
        assert_eq!(ctl.draft_state().action_count, 0);
        assert_eq!(
            stub.count(|c| matches!(c, draftcoach_client::stub::Call::EndSession { .. })),
            1
        );
    }

    #[tokio::test]
    async fn session_created_after_end_is_deleted() {
        let stub = Arc::new(StubAuthority::new());
        stub.script_create(Duration::ZERO, Ok(snapshot(false)));
        let (mut ctl, mut rx) = controller(Arc::clone(&stub));

        ctl.start(NegotiationConfig::new("T1", "GEN", Side::Blue)).unwrap();
        ctl.end_session();
        let started = rx.recv().await.unwrap();
        assert!(!ctl.handle_event(started));
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        assert_eq!(ctl.status(), NegotiationStatus::Idle);
        assert!(ctl.session_id().is_none());
        assert_eq!(
            stub.count(|c| matches!(c, draftcoach_client::stub::Call::EndSession { .. })),
            1
        );
        assert_eq!(stub.opponent_calls(), 0);
    }
}
