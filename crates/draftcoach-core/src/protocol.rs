// Wire types exchanged with the draft authority.
//
// Request bodies, response bodies, and the push messages of a replay
// subscription. Every response that can race another carries the session
// id and, where it describes a state, the action count.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::draft::action::Action;
use crate::draft::recommendation::{Commentary, Evaluation, RecommendationSet};
use crate::draft::state::{DraftState, Side, TeamInfo};
use crate::session::SessionId;

/// Series lengths the authority accepts.
pub const SERIES_LENGTHS: [u8; 3] = [1, 3, 5];

// ---------------------------------------------------------------------------
// Negotiation
// ---------------------------------------------------------------------------

/// Champion exclusivity rule across games of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftMode {
    #[default]
    Normal,
    /// Champions picked in earlier games of the series are unavailable.
    Fearless,
}

/// Parameters for creating a negotiation session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationConfig {
    pub blue_team_id: String,
    pub red_team_id: String,
    /// The side the human drafts for.
    pub coaching_side: Side,
    pub series_length: u8,
    #[serde(default)]
    pub draft_mode: DraftMode,
}

impl NegotiationConfig {
    /// Single-game, normal-mode session.
    pub fn new(
        blue_team_id: impl Into<String>,
        red_team_id: impl Into<String>,
        coaching_side: Side,
    ) -> Self {
        NegotiationConfig {
            blue_team_id: blue_team_id.into(),
            red_team_id: red_team_id.into(),
            coaching_side,
            series_length: 1,
            draft_mode: DraftMode::Normal,
        }
    }

    /// Check the request locally before it is sent. Returns a message
    /// suitable for display.
    pub fn validate(&self) -> Result<(), String> {
        if self.blue_team_id.trim().is_empty() || self.red_team_id.trim().is_empty() {
            return Err("both team ids are required".into());
        }
        if self.blue_team_id == self.red_team_id {
            return Err("a team cannot draft against itself".into());
        }
        if !SERIES_LENGTHS.contains(&self.series_length) {
            return Err(format!(
                "series length must be 1, 3 or 5, got {}",
                self.series_length
            ));
        }
        Ok(())
    }
}

/// State of a negotiation session at the start of a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationSnapshot {
    pub session_id: SessionId,
    #[serde(default = "first_game")]
    pub game_number: u8,
    pub draft_state: DraftState,
    /// Whether the coached side acts next, as decided by the authority.
    pub our_turn: bool,
    #[serde(default)]
    pub blue_team: Option<TeamInfo>,
    #[serde(default)]
    pub red_team: Option<TeamInfo>,
    #[serde(default)]
    pub recommendations: Option<RecommendationSet>,
    #[serde(default)]
    pub blocked_champions: BTreeSet<String>,
}

fn first_game() -> u8 {
    1
}

/// Response to a human submission or an opponent-turn request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResponse {
    pub session_id: SessionId,
    /// The action the authority just recorded.
    #[serde(default)]
    pub action: Option<Action>,
    pub draft_state: DraftState,
    pub our_turn: bool,
    /// Eagerly attached recommendations for the new state, if the
    /// authority computed them.
    #[serde(default)]
    pub recommendations: Option<RecommendationSet>,
    #[serde(default)]
    pub evaluation: Option<Evaluation>,
}

/// Series score after a game outcome is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesUpdate {
    pub session_id: SessionId,
    pub blue_wins: u8,
    pub red_wins: u8,
    pub series_complete: bool,
    #[serde(default)]
    pub blocked_champions: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub champion: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightRequest {
    pub action_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRequest {
    pub winner: Side,
}

// ---------------------------------------------------------------------------
// Stream (replay)
// ---------------------------------------------------------------------------

/// Which historical draft to replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamTarget {
    pub series_id: String,
    pub game_number: u8,
}

/// Playback options for a replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamOptions {
    /// Playback speed multiplier.
    pub speed: f32,
    /// Seconds between actions at speed 1.0.
    pub delay_seconds: f32,
    /// Ask the authority to generate commentary for each action.
    pub commentary: bool,
    /// Hold playback until commentary for an action is ready (bounded by
    /// the authority's own timeout and the client's wait timer).
    pub wait_for_commentary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        StreamOptions {
            speed: 1.0,
            delay_seconds: 3.0,
            commentary: false,
            wait_for_commentary: false,
            api_key: None,
        }
    }
}

/// Body of the replay-creation request.
#[derive(Debug, Clone, Serialize)]
pub struct StreamRequest<'a> {
    #[serde(flatten)]
    pub target: &'a StreamTarget,
    #[serde(flatten)]
    pub options: &'a StreamOptions,
}

/// Returned by replay creation: where to subscribe for pushes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamHandle {
    pub session_id: SessionId,
    /// Absolute `ws://`/`wss://` URL, or a path relative to the authority.
    pub subscription_url: String,
}

/// End-of-draft data attached to a completion message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftSummary {
    #[serde(default)]
    pub evaluation: Option<Evaluation>,
    /// Actual game winner, when the historical result is known.
    #[serde(default)]
    pub winner: Option<Side>,
    #[serde(default)]
    pub notes: Vec<String>,
}

/// One push message on a replay subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    SessionStart {
        session_id: SessionId,
        blue_team: TeamInfo,
        red_team: TeamInfo,
        #[serde(default)]
        total_actions: Option<u32>,
        #[serde(default)]
        patch: Option<String>,
    },
    DraftAction {
        session_id: SessionId,
        action: Action,
        draft_state: DraftState,
        #[serde(default)]
        recommendations: Option<RecommendationSet>,
    },
    DraftComplete {
        session_id: SessionId,
        draft_state: DraftState,
        #[serde(default)]
        summary: Option<DraftSummary>,
    },
    CommentaryReady {
        session_id: SessionId,
        commentary: Commentary,
    },
    CommentaryWaiting {
        session_id: SessionId,
        action_count: u32,
    },
    CommentaryTimeout {
        session_id: SessionId,
        action_count: u32,
    },
    Paused {
        session_id: SessionId,
    },
    Resumed {
        session_id: SessionId,
    },
    Error {
        session_id: SessionId,
        message: String,
    },
}

impl StreamMessage {
    pub fn session_id(&self) -> &SessionId {
        match self {
            StreamMessage::SessionStart { session_id, .. }
            | StreamMessage::DraftAction { session_id, .. }
            | StreamMessage::DraftComplete { session_id, .. }
            | StreamMessage::CommentaryReady { session_id, .. }
            | StreamMessage::CommentaryWaiting { session_id, .. }
            | StreamMessage::CommentaryTimeout { session_id, .. }
            | StreamMessage::Paused { session_id }
            | StreamMessage::Resumed { session_id }
            | StreamMessage::Error { session_id, .. } => session_id,
        }
    }
}
