// Draft state: bans and picks per side, current phase, and turn ownership.
//
// A `DraftState` is always the authority's snapshot. The client replaces it
// wholesale on every accepted update and never patches it in place, so
// nothing here mutates an existing state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the two drafting sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Blue,
    Red,
}

impl Side {
    pub fn opponent(self) -> Side {
        match self {
            Side::Blue => Side::Red,
            Side::Red => Side::Blue,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Blue => "blue",
            Side::Red => "red",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blue" | "b" => Ok(Side::Blue),
            "red" | "r" => Ok(Side::Red),
            other => Err(format!("unknown side `{other}` (expected blue or red)")),
        }
    }
}

/// Whether an action removes a champion from the pool or claims it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Ban,
    Pick,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Ban => f.write_str("ban"),
            ActionKind::Pick => f.write_str("pick"),
        }
    }
}

/// Draft phase as reported by the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DraftPhase {
    BanPhase1,
    PickPhase1,
    BanPhase2,
    PickPhase2,
    Complete,
}

/// Team metadata attached to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamInfo {
    /// Authority-side team identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Which side this team drafts from.
    pub side: Side,
}

/// Authoritative snapshot of one draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftState {
    /// Blue side bans, in the order they were made.
    #[serde(default)]
    pub blue_bans: Vec<String>,
    /// Red side bans, in the order they were made.
    #[serde(default)]
    pub red_bans: Vec<String>,
    /// Blue side picks, in the order they were made.
    #[serde(default)]
    pub blue_picks: Vec<String>,
    /// Red side picks, in the order they were made.
    #[serde(default)]
    pub red_picks: Vec<String>,
    pub phase: DraftPhase,
    /// Side that acts next. `None` once the draft is complete (or before
    /// the authority has reported anything).
    #[serde(default)]
    pub next_team: Option<Side>,
    /// Kind of the next action, if any.
    #[serde(default)]
    pub next_action: Option<ActionKind>,
    /// Version number of this snapshot. Strictly increases with every
    /// action the authority records within one game.
    pub action_count: u32,
}

impl DraftState {
    /// The state shown before the authority has reported any action.
    pub fn empty() -> Self {
        DraftState {
            blue_bans: Vec::new(),
            red_bans: Vec::new(),
            blue_picks: Vec::new(),
            red_picks: Vec::new(),
            phase: DraftPhase::BanPhase1,
            next_team: None,
            next_action: None,
            action_count: 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.phase == DraftPhase::Complete
    }

    pub fn bans(&self, side: Side) -> &[String] {
        match side {
            Side::Blue => &self.blue_bans,
            Side::Red => &self.red_bans,
        }
    }

    pub fn picks(&self, side: Side) -> &[String] {
        match side {
            Side::Blue => &self.blue_picks,
            Side::Red => &self.red_picks,
        }
    }

    /// True if nothing has been banned or picked yet.
    pub fn is_empty(&self) -> bool {
        self.action_count == 0
            && self.blue_bans.is_empty()
            && self.red_bans.is_empty()
            && self.blue_picks.is_empty()
            && self.red_picks.is_empty()
    }
}

impl Default for DraftState {
    fn default() -> Self {
        DraftState::empty()
    }
}
