// Recommendation sets, evaluations, and commentary returned by the authority.
//
// All three are tagged with the action count they were computed for. They
// are disposable: a newer value replaces an older one outright.

use serde::{Deserialize, Serialize};

use super::state::{ActionKind, Side};

/// One ranked candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub champion: String,
    pub score: f64,
    /// Suggested role, when the scorer assigns one.
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub reasons: Vec<String>,
}

/// Ranked candidates for one specific turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSet {
    /// Action count of the state these candidates were scored against.
    pub action_count: u32,
    #[serde(default)]
    pub for_side: Option<Side>,
    #[serde(default)]
    pub action: Option<ActionKind>,
    #[serde(default)]
    pub candidates: Vec<Recommendation>,
}

impl RecommendationSet {
    pub fn top(&self) -> Option<&Recommendation> {
        self.candidates.first()
    }

    /// Zero-based rank of `champion` in this set, if it was recommended.
    pub fn rank_of(&self, champion: &str) -> Option<usize> {
        self.candidates
            .iter()
            .position(|c| c.champion.eq_ignore_ascii_case(champion))
    }
}

/// Composition scores for both sides at a given action count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub action_count: u32,
    pub blue_score: f64,
    pub red_score: f64,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl Evaluation {
    pub fn favored(&self) -> Option<Side> {
        if self.blue_score > self.red_score {
            Some(Side::Blue)
        } else if self.red_score > self.blue_score {
            Some(Side::Red)
        } else {
            None
        }
    }
}

/// Natural-language analysis plus a reranking of the recommendations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commentary {
    pub action_count: u32,
    pub text: String,
    #[serde(default)]
    pub reranked: Vec<Recommendation>,
}
