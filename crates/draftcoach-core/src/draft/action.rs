// Draft actions and the append-only history they form.

use serde::{Deserialize, Serialize};

use super::state::{ActionKind, Side};

/// One ban or pick, as recorded by the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Authority-assigned position in the draft (1-based).
    pub sequence: u32,
    pub side: Side,
    pub kind: ActionKind,
    pub champion: String,
}

/// Ordered history of actions for one game.
///
/// Entries are never mutated or removed individually. The whole history is
/// dropped only when the game it describes is abandoned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionHistory {
    actions: Vec<Action>,
}

impl ActionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action. Returns `false` (and leaves the history untouched)
    /// if its sequence does not come after the last recorded one, which
    /// happens when the authority replays an action we already hold.
    pub fn append(&mut self, action: Action) -> bool {
        if let Some(last) = self.actions.last() {
            if action.sequence <= last.sequence {
                return false;
            }
        }
        self.actions.push(action);
        true
    }

    pub fn as_slice(&self) -> &[Action] {
        &self.actions
    }

    pub fn last(&self) -> Option<&Action> {
        self.actions.last()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Drop the whole history (new game or new replay target).
    pub fn clear(&mut self) {
        self.actions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(sequence: u32, champion: &str) -> Action {
        Action {
            sequence,
            side: Side::Blue,
            kind: ActionKind::Pick,
            champion: champion.into(),
        }
    }

    #[test]
    fn append_keeps_order() {
        let mut history = ActionHistory::new();
        assert!(history.append(action(1, "Ahri")));
        assert!(history.append(action(2, "Orianna")));
        assert_eq!(history.len(), 2);
        assert_eq!(history.last().map(|a| a.champion.as_str()), Some("Orianna"));
    }

    #[test]
    fn replayed_sequence_is_ignored() {
        let mut history = ActionHistory::new();
        history.append(action(1, "Ahri"));
        history.append(action(2, "Orianna"));
        assert!(!history.append(action(2, "Syndra")));
        assert!(!history.append(action(1, "Ahri")));
        assert_eq!(history.len(), 2);
        assert_eq!(history.as_slice()[1].champion, "Orianna");
    }
}
