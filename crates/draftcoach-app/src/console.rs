// Line-command parsing and one-line rendering for the console binary.

use draftcoach_core::draft::state::Side;
use draftcoach_core::protocol::{DraftMode, NegotiationConfig, StreamTarget};

use crate::app::{UiUpdate, UserCommand};
use crate::insight::InsightOutcome;
use crate::negotiation::NegotiationView;
use crate::stream::{CommentarySlot, StreamView};

pub const HELP: &str = "commands: negotiate <blue> <red> <side> [1|3|5] [fearless], pick <champion>, \
opponent, insight, winner <blue|red>, next, end, replay <series> <game>, stop, \
target <series> <game>, status, quit";

/// Parse one input line. Blank lines parse to `None`.
pub fn parse_command(line: &str) -> Result<Option<UserCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let cmd = match verb.to_ascii_lowercase().as_str() {
        "negotiate" | "n" => UserCommand::Negotiate(parse_negotiation(&args)?),
        "pick" | "ban" | "p" => {
            if args.is_empty() {
                return Err("usage: pick <champion>".into());
            }
            UserCommand::Pick(args.join(" "))
        }
        "opponent" | "o" => UserCommand::Opponent,
        "insight" | "i" => UserCommand::Insight,
        "winner" | "w" => match args.as_slice() {
            [side] => UserCommand::Winner(side.parse::<Side>()?),
            _ => return Err("usage: winner <blue|red>".into()),
        },
        "next" => UserCommand::NextGame,
        "end" => UserCommand::EndNegotiation,
        "replay" | "r" => UserCommand::Replay(parse_target(&args, "replay")?),
        "stop" => UserCommand::StopReplay,
        "target" | "t" => UserCommand::ChangeTarget(parse_target(&args, "target")?),
        "status" | "s" => UserCommand::Status,
        "quit" | "exit" | "q" => UserCommand::Quit,
        "help" | "?" => return Err(HELP.into()),
        other => return Err(format!("unknown command `{other}`; {HELP}")),
    };
    Ok(Some(cmd))
}

fn parse_negotiation(args: &[&str]) -> Result<NegotiationConfig, String> {
    let (blue, red, side, rest) = match args {
        [blue, red, side, rest @ ..] => (*blue, *red, *side, rest),
        _ => return Err("usage: negotiate <blue> <red> <side> [1|3|5] [fearless]".into()),
    };
    let mut config = NegotiationConfig::new(blue, red, side.parse::<Side>()?);
    for arg in rest {
        if arg.eq_ignore_ascii_case("fearless") {
            config.draft_mode = DraftMode::Fearless;
        } else {
            config.series_length = arg
                .parse::<u8>()
                .map_err(|_| format!("expected a series length or `fearless`, got `{arg}`"))?;
        }
    }
    config.validate()?;
    Ok(config)
}

fn parse_target(args: &[&str], verb: &str) -> Result<StreamTarget, String> {
    match args {
        [series_id, game] => {
            let game_number = game
                .parse::<u8>()
                .ok()
                .filter(|g| *g > 0)
                .ok_or_else(|| format!("game number must be a positive integer, got `{game}`"))?;
            Ok(StreamTarget {
                series_id: series_id.to_string(),
                game_number,
            })
        }
        _ => Err(format!("usage: {verb} <series> <game>")),
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// One-line summary of an update.
pub fn render(update: &UiUpdate) -> String {
    match update {
        UiUpdate::Negotiation(view) => render_negotiation(view),
        UiUpdate::Stream(view) => render_stream(view),
        UiUpdate::Rejected(message) => format!("! {message}"),
    }
}

fn render_negotiation(view: &NegotiationView) -> String {
    let mut parts = vec![format!(
        "[negotiation {} g{}] {:?}",
        view.session_id.as_ref().map_or("-", |s| s.as_str()),
        view.game_number,
        view.status
    )];
    parts.push(turn_summary(&view.draft_state));
    if let Some(action) = &view.last_action {
        parts.push(format!("last: {} {} {}", action.side, action.kind, action.champion));
    }
    if let Some(top) = view.recommendations.as_ref().and_then(|r| r.top()) {
        parts.push(format!("top: {} ({:.2})", top.champion, top.score));
    }
    if let Some(series) = &view.series {
        parts.push(format!("series {}-{}", series.blue_wins, series.red_wins));
    }
    if !view.blocked_champions.is_empty() {
        parts.push(format!("blocked: {}", view.blocked_champions.len()));
    }
    if view.insight_loading {
        parts.push("insight: loading".into());
    } else if let Some(outcome) = &view.insight {
        parts.push(match outcome {
            InsightOutcome::Ready(c) => format!("insight: {}", c.text),
            InsightOutcome::Unavailable { reason, .. } => format!("insight unavailable: {reason}"),
        });
    }
    if let Some(error) = &view.error {
        parts.push(format!("error: {error}"));
    }
    parts.join(" | ")
}

fn render_stream(view: &StreamView) -> String {
    let mut parts = vec![format!(
        "[replay {}] {:?}",
        view.session_id.as_ref().map_or("-", |s| s.as_str()),
        view.status
    )];
    if let (Some(blue), Some(red)) = (&view.blue_team, &view.red_team) {
        parts.push(format!("{} vs {}", blue.name, red.name));
    }
    match view.total_actions {
        Some(total) => parts.push(format!("{}/{}", view.draft_state.action_count, total)),
        None => parts.push(format!("action {}", view.draft_state.action_count)),
    }
    if let Some(action) = &view.last_action {
        parts.push(format!("last: {} {} {}", action.side, action.kind, action.champion));
    }
    if let Some(rank) = view
        .last_action
        .as_ref()
        .zip(view.recommendations.as_ref())
        .and_then(|(a, r)| r.rank_of(&a.champion))
    {
        parts.push(format!("recommended #{}", rank + 1));
    }
    match &view.commentary {
        Some(CommentarySlot::Ready(c)) => parts.push(format!("commentary: {}", c.text)),
        Some(CommentarySlot::Waiting) if view.holding => parts.push("holding for commentary".into()),
        Some(CommentarySlot::Waiting) => parts.push("commentary pending".into()),
        Some(CommentarySlot::TimedOut) => parts.push("commentary timed out".into()),
        None => {}
    }
    if let Some(winner) = view.summary.as_ref().and_then(|s| s.winner) {
        parts.push(format!("winner: {winner}"));
    }
    if let Some(error) = &view.error {
        parts.push(format!("error: {error}"));
    }
    parts.join(" | ")
}

fn turn_summary(state: &draftcoach_core::draft::state::DraftState) -> String {
    match (state.next_team, state.next_action) {
        (Some(side), Some(kind)) => format!(
            "action {} {:?}, next: {} {}",
            state.action_count, state.phase, side, kind
        ),
        _ => format!("action {} {:?}", state.action_count, state.phase),
    }
}
