// Application state and event loop.
//
// One task owns both controllers and is the only place either is mutated.
// It multiplexes user commands and the completion channels of the two
// controllers, and pushes a fresh view to the console whenever a
// controller reports a change.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use draftcoach_client::{DraftAuthority, StreamTransport};
use draftcoach_core::config::Config;
use draftcoach_core::draft::state::Side;
use draftcoach_core::protocol::{NegotiationConfig, StreamOptions, StreamTarget};

use crate::negotiation::{
    NegotiationController, NegotiationEvent, NegotiationSettings, NegotiationView,
};
use crate::stream::{StreamController, StreamEvent, StreamView};

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A request from the user.
#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    Negotiate(NegotiationConfig),
    Pick(String),
    Opponent,
    Insight,
    Winner(Side),
    NextGame,
    EndNegotiation,
    Replay(StreamTarget),
    StopReplay,
    ChangeTarget(StreamTarget),
    Status,
    Quit,
}

/// Something the console should show.
#[derive(Debug, Clone)]
pub enum UiUpdate {
    Negotiation(Box<NegotiationView>),
    Stream(Box<StreamView>),
    /// A command was refused before reaching either controller.
    Rejected(String),
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

pub struct AppState {
    pub negotiation: NegotiationController,
    pub stream: StreamController,
    pub stream_options: StreamOptions,
}

impl AppState {
    pub fn new(
        config: &Config,
        authority: Arc<dyn DraftAuthority>,
        transport: Arc<dyn StreamTransport>,
        negotiation_tx: mpsc::Sender<NegotiationEvent>,
        stream_tx: mpsc::Sender<StreamEvent>,
    ) -> Self {
        let negotiation = NegotiationController::new(
            Arc::clone(&authority),
            NegotiationSettings::from_config(config),
            negotiation_tx,
        );
        let stream = StreamController::new(
            authority,
            transport,
            config.stream.commentary_wait(),
            stream_tx,
        );
        AppState {
            negotiation,
            stream,
            stream_options: config.stream_options(),
        }
    }

    /// Apply one command. Returns the updates to show.
    pub fn handle_command(&mut self, cmd: UserCommand) -> Vec<UiUpdate> {
        let mut updates = Vec::new();
        match cmd {
            UserCommand::Negotiate(config) => {
                // One session per client: a negotiation supersedes a replay.
                if self.stream.is_active() {
                    self.stream.stop();
                }
                match self.negotiation.start(config) {
                    Ok(()) => updates.push(self.negotiation_update()),
                    Err(message) => updates.push(UiUpdate::Rejected(message)),
                }
            }
            UserCommand::Pick(champion) => {
                if self.negotiation.submit_our_action(&champion) {
                    updates.push(self.negotiation_update());
                } else {
                    updates.push(UiUpdate::Rejected(format!(
                        "cannot submit {champion} now ({:?})",
                        self.negotiation.status()
                    )));
                }
            }
            UserCommand::Opponent => {
                if !self.negotiation.trigger_opponent_turn() {
                    updates.push(UiUpdate::Rejected(
                        "not waiting on the opponent, or already asked".into(),
                    ));
                }
            }
            UserCommand::Insight => {
                if self.negotiation.request_insight() {
                    updates.push(self.negotiation_update());
                } else {
                    updates.push(UiUpdate::Rejected("no active negotiation".into()));
                }
            }
            UserCommand::Winner(side) => {
                if !self.negotiation.record_outcome(side) {
                    updates.push(UiUpdate::Rejected(
                        "outcome can be recorded once, after the draft completes".into(),
                    ));
                }
            }
            UserCommand::NextGame => {
                if !self.negotiation.advance_game() {
                    updates.push(UiUpdate::Rejected(
                        "record the winner of an unfinished series first".into(),
                    ));
                }
            }
            UserCommand::EndNegotiation => {
                self.negotiation.end_session();
                updates.push(self.negotiation_update());
            }
            UserCommand::Replay(target) => {
                if self.negotiation.is_active() {
                    self.negotiation.end_session();
                }
                self.stream.start(target, self.stream_options.clone());
                updates.push(self.stream_update());
            }
            UserCommand::StopReplay => {
                self.stream.stop();
                updates.push(self.stream_update());
            }
            UserCommand::ChangeTarget(target) => {
                if self.negotiation.is_active() {
                    self.negotiation.end_session();
                }
                self.stream.change_target(target.clone());
                self.stream.start(target, self.stream_options.clone());
                updates.push(self.stream_update());
            }
            UserCommand::Status => {
                updates.push(self.negotiation_update());
                updates.push(self.stream_update());
            }
            UserCommand::Quit => {}
        }
        updates
    }

    /// Cancel all background work and release remote sessions.
    pub fn shutdown(&mut self) {
        self.negotiation.end_session();
        self.stream.stop();
    }

    fn negotiation_update(&self) -> UiUpdate {
        UiUpdate::Negotiation(Box::new(self.negotiation.view()))
    }

    fn stream_update(&self) -> UiUpdate {
        UiUpdate::Stream(Box::new(self.stream.view()))
    }
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

/// Run the event loop until `Quit` or the command channel closes.
///
/// Pushes UI updates through `ui_tx` for the console.
pub async fn run(
    mut negotiation_rx: mpsc::Receiver<NegotiationEvent>,
    mut stream_rx: mpsc::Receiver<StreamEvent>,
    mut cmd_rx: mpsc::Receiver<UserCommand>,
    ui_tx: mpsc::Sender<UiUpdate>,
    mut state: AppState,
) -> anyhow::Result<()> {
    info!("Application event loop started");

    loop {
        tokio::select! {
            // --- User commands ---
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UserCommand::Quit) => {
                        info!("Quit command received, shutting down");
                        break;
                    }
                    Some(cmd) => {
                        debug!("Command: {:?}", cmd);
                        for update in state.handle_command(cmd) {
                            let _ = ui_tx.send(update).await;
                        }
                    }
                    None => {
                        info!("Command channel closed, shutting down");
                        break;
                    }
                }
            }

            // --- Negotiation completions ---
            // The controller holds a sender, so this channel never closes
            // while the loop runs.
            Some(event) = negotiation_rx.recv() => {
                if state.negotiation.handle_event(event) {
                    let _ = ui_tx.send(state.negotiation_update()).await;
                }
            }

            // --- Replay pushes ---
            Some(event) = stream_rx.recv() => {
                if state.stream.handle_event(event) {
                    let _ = ui_tx.send(state.stream_update()).await;
                }
            }
        }
    }

    state.shutdown();
    info!("Application event loop exiting");
    Ok(())
}
