// Scripted in-memory authority for tests and offline demos.
//
// Each endpoint has a FIFO of scripted results with a per-result latency
// (honoured with `tokio::time::sleep`, so paused-clock tests control it).
// An endpoint with nothing scripted never resolves, which lets a test
// observe that a request was issued without answering it. Every call is
// logged.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use tokio::sync::mpsc;
use tracing::debug;

use draftcoach_core::draft::recommendation::{Commentary, RecommendationSet};
use draftcoach_core::draft::state::Side;
use draftcoach_core::error::AuthorityError;
use draftcoach_core::protocol::{
    NegotiationConfig, NegotiationSnapshot, SeriesUpdate, StreamHandle, StreamMessage,
    StreamOptions, StreamTarget, TurnResponse,
};
use draftcoach_core::session::SessionId;

use crate::authority::{DraftAuthority, EventStream, StreamTransport};

/// One request the stub received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateNegotiation { config: NegotiationConfig },
    SubmitAction { session: SessionId, champion: String },
    OpponentAction { session: SessionId },
    Recommendations { session: SessionId },
    Insight { session: SessionId, action_count: u32 },
    RecordWinner { session: SessionId, winner: Side },
    NextGame { session: SessionId },
    EndSession { session: SessionId },
    CreateStream { target: StreamTarget },
    StopStream { session: SessionId },
}

struct Scripted<T> {
    latency: Duration,
    result: Result<T, AuthorityError>,
}

struct Scripts {
    create: VecDeque<Scripted<NegotiationSnapshot>>,
    submit: VecDeque<Scripted<TurnResponse>>,
    opponent: VecDeque<Scripted<TurnResponse>>,
    recommendations: VecDeque<Scripted<RecommendationSet>>,
    insight: VecDeque<Scripted<Commentary>>,
    outcome: VecDeque<Scripted<SeriesUpdate>>,
    next_game: VecDeque<Scripted<NegotiationSnapshot>>,
    stream: VecDeque<Scripted<StreamHandle>>,
    calls: Vec<Call>,
}

/// Scripted `DraftAuthority`.
pub struct StubAuthority {
    inner: Mutex<Scripts>,
}

impl Default for StubAuthority {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! script_fn {
    ($name:ident, $queue:ident, $ty:ty) => {
        pub fn $name(&self, latency: Duration, result: Result<$ty, AuthorityError>) {
            self.lock().$queue.push_back(Scripted { latency, result });
        }
    };
}

impl StubAuthority {
    pub fn new() -> Self {
        StubAuthority {
            inner: Mutex::new(Scripts {
                create: VecDeque::new(),
                submit: VecDeque::new(),
                opponent: VecDeque::new(),
                recommendations: VecDeque::new(),
                insight: VecDeque::new(),
                outcome: VecDeque::new(),
                next_game: VecDeque::new(),
                stream: VecDeque::new(),
                calls: Vec::new(),
            }),
        }
    }

    // A panicking test must not poison the stub for the rest of the run.
    fn lock(&self) -> MutexGuard<'_, Scripts> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    script_fn!(script_create, create, NegotiationSnapshot);
    script_fn!(script_submit, submit, TurnResponse);
    script_fn!(script_opponent, opponent, TurnResponse);
    script_fn!(script_recommendations, recommendations, RecommendationSet);
    script_fn!(script_insight, insight, Commentary);
    script_fn!(script_outcome, outcome, SeriesUpdate);
    script_fn!(script_next_game, next_game, NegotiationSnapshot);
    script_fn!(script_stream, stream, StreamHandle);

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Number of calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn opponent_calls(&self) -> usize {
        self.count(|c| matches!(c, Call::OpponentAction { .. }))
    }

    pub fn recommendation_calls(&self) -> usize {
        self.count(|c| matches!(c, Call::Recommendations { .. }))
    }

    fn record<T>(
        &self,
        call: Call,
        pick: impl FnOnce(&mut Scripts) -> &mut VecDeque<Scripted<T>>,
    ) -> Option<Scripted<T>> {
        let mut scripts = self.lock();
        debug!("Stub authority received {:?}", call);
        scripts.calls.push(call);
        pick(&mut scripts).pop_front()
    }
}

/// Sleep for the scripted latency and return the result, or hang forever if
/// nothing was scripted.
async fn play<T>(scripted: Option<Scripted<T>>) -> Result<T, AuthorityError> {
    match scripted {
        Some(Scripted { latency, result }) => {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            result
        }
        None => std::future::pending().await,
    }
}

#[async_trait]
impl DraftAuthority for StubAuthority {
    async fn create_negotiation(
        &self,
        config: &NegotiationConfig,
    ) -> Result<NegotiationSnapshot, AuthorityError> {
        let next = self.record(
            Call::CreateNegotiation {
                config: config.clone(),
            },
            |s| &mut s.create,
        );
        play(next).await
    }

    async fn submit_action(
        &self,
        session: &SessionId,
        champion: &str,
    ) -> Result<TurnResponse, AuthorityError> {
        let next = self.record(
            Call::SubmitAction {
                session: session.clone(),
                champion: champion.to_string(),
            },
            |s| &mut s.submit,
        );
        play(next).await
    }

    async fn request_opponent_action(
        &self,
        session: &SessionId,
    ) -> Result<TurnResponse, AuthorityError> {
        let next = self.record(
            Call::OpponentAction {
                session: session.clone(),
            },
            |s| &mut s.opponent,
        );
        play(next).await
    }

    async fn fetch_recommendations(
        &self,
        session: &SessionId,
    ) -> Result<RecommendationSet, AuthorityError> {
        let next = self.record(
            Call::Recommendations {
                session: session.clone(),
            },
            |s| &mut s.recommendations,
        );
        play(next).await
    }

    async fn fetch_insight(
        &self,
        session: &SessionId,
        action_count: u32,
        _api_key: Option<&str>,
    ) -> Result<Commentary, AuthorityError> {
        let next = self.record(
            Call::Insight {
                session: session.clone(),
                action_count,
            },
            |s| &mut s.insight,
        );
        play(next).await
    }

    async fn record_winner(
        &self,
        session: &SessionId,
        winner: Side,
    ) -> Result<SeriesUpdate, AuthorityError> {
        let next = self.record(
            Call::RecordWinner {
                session: session.clone(),
                winner,
            },
            |s| &mut s.outcome,
        );
        play(next).await
    }

    async fn next_game(&self, session: &SessionId) -> Result<NegotiationSnapshot, AuthorityError> {
        let next = self.record(
            Call::NextGame {
                session: session.clone(),
            },
            |s| &mut s.next_game,
        );
        play(next).await
    }

    async fn end_session(&self, session: &SessionId) -> Result<(), AuthorityError> {
        let mut scripts = self.lock();
        scripts.calls.push(Call::EndSession {
            session: session.clone(),
        });
        Ok(())
    }

    async fn create_stream(
        &self,
        target: &StreamTarget,
        _options: &StreamOptions,
    ) -> Result<StreamHandle, AuthorityError> {
        let next = self.record(
            Call::CreateStream {
                target: target.clone(),
            },
            |s| &mut s.stream,
        );
        play(next).await
    }

    async fn stop_stream(&self, session: &SessionId) -> Result<(), AuthorityError> {
        let mut scripts = self.lock();
        scripts.calls.push(Call::StopStream {
            session: session.clone(),
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// StubTransport
// ---------------------------------------------------------------------------

/// Sender side of one scripted subscription. Dropping it ends the stream.
pub type PushSender = mpsc::UnboundedSender<Result<StreamMessage, AuthorityError>>;

type PushReceiver = mpsc::UnboundedReceiver<Result<StreamMessage, AuthorityError>>;

/// Scripted `StreamTransport`: each `subscribe` takes the next channel
/// opened with [`open`](Self::open), in order.
#[derive(Default)]
pub struct StubTransport {
    pending: Mutex<VecDeque<PushReceiver>>,
    subscriptions: Mutex<Vec<StreamHandle>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a subscription and return the sender that feeds it.
    pub fn open(&self) -> PushSender {
        let (tx, rx) = mpsc::unbounded_channel();
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(rx);
        tx
    }

    /// Handles subscribed to so far.
    pub fn subscriptions(&self) -> Vec<StreamHandle> {
        self.subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl StreamTransport for StubTransport {
    async fn subscribe(&self, handle: &StreamHandle) -> Result<EventStream, AuthorityError> {
        self.subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handle.clone());
        let rx = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .ok_or_else(|| AuthorityError::Transport("no scripted subscription".into()))?;
        Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test(start_paused = true)]
    async fn scripted_results_are_returned_in_order_after_latency() {
        let stub = StubAuthority::new();
        stub.script_recommendations(
            Duration::from_secs(1),
            Err(AuthorityError::Timeout),
        );
        stub.script_recommendations(
            Duration::ZERO,
            Ok(RecommendationSet {
                action_count: 3,
                for_side: None,
                action: None,
                candidates: vec![],
            }),
        );

        let session = SessionId::new("s");
        let started = tokio::time::Instant::now();
        assert_eq!(
            stub.fetch_recommendations(&session).await,
            Err(AuthorityError::Timeout)
        );
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert_eq!(
            stub.fetch_recommendations(&session)
                .await
                .map(|r| r.action_count),
            Ok(3)
        );
        assert_eq!(stub.recommendation_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unscripted_call_never_resolves() {
        let stub = StubAuthority::new();
        let pending = tokio::time::timeout(
            Duration::from_secs(60),
            stub.request_opponent_action(&SessionId::new("s")),
        )
        .await;
        assert!(pending.is_err());
        assert_eq!(stub.opponent_calls(), 1);
    }

    #[tokio::test]
    async fn transport_feeds_subscriptions_in_order() {
        let transport = StubTransport::new();
        let first = transport.open();
        let handle = StreamHandle {
            session_id: SessionId::new("r-1"),
            subscription_url: "ws://stub/r-1".into(),
        };

        let mut events = transport.subscribe(&handle).await.unwrap();
        first
            .send(Ok(StreamMessage::Paused {
                session_id: SessionId::new("r-1"),
            }))
            .unwrap();
        drop(first);

        assert!(matches!(
            events.next().await,
            Some(Ok(StreamMessage::Paused { .. }))
        ));
        assert!(events.next().await.is_none());
        assert!(transport.subscribe(&handle).await.is_err());
        assert_eq!(transport.subscriptions().len(), 2);
    }
}
