// HTTP implementation of the draft authority contract.
//
// Every call is a JSON request against `base_url`. Responses are mapped onto
// `AuthorityError` so the controllers can tell a refused action (4xx,
// surfaced verbatim) from a network or server failure (retryable).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use draftcoach_core::config::Config;
use draftcoach_core::draft::recommendation::{Commentary, RecommendationSet};
use draftcoach_core::draft::state::Side;
use draftcoach_core::error::AuthorityError;
use draftcoach_core::protocol::{
    ActionRequest, InsightRequest, NegotiationConfig, NegotiationSnapshot, OutcomeRequest,
    SeriesUpdate, StreamHandle, StreamOptions, StreamRequest, StreamTarget, TurnResponse,
};
use draftcoach_core::session::SessionId;

use crate::authority::DraftAuthority;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const SIMULATOR_SESSIONS: &str = "/api/simulator/sessions";
const REPLAY_START: &str = "/api/replay/start";
const REPLAY_SESSIONS: &str = "/api/replay/sessions";

// ---------------------------------------------------------------------------
// HttpAuthority
// ---------------------------------------------------------------------------

/// `reqwest`-backed client for the draft authority.
pub struct HttpAuthority {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAuthority {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AuthorityError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthorityError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AuthorityError> {
        Self::new(&config.authority.base_url, config.authority.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `{base}{collection}/{session}/{suffix..}`, with the session id
    /// pushed as one escaped path segment.
    fn session_url(
        &self,
        collection: &str,
        session: &SessionId,
        suffix: &[&str],
    ) -> Result<Url, AuthorityError> {
        let mut url = Url::parse(&self.url(collection))
            .map_err(|e| AuthorityError::InvalidRequest(format!("bad authority URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| AuthorityError::InvalidRequest("authority URL cannot take a path".into()))?
            .push(session.as_str())
            .extend(suffix);
        Ok(url)
    }
}

#[async_trait]
impl DraftAuthority for HttpAuthority {
    async fn create_negotiation(
        &self,
        config: &NegotiationConfig,
    ) -> Result<NegotiationSnapshot, AuthorityError> {
        config.validate().map_err(AuthorityError::InvalidRequest)?;
        let response = self
            .http
            .post(self.url(SIMULATOR_SESSIONS))
            .json(config)
            .send()
            .await
            .map_err(map_send_error)?;
        decode(response).await
    }

    async fn submit_action(
        &self,
        session: &SessionId,
        champion: &str,
    ) -> Result<TurnResponse, AuthorityError> {
        let body = ActionRequest {
            champion: champion.to_string(),
        };
        let response = self
            .http
            .post(self.session_url(SIMULATOR_SESSIONS, session, &["actions"])?)
            .json(&body)
            .send()
            .await
            .map_err(map_send_error)?;
        decode(response).await
    }

    async fn request_opponent_action(
        &self,
        session: &SessionId,
    ) -> Result<TurnResponse, AuthorityError> {
        let response = self
            .http
            .post(self.session_url(SIMULATOR_SESSIONS, session, &["enemy-action"])?)
            .send()
            .await
            .map_err(map_send_error)?;
        decode(response).await
    }

    async fn fetch_recommendations(
        &self,
        session: &SessionId,
    ) -> Result<RecommendationSet, AuthorityError> {
        let response = self
            .http
            .get(self.session_url(SIMULATOR_SESSIONS, session, &["recommendations"])?)
            .send()
            .await
            .map_err(map_send_error)?;
        decode(response).await
    }

    async fn fetch_insight(
        &self,
        session: &SessionId,
        action_count: u32,
        api_key: Option<&str>,
    ) -> Result<Commentary, AuthorityError> {
        let body = InsightRequest {
            action_count,
            api_key: api_key.map(str::to_string),
        };
        let response = self
            .http
            .post(self.session_url(SIMULATOR_SESSIONS, session, &["insights"])?)
            .json(&body)
            .send()
            .await
            .map_err(map_send_error)?;
        decode(response).await
    }

    async fn record_winner(
        &self,
        session: &SessionId,
        winner: Side,
    ) -> Result<SeriesUpdate, AuthorityError> {
        let response = self
            .http
            .post(self.session_url(SIMULATOR_SESSIONS, session, &["games", "complete"])?)
            .json(&OutcomeRequest { winner })
            .send()
            .await
            .map_err(map_send_error)?;
        decode(response).await
    }

    async fn next_game(&self, session: &SessionId) -> Result<NegotiationSnapshot, AuthorityError> {
        let response = self
            .http
            .post(self.session_url(SIMULATOR_SESSIONS, session, &["games", "next"])?)
            .send()
            .await
            .map_err(map_send_error)?;
        decode(response).await
    }

    async fn end_session(&self, session: &SessionId) -> Result<(), AuthorityError> {
        let response = self
            .http
            .delete(self.session_url(SIMULATOR_SESSIONS, session, &[])?)
            .send()
            .await
            .map_err(map_send_error)?;
        expect_deleted(response).await
    }

    async fn create_stream(
        &self,
        target: &StreamTarget,
        options: &StreamOptions,
    ) -> Result<StreamHandle, AuthorityError> {
        let body = StreamRequest { target, options };
        let response = self
            .http
            .post(self.url(REPLAY_START))
            .json(&body)
            .send()
            .await
            .map_err(map_send_error)?;
        let mut handle: StreamHandle = decode(response).await?;
        handle.subscription_url = resolve_ws_url(&self.base_url, &handle.subscription_url);
        Ok(handle)
    }

    async fn stop_stream(&self, session: &SessionId) -> Result<(), AuthorityError> {
        let response = self
            .http
            .delete(self.session_url(REPLAY_SESSIONS, session, &[])?)
            .send()
            .await
            .map_err(map_send_error)?;
        expect_deleted(response).await
    }
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

fn map_send_error(err: reqwest::Error) -> AuthorityError {
    if err.is_timeout() {
        AuthorityError::Timeout
    } else if err.is_decode() {
        AuthorityError::Decode(err.to_string())
    } else {
        AuthorityError::Transport(err.to_string())
    }
}

/// Check the status, then parse the body as `T`.
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, AuthorityError> {
    let status = response.status();
    let body = response.text().await.map_err(map_send_error)?;
    check_status(status, &body)?;
    serde_json::from_str(&body).map_err(|e| {
        debug!("Undecodable authority response ({status}): {body}");
        AuthorityError::Decode(e.to_string())
    })
}

/// Deletions succeed when the session is gone, whether or not we removed it.
async fn expect_deleted(response: Response) -> Result<(), AuthorityError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Ok(());
    }
    let body = response.text().await.map_err(map_send_error)?;
    check_status(status, &body)
}

fn check_status(status: StatusCode, body: &str) -> Result<(), AuthorityError> {
    if status.is_success() {
        return Ok(());
    }
    let message = error_message(status, body);
    if status.is_client_error() {
        Err(AuthorityError::Rejected {
            status: status.as_u16(),
            message,
        })
    } else {
        Err(AuthorityError::Transport(format!(
            "authority returned {}: {message}",
            status.as_u16()
        )))
    }
}

/// The authority's own explanation, from a JSON `detail`/`message`/`error`
/// field or the raw body.
pub(crate) fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(v) = serde_json::from_str::<Value>(body) {
        for key in ["detail", "message", "error"] {
            if let Some(text) = v.get(key).and_then(Value::as_str) {
                return text.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        trimmed.to_string()
    }
}

/// Turn a subscription URL from the authority into an absolute WebSocket URL.
/// Absolute `ws://`/`wss://` URLs pass through; paths are joined onto the
/// authority's base URL with its scheme switched to `ws`/`wss`.
pub fn resolve_ws_url(base_url: &str, subscription_url: &str) -> String {
    if subscription_url.starts_with("ws://") || subscription_url.starts_with("wss://") {
        return subscription_url.to_string();
    }
    let base = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    if subscription_url.starts_with('/') {
        format!("{ws_base}{subscription_url}")
    } else {
        format!("{ws_base}/{subscription_url}")
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> HttpAuthority {
        HttpAuthority::new(&server.uri(), Duration::from_secs(5)).unwrap()
    }

    fn turn_body(action_count: u32, our_turn: bool) -> Value {
        json!({
            "session_id": "sim-1",
            "action": { "sequence": action_count, "side": "red", "kind": "ban", "champion": "Azir" },
            "draft_state": {
                "red_bans": ["Azir"],
                "phase": "BAN_PHASE_1",
                "next_team": "blue",
                "next_action": "ban",
                "action_count": action_count
            },
            "our_turn": our_turn
        })
    }

    #[tokio::test]
    async fn create_negotiation_posts_config_and_parses_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/simulator/sessions"))
            .and(body_partial_json(json!({
                "blue_team_id": "T1",
                "red_team_id": "GEN",
                "coaching_side": "blue",
                "series_length": 3,
                "draft_mode": "fearless"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "session_id": "sim-1",
                "game_number": 1,
                "draft_state": { "phase": "BAN_PHASE_1", "next_team": "blue", "action_count": 0 },
                "our_turn": true,
                "blue_team": { "id": "T1", "name": "T1", "side": "blue" },
                "red_team": { "id": "GEN", "name": "Gen.G", "side": "red" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = NegotiationConfig::new("T1", "GEN", Side::Blue);
        config.series_length = 3;
        config.draft_mode = draftcoach_core::protocol::DraftMode::Fearless;

        let snap = client(&server).create_negotiation(&config).await.unwrap();
        assert_eq!(snap.session_id.as_str(), "sim-1");
        assert!(snap.our_turn);
        assert_eq!(snap.red_team.map(|t| t.name), Some("Gen.G".to_string()));
    }

    #[tokio::test]
    async fn invalid_config_is_refused_without_a_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let config = NegotiationConfig::new("T1", "T1", Side::Blue);
        let err = client(&server).create_negotiation(&config).await.unwrap_err();
        assert!(matches!(err, AuthorityError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn client_error_detail_is_surfaced_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/simulator/sessions/sim-1/actions"))
            .and(body_partial_json(json!({ "champion": "Ahri" })))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({ "detail": "Ahri has already been banned" })),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .submit_action(&SessionId::new("sim-1"), "Ahri")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AuthorityError::Rejected {
                status: 400,
                message: "Ahri has already been banned".into()
            }
        );
        assert!(err.is_rejection());
    }

    #[tokio::test]
    async fn server_error_is_a_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/simulator/sessions/sim-1/enemy-action"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let err = client(&server)
            .request_opponent_action(&SessionId::new("sim-1"))
            .await
            .unwrap_err();
        assert!(err.is_transport(), "got {err:?}");
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn opponent_action_parses_turn_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/simulator/sessions/sim-1/enemy-action"))
            .respond_with(ResponseTemplate::new(200).set_body_json(turn_body(1, true)))
            .mount(&server)
            .await;

        let turn = client(&server)
            .request_opponent_action(&SessionId::new("sim-1"))
            .await
            .unwrap();
        assert_eq!(turn.draft_state.action_count, 1);
        assert!(turn.our_turn);
        assert_eq!(turn.action.map(|a| a.champion), Some("Azir".to_string()));
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/simulator/sessions/sim-1/recommendations"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
            .mount(&server)
            .await;

        let err = client(&server)
            .fetch_recommendations(&SessionId::new("sim-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthorityError::Decode(_)));
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/simulator/sessions/sim-1/recommendations"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "action_count": 0, "candidates": [] }))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let http = HttpAuthority::new(&server.uri(), Duration::from_millis(100)).unwrap();
        let err = http
            .fetch_recommendations(&SessionId::new("sim-1"))
            .await
            .unwrap_err();
        assert_eq!(err, AuthorityError::Timeout);
    }

    #[tokio::test]
    async fn insight_request_carries_count_and_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/simulator/sessions/sim-1/insights"))
            .and(body_partial_json(json!({ "action_count": 4, "api_key": "sk-test" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "action_count": 4,
                "text": "Red is short on engage.",
                "reranked": [{ "champion": "Rell", "score": 0.8 }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let commentary = client(&server)
            .fetch_insight(&SessionId::new("sim-1"), 4, Some("sk-test"))
            .await
            .unwrap();
        assert_eq!(commentary.action_count, 4);
        assert_eq!(commentary.reranked[0].champion, "Rell");
    }

    #[tokio::test]
    async fn record_winner_returns_series_update() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/simulator/sessions/sim-1/games/complete"))
            .and(body_partial_json(json!({ "winner": "red" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "session_id": "sim-1",
                "blue_wins": 0,
                "red_wins": 1,
                "series_complete": false,
                "blocked_champions": ["Azir", "Vi"]
            })))
            .mount(&server)
            .await;

        let update = client(&server)
            .record_winner(&SessionId::new("sim-1"), Side::Red)
            .await
            .unwrap();
        assert_eq!(update.red_wins, 1);
        assert!(update.blocked_champions.contains("Vi"));
    }

    #[tokio::test]
    async fn deleting_a_missing_session_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/simulator/sessions/sim-gone"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .end_session(&SessionId::new("sim-gone"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn session_id_is_escaped_in_the_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/simulator/sessions/a%2Fb%3Fc%23d/enemy-action"))
            .respond_with(ResponseTemplate::new(200).set_body_json(turn_body(3, true)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/replay/sessions/r%2F1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let http = client(&server);
        let turn = http
            .request_opponent_action(&SessionId::new("a/b?c#d"))
            .await
            .unwrap();
        assert_eq!(turn.draft_state.action_count, 3);
        http.stop_stream(&SessionId::new("r/1")).await.unwrap();
    }

    #[tokio::test]
    async fn create_stream_resolves_relative_subscription_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/replay/start"))
            .and(body_partial_json(json!({ "series_id": "LCK-F", "game_number": 2, "speed": 2.0 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "session_id": "replay-9",
                "subscription_url": "/ws/replay/replay-9"
            })))
            .mount(&server)
            .await;

        let http = client(&server);
        let target = StreamTarget {
            series_id: "LCK-F".into(),
            game_number: 2,
        };
        let options = StreamOptions {
            speed: 2.0,
            ..StreamOptions::default()
        };
        let handle = http.create_stream(&target, &options).await.unwrap();
        assert_eq!(handle.session_id.as_str(), "replay-9");
        assert!(handle.subscription_url.starts_with("ws://"));
        assert!(handle.subscription_url.ends_with("/ws/replay/replay-9"));
    }

    #[test]
    fn error_message_prefers_json_fields() {
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, r#"{"message":"not your turn"}"#),
            "not your turn"
        );
        assert_eq!(error_message(StatusCode::CONFLICT, "  plain text \n"), "plain text");
        assert_eq!(error_message(StatusCode::NOT_FOUND, ""), "Not Found");
    }

    #[test]
    fn resolve_ws_url_variants() {
        assert_eq!(
            resolve_ws_url("https://coach.example/", "/ws/replay/1"),
            "wss://coach.example/ws/replay/1"
        );
        assert_eq!(
            resolve_ws_url("http://127.0.0.1:8000", "ws/replay/1"),
            "ws://127.0.0.1:8000/ws/replay/1"
        );
        assert_eq!(
            resolve_ws_url("http://127.0.0.1:8000", "wss://push.example/r/1"),
            "wss://push.example/r/1"
        );
    }
}
