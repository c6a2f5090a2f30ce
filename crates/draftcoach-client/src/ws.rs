// WebSocket subscription for replay pushes.

use async_trait::async_trait;
use futures_util::stream::{self, Stream};
use futures_util::StreamExt;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use draftcoach_core::error::AuthorityError;
use draftcoach_core::protocol::{StreamHandle, StreamMessage};

use crate::authority::{EventStream, StreamTransport};

/// Opens replay subscriptions with `tokio-tungstenite`.
#[derive(Debug, Clone, Default)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        WsTransport
    }
}

#[async_trait]
impl StreamTransport for WsTransport {
    async fn subscribe(&self, handle: &StreamHandle) -> Result<EventStream, AuthorityError> {
        let url = handle.subscription_url.as_str();
        let (ws, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| AuthorityError::Transport(format!("failed to connect to {url}: {e}")))?;
        info!("Subscribed to replay {} at {}", handle.session_id, url);
        Ok(Box::pin(decode_frames(ws)))
    }
}

/// Decode raw WebSocket frames into stream messages.
///
/// Text frames are parsed as JSON; frames that do not parse are logged and
/// skipped. A close frame ends the stream. A transport error is yielded once
/// as `AuthorityError::Closed` and then ends the stream. Binary, ping and
/// pong frames are ignored.
///
/// Generic over the frame source so it can be tested without a socket.
pub fn decode_frames<St>(
    frames: St,
) -> impl Stream<Item = Result<StreamMessage, AuthorityError>> + Send
where
    St: Stream<Item = Result<Message, WsError>> + Unpin + Send + 'static,
{
    stream::unfold((frames, false), |(mut frames, failed)| async move {
        if failed {
            return None;
        }
        loop {
            match frames.next().await? {
                Ok(Message::Text(text)) => {
                    match serde_json::from_str::<StreamMessage>(text.as_str()) {
                        Ok(msg) => return Some((Ok(msg), (frames, false))),
                        Err(e) => warn!("Skipping undecodable replay message: {e}"),
                    }
                }
                Ok(Message::Close(frame)) => {
                    info!("Replay subscription closed by authority: {:?}", frame);
                    return None;
                }
                Err(e) => {
                    warn!("Replay subscription error: {e}");
                    return Some((Err(AuthorityError::Closed(e.to_string())), (frames, true)));
                }
                Ok(other) => {
                    debug!("Ignoring non-text frame ({} bytes)", other.len());
                }
            }
        }
    })
}
