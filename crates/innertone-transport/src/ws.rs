//! WebSocket channel connector
//!
//! One reader task forwards inbound text frames as [`ChannelEvent`]s; one
//! writer task drains an unbounded queue so `send` never awaits. Closing the
//! sink stops the reader at once; the writer gets a short grace period to
//! deliver the Close frame.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use innertone_core::{EventSink, InnertoneError, InnertoneResult, SessionId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, warn};

use crate::{ChannelConnector, ChannelEvent, ChannelSink};

/// Dialogue service path; `{id}` is replaced by the session id
pub const DIALOGUE_PATH: &str = "/api/v1/calls/ai-voice/{id}";

/// Signaling relay path; `{id}` is replaced by the room id
pub const SIGNALING_PATH: &str = "/api/v1/calls/signaling/{id}";

const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Connector to `{base_url}{path}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsConnector {
    base_url: String,
    path: String,
}

impl WsConnector {
    pub fn new(base_url: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            path: path.into(),
        }
    }

    pub fn dialogue(base_url: impl Into<String>) -> Self {
        Self::new(base_url, DIALOGUE_PATH)
    }

    pub fn signaling(base_url: impl Into<String>) -> Self {
        Self::new(base_url, SIGNALING_PATH)
    }

    pub fn url_for(&self, session: &SessionId) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            self.path.replace("{id}", session.as_str())
        )
    }
}

enum Outbound {
    Text(String),
    Close,
}

struct WsSink {
    tx: mpsc::UnboundedSender<Outbound>,
    reader: JoinHandle<()>,
}

impl Drop for WsSink {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl ChannelSink for WsSink {
    fn send(&self, frame: String) -> InnertoneResult<()> {
        self.tx
            .send(Outbound::Text(frame))
            .map_err(|_| InnertoneError::ChannelClosed)
    }

    fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
        self.reader.abort();
    }
}

#[async_trait]
impl ChannelConnector for WsConnector {
    async fn connect(
        &self,
        session: &SessionId,
        events: EventSink<ChannelEvent>,
    ) -> InnertoneResult<Box<dyn ChannelSink>> {
        let url = self.url_for(session);
        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| InnertoneError::Transport(e.to_string()))?;
        debug!(%url, "websocket connected");

        let (mut write, mut read) = stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();

        tokio::spawn(async move {
            while let Some(outbound) = rx.recv().await {
                let result = match outbound {
                    Outbound::Text(text) => write.send(Message::Text(text.into())).await,
                    Outbound::Close => {
                        if tokio::time::timeout(CLOSE_GRACE, write.send(Message::Close(None)))
                            .await
                            .is_err()
                        {
                            debug!("websocket close frame timed out");
                        }
                        break;
                    }
                };
                if let Err(err) = result {
                    warn!(%err, "websocket write failed");
                    break;
                }
            }
        });

        events.emit(ChannelEvent::Opened);
        let reader = tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        events.emit(ChannelEvent::Message(text.as_str().to_owned()))
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        events.emit(ChannelEvent::Failed(err.to_string()));
                        return;
                    }
                }
            }
            events.emit(ChannelEvent::Closed);
        });

        Ok(Box::new(WsSink { tx, reader }))
    }
}
