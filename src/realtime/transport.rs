//! Socket transport for the realtime client.
//!
//! The client only needs a sink and a stream of text frames. [`Connector`]
//! hides how they are produced so the protocol logic can run against an
//! in-memory transport in tests and against `tokio-tungstenite` in
//! production.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tracing::{debug, info};
use url::Url;

use super::RealtimeError;

/// Protocol version the backend expects in the socket URL.
const PROTOCOL_VERSION: &str = "5";

/// Outbound half of a connection.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = WsError> + Send>>;

/// Inbound half of a connection. Ends when the peer closes.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, WsError>> + Send>>;

/// A freshly dialed connection.
pub struct Transport {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Transport {
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

/// Dials new connections to the backend.
///
/// Called once at startup and again on every reconnect attempt.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Transport, WsError>;
}

/// Build `wss://{host}/.ws?v=5&ns={namespace}` from the configured
/// database URL. The scheme and any path are discarded; a bare host is
/// accepted as well.
pub fn endpoint_url(database_url: &str, namespace: &str) -> Result<Url, RealtimeError> {
    let trimmed = database_url.trim().trim_end_matches('/');
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let base = Url::parse(&with_scheme)
        .map_err(|e| RealtimeError::Protocol(format!("Invalid database URL {}: {}", database_url, e)))?;
    let host = base
        .host_str()
        .ok_or_else(|| RealtimeError::Protocol(format!("Database URL has no host: {}", database_url)))?;
    let authority = match base.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let mut url = Url::parse(&format!("wss://{}/.ws", authority))
        .map_err(|e| RealtimeError::Protocol(format!("Invalid socket URL: {}", e)))?;
    url.query_pairs_mut()
        .append_pair("v", PROTOCOL_VERSION)
        .append_pair("ns", namespace);
    Ok(url)
}

/// Production connector over a TLS WebSocket.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: Url,
}

impl WebSocketConnector {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<Transport, WsError> {
        info!(url = %self.url, "Connecting to realtime socket");
        let (ws, _response) = connect_async(self.url.as_str()).await?;
        let (write, read) = ws.split();

        let sink = write.with(|text: String| future::ok::<_, WsError>(WsMessage::text(text)));

        // Control frames are answered by tungstenite itself; only text and
        // binary payloads reach the assembler.
        let stream = read
            .take_while(|msg| future::ready(!matches!(msg, Ok(WsMessage::Close(_)))))
            .filter_map(|msg| {
                future::ready(match msg {
                    Ok(WsMessage::Text(text)) => Some(Ok(text.as_str().to_owned())),
                    Ok(WsMessage::Binary(bytes)) => Some(Ok(String::from_utf8_lossy(&bytes).into_owned())),
                    Ok(other) => {
                        debug!(kind = ?other, "Ignoring control frame");
                        None
                    }
                    Err(e) => Some(Err(e)),
                })
            });

        Ok(Transport::new(Box::pin(sink), Box::pin(stream)))
    }
}
