//! Client for the vendor's realtime database protocol.
//!
//! One long-lived WebSocket carries every request, response and push. This
//! module multiplexes concurrent callers over that socket and keeps it alive
//! across transport failures and credential expiry.
//!
//! # Architecture
//!
//! ```text
//!  query() ──► Multiplexer::register ──► writer (write lock) ──► socket
//!                                                                   │
//!  query() ◄── oneshot waiter ◄── Multiplexer::complete ◄── router ◄─┤
//!                                       ▲                           │
//!                                  push buffer ◄── router ◄── FrameAssembler
//! ```
//!
//! # Protocol
//!
//! Every message is a JSON object with abbreviated keys:
//!
//! ```text
//! {"t":"d","d":{"a":"q","r":3,"b":{"p":"/liquidIntake/u1","q":{"sp":"0"},"t":1}}}
//! {"t":"d","d":{"a":"d","b":{"p":"liquidIntake/u1","d":{"k1":{...}}}}}
//! {"t":"d","d":{"r":3,"b":{"s":"ok","d":{}}}}
//! ```
//!
//! A frame holding only a decimal number announces that the next N frames
//! are chunks of one message.
//!
//! # Usage
//!
//! ```ignore
//! use openlarq::realtime::{endpoint_url, ClientConfig, QueryParams, RealtimeClient, WebSocketConnector};
//!
//! let url = endpoint_url("https://s-usc1b-nss-2136.firebaseio.com", "ferrous-cogency-215410")?;
//! let client = RealtimeClient::connect(ClientConfig::default(), WebSocketConnector::new(url)).await?;
//! client.authenticate_user(&id_token).await?;
//! let body = client.query("/liquidIntake/u1", QueryParams::default()).await?;
//! ```

mod client;
mod framing;
mod message;
mod multiplexer;
mod router;
mod session;
mod transport;

use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

pub use client::{
    ClientConfig, ConnectionState, RealtimeClient, DEFAULT_RECONNECT_DELAY, DEFAULT_REQUEST_TIMEOUT,
};
pub use framing::{assemble, FrameAssembler};
pub use message::{
    Action, Body, Message, MessageData, QueryParams, DATA_MESSAGE, STATUS_EXPIRED_TOKEN, STATUS_OK,
};
pub use multiplexer::{Multiplexer, Waiter};
pub use router::{route, Route};
pub use session::Session;
pub use transport::{endpoint_url, Connector, FrameSink, FrameStream, Transport, WebSocketConnector};

/// Realtime client errors.
///
/// Read failures never show up here: they trigger a reconnect instead.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Dialing the socket failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(#[source] WsError),

    /// No transport is installed, e.g. while reconnecting.
    #[error("Not connected")]
    NotConnected,

    /// Writing a request to the socket failed.
    #[error("Send failed: {0}")]
    Send(#[source] WsError),

    /// No response arrived before the deadline.
    #[error("Request {request_id} timed out after {after:?}")]
    Timeout {
        request_id: u64,
        after: Duration,
    },

    /// Encoding or configuration problem.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The backend answered the auth request with a non-`ok` status.
    #[error("Authentication rejected: {0}")]
    AuthRejected(String),

    /// The client was closed while the request was waiting.
    #[error("Client closed")]
    Closed,
}

impl RealtimeError {
    /// Whether the request ran into its deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, RealtimeError::Timeout { .. })
    }
}
