//! In-memory realtime backend for integration tests.
//!
//! [`MemoryConnector`] hands every dialed connection's far end to the test as
//! a [`FakeServer`], which reads the client's frames and scripts replies.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Error as WsError;

use openlarq::realtime::{ClientConfig, ConnectionState, Connector, RealtimeClient, Transport};

/// How long a test waits for anything before failing.
pub const TEST_WAIT: Duration = Duration::from_secs(5);

/// Far end of one client connection.
pub struct FakeServer {
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<Result<String, WsError>>,
}

impl FakeServer {
    /// Next frame the client wrote, decoded.
    pub async fn recv(&mut self) -> Value {
        let text = tokio::time::timeout(TEST_WAIT, self.from_client.next())
            .await
            .expect("timed out waiting for client frame")
            .expect("client hung up");
        serde_json::from_str(&text).expect("client sent invalid JSON")
    }

    /// Next request: `(request_id, action, body)`.
    pub async fn recv_request(&mut self) -> (u64, String, Value) {
        let frame = self.recv().await;
        assert_eq!(frame["t"], "d");
        let id = frame["d"]["r"].as_u64().expect("request without id");
        let action = frame["d"]["a"].as_str().expect("request without action").to_string();
        (id, action, frame["d"]["b"].clone())
    }

    /// Assert the client has written nothing since the last read.
    pub fn assert_idle(&mut self) {
        assert!(
            !matches!(self.from_client.try_next(), Ok(Some(_))),
            "client sent an unexpected frame"
        );
    }

    pub fn send_raw(&self, text: impl Into<String>) {
        self.to_client
            .unbounded_send(Ok(text.into()))
            .expect("client reader is gone");
    }

    pub fn send(&self, value: Value) {
        self.send_raw(value.to_string());
    }

    /// Reply to request `id` with status `ok` and `data`.
    pub fn reply_ok(&self, id: u64, data: Value) {
        self.send(json!({"t": "d", "d": {"r": id, "b": {"s": "ok", "d": data}}}));
    }

    /// Unsolicited put for `path`.
    pub fn push(&self, path: &str, data: Value) {
        self.send(json!({"t": "d", "d": {"a": "d", "b": {"p": path, "d": data}}}));
    }

    /// Read the next request, check it is an auth, and accept it as `user_id`.
    /// Returns the credential the client presented.
    pub async fn accept_auth(&mut self, user_id: &str) -> String {
        let (id, action, body) = self.recv_request().await;
        assert_eq!(action, "auth");
        self.reply_ok(id, json!({"auth": {"user_id": user_id, "provider": "password"}}));
        body["cred"].as_str().expect("auth without credential").to_string()
    }

    /// Make the client's next read fail.
    pub fn fail_read(&self) {
        let err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset");
        let _ = self.to_client.unbounded_send(Err(WsError::Io(err)));
    }
}

/// Connector whose connections live in memory.
pub struct MemoryConnector {
    servers: tokio::sync::mpsc::UnboundedSender<FakeServer>,
    failures: Arc<AtomicUsize>,
    dials: Arc<AtomicUsize>,
}

/// Test-side handle to a [`MemoryConnector`].
pub struct Dials {
    servers: tokio::sync::mpsc::UnboundedReceiver<FakeServer>,
    failures: Arc<AtomicUsize>,
    dials: Arc<AtomicUsize>,
}

impl Dials {
    /// Far end of the next successful dial.
    pub async fn next(&mut self) -> FakeServer {
        tokio::time::timeout(TEST_WAIT, self.servers.recv())
            .await
            .expect("timed out waiting for a dial")
            .expect("connector dropped")
    }

    /// Fail the next `n` dial attempts.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Dial attempts so far, failed ones included.
    pub fn attempts(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

pub fn memory_connector() -> (MemoryConnector, Dials) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let failures = Arc::new(AtomicUsize::new(0));
    let dials = Arc::new(AtomicUsize::new(0));
    (
        MemoryConnector {
            servers: tx,
            failures: Arc::clone(&failures),
            dials: Arc::clone(&dials),
        },
        Dials {
            servers: rx,
            failures,
            dials,
        },
    )
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Transport, WsError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(WsError::ConnectionClosed);
        }

        let (client_tx, from_client) = mpsc::unbounded::<String>();
        let (to_client, client_rx) = mpsc::unbounded::<Result<String, WsError>>();
        self.servers
            .send(FakeServer {
                from_client,
                to_client,
            })
            .map_err(|_| WsError::ConnectionClosed)?;

        let sink = client_tx.sink_map_err(|_| WsError::ConnectionClosed);
        Ok(Transport::new(Box::pin(sink), Box::pin(client_rx)))
    }
}

/// Short deadlines so failure paths finish quickly.
pub fn fast_config() -> ClientConfig {
    ClientConfig {
        request_timeout: Duration::from_millis(500),
        reconnect_delay: Duration::from_millis(20),
    }
}

/// Connect a client to a fresh in-memory backend.
pub async fn connect(config: ClientConfig) -> (RealtimeClient, Dials, FakeServer) {
    let (connector, mut dials) = memory_connector();
    let client = RealtimeClient::connect(config, connector)
        .await
        .expect("connect failed");
    let server = dials.next().await;
    (client, dials, server)
}

/// Connect and authenticate as `u1` with credential `token-1`.
pub async fn connect_authenticated(config: ClientConfig) -> (RealtimeClient, Dials, FakeServer) {
    let (client, dials, mut server) = connect(config).await;
    let (auth, _) = tokio::join!(client.authenticate_user("token-1"), server.accept_auth("u1"));
    auth.expect("auth failed");
    (client, dials, server)
}

pub async fn wait_for_state(client: &RealtimeClient, state: ConnectionState) {
    let mut rx = client.watch_state();
    tokio::time::timeout(TEST_WAIT, rx.wait_for(|s| *s == state))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {:?}", state))
        .expect("state channel closed");
}
