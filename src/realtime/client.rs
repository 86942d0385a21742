//! Connection manager and query facade for the realtime backend.
//!
//! `RealtimeClient` owns one live socket at a time. A dedicated reader task
//! drains the socket, reassembles frames and routes each message to the
//! multiplexer. A supervisor task waits for the reader to stop, then redials
//! and re-authenticates with the stored credential until it succeeds or the
//! client is closed.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected ─► Connecting ─► Connected ◄────────────┐
//!                                  │                   │
//!                   read failure / expired credential  │ redial + re-auth ok
//!                                  ▼                   │
//!                            Reconnecting ─────────────┘
//!                                  │  (retries every reconnect_delay)
//!                               close()
//!                                  ▼
//!                                Closed
//! ```
//!
//! Requests that are pending while the connection is being replaced are not
//! failed; they keep waiting on their own deadline. New requests fail with
//! [`RealtimeError::NotConnected`] until a transport is installed again.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::framing;
use super::message::{Action, Body, Message, QueryParams};
use super::multiplexer::Multiplexer;
use super::router::{self, Route};
use super::transport::{Connector, FrameSink, FrameStream, Transport};
use super::RealtimeError;

/// How long a request waits for its response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Constant delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Upper bound on the graceful close handshake during shutdown.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Tunables for [`RealtimeClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub request_timeout: Duration,
    pub reconnect_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Terminal.
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed => "closed",
        }
    }
}

/// Why a reader task stopped.
#[derive(Debug)]
enum ReadOutcome {
    TransportFailed(String),
    PeerClosed,
    CredentialExpired,
}

struct Inner {
    config: ClientConfig,
    connector: Box<dyn Connector>,
    mux: Multiplexer,
    /// Serializes writes; the socket does not keep frames atomic under
    /// concurrent writers. Distinct from the multiplexer's state lock.
    writer: AsyncMutex<Option<FrameSink>>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
    reader: Mutex<Option<AbortHandle>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

/// Shared handle to the realtime connection. Cloning is cheap.
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("state", &self.state())
            .field("pending", &self.pending_requests())
            .finish()
    }
}

impl RealtimeClient {
    /// Dial the backend and start the reader and supervisor tasks.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::ConnectionFailed`] if the first dial fails.
    /// There is no retry at this point.
    pub async fn connect<C: Connector>(config: ClientConfig, connector: C) -> Result<Self, RealtimeError> {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let inner = Arc::new(Inner {
            config,
            connector: Box::new(connector),
            mux: Multiplexer::new(),
            writer: AsyncMutex::new(None),
            state_tx,
            shutdown: CancellationToken::new(),
            reader: Mutex::new(None),
            supervisor: Mutex::new(None),
        });

        inner.set_state(ConnectionState::Connecting);
        let transport = match inner.connector.connect().await {
            Ok(transport) => transport,
            Err(e) => {
                warn!(error = %e, "Initial realtime connection failed");
                inner.set_state(ConnectionState::Disconnected);
                return Err(RealtimeError::ConnectionFailed(e));
            }
        };

        let generation = inner.mux.with_session(|s| s.generation());
        let reader = inner.install(transport, generation).await?;
        inner.set_state(ConnectionState::Connected);

        let supervisor = tokio::spawn(supervise(Arc::clone(&inner), reader));
        *inner.supervisor.lock() = Some(supervisor);

        Ok(Self { inner })
    }

    /// Authenticate the session and remember the credential for reconnects.
    ///
    /// # Errors
    ///
    /// Fails if the request cannot be sent, times out, or the backend answers
    /// with a status other than `ok`.
    pub async fn authenticate_user(&self, credential: &str) -> Result<(), RealtimeError> {
        self.inner.mux.with_session(|s| s.set_credential(credential));
        self.inner.authenticate(credential).await
    }

    /// Query `path` and wait for the result.
    ///
    /// Streaming reads (pushes followed by an `ok` terminator) come back as
    /// one body whose payload is the array of pushed payloads. Only one
    /// streaming query may be outstanding at a time; pushes are not
    /// correlated to the request that caused them.
    ///
    /// # Errors
    ///
    /// - [`RealtimeError::NotConnected`] / [`RealtimeError::Send`] if the write fails
    /// - [`RealtimeError::Timeout`] if nothing arrives within the request timeout
    /// - [`RealtimeError::Closed`] if the client is closed while waiting
    pub async fn query(&self, path: &str, params: QueryParams) -> Result<Body, RealtimeError> {
        self.inner.request(Action::Query, Body::query(path, params)).await
    }

    /// User id derived from the last successful authentication.
    pub fn user_id(&self) -> Option<String> {
        self.inner.mux.with_session(|s| s.user_id().map(str::to_string))
    }

    /// The active credential, for authorizing calls to other vendor APIs.
    pub fn credential(&self) -> Option<String> {
        self.inner.mux.with_session(|s| s.credential().map(str::to_string))
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Subscribe to connection state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Generation of the session currently installed. Bumped on every reconnect.
    pub fn session_generation(&self) -> u64 {
        self.inner.mux.with_session(|s| s.generation())
    }

    /// Number of requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.inner.mux.pending_len()
    }

    /// Stop the reader and supervisor and release the socket.
    ///
    /// Requests still waiting fail with [`RealtimeError::Closed`]. No
    /// reconnect is attempted afterwards.
    pub async fn close(&self) {
        let inner = &self.inner;
        inner.shutdown.cancel();

        if let Some(supervisor) = inner.supervisor.lock().take() {
            supervisor.abort();
        }
        {
            // `install` checks the token under this same lock.
            let mut writer = inner.writer.lock().await;
            if let Some(reader) = inner.reader.lock().take() {
                reader.abort();
            }
            if let Some(mut sink) = writer.take() {
                if timeout(CLOSE_GRACE, sink.close()).await.is_err() {
                    debug!("Socket close handshake timed out");
                }
            }
        }

        let dropped = inner.mux.fail_all();
        if dropped > 0 {
            info!(dropped, "Failed pending requests on close");
        }
        inner.set_state(ConnectionState::Closed);
    }
}

impl Inner {
    /// Publish a state change. `Closed` is terminal.
    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state || *current == ConnectionState::Closed {
                return false;
            }
            info!(from = current.as_str(), to = state.as_str(), "Realtime connection state changed");
            *current = state;
            true
        });
    }

    /// Install a freshly dialed transport: swap in the writer and start a
    /// reader for the stream. Refuses once the client is closing.
    async fn install(
        self: &Arc<Self>,
        transport: Transport,
        generation: u64,
    ) -> Result<JoinHandle<ReadOutcome>, RealtimeError> {
        let Transport { sink, stream } = transport;
        let mut writer = self.writer.lock().await;
        if self.shutdown.is_cancelled() {
            debug!(generation, "Client closed, discarding new transport");
            return Err(RealtimeError::Closed);
        }
        *writer = Some(sink);

        let reader = tokio::spawn(read_loop(Arc::clone(self), stream, generation));
        *self.reader.lock() = Some(reader.abort_handle());
        Ok(reader)
    }

    async fn drop_writer(&self) {
        self.writer.lock().await.take();
    }

    async fn write(&self, text: String) -> Result<(), RealtimeError> {
        let mut writer = self.writer.lock().await;
        let sink = writer.as_mut().ok_or(RealtimeError::NotConnected)?;
        sink.send(text).await.map_err(RealtimeError::Send)
    }

    /// Register, send, and wait for the response to one request.
    async fn request(&self, action: Action, body: Body) -> Result<Body, RealtimeError> {
        let (request_id, waiter) = self.mux.register();
        let message = Message::request(request_id, action, body);

        let text = match serde_json::to_string(&message) {
            Ok(text) => text,
            Err(e) => {
                self.mux.cancel(request_id);
                return Err(RealtimeError::Protocol(format!("Failed to serialize request: {}", e)));
            }
        };

        debug!(request_id, action = action.as_str(), "Sending request");
        if let Err(e) = self.write(text).await {
            self.mux.cancel(request_id);
            warn!(request_id, error = %e, "Failed to send request");
            return Err(e);
        }

        match timeout(self.config.request_timeout, waiter).await {
            Ok(Ok(body)) => Ok(body),
            Ok(Err(_)) => Err(RealtimeError::Closed),
            Err(_) => {
                self.mux.cancel(request_id);
                warn!(request_id, "Timed out waiting for response");
                Err(RealtimeError::Timeout {
                    request_id,
                    after: self.config.request_timeout,
                })
            }
        }
    }

    async fn authenticate(&self, credential: &str) -> Result<(), RealtimeError> {
        info!(credential_len = credential.len(), "Authenticating realtime session");
        let response = self.request(Action::Auth, Body::auth(credential)).await?;

        if !response.is_ok() {
            let status = response.status().unwrap_or("missing status").to_string();
            return Err(RealtimeError::AuthRejected(status));
        }

        match response.auth_user_id() {
            Some(user_id) => {
                info!(user_id = %user_id, "Realtime session authenticated");
                self.mux.with_session(|s| s.set_user_id(user_id));
            }
            None => warn!("Auth response did not include a user id"),
        }
        Ok(())
    }

    /// Redial until a connection is up and re-authenticated, or the client
    /// is closed. Returns the new reader.
    async fn reestablish(self: &Arc<Self>) -> Option<JoinHandle<ReadOutcome>> {
        let mut attempt: u32 = 0;
        loop {
            if self.shutdown.is_cancelled() {
                return None;
            }
            attempt += 1;

            match self.reconnect_once().await {
                Ok(reader) => {
                    info!(attempt, "Realtime connection re-established");
                    return Some(reader);
                }
                Err(e) => {
                    warn!(
                        attempt,
                        error = %e,
                        delay_ms = self.config.reconnect_delay.as_millis() as u64,
                        "Reconnect failed, retrying"
                    );
                    self.drop_writer().await;
                    tokio::select! {
                        _ = self.shutdown.cancelled() => return None,
                        _ = tokio::time::sleep(self.config.reconnect_delay) => {}
                    }
                }
            }
        }
    }

    async fn reconnect_once(self: &Arc<Self>) -> Result<JoinHandle<ReadOutcome>, RealtimeError> {
        let transport = self
            .connector
            .connect()
            .await
            .map_err(RealtimeError::ConnectionFailed)?;

        let generation = self.mux.renew_session();
        let reader = self.install(transport, generation).await?;

        let credential = self.mux.with_session(|s| s.credential().map(str::to_string));
        if let Some(credential) = credential {
            if let Err(e) = self.authenticate(&credential).await {
                reader.abort();
                return Err(e);
            }
        }
        Ok(reader)
    }
}

/// Drain one connection until it fails, closes, or reports an expired
/// credential.
async fn read_loop(inner: Arc<Inner>, stream: FrameStream, generation: u64) -> ReadOutcome {
    debug!(generation, "Reader started");
    let messages = framing::assemble(stream);
    tokio::pin!(messages);

    while let Some(next) = messages.next().await {
        let text = match next {
            Ok(text) => text,
            Err(e) => {
                warn!(generation, error = %e, "Realtime socket read failed");
                return ReadOutcome::TransportFailed(e.to_string());
            }
        };

        match router::route(&text) {
            Route::Ignore => {}
            Route::CredentialExpired => {
                warn!(generation, "Credential expired, reconnecting");
                return ReadOutcome::CredentialExpired;
            }
            Route::Push(body) => inner.mux.buffer_push(body),
            Route::Response { request_id, body } => {
                debug!(generation, request_id, status = ?body.status, "Response received");
                inner.mux.complete(request_id, body);
            }
        }
    }

    info!(generation, "Realtime socket closed by peer");
    ReadOutcome::PeerClosed
}

/// Watch the current reader and replace the connection whenever it stops.
async fn supervise(inner: Arc<Inner>, mut reader: JoinHandle<ReadOutcome>) {
    loop {
        let outcome = tokio::select! {
            _ = inner.shutdown.cancelled() => {
                reader.abort();
                return;
            }
            joined = &mut reader => match joined {
                Ok(outcome) => outcome,
                Err(e) => ReadOutcome::TransportFailed(format!("reader task failed: {}", e)),
            },
        };
        if inner.shutdown.is_cancelled() {
            return;
        }

        info!(reason = ?outcome, "Realtime connection lost");
        // No writer while `Reconnecting`.
        inner.drop_writer().await;
        inner.set_state(ConnectionState::Reconnecting);

        match inner.reestablish().await {
            Some(next) => {
                reader = next;
                inner.set_state(ConnectionState::Connected);
            }
            None => return,
        }
    }
}
