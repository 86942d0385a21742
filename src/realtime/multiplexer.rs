//! Request/response correlation and push accumulation.
//!
//! The session, the pending table and the push buffer share one lock. The
//! lock is never held across an `.await`.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::message::Body;
use super::session::Session;

/// Receives the single response for a registered request.
pub type Waiter = oneshot::Receiver<Body>;

#[derive(Debug, Default)]
struct State {
    session: Session,
    pending: HashMap<u64, oneshot::Sender<Body>>,
    /// Pushes received while a streaming read is in flight.
    ///
    /// Pushes carry no request id, so the whole buffer goes to whichever
    /// request completes next. Callers must keep at most one streaming
    /// query outstanding at a time.
    pushes: Vec<Body>,
}

impl State {
    fn deliver(&mut self, request_id: u64, body: Body) -> bool {
        match self.pending.remove(&request_id) {
            Some(tx) => {
                if tx.send(body).is_err() {
                    debug!(request_id, "Waiter dropped before delivery");
                }
                true
            }
            None => {
                warn!(request_id, "No pending request for response, dropping");
                false
            }
        }
    }
}

/// Routes responses back to the callers that are waiting for them.
#[derive(Debug, Default)]
pub struct Multiplexer {
    state: Mutex<State>,
}

impl Multiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a request id and a waiter for its response.
    pub fn register(&self) -> (u64, Waiter) {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock();
        let id = state.session.next_id();
        state.pending.insert(id, tx);
        (id, rx)
    }

    /// Fulfil the waiter for `request_id`. Returns `false` if nothing was
    /// waiting, e.g. because the caller already timed out.
    pub fn deliver(&self, request_id: u64, body: Body) -> bool {
        self.state.lock().deliver(request_id, body)
    }

    /// Drop a pending entry without fulfilling it.
    pub fn cancel(&self, request_id: u64) -> bool {
        self.state.lock().pending.remove(&request_id).is_some()
    }

    /// Buffer an unsolicited push until the next request completes.
    pub fn buffer_push(&self, body: Body) {
        let mut state = self.state.lock();
        state.pushes.push(body);
        debug!(buffered = state.pushes.len(), "Buffered push");
    }

    /// Handle a response carrying a request id.
    ///
    /// An `ok` response arriving while pushes are buffered terminates a
    /// streaming read: the caller receives the buffered payloads and the
    /// buffer is cleared, whether or not the caller is still waiting. Any
    /// other response is delivered as-is.
    pub fn complete(&self, request_id: u64, body: Body) -> bool {
        let mut state = self.state.lock();
        if body.is_ok() && !state.pushes.is_empty() {
            let pushes = std::mem::take(&mut state.pushes);
            debug!(request_id, pushes = pushes.len(), "Flushing streamed pushes");
            return state.deliver(request_id, Body::streamed(body, pushes));
        }
        state.deliver(request_id, body)
    }

    /// Drop every pending waiter; their receivers observe a closed channel.
    pub fn fail_all(&self) -> usize {
        let mut state = self.state.lock();
        state.pushes.clear();
        let dropped = state.pending.len();
        state.pending.clear();
        dropped
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn buffered_len(&self) -> usize {
        self.state.lock().pushes.len()
    }

    /// Run `f` against the current session under the state lock.
    pub fn with_session<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        f(&mut self.state.lock().session)
    }

    /// Install the session for a new connection, returning its generation.
    pub fn renew_session(&self) -> u64 {
        let mut state = self.state.lock();
        state.session = state.session.next_generation();
        state.session.generation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn status(s: &str) -> Body {
        Body {
            status: Some(s.to_string()),
            ..Body::default()
        }
    }

    fn push(data: serde_json::Value) -> Body {
        Body {
            path: Some("liquidIntake/u1".into()),
            data: Some(data),
            ..Body::default()
        }
    }

    #[test]
    fn test_register_allocates_distinct_ids() {
        let mux = Multiplexer::new();
        let (a, _ra) = mux.register();
        let (b, _rb) = mux.register();
        assert_ne!(a, b);
        assert!(b > a);
        assert_eq!(mux.pending_len(), 2);
    }

    #[tokio::test]
    async fn test_deliver_wakes_only_the_matching_waiter() {
        let mux = Multiplexer::new();
        let (a, ra) = mux.register();
        let (b, mut rb) = mux.register();

        assert!(mux.deliver(a, status("for-a")));
        assert_eq!(ra.await.unwrap().status(), Some("for-a"));
        assert!(rb.try_recv().is_err());
        assert_eq!(mux.pending_len(), 1);

        assert!(mux.deliver(b, status("for-b")));
        assert_eq!(rb.await.unwrap().status(), Some("for-b"));
    }

    #[test]
    fn test_deliver_is_exactly_once() {
        let mux = Multiplexer::new();
        let (id, _rx) = mux.register();
        assert!(mux.deliver(id, status("ok")));
        assert!(!mux.deliver(id, status("ok")));
    }

    #[test]
    fn test_late_delivery_after_cancel_is_dropped() {
        let mux = Multiplexer::new();
        let (id, _rx) = mux.register();
        let (other, mut other_rx) = mux.register();

        assert!(mux.cancel(id));
        assert!(!mux.deliver(id, status("ok")));
        assert!(!mux.cancel(id));

        assert_eq!(mux.pending_len(), 1);
        assert!(other_rx.try_recv().is_err());
        assert!(mux.deliver(other, status("ok")));
    }

    #[tokio::test]
    async fn test_ok_terminator_flushes_buffered_pushes() {
        let mux = Multiplexer::new();
        let (id, rx) = mux.register();

        mux.buffer_push(push(json!({"k1": {"v": 1}})));
        mux.buffer_push(push(json!({"k2": {"v": 2}})));
        assert_eq!(mux.buffered_len(), 2);

        assert!(mux.complete(id, status("ok")));
        let body = rx.await.unwrap();
        assert_eq!(body.data, Some(json!([{"k1": {"v": 1}}, {"k2": {"v": 2}}])));
        assert_eq!(mux.buffered_len(), 0);
    }

    #[tokio::test]
    async fn test_ok_without_pushes_is_delivered_directly() {
        let mux = Multiplexer::new();
        let (id, rx) = mux.register();
        let body = Body {
            status: Some("ok".into()),
            data: Some(json!({"auth": {"user_id": "u1"}})),
            ..Body::default()
        };

        mux.complete(id, body.clone());
        assert_eq!(rx.await.unwrap(), body);
    }

    #[tokio::test]
    async fn test_non_ok_response_leaves_buffer_untouched() {
        let mux = Multiplexer::new();
        let (id, rx) = mux.register();
        mux.buffer_push(push(json!({"k1": 1})));

        mux.complete(id, status("permission_denied"));
        assert_eq!(rx.await.unwrap().status(), Some("permission_denied"));
        assert_eq!(mux.buffered_len(), 1);
    }

    #[test]
    fn test_flush_for_unknown_id_still_clears_buffer() {
        let mux = Multiplexer::new();
        mux.buffer_push(push(json!({"k1": 1})));
        assert!(!mux.complete(99, status("ok")));
        assert_eq!(mux.buffered_len(), 0);
    }

    #[tokio::test]
    async fn test_fail_all_closes_waiters() {
        let mux = Multiplexer::new();
        let (_, rx) = mux.register();
        assert_eq!(mux.fail_all(), 1);
        assert!(rx.await.is_err());
        assert_eq!(mux.pending_len(), 0);
    }

    #[test]
    fn test_renew_session_keeps_id_sequence() {
        let mux = Multiplexer::new();
        let (first, _r1) = mux.register();
        assert_eq!(mux.renew_session(), 2);
        let (second, _r2) = mux.register();
        assert_eq!(second, first + 1);
    }
}
