//! Classification of assembled messages.

use tracing::{debug, warn};

use super::message::{Action, Body, Message};

/// What the reader should do with one logical message.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Not request/response or push traffic, or undecodable.
    Ignore,
    /// The backend reported the credential as expired.
    CredentialExpired,
    /// Unsolicited push to buffer.
    Push(Body),
    /// Response for a pending request.
    Response { request_id: u64, body: Body },
}

/// Decode a logical message and decide where it goes.
///
/// Decode failures are logged and ignored; they never affect the connection.
pub fn route(text: &str) -> Route {
    let message: Message = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "Dropping undecodable message");
            return Route::Ignore;
        }
    };

    if !message.is_data() {
        debug!(kind = %message.kind, "Skipping non-data message");
        return Route::Ignore;
    }

    let Some(data) = message.data else {
        debug!("Data message without payload");
        return Route::Ignore;
    };

    if data.body.is_expired_token() {
        return Route::CredentialExpired;
    }

    let action = data.action.as_deref().and_then(Action::from_wire);
    match (data.request_id, action) {
        (Some(request_id), _) => Route::Response {
            request_id,
            body: data.body,
        },
        (None, Some(action)) if action.is_push() => Route::Push(data.body),
        (None, _) => {
            debug!(action = ?data.action, "Dropping uncorrelated message");
            Route::Ignore
        }
    }
}
