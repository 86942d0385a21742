//! REST surface of the gateway.
//!
//! Handlers translate query-string parameters into realtime queries, reshape
//! the raw payloads into stable JSON documents, and cache the shaped result
//! for a short time.
//!
//! | Route             | Source                                   |
//! |-------------------|------------------------------------------|
//! | `/health`         | static                                   |
//! | `/liquid-intake`  | realtime `/liquidIntake/{userId}`        |
//! | `/hydration-goal` | realtime `/hydrationGoal/{userId}`       |
//! | `/device-info`    | realtime `/devices/{userId}/{deviceId}`  |
//! | `/user-info`      | customer API `/api/v2/customer/{email}`  |

mod device;
mod goals;
mod intake;
mod user;

use std::future::Future;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, error};

use crate::cache::ResponseCache;
use crate::realtime::{Body, QueryParams, RealtimeClient, RealtimeError};

pub use device::DeviceInfoResponse;
pub use goals::{HydrationGoalEntry, HydrationGoalResponse};
pub use intake::{LiquidIntakeEntry, LiquidIntakeResponse};
pub use user::{CustomerApi, UserInfoResponse};

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub realtime: RealtimeClient,
    pub cache: Arc<ResponseCache<Value>>,
    pub customer: CustomerApi,
}

impl AppState {
    pub fn new(realtime: RealtimeClient, cache: ResponseCache<Value>, customer: CustomerApi) -> Self {
        Self {
            realtime,
            cache: Arc::new(cache),
            customer,
        }
    }

    /// User id of the authenticated realtime session.
    fn user_id(&self) -> Result<String, ApiError> {
        self.realtime.user_id().ok_or(ApiError::NoUserId)
    }

    /// Query the realtime database, treating any status other than `ok` as
    /// an upstream failure.
    async fn query_ok(&self, path: &str, params: QueryParams) -> Result<Body, ApiError> {
        let body = self.realtime.query(path, params).await?;
        if !body.is_ok() {
            let status = body.status().unwrap_or("missing status").to_string();
            return Err(ApiError::Upstream { path: path.to_string(), status });
        }
        Ok(body)
    }
}

/// Handler failures. Everything except a bad request is reported to the
/// client as an opaque 500.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Realtime query failed: {0}")]
    Realtime(#[from] RealtimeError),

    #[error("Realtime query for {path} failed with status {status}")]
    Upstream { path: String, status: String },

    #[error("Realtime session has no user id")]
    NoUserId,

    #[error("No credential available")]
    NoCredential,

    #[error("Customer API request failed: {0}")]
    Customer(#[from] reqwest::Error),

    #[error("Customer API returned status {0}")]
    CustomerStatus(u16),

    #[error("Failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            other => {
                error!(error = %other, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}

/// Build the router with every gateway route.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/liquid-intake", get(intake::get_liquid_intake))
        .route("/hydration-goal", get(goals::get_hydration_goals))
        .route("/device-info", get(device::get_device_info))
        .route("/user-info", get(user::get_user_info))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

/// Serve `key` from the cache, or await `fetch` and cache its result.
/// `fetch` is never polled on a hit.
async fn cached<T, Fut>(state: &AppState, key: String, fetch: Fut) -> Result<Json<Value>, ApiError>
where
    T: Serialize,
    Fut: Future<Output = Result<T, ApiError>>,
{
    if let Some(hit) = state.cache.get(&key) {
        debug!(key = %key, "Cache hit");
        return Ok(Json(hit));
    }

    let value = serde_json::to_value(fetch.await?)?;
    state.cache.set(key, value.clone());
    Ok(Json(value))
}

/// Empty query-string values mean "not set".
fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn str_field(entry: &Map<String, Value>, key: &str) -> String {
    entry
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn f64_field(entry: &Map<String, Value>, key: &str) -> f64 {
    entry.get(key).and_then(Value::as_f64).unwrap_or_default()
}

fn bool_field(entry: &Map<String, Value>, key: &str) -> bool {
    entry.get(key).and_then(Value::as_bool).unwrap_or_default()
}

/// Object-valued entries of a keyed payload, in key order.
fn sorted_entries(data: &Map<String, Value>) -> Vec<&Map<String, Value>> {
    let mut keys: Vec<&String> = data.keys().collect();
    keys.sort();
    keys.into_iter()
        .filter_map(|key| data.get(key).and_then(Value::as_object))
        .collect()
}
