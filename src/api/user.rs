//! `GET /user-info`, backed by the vendor customer API rather than the
//! realtime database.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use super::{cached, ApiError, AppState};

const CACHE_KEY: &str = "user-info";

/// HTTP client for the customer API.
#[derive(Debug, Clone)]
pub struct CustomerApi {
    http: reqwest::Client,
    base: String,
    email: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CustomerDataResponse {
    first_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfoResponse {
    pub display_name: String,
}

impl CustomerApi {
    pub fn new(http: reqwest::Client, base: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            http,
            base: base.into().trim_end_matches('/').to_string(),
            email: email.into(),
        }
    }

    fn customer_url(&self) -> String {
        format!("{}/api/v2/customer/{}", self.base, self.email)
    }

    /// Fetch the account's display name using `credential` as bearer token.
    #[instrument(skip_all, fields(email = %self.email))]
    pub async fn fetch_user_info(&self, credential: &str) -> Result<UserInfoResponse, ApiError> {
        let resp = self
            .http
            .get(self.customer_url())
            .bearer_auth(credential)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::CustomerStatus(status.as_u16()));
        }

        let customer: CustomerDataResponse = resp.json().await?;
        debug!("Fetched customer record");
        Ok(UserInfoResponse {
            display_name: customer.first_name,
        })
    }
}

pub(super) async fn get_user_info(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    cached(&state, CACHE_KEY.to_string(), async {
        let credential = state.realtime.credential().ok_or(ApiError::NoCredential)?;
        state.customer.fetch_user_info(&credential).await
    })
    .await
}
