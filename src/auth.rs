//! Password login against the vendor's identity service.
//!
//! Produces the ID token the realtime session authenticates with. This is a
//! one-shot call made at startup; the realtime client keeps the token and
//! replays it on every reconnect.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};

/// Identity-toolkit password verification endpoint.
pub const DEFAULT_LOGIN_ENDPOINT: &str =
    "https://www.googleapis.com/identitytoolkit/v3/relyingparty/verifyPassword";

/// Login failures.
#[derive(Debug, Error)]
pub enum LoginError {
    #[error("Login request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Login rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Login response did not contain an ID token")]
    MissingToken,
}

/// Where and as whom to log in.
#[derive(Debug, Clone)]
pub struct LoginConfig {
    pub endpoint: String,
    pub api_key: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    client_type: &'a str,
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

/// Identity service response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthResponse {
    pub kind: String,
    pub local_id: String,
    pub email: String,
    pub display_name: String,
    pub id_token: String,
    pub registered: bool,
    pub refresh_token: String,
    pub expires_in: String,
}

/// Exchange email and password for an ID token.
#[instrument(skip_all, fields(email = %config.email))]
pub async fn login(http: &reqwest::Client, config: &LoginConfig) -> Result<String, LoginError> {
    let request = LoginRequest {
        client_type: "CLIENT_TYPE_IOS",
        email: &config.email,
        password: &config.password,
        return_secure_token: true,
    };

    let resp = http
        .post(&config.endpoint)
        .query(&[("key", config.api_key.as_str())])
        .json(&request)
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        return Err(LoginError::Rejected {
            status: status.as_u16(),
            message,
        });
    }

    let auth: AuthResponse = resp.json().await?;
    if auth.id_token.is_empty() {
        return Err(LoginError::MissingToken);
    }

    info!(local_id = %auth.local_id, expires_in = %auth.expires_in, "Logged in");
    Ok(auth.id_token)
}
