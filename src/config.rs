//! Gateway configuration.
//!
//! Every setting can be passed as a flag or through the environment, so the
//! gateway runs unchanged from a shell, a container or a `.env`-driven
//! process manager.

use std::time::Duration;

use clap::Parser;

use crate::auth::{LoginConfig, DEFAULT_LOGIN_ENDPOINT};
use crate::realtime::ClientConfig;

/// REST gateway for LARQ hydration data.
#[derive(Parser, Debug, Clone)]
#[command(name = "openlarq", version, about = "REST gateway for LARQ hydration data")]
pub struct Config {
    /// Account email.
    #[arg(long, env = "LARQ_EMAIL")]
    pub email: String,

    /// Account password.
    #[arg(long, env = "LARQ_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Web API key of the vendor app, passed to the identity service.
    #[arg(long, env = "LARQ_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Identity service password-login endpoint.
    #[arg(long, env = "LARQ_LOGIN_ENDPOINT", default_value = DEFAULT_LOGIN_ENDPOINT)]
    pub login_endpoint: String,

    /// Realtime database project (socket namespace).
    #[arg(long, env = "FIREBASE_PROJECT_ID", default_value = "ferrous-cogency-215410")]
    pub project_id: String,

    /// Realtime database base URL; only its host is used.
    #[arg(
        long,
        env = "FIREBASE_DATABASE_URL",
        default_value = "https://s-usc1b-nss-2136.firebaseio.com"
    )]
    pub database_url: String,

    /// Base URL of the vendor customer API.
    #[arg(long, env = "CUSTOMER_API_BASE", default_value = "https://api.livelarq.com")]
    pub customer_api_base: String,

    /// HTTP port to listen on.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Seconds shaped responses stay cached.
    #[arg(long, env = "CACHE_TTL_SECS", default_value_t = 60)]
    pub cache_ttl_secs: u64,

    /// Upper bound on cached responses.
    #[arg(long, env = "CACHE_MAX_ENTRIES", default_value_t = 1000)]
    pub cache_max_entries: u64,

    /// Seconds a realtime query waits for its response.
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Seconds between reconnect attempts.
    #[arg(long, env = "RECONNECT_DELAY_SECS", default_value_t = 5)]
    pub reconnect_delay_secs: u64,
}

impl Config {
    pub fn login(&self) -> LoginConfig {
        LoginConfig {
            endpoint: self.login_endpoint.clone(),
            api_key: self.api_key.clone(),
            email: self.email.clone(),
            password: self.password.clone(),
        }
    }

    pub fn client(&self) -> ClientConfig {
        ClientConfig {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            reconnect_delay: Duration::from_secs(self.reconnect_delay_secs),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}
