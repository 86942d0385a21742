//! OpenLARQ gateway library
//!
//! This library provides the components behind the `openlarq` binary:
//!
//! - `realtime` - multiplexed client for the vendor's realtime database socket
//! - `auth` - password login that yields the session credential
//! - `cache` - TTL cache for shaped responses
//! - `api` - axum router exposing hydration data over REST
//! - `config` - command-line and environment configuration
//!
//! # Realtime Module
//!
//! ```ignore
//! use openlarq::realtime::{endpoint_url, ClientConfig, QueryParams, RealtimeClient, WebSocketConnector};
//!
//! let url = endpoint_url(&config.database_url, &config.project_id)?;
//! let client = RealtimeClient::connect(ClientConfig::default(), WebSocketConnector::new(url)).await?;
//! client.authenticate_user(&id_token).await?;
//! let body = client.query("/hydrationGoal/u1", QueryParams::default()).await?;
//! ```

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod realtime;
