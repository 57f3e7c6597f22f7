//! Core library for the pharmacy client.
//!
//! Provides the session store, durable token storage, the session-aware
//! HTTP gateway, and the API data models shared by front-ends.
//!
//! A front-end wires the pieces together once at startup:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use pharmacy_core::{ApiClient, Config, Gateway, RecordingNavigator, SessionStore};
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let api = ApiClient::with_timeout(&config.api_base_url, config.request_timeout())?;
//! let session = SessionStore::new(config.token_storage()?, Arc::new(api.clone()));
//! let gateway = Gateway::new(api, session.clone(), Arc::new(RecordingNavigator::new()));
//! session.rehydrate()?;
//! # let _ = gateway;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, Gateway, LoggedIn, Navigator, RecordingNavigator, LOGIN_ROUTE};
pub use auth::{
    IdentityFetch, IdentityOutcome, Session, SessionError, SessionStore, SessionSubscription,
    TokenStorage,
};
pub use config::{Config, StorageKind};
