//! REST API client module for the pharmacy backend.
//!
//! - `ApiClient`: connection pool, base URL, bearer attachment
//! - `Gateway`: the session-aware entry point used by the application;
//!   intercepts every request and response
//! - `Navigator`: how the gateway sends the UI back to the login route
//!
//! The API uses bearer tokens obtained from `POST /auth/login`.

pub mod client;
pub mod error;
pub mod gateway;
pub mod navigation;

pub use client::ApiClient;
pub use error::ApiError;
pub use gateway::{Gateway, LoggedIn};
pub use navigation::{Navigator, RecordingNavigator, LOGIN_ROUTE};
