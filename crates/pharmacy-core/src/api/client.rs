//! Low-level transport for the pharmacy REST API.
//!
//! `ApiClient` owns the connection pool and base URL, builds requests with
//! an optional bearer token, and turns non-success statuses into
//! `ApiError`s. It has no notion of a session; see `Gateway` for the
//! intercepted, session-aware entry point.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::ApiError;
use crate::auth::IdentityFetcher;
use crate::models::User;

// ============================================================================
// Constants
// ============================================================================

/// Default base URL, matching the backend's dev port
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

/// HTTP request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Endpoint the identity of a token is resolved from
const PROFILE_PATH: &str = "/profile";

/// API client for the pharmacy backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client with the default timeout
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(Self::default_headers())
            .build()?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    fn default_headers() -> header::HeaderMap {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        headers
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Build a request, attaching `Authorization: Bearer <token>` when a
    /// token is given.
    pub fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let request = self.client.request(method, self.url(path));
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Check if response is successful, returning an error with body if not.
    pub async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Read and deserialize a JSON body.
    pub async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let url = response.url().path().to_string();
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response from {}: {}", url, e)))
    }
}

#[async_trait]
impl IdentityFetcher for ApiClient {
    async fn fetch_identity(&self, token: &str) -> Result<User, ApiError> {
        debug!("Fetching session identity");
        let response = self
            .request(Method::GET, PROFILE_PATH, Some(token))
            .send()
            .await?;
        let response = Self::check_response(response).await?;
        // Only id, email and role are needed; the rest of the profile is ignored
        Self::parse_json(response).await
    }
}
