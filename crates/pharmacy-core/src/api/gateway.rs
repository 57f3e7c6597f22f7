//! Session-aware HTTP gateway.
//!
//! Every API call in the application goes through `Gateway`. Before a
//! request is sent the current session token is attached as a bearer
//! credential; when a response comes back 401 the session is ended through
//! `SessionStore::invalidate` and the navigator is sent to the login route.
//! Other statuses are returned to the caller as `ApiError`s. Nothing is
//! retried.

use std::sync::Arc;

use reqwest::{Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use super::client::ApiClient;
use super::navigation::{Navigator, LOGIN_ROUTE};
use super::ApiError;
use crate::auth::{IdentityFetch, SessionStore};
use crate::models::{
    Drug, LoginRequest, LoginResponse, PasswordChangeRequest, PasswordChangeResponse,
    PasswordResetConfirm, PasswordResetRequest, PasswordResetResponse, Prescription,
    PrescriptionRequest, RegistrationRequest, RegistrationResponse, UserProfile,
    UserProfileUpdate,
};

/// What a 401 on a request means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unauthorized {
    /// The session token was rejected: end the session and redirect.
    EndsSession,
    /// Submitted credentials were rejected (login, registration, reset):
    /// end the session but stay on the login route.
    RejectsCredentials,
}

/// Result of a successful credential login.
pub struct LoggedIn {
    pub response: LoginResponse,
    /// Identity fetch started for the new token.
    pub identity: IdentityFetch,
}

#[derive(Clone)]
pub struct Gateway {
    api: ApiClient,
    session: Arc<SessionStore>,
    navigator: Arc<dyn Navigator>,
}

impl Gateway {
    pub fn new(api: ApiClient, session: Arc<SessionStore>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            api,
            session,
            navigator,
        }
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        query: Option<&[(&str, &str)]>,
        body: Option<&B>,
        on_unauthorized: Unauthorized,
    ) -> Result<Response, ApiError> {
        let (token, generation) = self.session.token_with_generation();

        let mut request = self.api.request(method.clone(), path, token.as_deref());
        if let Some(query) = query {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!(%method, path, authenticated = token.is_some(), "Sending request");
        let response = request.send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(match on_unauthorized {
                Unauthorized::EndsSession => self.end_session(generation, path),
                Unauthorized::RejectsCredentials => self.reject_credentials(generation, path),
            });
        }

        ApiClient::check_response(response).await
    }

    /// Response interceptor for 401: end the session the request was sent
    /// under and go to the login route. Later 401s from the same session are
    /// absorbed so the redirect happens once.
    fn end_session(&self, generation: u64, path: &str) -> ApiError {
        let ended = match self.session.invalidate(generation) {
            Ok(ended) => ended,
            Err(e) => {
                // In-memory session is gone even though storage could not be cleared
                warn!(error = %e, "Failed to clear stored token after 401");
                true
            }
        };

        if ended {
            warn!(path, route = LOGIN_ROUTE, "Session rejected by server, redirecting to login");
            self.navigator.redirect_to(LOGIN_ROUTE);
        } else {
            debug!(path, "401 for a session that already ended");
        }
        ApiError::SessionExpired
    }

    /// Response interceptor for 401 on a credential endpoint: any stored
    /// session is dropped, but the caller is already at the login route so
    /// no redirect is issued.
    fn reject_credentials(&self, generation: u64, path: &str) -> ApiError {
        match self.session.invalidate(generation) {
            Ok(true) => debug!(path, "Credentials rejected, previous session cleared"),
            Ok(false) => debug!(path, "Credentials rejected"),
            Err(e) => warn!(error = %e, "Failed to clear stored token after 401"),
        }
        ApiError::InvalidCredentials
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self
            .send::<()>(Method::GET, path, None, None, Unauthorized::EndsSession)
            .await?;
        ApiClient::parse_json(response).await
    }

    async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let response = self
            .send::<()>(Method::GET, path, Some(query), None, Unauthorized::EndsSession)
            .await?;
        ApiClient::parse_json(response).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        on_unauthorized: Unauthorized,
    ) -> Result<T, ApiError> {
        let response = self
            .send(Method::POST, path, None, Some(body), on_unauthorized)
            .await?;
        ApiClient::parse_json(response).await
    }

    async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self
            .send(Method::PUT, path, None, Some(body), Unauthorized::EndsSession)
            .await?;
        ApiClient::parse_json(response).await
    }

    async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send::<()>(Method::DELETE, path, None, None, Unauthorized::EndsSession)
            .await?;
        Ok(())
    }

    // ===== Authentication =====

    pub async fn register(&self, email: &str, password: &str) -> Result<RegistrationResponse, ApiError> {
        let body = RegistrationRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let registered: RegistrationResponse = self
            .post("/auth/register", &body, Unauthorized::RejectsCredentials)
            .await?;
        info!(user_id = registered.id, "Account registered");
        Ok(registered)
    }

    /// Exchange credentials for a token and start a session with it.
    ///
    /// A rejected login ends any existing session.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoggedIn, ApiError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response: LoginResponse = self
            .post("/auth/login", &body, Unauthorized::RejectsCredentials)
            .await?;
        let identity = self.session.login(&response.token)?;
        info!(user_id = response.id, expires_at = %response.expires_at, "Logged in");
        Ok(LoggedIn { response, identity })
    }

    /// End the session locally. No request is made.
    pub fn logout(&self) -> Result<(), ApiError> {
        self.session.logout()?;
        Ok(())
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<PasswordResetResponse, ApiError> {
        let body = PasswordResetRequest {
            email: email.to_string(),
        };
        self.post("/auth/password/reset", &body, Unauthorized::RejectsCredentials)
            .await
    }

    pub async fn confirm_password_reset(
        &self,
        reset_token: &str,
        new_password: &str,
    ) -> Result<PasswordChangeResponse, ApiError> {
        let body = PasswordResetConfirm {
            token: reset_token.to_string(),
            new_password: new_password.to_string(),
        };
        self.post("/auth/password/reset/confirm", &body, Unauthorized::RejectsCredentials)
            .await
    }

    // ===== Profile =====

    pub async fn get_profile(&self) -> Result<UserProfile, ApiError> {
        self.get("/profile").await
    }

    pub async fn update_profile(&self, update: &UserProfileUpdate) -> Result<UserProfile, ApiError> {
        self.put("/profile", update).await
    }

    pub async fn change_password(
        &self,
        old_password: &str,
        new_password: &str,
    ) -> Result<PasswordChangeResponse, ApiError> {
        let body = PasswordChangeRequest {
            old_password: old_password.to_string(),
            new_password: new_password.to_string(),
        };
        self.post("/profile/password", &body, Unauthorized::EndsSession)
            .await
    }

    // ===== Drugs =====

    pub async fn list_drugs(&self) -> Result<Vec<Drug>, ApiError> {
        self.get("/drugs").await
    }

    pub async fn get_drug(&self, id: i64) -> Result<Drug, ApiError> {
        self.get(&format!("/drugs/{}", id)).await
    }

    pub async fn list_public_drugs(&self) -> Result<Vec<Drug>, ApiError> {
        self.get("/public/drugs").await
    }

    pub async fn search_public_drugs(&self, query: &str) -> Result<Vec<Drug>, ApiError> {
        self.get_with_query("/public/drugs/search", &[("query", query)])
            .await
    }

    // ===== Prescriptions =====

    pub async fn list_prescriptions(&self) -> Result<Vec<Prescription>, ApiError> {
        self.get("/prescriptions").await
    }

    pub async fn get_prescription(&self, id: i64) -> Result<Prescription, ApiError> {
        self.get(&format!("/prescriptions/{}", id)).await
    }

    pub async fn create_prescription(&self, request: &PrescriptionRequest) -> Result<Prescription, ApiError> {
        self.post("/prescriptions", request, Unauthorized::EndsSession)
            .await
    }

    pub async fn update_prescription(
        &self,
        id: i64,
        request: &PrescriptionRequest,
    ) -> Result<Prescription, ApiError> {
        self.put(&format!("/prescriptions/{}", id), request).await
    }

    pub async fn delete_prescription(&self, id: i64) -> Result<(), ApiError> {
        self.delete(&format!("/prescriptions/{}", id)).await
    }
}
