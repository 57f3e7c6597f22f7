//! Authentication DTOs.
//!
//! Field names follow the backend's camelCase JSON. Refresh-token types are
//! carried for completeness; no flow in this crate exchanges refresh tokens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::user::{Role, User};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub id: i64,
    pub email: String,
    #[serde(with = "super::timestamp")]
    pub registered_at: DateTime<Utc>,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub id: i64,
    pub email: String,
    pub token: String,
    pub role: Role,
    #[serde(with = "super::timestamp")]
    pub issued_at: DateTime<Utc>,
    #[serde(with = "super::timestamp")]
    pub expires_at: DateTime<Utc>,
}

impl LoginResponse {
    pub fn user(&self) -> User {
        User {
            id: self.id,
            email: self.email.clone(),
            role: self.role.clone(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    #[serde(with = "super::timestamp")]
    pub issued_at: DateTime<Utc>,
    #[serde(with = "super::timestamp")]
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordResetResponse {
    pub message: String,
    #[serde(with = "super::timestamp")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordResetConfirm {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChangeRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChangeResponse {
    pub message: String,
    #[serde(with = "super::timestamp")]
    pub updated_at: DateTime<Utc>,
}

/// Error body the backend attaches to 4xx/5xx responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}
