//! Identity and profile records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account role as reported by the backend.
///
/// Unknown roles are preserved verbatim so a newer backend does not break
/// identity fetches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    User,
    Pharmacist,
    Admin,
    Other(String),
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        match s.trim_start_matches("ROLE_").to_ascii_uppercase().as_str() {
            "USER" => Role::User,
            "PHARMACIST" => Role::Pharmacist,
            "ADMIN" => Role::Admin,
            _ => Role::Other(s),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::User => "USER".to_string(),
            Role::Pharmacist => "PHARMACIST".to_string(),
            Role::Admin => "ADMIN".to_string(),
            Role::Other(s) => s,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "USER"),
            Role::Pharmacist => write!(f, "PHARMACIST"),
            Role::Admin => write!(f, "ADMIN"),
            Role::Other(s) => write!(f, "{}", s),
        }
    }
}

/// The identity a session token authorizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub role: Role,
}

/// Full profile as returned by `GET /profile`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    pub role: Role,
    #[serde(with = "super::timestamp")]
    pub registered_at: DateTime<Utc>,
    #[serde(with = "super::timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// Reduce the profile to the identity carried by a session.
    pub fn identity(&self) -> User {
        User {
            id: self.id,
            email: self.email.clone(),
            role: self.role.clone(),
        }
    }
}

/// Body of `PUT /profile`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfileUpdate {
    pub address: String,
    pub phone_number: String,
    pub payment_method: String,
}

impl UserProfileUpdate {
    /// Start an update from the current profile so unchanged fields round-trip.
    pub fn from_profile(profile: &UserProfile) -> Self {
        Self {
            address: profile.address.clone().unwrap_or_default(),
            phone_number: profile.phone_number.clone().unwrap_or_default(),
            payment_method: profile.payment_method.clone().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_str() {
        assert_eq!(Role::from("USER".to_string()), Role::User);
        assert_eq!(Role::from("ROLE_ADMIN".to_string()), Role::Admin);
        assert_eq!(Role::from("pharmacist".to_string()), Role::Pharmacist);
        assert_eq!(
            Role::from("AUDITOR".to_string()),
            Role::Other("AUDITOR".to_string())
        );
    }

    #[test]
    fn test_parse_profile_response() {
        let json = r#"{"id":7,"email":"a@b.com","address":"1 Main St","phoneNumber":null,"role":"USER","registeredAt":"2024-01-02T03:04:05","updatedAt":"2024-02-02T03:04:05"}"#;
        let profile: UserProfile = serde_json::from_str(json).expect("Failed to parse profile JSON");
        assert_eq!(profile.address.as_deref(), Some("1 Main St"));
        assert!(profile.phone_number.is_none());
        assert!(profile.payment_method.is_none());
        assert_eq!(
            profile.identity(),
            User {
                id: 7,
                email: "a@b.com".to_string(),
                role: Role::User
            }
        );
    }

    #[test]
    fn test_update_from_profile_keeps_missing_fields_empty() {
        let json = r#"{"id":7,"email":"a@b.com","phoneNumber":"555","role":"USER","registeredAt":"2024-01-02T03:04:05","updatedAt":"2024-01-02T03:04:05"}"#;
        let profile: UserProfile = serde_json::from_str(json).expect("Failed to parse profile JSON");
        let update = UserProfileUpdate::from_profile(&profile);
        assert_eq!(update.address, "");
        assert_eq!(update.phone_number, "555");

        let body = serde_json::to_value(&update).expect("serialize");
        assert_eq!(body["phoneNumber"], "555");
        assert_eq!(body["paymentMethod"], "");
    }
}
