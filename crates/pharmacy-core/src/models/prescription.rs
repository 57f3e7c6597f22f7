use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A prescription as returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prescription {
    pub id: i64,
    pub user_id: i64,
    pub drug_name: String,
    pub dosage: String,
    pub frequency: String,
    pub prescription_required: bool,
    #[serde(with = "super::timestamp")]
    pub issued_at: DateTime<Utc>,
    #[serde(with = "super::timestamp")]
    pub expires_at: DateTime<Utc>,
}

impl Prescription {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Body of `POST /prescriptions` and `PUT /prescriptions/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionRequest {
    pub drug_id: i64,
    pub dosage: String,
    pub frequency: String,
    pub prescription_required: bool,
    #[serde(with = "super::timestamp")]
    pub issued_at: DateTime<Utc>,
    #[serde(with = "super::timestamp")]
    pub expires_at: DateTime<Utc>,
}
