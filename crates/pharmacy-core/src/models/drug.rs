use serde::{Deserialize, Serialize};

/// A catalogue entry from `/drugs` or `/public/drugs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Drug {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub manufacturer: String,
    pub dosage: String,
    #[serde(default)]
    pub description: String,
    pub prescription_required: bool,
}

impl Drug {
    pub fn availability_display(&self) -> &'static str {
        if self.prescription_required {
            "Prescription only"
        } else {
            "Over the counter"
        }
    }
}
