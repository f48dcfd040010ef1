use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::RecordType;

/// A clinical record entry (consultation note, lab result, prescription...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalRecord {
    pub id: String,
    pub patient_id: String,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub title: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub treatment_plan: Option<String>,
    #[serde(default)]
    pub doctor: Option<String>,
    #[serde(default)]
    pub follow_up_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl MedicalRecord {
    pub fn new(
        id: impl Into<String>,
        patient_id: impl Into<String>,
        record_type: RecordType,
        title: impl Into<String>,
        date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            patient_id: patient_id.into(),
            patient_name: None,
            record_type,
            title: title.into(),
            date,
            diagnosis: None,
            summary: None,
            treatment_plan: None,
            doctor: None,
            follow_up_date: None,
            tags: Vec::new(),
            created_by: None,
        }
    }
}
