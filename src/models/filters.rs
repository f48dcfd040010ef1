use serde::{Deserialize, Serialize};

use super::enums::{AlertPriority, AlertTab, AlertType, DateRange, Gender, RecordType};

/// `None` on any field means "no constraint".
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientFilter {
    pub gender: Option<Gender>,
    /// Only patients with an appointment after the query instant.
    #[serde(default)]
    pub has_appointment: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFilter {
    pub record_type: Option<RecordType>,
    /// Case-insensitive substring of the record's diagnosis.
    pub diagnosis: Option<String>,
    pub date_range: Option<DateRange>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertFilter {
    pub tab: Option<AlertTab>,
    pub priority: Option<AlertPriority>,
    pub alert_type: Option<AlertType>,
}
