//! Domain records shared by the alert feed, the reminder scheduler and the
//! list views: alerts, patients, medical records, and per-list filters.

pub mod alert;
pub mod enums;
pub mod filters;
pub mod patient;
pub mod record;

pub use alert::Alert;
pub use enums::*;
pub use filters::*;
pub use patient::Patient;
pub use record::MedicalRecord;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Alert {id}: completed={completed} does not match completedAt")]
    CompletionMismatch { id: String, completed: bool },
}
