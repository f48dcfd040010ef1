use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{AlertPriority, AlertType};
use super::ModelError;

/// A scheduled reminder assigned to one or more users.
///
/// `completed_at` is set if and only if `completed` is true. Use
/// [`Alert::mark_completed`] and [`Alert::reopen`] rather than touching the
/// two fields separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub priority: AlertPriority,
    pub scheduled_date: DateTime<Utc>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub related_record_id: Option<String>,
    /// Users who should see this alert. Membership only, no ownership.
    #[serde(default)]
    pub assigned_to: BTreeSet<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl Alert {
    /// Minimal pending alert. Remaining fields start empty.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        alert_type: AlertType,
        priority: AlertPriority,
        scheduled_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            alert_type,
            priority,
            scheduled_date,
            completed: false,
            completed_at: None,
            patient_id: None,
            patient_name: None,
            related_record_id: None,
            assigned_to: BTreeSet::new(),
            created_at: None,
            created_by: None,
        }
    }

    pub fn is_assigned_to(&self, user_id: &str) -> bool {
        self.assigned_to.contains(user_id)
    }

    pub fn mark_completed(&mut self, at: DateTime<Utc>) {
        self.completed = true;
        self.completed_at = Some(at);
    }

    pub fn reopen(&mut self) {
        self.completed = false;
        self.completed_at = None;
    }

    /// Pending and due strictly after `now`.
    pub fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        !self.completed && self.scheduled_date > now
    }

    /// Notification body: the description, or `fallback` when there is none.
    pub fn notification_body<'a>(&'a self, fallback: &'a str) -> &'a str {
        match self.description.as_deref() {
            Some(d) if !d.trim().is_empty() => d,
            _ => fallback,
        }
    }

    /// Checks the completion invariant.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.completed != self.completed_at.is_some() {
            return Err(ModelError::CompletionMismatch {
                id: self.id.clone(),
                completed: self.completed,
            });
        }
        Ok(())
    }
}
