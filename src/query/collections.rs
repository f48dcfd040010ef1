//! Field mappings for the three list views: patients, medical records, alerts.

use crate::models::{Alert, AlertFilter, AlertTab, MedicalRecord, Patient, PatientFilter, RecordFilter};

use super::calendar::QueryContext;
use super::engine::Queryable;
use super::types::{SortSpec, SortValue};

/// Alerts shown on the home dashboard.
pub const HOME_ALERT_LIMIT: usize = 3;

// ═══════════════════════════════════════════════════════════
// Patients
// ═══════════════════════════════════════════════════════════

impl Queryable for Patient {
    type Filter = PatientFilter;

    const COLLECTION: &'static str = "patients";
    const SORT_KEYS: &'static [&'static str] = &["last_name", "first_name", "last_updated"];

    fn default_sort() -> SortSpec {
        SortSpec::ascending("last_name")
    }

    /// `first last email phone`
    fn searchable_text(&self) -> String {
        format!(
            "{} {} {} {}",
            self.first_name,
            self.last_name,
            self.email.as_deref().unwrap_or(""),
            self.phone.as_deref().unwrap_or(""),
        )
    }

    fn matches_filter(&self, filter: &PatientFilter, ctx: &QueryContext) -> bool {
        if filter.gender.is_some() && self.gender != filter.gender {
            return false;
        }
        if filter.has_appointment && !self.has_upcoming_appointment(ctx.now()) {
            return false;
        }
        true
    }

    fn sort_value(&self, key: &str) -> SortValue {
        match key {
            "last_name" => SortValue::text(&self.last_name),
            "first_name" => SortValue::text(&self.first_name),
            "last_updated" => SortValue::optional_time(self.last_updated),
            _ => SortValue::Missing,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Medical records
// ═══════════════════════════════════════════════════════════

impl Queryable for MedicalRecord {
    type Filter = RecordFilter;

    const COLLECTION: &'static str = "records";
    const SORT_KEYS: &'static [&'static str] = &["date", "title", "patient_name"];

    fn default_sort() -> SortSpec {
        SortSpec::descending("date")
    }

    /// `title patient_name diagnosis summary doctor`
    fn searchable_text(&self) -> String {
        [
            self.title.as_str(),
            self.patient_name.as_deref().unwrap_or(""),
            self.diagnosis.as_deref().unwrap_or(""),
            self.summary.as_deref().unwrap_or(""),
            self.doctor.as_deref().unwrap_or(""),
        ]
        .join(" ")
    }

    fn matches_filter(&self, filter: &RecordFilter, ctx: &QueryContext) -> bool {
        if filter.record_type.is_some_and(|t| t != self.record_type) {
            return false;
        }
        if let Some(wanted) = filter.diagnosis.as_deref().filter(|d| !d.is_empty()) {
            let wanted = wanted.to_lowercase();
            let found = self
                .diagnosis
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&wanted));
            if !found {
                return false;
            }
        }
        if let Some(range) = filter.date_range {
            if !ctx.window(range).contains(self.date) {
                return false;
            }
        }
        true
    }

    fn sort_value(&self, key: &str) -> SortValue {
        match key {
            "date" => SortValue::Time(self.date),
            "title" => SortValue::text(&self.title),
            "patient_name" => SortValue::optional_text(self.patient_name.as_deref()),
            _ => SortValue::Missing,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Alerts
// ═══════════════════════════════════════════════════════════

impl Queryable for Alert {
    type Filter = AlertFilter;

    const COLLECTION: &'static str = "alerts";
    const SORT_KEYS: &'static [&'static str] = &["scheduled_date", "priority", "title"];

    fn default_sort() -> SortSpec {
        SortSpec::ascending("scheduled_date")
    }

    /// `title description patient_name`
    fn searchable_text(&self) -> String {
        [
            self.title.as_str(),
            self.description.as_deref().unwrap_or(""),
            self.patient_name.as_deref().unwrap_or(""),
        ]
        .join(" ")
    }

    fn matches_filter(&self, filter: &AlertFilter, ctx: &QueryContext) -> bool {
        let in_tab = match filter.tab {
            None => true,
            Some(AlertTab::Pending) => !self.completed,
            Some(AlertTab::Today) => ctx.today().contains(self.scheduled_date),
            Some(AlertTab::Upcoming) => self.scheduled_date >= ctx.today().end,
            Some(AlertTab::Completed) => self.completed,
        };
        in_tab
            && filter.priority.map_or(true, |p| p == self.priority)
            && filter.alert_type.map_or(true, |t| t == self.alert_type)
    }

    fn sort_value(&self, key: &str) -> SortValue {
        match key {
            "scheduled_date" => SortValue::Time(self.scheduled_date),
            "priority" => SortValue::Rank(self.priority.rank()),
            "title" => SortValue::text(&self.title),
            _ => SortValue::Missing,
        }
    }
}

/// The first `limit` alerts due on today's calendar date, in feed order.
pub fn todays_alerts(alerts: &[Alert], ctx: &QueryContext, limit: usize) -> Vec<Alert> {
    let today = ctx.today();
    alerts
        .iter()
        .filter(|a| today.contains(a.scheduled_date))
        .take(limit)
        .cloned()
        .collect()
}
