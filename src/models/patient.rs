use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::enums::Gender;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub upcoming_appointment: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_visit: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl Patient {
    pub fn new(id: impl Into<String>, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            birth_date: None,
            gender: None,
            phone: None,
            email: None,
            upcoming_appointment: None,
            last_visit: None,
            last_updated: None,
            created_by: None,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Age in whole years on `today`. `None` without a birth date or when
    /// the birth date lies in the future.
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        let born = self.birth_date?;
        if born > today {
            return None;
        }
        let mut years = today.year() - born.year();
        if (today.month(), today.day()) < (born.month(), born.day()) {
            years -= 1;
        }
        u32::try_from(years).ok()
    }

    /// Has an appointment strictly after `now`.
    pub fn has_upcoming_appointment(&self, now: DateTime<Utc>) -> bool {
        self.upcoming_appointment.is_some_and(|at| at > now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn age_counts_completed_birthdays_only() {
        let mut p = Patient::new("p1", "Ana", "Garcia");
        p.birth_date = Some(date(1990, 6, 15));
        assert_eq!(p.age_on(date(2026, 6, 14)), Some(35));
        assert_eq!(p.age_on(date(2026, 6, 15)), Some(36));
    }

    #[test]
    fn age_is_none_without_birth_date_or_for_future_birth() {
        let mut p = Patient::new("p1", "Ana", "Garcia");
        assert_eq!(p.age_on(date(2026, 1, 1)), None);
        p.birth_date = Some(date(2030, 1, 1));
        assert_eq!(p.age_on(date(2026, 1, 1)), None);
    }

    #[test]
    fn upcoming_appointment_must_be_in_future() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let mut p = Patient::new("p1", "Ana", "Garcia");
        assert!(!p.has_upcoming_appointment(now));
        p.upcoming_appointment = Some(now);
        assert!(!p.has_upcoming_appointment(now));
        p.upcoming_appointment = Some(now + chrono::Duration::minutes(1));
        assert!(p.has_upcoming_appointment(now));
    }

    #[test]
    fn full_name_joins_first_and_last() {
        assert_eq!(Patient::new("p1", "Ana", "Garcia").full_name(), "Ana Garcia");
    }
}
