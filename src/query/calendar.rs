//! Calendar windows for the date-bucket filters, computed in the caller's
//! time zone at the instant the query runs.

use chrono::{DateTime, Datelike, Days, Local, Months, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::models::{DateRange, WeekStart};

/// Half-open instant range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

/// First instant of `date` in `tz`. A midnight skipped by a DST jump
/// resolves to the first valid local time after it.
pub fn local_midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    (0..=2)
        .find_map(|h| {
            tz.from_local_datetime(&(naive + chrono::Duration::hours(h)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

fn days_into_week(date: NaiveDate, week_start: WeekStart) -> u64 {
    let offset = match week_start {
        WeekStart::Sunday => date.weekday().num_days_from_sunday(),
        WeekStart::Monday => date.weekday().num_days_from_monday(),
    };
    u64::from(offset)
}

/// Calendar window of `range` around `now`, in `now`'s time zone.
pub fn window_for<Tz: TimeZone>(range: DateRange, now: &DateTime<Tz>, week_start: WeekStart) -> DateWindow {
    let tz = now.timezone();
    let today = now.date_naive();
    let (first, next) = match range {
        DateRange::Today => (today, today + Days::new(1)),
        DateRange::ThisWeek => {
            let start = today - Days::new(days_into_week(today, week_start));
            (start, start + Days::new(7))
        }
        DateRange::ThisMonth => {
            let start = today - Days::new(u64::from(today.day0()));
            (start, start + Months::new(1))
        }
        DateRange::ThisYear => {
            let start = today - Days::new(u64::from(today.ordinal0()));
            (start, start + Months::new(12))
        }
    };
    DateWindow {
        start: local_midnight(&tz, first),
        end: local_midnight(&tz, next),
    }
}

// ═══════════════════════════════════════════════════════════
// QueryContext
// ═══════════════════════════════════════════════════════════

/// The query instant plus its precomputed calendar windows.
///
/// Built once per query run so every record is judged against the same
/// "now", regardless of how long filtering takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryContext {
    now: DateTime<Utc>,
    today: DateWindow,
    week: DateWindow,
    month: DateWindow,
    year: DateWindow,
}

impl QueryContext {
    pub fn new<Tz: TimeZone>(now: DateTime<Tz>, week_start: WeekStart) -> Self {
        Self {
            now: now.with_timezone(&Utc),
            today: window_for(DateRange::Today, &now, week_start),
            week: window_for(DateRange::ThisWeek, &now, week_start),
            month: window_for(DateRange::ThisMonth, &now, week_start),
            year: window_for(DateRange::ThisYear, &now, week_start),
        }
    }

    /// Context for the current instant in the machine's local time zone.
    pub fn local_now(week_start: WeekStart) -> Self {
        Self::new(Local::now(), week_start)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn today(&self) -> DateWindow {
        self.today
    }

    pub fn window(&self, range: DateRange) -> DateWindow {
        match range {
            DateRange::Today => self.today,
            DateRange::ThisWeek => self.week,
            DateRange::ThisMonth => self.month,
            DateRange::ThisYear => self.year,
        }
    }
}
