//! Reminder scheduler: keeps a bounded set of local notification timers in
//! step with the alert feed.
//!
//! Every synchronization cancels the whole registry and rebuilds it from the
//! current snapshot, so there is never more than one live timer per alert
//! and a changed or completed alert cannot fire from an old schedule.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::ReminderSettings;
use crate::models::Alert;
use crate::notification::{CapabilityStatus, HostError, NotificationCapability, NotificationHandle};

/// Runs when a timer elapses.
pub type TimerCallback = Box<dyn FnOnce() + Send>;

// ═══════════════════════════════════════════════════════════
// Timer host
// ═══════════════════════════════════════════════════════════

/// Platform delayed-callback facility.
pub trait TimerHost: Send + Sync + 'static {
    /// Arm a timer. Returns `None` when the host cannot arm one right now.
    fn schedule(&self, delay: Duration, fire: TimerCallback) -> Option<TimerHandle>;

    /// Longest delay the host can represent.
    fn max_delay(&self) -> Duration;
}

/// Pending timer. Dropping the handle cancels the timer.
#[must_use = "dropping a TimerHandle cancels the timer"]
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl TimerHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("armed", &self.cancel.is_some())
            .finish()
    }
}

/// Timers as tokio tasks sleeping on the runtime clock.
#[derive(Debug, Clone)]
pub struct TokioTimerHost {
    max_delay: Duration,
}

impl TokioTimerHost {
    pub fn new(max_delay: Duration) -> Self {
        Self { max_delay }
    }

    pub fn from_settings(settings: &ReminderSettings) -> Self {
        Self::new(Duration::from_millis(settings.max_timer_delay_ms))
    }
}

impl TimerHost for TokioTimerHost {
    fn schedule(&self, delay: Duration, fire: TimerCallback) -> Option<TimerHandle> {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(rt) => rt,
            Err(e) => {
                tracing::warn!(error = %e, "No tokio runtime, reminder timer not armed");
                return None;
            }
        };
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            fire();
        });
        Some(TimerHandle::new(move || task.abort()))
    }

    fn max_delay(&self) -> Duration {
        self.max_delay
    }
}

// ═══════════════════════════════════════════════════════════
// Scheduler
// ═══════════════════════════════════════════════════════════

/// Identifies one armed timer. Never reused within a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TimerToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerPhase {
    Idle,
    Synchronized,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingReminder {
    pub alert_id: String,
    pub title: String,
    pub fire_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReminderStatus {
    pub phase: SchedulerPhase,
    /// Ascending by `fire_at`.
    pub pending: Vec<PendingReminder>,
    /// Eligible alerts left out by the pending-timer bound.
    pub skipped_by_bound: usize,
    /// Selected alerts the timer host could not arm: too far out, or no
    /// timer facility available.
    pub deferred_beyond_host_limit: usize,
    pub capability: CapabilityStatus,
}

/// Counts from one synchronization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub cancelled: usize,
    pub scheduled: usize,
    pub skipped_by_bound: usize,
    pub deferred_beyond_host_limit: usize,
}

struct ScheduledTimer {
    alert_id: String,
    fire_at: DateTime<Utc>,
    token: TimerToken,
    title: String,
    body: String,
    handle: TimerHandle,
}

pub struct ReminderScheduler {
    timers: Arc<dyn TimerHost>,
    on_fire: Arc<dyn Fn(TimerToken) + Send + Sync>,
    max_pending: usize,
    default_body: String,
    registry: Vec<ScheduledTimer>,
    next_token: u64,
    phase: SchedulerPhase,
    skipped_by_bound: usize,
    deferred: usize,
}

impl ReminderScheduler {
    /// `on_fire` is called from the timer host with the elapsed timer's
    /// token; route it back to [`ReminderScheduler::on_timer_fired`].
    pub fn new(
        timers: Arc<dyn TimerHost>,
        settings: &ReminderSettings,
        on_fire: impl Fn(TimerToken) + Send + Sync + 'static,
    ) -> Self {
        Self {
            timers,
            on_fire: Arc::new(on_fire),
            max_pending: settings.max_pending,
            default_body: settings.default_body.clone(),
            registry: Vec::new(),
            next_token: 0,
            phase: SchedulerPhase::Idle,
            skipped_by_bound: 0,
            deferred: 0,
        }
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    pub fn pending_count(&self) -> usize {
        self.registry.len()
    }

    /// Cancel every armed timer. Returns how many were cancelled.
    pub fn cancel_all(&mut self) -> usize {
        let cancelled = self.registry.len();
        for timer in self.registry.drain(..) {
            timer.handle.cancel();
        }
        self.skipped_by_bound = 0;
        self.deferred = 0;
        cancelled
    }

    /// Rebuild the timer registry from `alerts`.
    ///
    /// Arms at most `max_pending` timers for the earliest incomplete alerts
    /// due strictly after `now`. Nothing is armed while `capability`
    /// cannot display.
    pub fn synchronize(
        &mut self,
        alerts: &[Alert],
        capability: &NotificationCapability,
        now: DateTime<Utc>,
    ) -> SyncReport {
        let mut report = SyncReport {
            cancelled: self.cancel_all(),
            ..SyncReport::default()
        };

        if !capability.can_display() {
            tracing::debug!(
                state = capability.state().as_str(),
                cancelled = report.cancelled,
                "Reminders not scheduled, notifications unavailable"
            );
            return report;
        }

        let mut seen = HashSet::new();
        let mut upcoming: Vec<&Alert> = alerts
            .iter()
            .filter(|a| a.is_upcoming(now))
            .filter(|a| seen.insert(a.id.as_str()))
            .collect();
        upcoming.sort_by_key(|a| a.scheduled_date);

        report.skipped_by_bound = upcoming.len().saturating_sub(self.max_pending);
        let max_delay = self.timers.max_delay();

        for alert in upcoming.into_iter().take(self.max_pending) {
            let delay = match (alert.scheduled_date - now).to_std() {
                Ok(delay) if delay <= max_delay => delay,
                _ => {
                    tracing::debug!(alert_id = %alert.id, "Reminder beyond timer host limit");
                    report.deferred_beyond_host_limit += 1;
                    continue;
                }
            };

            let token = TimerToken(self.next_token);
            self.next_token += 1;
            let on_fire = Arc::clone(&self.on_fire);
            let Some(handle) = self.timers.schedule(delay, Box::new(move || on_fire(token))) else {
                tracing::warn!(alert_id = %alert.id, "Timer host refused reminder");
                report.deferred_beyond_host_limit += 1;
                continue;
            };

            self.registry.push(ScheduledTimer {
                alert_id: alert.id.clone(),
                fire_at: alert.scheduled_date,
                token,
                title: alert.title.clone(),
                body: alert.notification_body(&self.default_body).to_string(),
                handle,
            });
        }

        report.scheduled = self.registry.len();
        self.skipped_by_bound = report.skipped_by_bound;
        self.deferred = report.deferred_beyond_host_limit;
        self.phase = SchedulerPhase::Synchronized;

        tracing::info!(
            scheduled = report.scheduled,
            cancelled = report.cancelled,
            skipped_by_bound = report.skipped_by_bound,
            deferred = report.deferred_beyond_host_limit,
            "Reminders synchronized"
        );
        report
    }

    /// Handle an elapsed timer: drop it from the registry and display its
    /// notification. Tokens of cancelled timers are ignored and yield `None`.
    pub fn on_timer_fired(
        &mut self,
        token: TimerToken,
        capability: &NotificationCapability,
    ) -> Option<Result<NotificationHandle, HostError>> {
        let Some(index) = self.registry.iter().position(|t| t.token == token) else {
            tracing::debug!(token = token.0, "Ignoring fire from cancelled reminder timer");
            return None;
        };
        let timer = self.registry.remove(index);

        let result = capability.display(&timer.title, &timer.body);
        match &result {
            Ok(_) => tracing::info!(alert_id = %timer.alert_id, "Reminder displayed"),
            Err(e) => tracing::warn!(alert_id = %timer.alert_id, error = %e, "Reminder display failed"),
        }
        Some(result)
    }

    pub fn status(&self, capability: &NotificationCapability) -> ReminderStatus {
        ReminderStatus {
            phase: self.phase,
            pending: self
                .registry
                .iter()
                .map(|t| PendingReminder {
                    alert_id: t.alert_id.clone(),
                    title: t.title.clone(),
                    fire_at: t.fire_at,
                })
                .collect(),
            skipped_by_bound: self.skipped_by_bound,
            deferred_beyond_host_limit: self.deferred,
            capability: capability.status(),
        }
    }
}

impl fmt::Debug for ReminderScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReminderScheduler")
            .field("phase", &self.phase)
            .field("pending", &self.registry.len())
            .field("max_pending", &self.max_pending)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════
// Mock timer host
// ═══════════════════════════════════════════════════════════

struct MockTimer {
    delay: Duration,
    fire: Option<TimerCallback>,
    cancelled: bool,
}

/// Timer host driven by hand, for unit testing without a clock.
pub struct MockTimerHost {
    timers: Arc<Mutex<Vec<MockTimer>>>,
    max_delay: Duration,
}

impl MockTimerHost {
    pub fn new(max_delay: Duration) -> Self {
        Self {
            timers: Arc::new(Mutex::new(Vec::new())),
            max_delay,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<MockTimer>> {
        self.timers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every timer ever scheduled, including cancelled and fired ones.
    pub fn total_scheduled(&self) -> usize {
        self.lock().len()
    }

    /// Delays of timers that are neither cancelled nor fired, in
    /// scheduling order.
    pub fn armed(&self) -> Vec<Duration> {
        self.lock()
            .iter()
            .filter(|t| t.fire.is_some())
            .map(|t| t.delay)
            .collect()
    }

    pub fn cancelled_count(&self) -> usize {
        self.lock().iter().filter(|t| t.cancelled).count()
    }

    /// Fire the armed timer with the shortest delay. Returns false when
    /// none is armed.
    pub fn fire_next(&self) -> bool {
        let callback = {
            let mut timers = self.lock();
            timers
                .iter_mut()
                .filter(|t| t.fire.is_some())
                .min_by_key(|t| t.delay)
                .and_then(|t| t.fire.take())
        };
        match callback {
            Some(fire) => {
                fire();
                true
            }
            None => false,
        }
    }
}

impl TimerHost for MockTimerHost {
    fn schedule(&self, delay: Duration, fire: TimerCallback) -> Option<TimerHandle> {
        let index = {
            let mut timers = self.lock();
            timers.push(MockTimer {
                delay,
                fire: Some(fire),
                cancelled: false,
            });
            timers.len() - 1
        };
        let timers: Weak<Mutex<Vec<MockTimer>>> = Arc::downgrade(&self.timers);
        Some(TimerHandle::new(move || {
            if let Some(timers) = timers.upgrade() {
                let mut timers = timers.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(timer) = timers.get_mut(index) {
                    if timer.fire.take().is_some() {
                        timer.cancelled = true;
                    }
                }
            }
        }))
    }

    fn max_delay(&self) -> Duration {
        self.max_delay
    }
}
