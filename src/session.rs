//! Alert session: one event loop that owns the alert feed, the
//! notification capability and the reminder scheduler for the signed-in
//! user.
//!
//! The loop runs as a background task behind a cloneable handle that sends
//! commands and reads state from `watch` channels. Fetch results,
//! subscription deliveries, permission answers and timer fires all enter the
//! loop as events and are handled strictly in arrival order.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::ReminderSettings;
use crate::feed::{
    AlertFeed, AlertSource, FeedStatus, FeedTicket, IdentityChange, SnapshotOrigin, SnapshotResult,
    SnapshotSink, SourceError, Subscription,
};
use crate::models::Alert;
use crate::notification::{
    EnableOutcome, HostPermission, NotificationCapability, NotificationHost, PermissionRequest,
};
use crate::reminders::{ReminderScheduler, ReminderStatus, TimerHost, TimerToken};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Alert session has shut down")]
    Closed,
}

// ═══════════════════════════════════════════════════════════
// Messages
// ═══════════════════════════════════════════════════════════

enum SessionCommand {
    SetIdentity(Option<String>),
    Refresh,
    RequestPermission,
    EnableNotifications,
    DisableNotifications,
    CompleteAlert(String),
    Shutdown(oneshot::Sender<()>),
}

enum SessionEvent {
    Fetched {
        ticket: FeedTicket,
        result: Result<Vec<Alert>, SourceError>,
    },
    Delivered {
        ticket: FeedTicket,
        result: SnapshotResult,
    },
    PermissionAnswered(HostPermission),
    CompletionWritten {
        ticket: FeedTicket,
        alert_id: String,
        at: DateTime<Utc>,
        result: Result<(), SourceError>,
    },
    TimerFired(TimerToken),
}

// ═══════════════════════════════════════════════════════════
// Handle
// ═══════════════════════════════════════════════════════════

/// Cloneable handle to a running [`AlertSession`].
///
/// The session stops when [`SessionHandle::shutdown`] is called or when the
/// last handle is dropped.
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    commands: mpsc::UnboundedSender<SessionCommand>,
    feed: watch::Receiver<FeedStatus>,
    reminders: watch::Receiver<ReminderStatus>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.commands.send(command).map_err(|_| SessionError::Closed)
    }

    /// Switch user. `None` signs out and clears all feed and reminder state.
    pub fn set_identity(&self, identity: Option<String>) -> Result<(), SessionError> {
        self.send(SessionCommand::SetIdentity(identity))
    }

    /// Re-issue the one-shot fetch. The live subscription is left alone.
    pub fn refresh(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Refresh)
    }

    pub fn request_permission(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::RequestPermission)
    }

    pub fn enable_notifications(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::EnableNotifications)
    }

    pub fn disable_notifications(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::DisableNotifications)
    }

    pub fn complete_alert(&self, alert_id: impl Into<String>) -> Result<(), SessionError> {
        self.send(SessionCommand::CompleteAlert(alert_id.into()))
    }

    pub fn feed(&self) -> watch::Receiver<FeedStatus> {
        self.feed.clone()
    }

    pub fn reminders(&self) -> watch::Receiver<ReminderStatus> {
        self.reminders.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Cancel the subscription and every pending reminder, then stop the
    /// loop. Resolves once teardown has finished.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(SessionCommand::Shutdown(ack_tx))?;
        ack_rx.await.map_err(|_| SessionError::Closed)
    }
}

// ═══════════════════════════════════════════════════════════
// Event loop
// ═══════════════════════════════════════════════════════════

pub struct AlertSession {
    id: Uuid,
    source: Arc<dyn AlertSource>,
    feed: AlertFeed,
    capability: NotificationCapability,
    scheduler: ReminderScheduler,
    subscription: Option<Subscription>,
    tasks: Vec<JoinHandle<()>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    feed_tx: watch::Sender<FeedStatus>,
    reminders_tx: watch::Sender<ReminderStatus>,
    prompt_on_start: bool,
}

impl AlertSession {
    /// Start the session loop on the current tokio runtime.
    pub fn spawn(
        source: Arc<dyn AlertSource>,
        host: Arc<dyn NotificationHost>,
        timers: Arc<dyn TimerHost>,
        settings: &ReminderSettings,
    ) -> SessionHandle {
        let id = Uuid::new_v4();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let capability = NotificationCapability::new(host, settings.notifications_enabled);
        let fire_tx = events_tx.clone();
        let scheduler = ReminderScheduler::new(timers, settings, move |token| {
            let _ = fire_tx.send(SessionEvent::TimerFired(token));
        });

        let feed = AlertFeed::new();
        let (feed_tx, feed_rx) = watch::channel(feed.status());
        let (reminders_tx, reminders_rx) = watch::channel(scheduler.status(&capability));

        let session = AlertSession {
            id,
            source,
            feed,
            capability,
            scheduler,
            subscription: None,
            tasks: Vec::new(),
            events: events_tx,
            feed_tx,
            reminders_tx,
            prompt_on_start: settings.notifications_enabled,
        };
        tokio::spawn(session.run(commands_rx, events_rx));

        SessionHandle {
            id,
            commands: commands_tx,
            feed: feed_rx,
            reminders: reminders_rx,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<SessionCommand>,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        tracing::info!(session_id = %self.id, "Alert session started");

        if self.prompt_on_start {
            self.request_permission();
        }

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SessionCommand::Shutdown(ack)) => {
                        self.teardown();
                        let _ = ack.send(());
                        return;
                    }
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(event) = events.recv() => self.handle_event(event),
            }
            self.publish();
        }

        // All handles dropped.
        self.teardown();
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::SetIdentity(identity) => self.set_identity(identity),
            SessionCommand::Refresh => {
                if let Some(ticket) = self.feed.begin_refresh() {
                    tracing::info!(session_id = %self.id, "Refreshing alerts");
                    self.start_fetch(ticket);
                }
            }
            SessionCommand::RequestPermission => self.request_permission(),
            SessionCommand::EnableNotifications => match self.capability.enable() {
                EnableOutcome::Enabled { newly_displayable } => {
                    if newly_displayable {
                        self.resync();
                    }
                }
                EnableOutcome::NeedsPermission(prompt) => self.await_permission(prompt),
                EnableOutcome::Unavailable(state) => {
                    tracing::info!(state = state.as_str(), "Notifications enabled but unavailable");
                }
            },
            SessionCommand::DisableNotifications => {
                self.capability.disable();
                self.resync();
            }
            SessionCommand::CompleteAlert(alert_id) => self.complete_alert(alert_id),
            // Handled by the loop before dispatch.
            SessionCommand::Shutdown(_) => {}
        }
    }

    fn handle_event(&mut self, event: SessionEvent) {
        let now = Utc::now();
        match event {
            SessionEvent::Fetched { ticket, result } => {
                self.apply_delivery(ticket, SnapshotOrigin::Fetch, result, now)
            }
            SessionEvent::Delivered { ticket, result } => {
                self.apply_delivery(ticket, SnapshotOrigin::Subscription, result, now)
            }
            SessionEvent::PermissionAnswered(answer) => {
                if self.capability.complete_request(answer) {
                    self.resync();
                }
            }
            SessionEvent::CompletionWritten {
                ticket,
                alert_id,
                at,
                result,
            } => match result {
                Ok(()) => {
                    if self.feed.apply_completion(ticket, &alert_id, at) {
                        self.resync();
                    }
                }
                Err(e) => {
                    self.feed.report_write_error(ticket, e);
                }
            },
            SessionEvent::TimerFired(token) => {
                self.scheduler.on_timer_fired(token, &self.capability);
            }
        }
    }

    fn apply_delivery(
        &mut self,
        ticket: FeedTicket,
        origin: SnapshotOrigin,
        result: SnapshotResult,
        now: DateTime<Utc>,
    ) {
        match result {
            Ok(alerts) => {
                if self.feed.adopt(ticket, origin, alerts, now) {
                    self.resync();
                }
            }
            Err(e) => {
                self.feed.fail(ticket, origin, e);
            }
        }
    }

    fn set_identity(&mut self, identity: Option<String>) {
        match self.feed.set_identity(identity) {
            IdentityChange::Unchanged => {}
            IdentityChange::Cleared => {
                self.close_subscription();
                self.resync();
            }
            IdentityChange::Started(ticket) => {
                self.close_subscription();
                self.start_fetch(ticket);
                self.open_subscription(ticket);
                self.resync();
            }
        }
    }

    fn start_fetch(&mut self, ticket: FeedTicket) {
        let Some(identity) = self.feed.identity() else {
            return;
        };
        let fetch = self.source.fetch_once(identity);
        let events = self.events.clone();
        self.track(tokio::spawn(async move {
            let result = fetch.await;
            let _ = events.send(SessionEvent::Fetched { ticket, result });
        }));
    }

    fn open_subscription(&mut self, ticket: FeedTicket) {
        let Some(identity) = self.feed.identity() else {
            return;
        };
        let events = self.events.clone();
        let sink = SnapshotSink::new(move |result| {
            let _ = events.send(SessionEvent::Delivered { ticket, result });
        });
        self.subscription = Some(self.source.subscribe(identity, sink));
    }

    fn close_subscription(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            tracing::debug!(session_id = %self.id, "Closing alert subscription");
            subscription.cancel();
        }
    }

    fn request_permission(&mut self) {
        match self.capability.request_permission() {
            PermissionRequest::Prompt(prompt) => self.await_permission(prompt),
            PermissionRequest::Resolved { newly_displayable } => {
                if newly_displayable {
                    self.resync();
                }
            }
        }
    }

    fn await_permission(&mut self, prompt: BoxFuture<'static, HostPermission>) {
        let events = self.events.clone();
        self.track(tokio::spawn(async move {
            let answer = prompt.await;
            let _ = events.send(SessionEvent::PermissionAnswered(answer));
        }));
    }

    fn complete_alert(&mut self, alert_id: String) {
        if self.feed.identity().is_none() {
            tracing::warn!(alert_id = %alert_id, "Ignoring completion without a signed-in user");
            return;
        }
        let ticket = self.feed.ticket();
        let at = Utc::now();
        let write = self.source.set_completed(&alert_id, at);
        let events = self.events.clone();
        self.track(tokio::spawn(async move {
            let result = write.await;
            let _ = events.send(SessionEvent::CompletionWritten {
                ticket,
                alert_id,
                at,
                result,
            });
        }));
    }

    fn track(&mut self, task: JoinHandle<()>) {
        self.tasks.retain(|t| !t.is_finished());
        self.tasks.push(task);
    }

    fn resync(&mut self) {
        self.capability.refresh_from_host();
        self.scheduler
            .synchronize(self.feed.alerts(), &self.capability, Utc::now());
    }

    fn publish(&self) {
        let feed = self.feed.status();
        self.feed_tx.send_if_modified(|current| {
            if *current == feed {
                return false;
            }
            *current = feed;
            true
        });

        let reminders = self.scheduler.status(&self.capability);
        self.reminders_tx.send_if_modified(|current| {
            if *current == reminders {
                return false;
            }
            *current = reminders;
            true
        });
    }

    fn teardown(&mut self) {
        self.close_subscription();
        let cancelled = self.scheduler.cancel_all();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.publish();
        tracing::info!(session_id = %self.id, cancelled, "Alert session stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertPriority, AlertType};
    use crate::notification::{CapabilityState, MockNotificationHost};
    use crate::reminders::MockTimerHost;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    type FetchReply = oneshot::Sender<Result<Vec<Alert>, SourceError>>;

    /// Source whose fetches stay pending until the test resolves them.
    #[derive(Default)]
    struct ScriptedSource {
        fetches: Mutex<Vec<(String, FetchReply)>>,
        sinks: Mutex<Vec<(String, SnapshotSink, Arc<AtomicBool>)>>,
        writes: Mutex<Vec<String>>,
        fail_writes: AtomicBool,
    }

    impl ScriptedSource {
        fn pending_fetches(&self, identity: &str) -> usize {
            self.fetches.lock().unwrap().iter().filter(|(id, _)| id == identity).count()
        }

        /// Resolve the oldest pending fetch for `identity`.
        fn resolve_fetch(&self, identity: &str, result: Result<Vec<Alert>, SourceError>) {
            let reply = {
                let mut fetches = self.fetches.lock().unwrap();
                let index = fetches
                    .iter()
                    .position(|(id, _)| id == identity)
                    .expect("pending fetch");
                fetches.remove(index).1
            };
            let _ = reply.send(result);
        }

        fn active_subscriptions(&self, identity: &str) -> usize {
            self.sinks
                .lock()
                .unwrap()
                .iter()
                .filter(|(id, _, active)| id == identity && active.load(Ordering::SeqCst))
                .count()
        }

        fn push(&self, identity: &str, result: SnapshotResult) {
            let sinks: Vec<SnapshotSink> = self
                .sinks
                .lock()
                .unwrap()
                .iter()
                .filter(|(id, _, active)| id == identity && active.load(Ordering::SeqCst))
                .map(|(_, sink, _)| sink.clone())
                .collect();
            for sink in sinks {
                match &result {
                    Ok(alerts) => sink.snapshot(alerts.clone()),
                    Err(e) => sink.error(e.clone()),
                }
            }
        }
    }

    impl AlertSource for ScriptedSource {
        fn fetch_once(&self, identity: &str) -> BoxFuture<'static, Result<Vec<Alert>, SourceError>> {
            let (tx, rx) = oneshot::channel();
            self.fetches.lock().unwrap().push((identity.to_string(), tx));
            Box::pin(async move {
                rx.await
                    .unwrap_or_else(|_| Err(SourceError::FetchFailed("fetch abandoned".into())))
            })
        }

        fn subscribe(&self, identity: &str, sink: SnapshotSink) -> Subscription {
            let active = Arc::new(AtomicBool::new(true));
            self.sinks
                .lock()
                .unwrap()
                .push((identity.to_string(), sink, active.clone()));
            Subscription::new(move || active.store(false, Ordering::SeqCst))
        }

        fn set_completed(
            &self,
            alert_id: &str,
            _completed_at: DateTime<Utc>,
        ) -> BoxFuture<'static, Result<(), SourceError>> {
            self.writes.lock().unwrap().push(alert_id.to_string());
            let result = if self.fail_writes.load(Ordering::SeqCst) {
                Err(SourceError::WriteFailed("permission denied".into()))
            } else {
                Ok(())
            };
            Box::pin(async move { result })
        }
    }

    struct Fixture {
        source: Arc<ScriptedSource>,
        host: Arc<MockNotificationHost>,
        timers: Arc<MockTimerHost>,
        handle: SessionHandle,
    }

    fn start(permission: HostPermission) -> Fixture {
        let source = Arc::new(ScriptedSource::default());
        let host = Arc::new(MockNotificationHost::new(permission));
        let timers = Arc::new(MockTimerHost::new(Duration::from_secs(30 * 24 * 3600)));
        let handle = AlertSession::spawn(
            source.clone(),
            host.clone(),
            timers.clone(),
            &ReminderSettings::default(),
        );
        Fixture {
            source,
            host,
            timers,
            handle,
        }
    }

    fn alert(id: &str, minutes: i64) -> Alert {
        Alert::new(
            id,
            format!("Alert {id}"),
            AlertType::Task,
            AlertPriority::Medium,
            Utc::now() + chrono::Duration::minutes(minutes),
        )
    }

    fn ids(status: &FeedStatus) -> Vec<String> {
        status.alerts.iter().map(|a| a.id.clone()).collect()
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    async fn feed_until(
        handle: &SessionHandle,
        check: impl FnMut(&FeedStatus) -> bool,
    ) -> FeedStatus {
        let mut rx = handle.feed();
        let status = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(check))
            .await
            .expect("feed status not reached in time")
            .expect("session alive");
        status.clone()
    }

    async fn reminders_until(
        handle: &SessionHandle,
        check: impl FnMut(&ReminderStatus) -> bool,
    ) -> ReminderStatus {
        let mut rx = handle.reminders();
        let status = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(check))
            .await
            .expect("reminder status not reached in time")
            .expect("session alive");
        status.clone()
    }

    /// Let spawned tasks and the session loop drain.
    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    /// Sign in as `identity` and wait for the fetch to be issued.
    async fn sign_in(f: &Fixture, identity: &str) {
        f.handle.set_identity(Some(identity.into())).unwrap();
        eventually(|| f.source.pending_fetches(identity) > 0).await;
    }

    #[tokio::test]
    async fn subscription_snapshot_after_fetch_is_sorted() {
        let f = start(HostPermission::Granted);
        sign_in(&f, "u1").await;
        feed_until(&f.handle, |s| s.loading).await;

        f.source.resolve_fetch("u1", Ok(vec![alert("1", 10)]));
        let status = feed_until(&f.handle, |s| !s.alerts.is_empty()).await;
        assert_eq!(ids(&status), vec!["1"]);
        assert!(!status.loading);

        f.source.push("u1", Ok(vec![alert("1", 10), alert("2", 5)]));
        let status = feed_until(&f.handle, |s| s.alerts.len() == 2).await;
        assert_eq!(ids(&status), vec!["2", "1"]);
    }

    #[tokio::test]
    async fn stale_fetch_for_previous_identity_is_discarded() {
        let f = start(HostPermission::Granted);
        sign_in(&f, "u1").await;
        sign_in(&f, "u2").await;
        assert_eq!(f.source.active_subscriptions("u1"), 0);
        assert_eq!(f.source.active_subscriptions("u2"), 1);

        f.source.resolve_fetch("u1", Ok(vec![alert("u1-a", 1)]));
        settle().await;
        let status = f.handle.feed().borrow().clone();
        assert!(status.alerts.is_empty());
        assert!(status.loading);

        f.source.resolve_fetch("u2", Ok(vec![alert("u2-a", 5)]));
        let status = feed_until(&f.handle, |s| !s.alerts.is_empty()).await;
        assert_eq!(ids(&status), vec!["u2-a"]);
        assert_eq!(status.identity.as_deref(), Some("u2"));
    }

    #[tokio::test]
    async fn fetch_error_keeps_loading_false_and_reports() {
        let f = start(HostPermission::Granted);
        sign_in(&f, "u1").await;
        f.source
            .resolve_fetch("u1", Err(SourceError::FetchFailed("offline".into())));
        let status = feed_until(&f.handle, |s| !s.loading).await;
        assert_eq!(status.last_error, Some(SourceError::FetchFailed("offline".into())));
        assert!(status.alerts.is_empty());
    }

    #[tokio::test]
    async fn refresh_reissues_fetch_without_resubscribing() {
        let f = start(HostPermission::Granted);
        sign_in(&f, "u1").await;
        f.source.resolve_fetch("u1", Ok(vec![alert("1", 10)]));
        feed_until(&f.handle, |s| !s.alerts.is_empty()).await;

        f.handle.refresh().unwrap();
        eventually(|| f.source.pending_fetches("u1") == 1).await;
        assert_eq!(f.source.active_subscriptions("u1"), 1);
        assert_eq!(f.source.sinks.lock().unwrap().len(), 1);

        f.source.resolve_fetch("u1", Ok(vec![alert("1", 10), alert("3", 20)]));
        let status = feed_until(&f.handle, |s| s.alerts.len() == 2).await;
        assert!(!status.refreshing);
    }

    #[tokio::test]
    async fn snapshot_schedules_bounded_reminders() {
        let f = start(HostPermission::Granted);
        sign_in(&f, "u1").await;
        let alerts: Vec<Alert> = (1..=7).map(|i| alert(&format!("t{i}"), i * 10)).collect();
        f.source.push("u1", Ok(alerts));

        let status = reminders_until(&f.handle, |s| !s.pending.is_empty()).await;
        let pending: Vec<&str> = status.pending.iter().map(|p| p.alert_id.as_str()).collect();
        assert_eq!(pending, vec!["t1", "t2", "t3", "t4", "t5"]);
        assert_eq!(status.skipped_by_bound, 2);
        assert_eq!(f.timers.armed().len(), 5);
    }

    #[tokio::test]
    async fn denied_permission_schedules_nothing() {
        let f = start(HostPermission::Denied);
        sign_in(&f, "u1").await;
        f.source.resolve_fetch("u1", Ok(vec![alert("1", 5), alert("2", 10), alert("3", 15)]));
        feed_until(&f.handle, |s| s.alerts.len() == 3).await;

        let status = f.handle.reminders().borrow().clone();
        assert!(status.pending.is_empty());
        assert_eq!(f.timers.total_scheduled(), 0);
        assert!(f.host.shown().is_empty());
    }

    #[tokio::test]
    async fn completing_alert_cancels_its_reminder() {
        let f = start(HostPermission::Granted);
        sign_in(&f, "u1").await;
        f.source.push("u1", Ok(vec![alert("1", 5), alert("2", 10)]));
        reminders_until(&f.handle, |s| s.pending.len() == 2).await;

        f.handle.complete_alert("1").unwrap();
        let status = reminders_until(&f.handle, |s| s.pending.len() == 1).await;
        assert_eq!(status.pending[0].alert_id, "2");
        assert_eq!(*f.source.writes.lock().unwrap(), vec!["1".to_string()]);

        let feed = f.handle.feed().borrow().clone();
        assert!(feed.alerts.iter().any(|a| a.id == "1" && a.completed));
    }

    #[tokio::test]
    async fn failed_completion_is_reported_and_keeps_reminder() {
        let f = start(HostPermission::Granted);
        f.source.fail_writes.store(true, Ordering::SeqCst);
        sign_in(&f, "u1").await;
        f.source.push("u1", Ok(vec![alert("1", 5)]));
        reminders_until(&f.handle, |s| s.pending.len() == 1).await;

        f.handle.complete_alert("1").unwrap();
        let feed = feed_until(&f.handle, |s| s.last_error.is_some()).await;
        assert!(matches!(feed.last_error, Some(SourceError::WriteFailed(_))));
        assert_eq!(f.handle.reminders().borrow().pending.len(), 1);
    }

    #[tokio::test]
    async fn fired_timer_displays_notification() {
        let f = start(HostPermission::Granted);
        sign_in(&f, "u1").await;
        let mut a = alert("1", 5);
        a.description = Some("Check glucose".into());
        f.source.push("u1", Ok(vec![a]));
        reminders_until(&f.handle, |s| s.pending.len() == 1).await;

        assert!(f.timers.fire_next());
        reminders_until(&f.handle, |s| s.pending.is_empty()).await;
        assert_eq!(
            f.host.shown(),
            vec![("Alert 1".to_string(), "Check glucose".to_string())]
        );

        f.host.interact(0);
        assert_eq!(f.host.focus_requests(), 1);
    }

    #[tokio::test]
    async fn granting_permission_schedules_existing_alerts() {
        let f = start(HostPermission::Undetermined);
        f.host.answer_prompts_with(HostPermission::Denied);
        reminders_until(&f.handle, |s| s.capability.state == CapabilityState::Denied).await;
        sign_in(&f, "u1").await;
        f.source.push("u1", Ok(vec![alert("1", 5)]));
        feed_until(&f.handle, |s| s.alerts.len() == 1).await;
        assert_eq!(f.handle.reminders().borrow().pending.len(), 0);

        // Reset in system settings, then ask again.
        f.host.set_permission(HostPermission::Undetermined);
        f.host.answer_prompts_with(HostPermission::Granted);
        f.handle.request_permission().unwrap();
        let status = reminders_until(&f.handle, |s| s.pending.len() == 1).await;
        assert!(status.capability.can_display);
    }

    #[tokio::test]
    async fn permission_granted_outside_app_schedules_on_request() {
        let f = start(HostPermission::Denied);
        sign_in(&f, "u1").await;
        f.source.push("u1", Ok(vec![alert("1", 5)]));
        feed_until(&f.handle, |s| s.alerts.len() == 1).await;
        assert_eq!(f.handle.reminders().borrow().pending.len(), 0);

        // Granted in system settings while the app was running.
        f.host.set_permission(HostPermission::Granted);
        f.handle.request_permission().unwrap();
        let status = reminders_until(&f.handle, |s| s.pending.len() == 1).await;
        assert!(status.capability.can_display);
        assert_eq!(status.pending[0].alert_id, "1");
        assert_eq!(f.host.prompt_count(), 0);
    }

    #[tokio::test]
    async fn completion_result_for_previous_user_is_discarded() {
        let f = start(HostPermission::Granted);
        f.source.fail_writes.store(true, Ordering::SeqCst);
        sign_in(&f, "u1").await;
        f.source.push("u1", Ok(vec![alert("1", 5)]));
        feed_until(&f.handle, |s| s.alerts.len() == 1).await;

        f.handle.complete_alert("1").unwrap();
        f.handle.set_identity(Some("u2".into())).unwrap();
        eventually(|| f.source.pending_fetches("u2") > 0).await;
        eventually(|| f.source.writes.lock().unwrap().len() == 1).await;
        settle().await;

        let status = f.handle.feed().borrow().clone();
        assert_eq!(status.identity.as_deref(), Some("u2"));
        assert_eq!(status.last_error, None);

        f.source.resolve_fetch("u2", Ok(vec![alert("1", 5)]));
        let status = feed_until(&f.handle, |s| !s.alerts.is_empty()).await;
        assert!(!status.alerts[0].completed);
        assert_eq!(status.last_error, None);
    }

    #[tokio::test]
    async fn prompts_on_start_when_enabled() {
        let f = start(HostPermission::Undetermined);
        let status = reminders_until(&f.handle, |s| s.capability.can_display).await;
        assert_eq!(status.pending.len(), 0);
        assert_eq!(f.host.prompt_count(), 1);
    }

    #[tokio::test]
    async fn toggling_notifications_clears_and_restores_reminders() {
        let f = start(HostPermission::Granted);
        sign_in(&f, "u1").await;
        f.source.push("u1", Ok(vec![alert("1", 5), alert("2", 10)]));
        reminders_until(&f.handle, |s| s.pending.len() == 2).await;

        f.handle.disable_notifications().unwrap();
        reminders_until(&f.handle, |s| s.pending.is_empty()).await;
        assert!(f.timers.armed().is_empty());

        f.handle.enable_notifications().unwrap();
        reminders_until(&f.handle, |s| s.pending.len() == 2).await;
        assert_eq!(f.host.prompt_count(), 0);
    }

    #[tokio::test]
    async fn signing_out_clears_feed_and_timers() {
        let f = start(HostPermission::Granted);
        sign_in(&f, "u1").await;
        f.source.push("u1", Ok(vec![alert("1", 5)]));
        reminders_until(&f.handle, |s| s.pending.len() == 1).await;

        f.handle.set_identity(None).unwrap();
        let feed = feed_until(&f.handle, |s| s.identity.is_none()).await;
        assert!(feed.alerts.is_empty());
        assert!(!feed.loading);
        reminders_until(&f.handle, |s| s.pending.is_empty()).await;
        assert_eq!(f.source.active_subscriptions("u1"), 0);
        assert!(f.timers.armed().is_empty());
    }

    #[tokio::test]
    async fn shutdown_releases_subscription_and_timers() {
        let f = start(HostPermission::Granted);
        sign_in(&f, "u1").await;
        f.source.push("u1", Ok(vec![alert("1", 5), alert("2", 10)]));
        reminders_until(&f.handle, |s| s.pending.len() == 2).await;

        f.handle.shutdown().await.unwrap();
        assert_eq!(f.source.active_subscriptions("u1"), 0);
        assert!(f.timers.armed().is_empty());
        assert_eq!(f.handle.refresh(), Err(SessionError::Closed));
        assert_eq!(f.handle.shutdown().await, Err(SessionError::Closed));
    }

    #[tokio::test]
    async fn dropping_last_handle_stops_session() {
        let f = start(HostPermission::Granted);
        sign_in(&f, "u1").await;
        f.source.push("u1", Ok(vec![alert("1", 5)]));
        reminders_until(&f.handle, |s| s.pending.len() == 1).await;

        let Fixture {
            source,
            timers,
            handle,
            ..
        } = f;
        drop(handle);
        eventually(|| source.active_subscriptions("u1") == 0).await;
        eventually(|| timers.armed().is_empty()).await;
    }

    #[tokio::test]
    async fn works_against_memory_source() {
        let source = Arc::new(crate::feed::MemoryAlertSource::new());
        let host = Arc::new(MockNotificationHost::new(HostPermission::Granted));
        let timers = Arc::new(MockTimerHost::new(Duration::from_secs(3600)));
        let handle = AlertSession::spawn(source.clone(), host, timers, &ReminderSettings::default());

        let mut a = alert("m1", 15);
        a.assigned_to.insert("u1".into());
        source.upsert(a).unwrap();

        handle.set_identity(Some("u1".into())).unwrap();
        let status = feed_until(&handle, |s| s.alerts.len() == 1).await;
        assert_eq!(ids(&status), vec!["m1"]);
        reminders_until(&handle, |s| s.pending.len() == 1).await;

        let mut b = alert("m2", 5);
        b.assigned_to.insert("u1".into());
        source.upsert(b).unwrap();
        let status = feed_until(&handle, |s| s.alerts.len() == 2).await;
        assert_eq!(ids(&status), vec!["m2", "m1"]);

        handle.shutdown().await.unwrap();
        assert_eq!(source.subscriber_count(), 0);
    }
}
