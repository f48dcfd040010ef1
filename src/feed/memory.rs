//! In-process [`AlertSource`] backed by a shared vector.
//!
//! Every write pushes a fresh snapshot to each live subscriber whose
//! identity can see the changed alert set. Useful for offline mode and as
//! the reference source in tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures_util::future::{self, BoxFuture, FutureExt};

use crate::models::Alert;

use super::source::{AlertSource, SnapshotSink, Subscription};
use super::SourceError;

#[derive(Default)]
struct Store {
    alerts: Vec<Alert>,
    subscribers: HashMap<u64, (String, SnapshotSink)>,
    next_subscriber: u64,
}

impl Store {
    fn visible_to(&self, identity: &str) -> Vec<Alert> {
        self.alerts
            .iter()
            .filter(|a| a.is_assigned_to(identity))
            .cloned()
            .collect()
    }

    /// Sinks paired with the snapshot each should receive.
    fn deliveries(&self) -> Vec<(SnapshotSink, Vec<Alert>)> {
        self.subscribers
            .values()
            .map(|(identity, sink)| (sink.clone(), self.visible_to(identity)))
            .collect()
    }
}

#[derive(Clone, Default)]
pub struct MemoryAlertSource {
    store: Arc<Mutex<Store>>,
}

impl MemoryAlertSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alerts(alerts: Vec<Alert>) -> Self {
        let source = Self::new();
        if let Ok(mut store) = source.store.lock() {
            store.alerts = alerts;
        }
        source
    }

    /// Insert or replace by id, then notify subscribers.
    pub fn upsert(&self, alert: Alert) -> Result<(), SourceError> {
        self.write(|alerts| {
            match alerts.iter_mut().find(|a| a.id == alert.id) {
                Some(existing) => *existing = alert,
                None => alerts.push(alert),
            }
            Ok(())
        })
    }

    pub fn remove(&self, alert_id: &str) -> Result<(), SourceError> {
        self.write(|alerts| {
            alerts.retain(|a| a.id != alert_id);
            Ok(())
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.store.lock().map(|s| s.subscribers.len()).unwrap_or(0)
    }

    fn write(
        &self,
        change: impl FnOnce(&mut Vec<Alert>) -> Result<(), SourceError>,
    ) -> Result<(), SourceError> {
        let deliveries = {
            let mut store = self
                .store
                .lock()
                .map_err(|_| SourceError::WriteFailed("alert store poisoned".into()))?;
            change(&mut store.alerts)?;
            store.deliveries()
        };
        // Deliver outside the lock so a sink may call back into the source.
        for (sink, alerts) in deliveries {
            sink.snapshot(alerts);
        }
        Ok(())
    }
}

impl AlertSource for MemoryAlertSource {
    fn fetch_once(&self, identity: &str) -> BoxFuture<'static, Result<Vec<Alert>, SourceError>> {
        let result = self
            .store
            .lock()
            .map(|s| s.visible_to(identity))
            .map_err(|_| SourceError::FetchFailed("alert store poisoned".into()));
        future::ready(result).boxed()
    }

    fn subscribe(&self, identity: &str, sink: SnapshotSink) -> Subscription {
        let (id, initial) = match self.store.lock() {
            Ok(mut store) => {
                let id = store.next_subscriber;
                store.next_subscriber += 1;
                store.subscribers.insert(id, (identity.to_string(), sink.clone()));
                (id, store.visible_to(identity))
            }
            Err(_) => {
                sink.error(SourceError::SubscriptionFailed("alert store poisoned".into()));
                return Subscription::detached();
            }
        };
        sink.snapshot(initial);

        let store = Arc::downgrade(&self.store);
        Subscription::new(move || {
            if let Some(store) = store.upgrade() {
                if let Ok(mut store) = store.lock() {
                    store.subscribers.remove(&id);
                }
            }
        })
    }

    fn set_completed(
        &self,
        alert_id: &str,
        completed_at: DateTime<Utc>,
    ) -> BoxFuture<'static, Result<(), SourceError>> {
        let result = self.write(|alerts| {
            let alert = alerts
                .iter_mut()
                .find(|a| a.id == alert_id)
                .ok_or_else(|| SourceError::WriteFailed(format!("no alert {alert_id}")))?;
            alert.mark_completed(completed_at);
            Ok(())
        });
        future::ready(result).boxed()
    }
}
