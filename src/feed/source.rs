//! The remote alert backend as seen by the feed: a one-shot read, a live
//! subscription of full replacement snapshots, and the completion write.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;

use crate::models::Alert;

use super::SourceError;

/// Result of one subscription delivery.
pub type SnapshotResult = Result<Vec<Alert>, SourceError>;

/// Remote store of alerts scoped by assignee identity.
///
/// Implementations own transport, retries and timeouts. Returned futures
/// are `'static` so the caller can race them against identity changes.
pub trait AlertSource: Send + Sync + 'static {
    /// Point-in-time read of alerts whose `assigned_to` contains `identity`.
    fn fetch_once(&self, identity: &str) -> BoxFuture<'static, Result<Vec<Alert>, SourceError>>;

    /// Live delivery of full replacement snapshots for `identity`.
    ///
    /// The subscription stays open until the returned handle is cancelled
    /// or dropped. Errors are delivered through the same sink and do not
    /// close the handle.
    fn subscribe(&self, identity: &str, sink: SnapshotSink) -> Subscription;

    /// Mark an alert completed at `completed_at`.
    fn set_completed(
        &self,
        alert_id: &str,
        completed_at: DateTime<Utc>,
    ) -> BoxFuture<'static, Result<(), SourceError>>;
}

// ═══════════════════════════════════════════════════════════
// SnapshotSink
// ═══════════════════════════════════════════════════════════

/// Callback a subscription pushes deliveries into.
#[derive(Clone)]
pub struct SnapshotSink {
    deliver: Arc<dyn Fn(SnapshotResult) + Send + Sync>,
}

impl SnapshotSink {
    pub fn new(deliver: impl Fn(SnapshotResult) + Send + Sync + 'static) -> Self {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    pub fn snapshot(&self, alerts: Vec<Alert>) {
        (self.deliver)(Ok(alerts));
    }

    pub fn error(&self, error: SourceError) {
        (self.deliver)(Err(error));
    }
}

impl fmt::Debug for SnapshotSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotSink").finish_non_exhaustive()
    }
}

// ═══════════════════════════════════════════════════════════
// Subscription
// ═══════════════════════════════════════════════════════════

/// Handle to a live subscription. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// A subscription with nothing to release.
    pub fn detached() -> Self {
        Self { unsubscribe: None }
    }

    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}
