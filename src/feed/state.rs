//! AlertFeed: reconciles the one-shot fetch and the live subscription into
//! a single time-ordered snapshot for the current identity.
//!
//! Pure state: the owner issues the actual requests and hands every
//! delivery back together with the [`FeedTicket`] it was issued under.
//! Deliveries carrying an older ticket belong to a previous identity and
//! are dropped on arrival.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::Alert;

use super::SourceError;

/// Generation tag handed out with every fetch and subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FeedTicket(u64);

/// Which data path a delivery came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotOrigin {
    Fetch,
    Subscription,
}

impl SnapshotOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Subscription => "subscription",
        }
    }
}

/// Outcome of [`AlertFeed::set_identity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityChange {
    /// Same identity as before; nothing to do.
    Unchanged,
    /// Signed out. Release the subscription; nothing new to open.
    Cleared,
    /// New identity. Release the old subscription, then fetch and
    /// subscribe under this ticket.
    Started(FeedTicket),
}

/// Published view of the feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedStatus {
    pub identity: Option<String>,
    /// Sorted ascending by `scheduled_date`.
    pub alerts: Vec<Alert>,
    /// True until the first snapshot (or error) for this identity.
    pub loading: bool,
    /// A manual refresh fetch is outstanding.
    pub refreshing: bool,
    pub last_error: Option<SourceError>,
    pub adopted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct AlertFeed {
    identity: Option<String>,
    generation: u64,
    alerts: Vec<Alert>,
    loading: bool,
    refreshing: bool,
    last_error: Option<SourceError>,
    adopted_at: Option<DateTime<Utc>>,
}

impl AlertFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn ticket(&self) -> FeedTicket {
        FeedTicket(self.generation)
    }

    fn is_current(&self, ticket: FeedTicket) -> bool {
        self.identity.is_some() && ticket.0 == self.generation
    }

    /// Switch to `identity`, clearing all state from the previous one.
    pub fn set_identity(&mut self, identity: Option<String>) -> IdentityChange {
        if identity == self.identity {
            return IdentityChange::Unchanged;
        }

        self.generation += 1;
        self.alerts.clear();
        self.last_error = None;
        self.adopted_at = None;
        self.refreshing = false;
        self.loading = identity.is_some();
        self.identity = identity;

        match &self.identity {
            Some(id) => {
                tracing::info!(identity = %id, generation = self.generation, "Alert feed identity changed");
                IdentityChange::Started(self.ticket())
            }
            None => {
                tracing::info!(generation = self.generation, "Alert feed cleared");
                IdentityChange::Cleared
            }
        }
    }

    /// Start a manual refresh. Returns the ticket for the new fetch, or
    /// `None` when there is no identity to fetch for.
    pub fn begin_refresh(&mut self) -> Option<FeedTicket> {
        self.identity.as_ref()?;
        self.refreshing = true;
        Some(self.ticket())
    }

    /// Replace the snapshot with `alerts` if `ticket` is current.
    ///
    /// Alerts violating the completion invariant are dropped, and a
    /// repeated id keeps its first occurrence. Returns whether the
    /// snapshot was adopted.
    pub fn adopt(
        &mut self,
        ticket: FeedTicket,
        origin: SnapshotOrigin,
        alerts: Vec<Alert>,
        now: DateTime<Utc>,
    ) -> bool {
        if !self.is_current(ticket) {
            tracing::debug!(
                origin = origin.as_str(),
                stale = ticket.0,
                current = self.generation,
                "Discarding stale alert delivery"
            );
            return false;
        }

        let received = alerts.len();
        let mut seen = HashSet::new();
        let mut accepted: Vec<Alert> = alerts
            .into_iter()
            .filter(|alert| match alert.validate() {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping invalid alert from snapshot");
                    false
                }
            })
            .filter(|alert| seen.insert(alert.id.clone()))
            .collect();
        accepted.sort_by_key(|a| a.scheduled_date);

        tracing::info!(
            origin = origin.as_str(),
            received,
            adopted = accepted.len(),
            "Alert snapshot adopted"
        );

        self.alerts = accepted;
        self.loading = false;
        self.last_error = None;
        self.adopted_at = Some(now);
        if origin == SnapshotOrigin::Fetch {
            self.refreshing = false;
        }
        true
    }

    /// Record a failure on either path. The adopted snapshot is kept.
    /// Returns whether the failure belonged to the current identity.
    pub fn fail(&mut self, ticket: FeedTicket, origin: SnapshotOrigin, error: SourceError) -> bool {
        if !self.is_current(ticket) {
            tracing::debug!(origin = origin.as_str(), error = %error, "Discarding stale alert error");
            return false;
        }

        tracing::warn!(
            origin = origin.as_str(),
            error = %error,
            retained = self.alerts.len(),
            "Alert feed error"
        );
        self.loading = false;
        if origin == SnapshotOrigin::Fetch {
            self.refreshing = false;
        }
        self.last_error = Some(error);
        true
    }

    /// Record a failed write (e.g. marking an alert completed) issued under
    /// `ticket`. Loading and the adopted snapshot are untouched. Returns
    /// whether the failure belonged to the current identity.
    pub fn report_write_error(&mut self, ticket: FeedTicket, error: SourceError) -> bool {
        if !self.is_current(ticket) {
            tracing::debug!(error = %error, "Discarding stale alert write error");
            return false;
        }
        tracing::warn!(error = %error, "Alert write failed");
        self.last_error = Some(error);
        true
    }

    /// Mark `alert_id` completed locally after the backend accepted a write
    /// issued under `ticket`. Returns false when the ticket is stale or the
    /// alert is unknown or already completed.
    pub fn apply_completion(
        &mut self,
        ticket: FeedTicket,
        alert_id: &str,
        at: DateTime<Utc>,
    ) -> bool {
        if !self.is_current(ticket) {
            tracing::debug!(alert_id, "Discarding stale alert completion");
            return false;
        }
        match self.alerts.iter_mut().find(|a| a.id == alert_id) {
            Some(alert) if !alert.completed => {
                alert.mark_completed(at);
                true
            }
            _ => false,
        }
    }

    pub fn status(&self) -> FeedStatus {
        FeedStatus {
            identity: self.identity.clone(),
            alerts: self.alerts.clone(),
            loading: self.loading,
            refreshing: self.refreshing,
            last_error: self.last_error.clone(),
            adopted_at: self.adopted_at,
        }
    }
}
