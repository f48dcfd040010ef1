//! Alert feed: the authoritative, time-ordered alert list for the signed-in
//! user, fed by a remote [`AlertSource`].

pub mod memory;
pub mod source;
pub mod state;

pub use memory::MemoryAlertSource;
pub use source::{AlertSource, SnapshotResult, SnapshotSink, Subscription};
pub use state::{AlertFeed, FeedStatus, FeedTicket, IdentityChange, SnapshotOrigin};

use thiserror::Error;

/// Failures reported by an [`AlertSource`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Alert fetch failed: {0}")]
    FetchFailed(String),

    #[error("Alert subscription failed: {0}")]
    SubscriptionFailed(String),

    #[error("Alert update failed: {0}")]
    WriteFailed(String),

    #[error("Not authorized to read alerts")]
    Unauthorized,
}
