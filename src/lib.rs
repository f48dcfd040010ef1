pub mod config;
pub mod feed; // Alert feed: fetch + live subscription reconciliation
pub mod models;
pub mod notification; // Notification capability state machine
pub mod query; // Search / filter / sort / paginate for list views
pub mod reminders; // Local reminder timers
pub mod session; // Event loop wiring feed -> reminders -> notifications

use tracing_subscriber::EnvFilter;

pub use feed::{AlertFeed, AlertSource, FeedStatus, MemoryAlertSource, SourceError};
pub use notification::{NotificationCapability, NotificationHost};
pub use query::{query, ListState, QueryContext, QueryError, QueryResult};
pub use reminders::{ReminderScheduler, ReminderStatus, TimerHost, TokioTimerHost};
pub use session::{AlertSession, SessionError, SessionHandle};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise [`config::default_log_filter`].
/// Calling it again is harmless: the first subscriber stays installed.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
    }
}
