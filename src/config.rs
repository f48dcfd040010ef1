use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::WeekStart;

/// Application-level constants
pub const APP_NAME: &str = "Clinicore";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Upcoming reminders kept armed at once.
pub const DEFAULT_MAX_PENDING_REMINDERS: usize = 5;

/// Body used when an alert has no description.
pub const DEFAULT_NOTIFICATION_BODY: &str = "You have a pending alert";

/// Largest delay most hosts accept for a single timer (2^31 - 1 ms, ~24.8 days).
pub const DEFAULT_MAX_TIMER_DELAY_MS: u64 = 2_147_483_647;

/// Rows per page in the patient and record lists.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Settings file name inside the app data directory.
const SETTINGS_FILE: &str = "settings.json";

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "clinicore_lib=info,warn"
}

/// Get the application data directory (~/Clinicore/), or `./Clinicore`
/// when no home directory can be determined.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Settings IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ═══════════════════════════════════════════════════════════
// Settings
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderSettings {
    /// At most this many reminders are armed per synchronization.
    pub max_pending: usize,
    pub default_body: String,
    /// Alerts further out than this are left to a later synchronization.
    pub max_timer_delay_ms: u64,
    /// In-app toggle, independent of the host permission.
    pub notifications_enabled: bool,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            max_pending: DEFAULT_MAX_PENDING_REMINDERS,
            default_body: DEFAULT_NOTIFICATION_BODY.to_string(),
            max_timer_delay_ms: DEFAULT_MAX_TIMER_DELAY_MS,
            notifications_enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListSettings {
    pub page_size: usize,
    pub week_start: WeekStart,
}

impl Default for ListSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            week_start: WeekStart::Sunday,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub reminders: ReminderSettings,
    pub lists: ListSettings,
}

/// Loads and saves `settings.json` in a config directory.
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        Self {
            path: config_dir.as_ref().join(SETTINGS_FILE),
        }
    }

    /// Store rooted at [`app_data_dir`].
    pub fn default_location() -> Self {
        Self::new(app_data_dir())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable settings fall back to defaults.
    pub fn load(&self) -> Settings {
        match self.try_load() {
            Ok(Some(settings)) => settings,
            Ok(None) => Settings::default(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Ignoring unreadable settings");
                Settings::default()
            }
        }
    }

    fn try_load(&self) -> Result<Option<Settings>, ConfigError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn app_data_dir_ends_with_app_name() {
        assert!(app_data_dir().ends_with("Clinicore"));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }

    #[test]
    fn defaults_match_reminder_bound() {
        let settings = Settings::default();
        assert_eq!(settings.reminders.max_pending, 5);
        assert_eq!(settings.lists.page_size, 10);
        assert_eq!(settings.lists.week_start, WeekStart::Sunday);
        assert!(settings.reminders.notifications_enabled);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempdir().unwrap();
        let store = SettingsStore::new(dir.path());
        assert_eq!(store.load(), Settings::default());
    }

    #[test]
    fn save_and_load() {
        let dir = tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("nested"));

        let mut settings = Settings::default();
        settings.reminders.max_pending = 3;
        settings.lists.week_start = WeekStart::Monday;
        store.save(&settings).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.reminders.max_pending, 3);
        assert_eq!(loaded.lists.week_start, WeekStart::Monday);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let store = SettingsStore::new(dir.path());
        fs::write(store.path(), r#"{"lists": {"page_size": 25}}"#).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.lists.page_size, 25);
        assert_eq!(loaded.reminders, ReminderSettings::default());
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let store = SettingsStore::new(dir.path());
        fs::write(store.path(), "{not json").unwrap();
        assert_eq!(store.load(), Settings::default());
    }
}
