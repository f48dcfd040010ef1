//! Notification capability: the single authority on whether a reminder
//! may be shown right now.
//!
//! Combines the host's permission (which only the host can change once
//! decided) with the in-app toggle. A notification is displayable only when
//! both allow it.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::{self, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Called when the user interacts with a displayed notification.
pub type InteractCallback = Box<dyn FnOnce() + Send>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("Notifications are not permitted")]
    NotPermitted,

    #[error("Notification display failed: {0}")]
    DisplayFailed(String),
}

/// Host-side permission as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostPermission {
    Undetermined,
    Granted,
    Denied,
}

/// Combined capability state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapabilityState {
    Unsupported,
    Undetermined,
    Denied,
    Granted,
    UserDisabled,
}

impl CapabilityState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unsupported => "unsupported",
            Self::Undetermined => "undetermined",
            Self::Denied => "denied",
            Self::Granted => "granted",
            Self::UserDisabled => "user-disabled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CapabilityStatus {
    pub state: CapabilityState,
    pub can_display: bool,
    pub user_enabled: bool,
}

/// Opaque id of a displayed notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NotificationHandle(pub String);

/// Platform notification facility.
pub trait NotificationHost: Send + Sync + 'static {
    fn is_supported(&self) -> bool;

    fn permission_state(&self) -> HostPermission;

    /// Prompt the user. Resolves to `Granted` or `Denied`.
    fn request_permission(&self) -> BoxFuture<'static, HostPermission>;

    fn display(
        &self,
        title: &str,
        body: &str,
        on_interact: Option<InteractCallback>,
    ) -> Result<NotificationHandle, HostError>;

    /// Bring the application window to the foreground.
    fn request_focus(&self);
}

// ═══════════════════════════════════════════════════════════
// NotificationCapability
// ═══════════════════════════════════════════════════════════

/// Outcome of [`NotificationCapability::request_permission`].
pub enum PermissionRequest {
    /// The host must be asked. Resolve the future and pass the answer to
    /// [`NotificationCapability::complete_request`].
    Prompt(BoxFuture<'static, HostPermission>),
    /// No prompt was needed. `newly_displayable` is true when re-reading the
    /// host flipped `can_display` from false to true.
    Resolved { newly_displayable: bool },
}

impl PermissionRequest {
    pub fn is_prompt(&self) -> bool {
        matches!(self, Self::Prompt(_))
    }
}

impl fmt::Debug for PermissionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prompt(_) => f.write_str("Prompt"),
            Self::Resolved { newly_displayable } => f
                .debug_struct("Resolved")
                .field("newly_displayable", newly_displayable)
                .finish(),
        }
    }
}

/// Outcome of [`NotificationCapability::enable`].
pub enum EnableOutcome {
    /// Toggle is on. `newly_displayable` is true when this flipped
    /// `can_display` from false to true.
    Enabled { newly_displayable: bool },
    /// Toggle is on but the host must be asked first. Resolve the future
    /// and pass the answer to [`NotificationCapability::complete_request`].
    NeedsPermission(BoxFuture<'static, HostPermission>),
    /// Toggle is on but the host cannot or will not display.
    Unavailable(CapabilityState),
}

impl fmt::Debug for EnableOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enabled { newly_displayable } => f
                .debug_struct("Enabled")
                .field("newly_displayable", newly_displayable)
                .finish(),
            Self::NeedsPermission(_) => f.write_str("NeedsPermission"),
            Self::Unavailable(state) => f.debug_tuple("Unavailable").field(state).finish(),
        }
    }
}

pub struct NotificationCapability {
    host: Arc<dyn NotificationHost>,
    supported: bool,
    permission: HostPermission,
    user_enabled: bool,
    prompt_in_flight: bool,
}

impl NotificationCapability {
    pub fn new(host: Arc<dyn NotificationHost>, user_enabled: bool) -> Self {
        let supported = host.is_supported();
        let permission = if supported {
            host.permission_state()
        } else {
            HostPermission::Denied
        };
        tracing::info!(
            supported,
            permission = ?permission,
            user_enabled,
            "Notification capability initialized"
        );
        Self {
            host,
            supported,
            permission,
            user_enabled,
            prompt_in_flight: false,
        }
    }

    pub fn state(&self) -> CapabilityState {
        if !self.supported {
            return CapabilityState::Unsupported;
        }
        match self.permission {
            HostPermission::Undetermined => CapabilityState::Undetermined,
            HostPermission::Denied => CapabilityState::Denied,
            HostPermission::Granted if self.user_enabled => CapabilityState::Granted,
            HostPermission::Granted => CapabilityState::UserDisabled,
        }
    }

    pub fn can_display(&self) -> bool {
        self.supported && self.permission == HostPermission::Granted && self.user_enabled
    }

    pub fn status(&self) -> CapabilityStatus {
        CapabilityStatus {
            state: self.state(),
            can_display: self.can_display(),
            user_enabled: self.user_enabled,
        }
    }

    /// Re-read host permission. Returns true when this made the capability
    /// displayable.
    pub fn refresh_from_host(&mut self) -> bool {
        if !self.supported {
            return false;
        }
        let before = self.can_display();
        let permission = self.host.permission_state();
        if permission != self.permission {
            tracing::info!(from = ?self.permission, to = ?permission, "Host notification permission changed");
            self.permission = permission;
        }
        !before && self.can_display()
    }

    /// Ask the host for permission if it has not decided yet.
    ///
    /// A denied host is only re-read, never re-prompted, and a permission
    /// granted outside the app is reported as newly displayable. At most one
    /// prompt is in flight.
    pub fn request_permission(&mut self) -> PermissionRequest {
        if !self.supported || self.prompt_in_flight {
            return PermissionRequest::Resolved {
                newly_displayable: false,
            };
        }
        let newly_displayable = self.refresh_from_host();
        if self.permission != HostPermission::Undetermined {
            return PermissionRequest::Resolved { newly_displayable };
        }
        self.prompt_in_flight = true;
        tracing::info!("Requesting notification permission");
        PermissionRequest::Prompt(self.host.request_permission())
    }

    /// Record the host's answer to a prompt. Returns true when this made
    /// the capability displayable.
    pub fn complete_request(&mut self, answer: HostPermission) -> bool {
        let before = self.can_display();
        self.prompt_in_flight = false;
        self.permission = answer;
        tracing::info!(permission = ?answer, state = self.state().as_str(), "Notification permission resolved");
        !before && self.can_display()
    }

    /// Turn the in-app toggle on.
    pub fn enable(&mut self) -> EnableOutcome {
        let before = self.can_display();
        self.user_enabled = true;

        if !self.supported {
            return EnableOutcome::Unavailable(CapabilityState::Unsupported);
        }
        if self.permission != HostPermission::Granted {
            if let PermissionRequest::Prompt(prompt) = self.request_permission() {
                return EnableOutcome::NeedsPermission(prompt);
            }
        }
        if self.can_display() {
            tracing::info!("Notifications enabled");
            EnableOutcome::Enabled {
                newly_displayable: !before,
            }
        } else {
            EnableOutcome::Unavailable(self.state())
        }
    }

    /// Turn the in-app toggle off. Returns true when notifications were
    /// displayable before.
    pub fn disable(&mut self) -> bool {
        let before = self.can_display();
        self.user_enabled = false;
        tracing::info!("Notifications disabled in app");
        before
    }

    /// Show a notification. Interacting with it asks the host for focus.
    ///
    /// Host permission is re-checked at display time since it may have been
    /// revoked outside the app.
    pub fn display(&self, title: &str, body: &str) -> Result<NotificationHandle, HostError> {
        if !self.can_display() || self.host.permission_state() != HostPermission::Granted {
            return Err(HostError::NotPermitted);
        }
        let host = Arc::clone(&self.host);
        let focus: InteractCallback = Box::new(move || host.request_focus());
        self.host.display(title, body, Some(focus))
    }
}

impl fmt::Debug for NotificationCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationCapability")
            .field("state", &self.state())
            .field("prompt_in_flight", &self.prompt_in_flight)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════
// Mock host
// ═══════════════════════════════════════════════════════════

/// A notification shown through [`MockNotificationHost`].
pub struct ShownNotification {
    pub title: String,
    pub body: String,
    on_interact: Option<InteractCallback>,
}

struct MockHostState {
    supported: bool,
    permission: HostPermission,
    prompt_answer: HostPermission,
    prompts: usize,
    focus_requests: usize,
    fail_display: bool,
    shown: Vec<ShownNotification>,
}

/// In-memory host for unit testing and headless runs.
pub struct MockNotificationHost {
    state: Mutex<MockHostState>,
}

impl MockNotificationHost {
    pub fn new(permission: HostPermission) -> Self {
        Self {
            state: Mutex::new(MockHostState {
                supported: true,
                permission,
                prompt_answer: HostPermission::Granted,
                prompts: 0,
                focus_requests: 0,
                fail_display: false,
                shown: Vec::new(),
            }),
        }
    }

    pub fn unsupported() -> Self {
        let host = Self::new(HostPermission::Undetermined);
        host.lock().supported = false;
        host
    }

    fn lock(&self) -> MutexGuard<'_, MockHostState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Answer future prompts with `answer`.
    pub fn answer_prompts_with(&self, answer: HostPermission) {
        self.lock().prompt_answer = answer;
    }

    /// Simulate the user changing permission in system settings.
    pub fn set_permission(&self, permission: HostPermission) {
        self.lock().permission = permission;
    }

    pub fn fail_displays(&self, fail: bool) {
        self.lock().fail_display = fail;
    }

    pub fn prompt_count(&self) -> usize {
        self.lock().prompts
    }

    pub fn focus_requests(&self) -> usize {
        self.lock().focus_requests
    }

    /// `(title, body)` of every notification shown so far.
    pub fn shown(&self) -> Vec<(String, String)> {
        self.lock()
            .shown
            .iter()
            .map(|n| (n.title.clone(), n.body.clone()))
            .collect()
    }

    /// Simulate the user clicking the `index`th notification.
    pub fn interact(&self, index: usize) {
        let callback = self
            .lock()
            .shown
            .get_mut(index)
            .and_then(|n| n.on_interact.take());
        if let Some(callback) = callback {
            callback();
        }
    }
}

impl NotificationHost for MockNotificationHost {
    fn is_supported(&self) -> bool {
        self.lock().supported
    }

    fn permission_state(&self) -> HostPermission {
        self.lock().permission
    }

    fn request_permission(&self) -> BoxFuture<'static, HostPermission> {
        let mut state = self.lock();
        state.prompts += 1;
        if state.permission == HostPermission::Undetermined {
            state.permission = state.prompt_answer;
        }
        future::ready(state.permission).boxed()
    }

    fn display(
        &self,
        title: &str,
        body: &str,
        on_interact: Option<InteractCallback>,
    ) -> Result<NotificationHandle, HostError> {
        let mut state = self.lock();
        if state.fail_display {
            return Err(HostError::DisplayFailed("mock display failure".into()));
        }
        state.shown.push(ShownNotification {
            title: title.to_string(),
            body: body.to_string(),
            on_interact,
        });
        Ok(NotificationHandle(format!("mock-{}", state.shown.len())))
    }

    fn request_focus(&self) {
        self.lock().focus_requests += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capability(permission: HostPermission) -> (Arc<MockNotificationHost>, NotificationCapability) {
        let host = Arc::new(MockNotificationHost::new(permission));
        let cap = NotificationCapability::new(host.clone(), true);
        (host, cap)
    }

    #[test]
    fn unsupported_host_is_terminal() {
        let host = Arc::new(MockNotificationHost::unsupported());
        let mut cap = NotificationCapability::new(host.clone(), true);
        assert_eq!(cap.state(), CapabilityState::Unsupported);
        assert!(!cap.request_permission().is_prompt());
        assert!(matches!(
            cap.enable(),
            EnableOutcome::Unavailable(CapabilityState::Unsupported)
        ));
        assert!(!cap.can_display());
        assert_eq!(host.prompt_count(), 0);
    }

    #[tokio::test]
    async fn undetermined_prompts_once_and_grants() {
        let (host, mut cap) = capability(HostPermission::Undetermined);
        assert_eq!(cap.state(), CapabilityState::Undetermined);

        let prompt = match cap.request_permission() {
            PermissionRequest::Prompt(prompt) => prompt,
            other => panic!("expected Prompt, got {other:?}"),
        };
        assert!(
            !cap.request_permission().is_prompt(),
            "second prompt while one is in flight"
        );

        let answer = prompt.await;
        assert!(cap.complete_request(answer));
        assert_eq!(cap.state(), CapabilityState::Granted);
        assert!(cap.can_display());
        assert_eq!(host.prompt_count(), 1);
    }

    #[tokio::test]
    async fn denied_answer_is_not_displayable() {
        let (host, mut cap) = capability(HostPermission::Undetermined);
        host.answer_prompts_with(HostPermission::Denied);
        let answer = match cap.request_permission() {
            PermissionRequest::Prompt(prompt) => prompt.await,
            other => panic!("expected Prompt, got {other:?}"),
        };
        assert!(!cap.complete_request(answer));
        assert_eq!(cap.state(), CapabilityState::Denied);
    }

    #[test]
    fn denied_request_rereads_host_without_prompting() {
        let (host, mut cap) = capability(HostPermission::Denied);
        assert!(matches!(
            cap.request_permission(),
            PermissionRequest::Resolved { newly_displayable: false }
        ));
        assert_eq!(host.prompt_count(), 0);

        // Reset in system settings.
        host.set_permission(HostPermission::Granted);
        assert!(matches!(
            cap.request_permission(),
            PermissionRequest::Resolved { newly_displayable: true }
        ));
        assert_eq!(cap.state(), CapabilityState::Granted);
        assert_eq!(host.prompt_count(), 0);

        // Already displayable: nothing new to report.
        assert!(matches!(
            cap.request_permission(),
            PermissionRequest::Resolved { newly_displayable: false }
        ));
    }

    #[test]
    fn toggle_is_independent_of_host_permission() {
        let (host, mut cap) = capability(HostPermission::Granted);
        assert!(cap.can_display());

        assert!(cap.disable());
        assert_eq!(cap.state(), CapabilityState::UserDisabled);
        assert!(!cap.can_display());

        match cap.enable() {
            EnableOutcome::Enabled { newly_displayable } => assert!(newly_displayable),
            other => panic!("expected Enabled, got {other:?}"),
        }
        assert_eq!(cap.state(), CapabilityState::Granted);
        assert_eq!(host.prompt_count(), 0);
    }

    #[test]
    fn enabling_twice_is_not_newly_displayable() {
        let (_host, mut cap) = capability(HostPermission::Granted);
        match cap.enable() {
            EnableOutcome::Enabled { newly_displayable } => assert!(!newly_displayable),
            other => panic!("expected Enabled, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn enable_on_undetermined_host_prompts() {
        let host = Arc::new(MockNotificationHost::new(HostPermission::Undetermined));
        let mut cap = NotificationCapability::new(host.clone(), false);
        let prompt = match cap.enable() {
            EnableOutcome::NeedsPermission(prompt) => prompt,
            other => panic!("expected NeedsPermission, got {other:?}"),
        };
        assert!(cap.complete_request(prompt.await));
        assert!(cap.can_display());
    }

    #[test]
    fn enable_on_denied_host_is_unavailable() {
        let (_host, mut cap) = capability(HostPermission::Denied);
        assert!(matches!(
            cap.enable(),
            EnableOutcome::Unavailable(CapabilityState::Denied)
        ));
    }

    #[test]
    fn display_requires_capability() {
        let (host, mut cap) = capability(HostPermission::Granted);
        cap.disable();
        assert_eq!(cap.display("t", "b"), Err(HostError::NotPermitted));
        assert!(host.shown().is_empty());
    }

    #[test]
    fn display_rechecks_revoked_host_permission() {
        let (host, cap) = capability(HostPermission::Granted);
        host.set_permission(HostPermission::Denied);
        assert_eq!(cap.display("t", "b"), Err(HostError::NotPermitted));
    }

    #[test]
    fn interacting_with_notification_requests_focus() {
        let (host, cap) = capability(HostPermission::Granted);
        cap.display("Insulin", "Take 10 units").unwrap();
        assert_eq!(host.shown(), vec![("Insulin".to_string(), "Take 10 units".to_string())]);

        host.interact(0);
        host.interact(0);
        assert_eq!(host.focus_requests(), 1);
    }

    #[test]
    fn refresh_from_host_reports_new_grant() {
        let (host, mut cap) = capability(HostPermission::Denied);
        assert!(!cap.refresh_from_host());
        host.set_permission(HostPermission::Granted);
        assert!(cap.refresh_from_host());
        assert!(!cap.refresh_from_host());
    }

    #[test]
    fn status_serializes_kebab_case_state() {
        let (_host, mut cap) = capability(HostPermission::Granted);
        cap.disable();
        let json = serde_json::to_value(cap.status()).unwrap();
        assert_eq!(json["state"], "user-disabled");
        assert_eq!(json["can_display"], false);
    }
}
