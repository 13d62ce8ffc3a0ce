use tracing::{info, warn};

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// Failure the user should see (a toast in a UI layer).
    Error,
    /// Informational message.
    Info,
}

/// User-facing notification collaborator.
///
/// Fire-and-forget; the client never consumes a return value and never
/// depends on delivery.
pub trait NotificationSink: Send + Sync {
    /// Delivers one notification.
    fn notify(&self, kind: NotificationKind, message: &str);
}

/// Default sink: routes notifications to the tracing subscriber so an
/// undecorated client still records user-visible failures.
#[derive(Debug, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, kind: NotificationKind, message: &str) {
        match kind {
            NotificationKind::Error => warn!(message, "user notification"),
            NotificationKind::Info => info!(message, "user notification"),
        }
    }
}
