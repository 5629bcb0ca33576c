//! User-visible notifications for failed requests
//!
//! This module provides notification functionality with a trait-based
//! abstraction for testability.

const APP_NAME: &str = "Practice";
const MAX_MESSAGE_LEN: usize = 200;

/// Trait for surfacing request failures to the user
///
/// Implementations must not block; the dispatcher calls them inline.
pub trait Notifier: Send + Sync {
    /// Sends an error notification
    fn error(&self, message: &str) -> anyhow::Result<()>;
}

/// Desktop notification implementation
pub struct DesktopNotifier;

impl DesktopNotifier {
    pub fn new() -> Self {
        Self
    }

    #[cfg(target_os = "linux")]
    fn send_notification(&self, title: &str, message: &str) -> anyhow::Result<()> {
        use notify_rust::Notification;

        Notification::new()
            .summary(title)
            .body(message)
            .appname(APP_NAME)
            .timeout(5000)
            .show()?;

        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    fn send_notification(&self, title: &str, message: &str) -> anyhow::Result<()> {
        tracing::warn!("{}: {}", title, message);
        Ok(())
    }
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for DesktopNotifier {
    fn error(&self, message: &str) -> anyhow::Result<()> {
        self.send_notification(APP_NAME, &truncate(message, MAX_MESSAGE_LEN))
    }
}

/// Notifier that only writes to the log
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn error(&self, message: &str) -> anyhow::Result<()> {
        tracing::warn!("{}", message);
        Ok(())
    }
}

/// Truncates a string to max characters with ellipsis
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else if max <= 3 {
        s.chars().take(max).collect()
    } else {
        let head: String = s.chars().take(max - 3).collect();
        format!("{head}...")
    }
}
