//! Transient user-facing notifications ("toasts").

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Notification severity for coloring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Error,
}

/// Sink for short-lived messages to the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NotificationLevel, message: String);

    fn info(&self, message: &str) {
        self.notify(NotificationLevel::Info, message.to_string());
    }

    fn error(&self, message: &str) {
        self.notify(NotificationLevel::Error, message.to_string());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub level: NotificationLevel,
    pub message: String,
    expires: Instant,
}

/// Holds the most recent notification until it expires.
#[derive(Debug)]
pub struct ToastQueue {
    ttl: Duration,
    current: Mutex<Option<Toast>>,
}

impl ToastQueue {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            current: Mutex::new(None),
        }
    }

    /// The visible notification, if it has not expired.
    pub fn current(&self) -> Option<Toast> {
        self.tick();
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Take the visible notification, clearing it.
    pub fn take(&self) -> Option<Toast> {
        self.tick();
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Clear expired notifications.
    pub fn tick(&self) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref().is_some_and(|t| Instant::now() >= t.expires) {
            *current = None;
        }
    }
}

impl Default for ToastQueue {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

impl Notifier for ToastQueue {
    fn notify(&self, level: NotificationLevel, message: String) {
        let toast = Toast {
            level,
            message,
            expires: Instant::now() + self.ttl,
        };
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(toast);
    }
}
