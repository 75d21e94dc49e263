//! User-visible notifications (toasts).
//!
//! Components never talk to a UI directly. They are handed a [`Notifier`] and
//! report through it; the server uses a [`NotificationFeed`] that the
//! presentation layer polls.

use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tracing::{info, warn};

/// Maximum number of undelivered notifications kept by the feed.
const FEED_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: Level,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: Level::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: Level::Error,
            message: message.into(),
        }
    }
}

/// Non-blocking, non-fatal notification sink.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// In-memory queue of notifications waiting to be shown.
///
/// Oldest entries are dropped once [`FEED_CAPACITY`] is reached so a client
/// that never polls cannot grow the queue without bound.
#[derive(Debug, Clone, Default)]
pub struct NotificationFeed {
    inner: Arc<RwLock<VecDeque<Notification>>>,
}

impl NotificationFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every pending notification, oldest first.
    pub fn drain(&self) -> Vec<Notification> {
        let mut queue = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        queue.drain(..).collect()
    }

    /// Look at pending notifications without consuming them.
    #[cfg(test)]
    pub fn pending(&self) -> Vec<Notification> {
        let queue = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        queue.iter().cloned().collect()
    }
}

impl Notifier for NotificationFeed {
    fn notify(&self, notification: Notification) {
        match notification.level {
            Level::Success => info!("notify: {}", notification.message),
            Level::Error => warn!("notify: {}", notification.message),
        }

        let mut queue = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if queue.len() == FEED_CAPACITY {
            queue.pop_front();
        }
        queue.push_back(notification);
    }
}
