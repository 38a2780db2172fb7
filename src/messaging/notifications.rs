use log::debug;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::MessagingError;

pub const DEFAULT_TTL: Duration = Duration::from_millis(4000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    LoadFailed,
    SendFailed,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::LoadFailed => f.write_str("load failed"),
            NotificationKind::SendFailed => f.write_str("send failed"),
        }
    }
}

/// A non-blocking alert shown to the user for a short time.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    pub raised_at: Instant,
}

impl Notification {
    /// Notification for a failure, or `None` for failures that are only logged.
    pub fn for_error(error: &MessagingError, now: Instant) -> Option<Self> {
        let kind = match error {
            MessagingError::LoadFailed { .. } => NotificationKind::LoadFailed,
            MessagingError::SendFailed(_) => NotificationKind::SendFailed,
            MessagingError::TransportUnavailable(_) | MessagingError::ConnectFailed { .. } => return None,
        };
        Some(Notification {
            kind,
            message: error.to_string(),
            raised_at: now,
        })
    }
}

#[derive(Debug)]
pub struct Notifications {
    ttl: Duration,
    queue: VecDeque<Notification>,
}

impl Default for Notifications {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl Notifications {
    pub fn new(ttl: Duration) -> Self {
        Notifications {
            ttl,
            queue: VecDeque::new(),
        }
    }

    pub fn push(&mut self, notification: Notification) {
        debug!("Notification ({}): {}", notification.kind, notification.message);
        self.queue.push_back(notification);
    }

    /// Latest notification that has not expired yet.
    pub fn current(&self, now: Instant) -> Option<&Notification> {
        self.queue
            .iter()
            .rev()
            .find(|n| now < n.raised_at + self.ttl)
    }

    /// Take everything queued, expired or not.
    pub fn drain(&mut self) -> Vec<Notification> {
        self.queue.drain(..).collect()
    }

    pub fn clean_expired(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.queue.retain(|n| now < n.raised_at + ttl);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
