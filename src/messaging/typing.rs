use log::debug;
use std::time::Duration;
use tokio::time::Instant;

use crate::models::{ConversationId, UserId};
use crate::transport::{ClientEvent, TypingPayload};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(2000);
pub const DEFAULT_INDICATOR_TIMEOUT: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone)]
struct PendingStop {
    payload: TypingPayload,
    deadline: Instant,
}

/// Both directions of the typing indicator.
///
/// Outbound, every keystroke yields a `typing` event and pushes back a
/// debounce deadline; once it passes without another keystroke the matching
/// `stop_typing` is due. Inbound, a single flag tracks whether the
/// counterparty of the active conversation is typing. The coordinator holds
/// no timers itself, the session waits on [`TypingCoordinator::next_deadline`].
#[derive(Debug)]
pub struct TypingCoordinator {
    debounce: Duration,
    indicator_timeout: Option<Duration>,
    pending_stop: Option<PendingStop>,
    remote_since: Option<Instant>,
}

impl Default for TypingCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE, Some(DEFAULT_INDICATOR_TIMEOUT))
    }
}

impl TypingCoordinator {
    /// `indicator_timeout` of `None` keeps a remote indicator until `stop_typing` arrives.
    pub fn new(debounce: Duration, indicator_timeout: Option<Duration>) -> Self {
        TypingCoordinator {
            debounce,
            indicator_timeout,
            pending_stop: None,
            remote_since: None,
        }
    }

    /// Events to emit for a keystroke.
    ///
    /// Normally just `typing`. When the debounce was still armed for another
    /// conversation, its `stop_typing` comes first so that peer is not left
    /// with a stuck indicator.
    pub fn keystroke(&mut self, conversation_id: ConversationId, user_id: UserId, now: Instant) -> Vec<ClientEvent> {
        let payload = TypingPayload {
            conversation_id,
            user_id,
        };
        let mut events = Vec::with_capacity(2);

        if let Some(previous) = self.pending_stop.take() {
            if previous.payload != payload {
                events.push(ClientEvent::StopTyping(previous.payload));
            }
        }

        events.push(ClientEvent::Typing(payload.clone()));
        self.pending_stop = Some(PendingStop {
            payload,
            deadline: now + self.debounce,
        });
        events
    }

    pub fn is_armed(&self) -> bool {
        self.pending_stop.is_some()
    }

    /// The `stop_typing` event once the debounce deadline has passed.
    pub fn poll_expired(&mut self, now: Instant) -> Option<ClientEvent> {
        match &self.pending_stop {
            Some(pending) if now >= pending.deadline => {
                let pending = self.pending_stop.take()?;
                debug!("Typing debounce elapsed for {}", pending.payload.conversation_id);
                Some(ClientEvent::StopTyping(pending.payload))
            }
            _ => None,
        }
    }

    /// Disarm the debounce without emitting anything.
    pub fn cancel(&mut self) {
        self.pending_stop = None;
    }

    pub fn remote_typing(&mut self, now: Instant) {
        self.remote_since = Some(now);
    }

    pub fn remote_stopped(&mut self) {
        self.remote_since = None;
    }

    pub fn is_typing(&self, now: Instant) -> bool {
        match (self.remote_since, self.indicator_timeout) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(since), Some(timeout)) => now < since + timeout,
        }
    }

    /// Drop an indicator that outlived its timeout. Returns true when it was cleared.
    pub fn expire_remote(&mut self, now: Instant) -> bool {
        if self.remote_since.is_some() && !self.is_typing(now) {
            self.remote_since = None;
            return true;
        }
        false
    }

    fn remote_deadline(&self) -> Option<Instant> {
        match (self.remote_since, self.indicator_timeout) {
            (Some(since), Some(timeout)) => Some(since + timeout),
            _ => None,
        }
    }

    /// Earliest instant at which [`poll_expired`](Self::poll_expired) or
    /// [`expire_remote`](Self::expire_remote) has something to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        let outbound = self.pending_stop.as_ref().map(|p| p.deadline);
        match (outbound, self.remote_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}
