use log::debug;
use std::collections::HashSet;

use crate::models::UserId;

/// Set of users currently reported online by the transport.
///
/// Best-effort only: there is no heartbeat, so an entry stays until the
/// transport reports the user offline or the connection is re-established.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    online: HashSet<UserId>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the set changed.
    pub fn set_online(&mut self, user_id: UserId) -> bool {
        let changed = self.online.insert(user_id);
        if changed {
            debug!("Presence: {} users online", self.online.len());
        }
        changed
    }

    /// Returns true when the set changed.
    pub fn set_offline(&mut self, user_id: &UserId) -> bool {
        self.online.remove(user_id)
    }

    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.online.contains(user_id)
    }

    pub fn online_count(&self) -> usize {
        self.online.len()
    }

    pub fn reset(&mut self) {
        self.online.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_online_is_idempotent() {
        let mut presence = PresenceTracker::new();
        assert!(presence.set_online(UserId::from("2")));
        assert!(!presence.set_online(UserId::from("2")));
        assert_eq!(presence.online_count(), 1);
        assert!(presence.is_online(&UserId::from("2")));
    }

    #[test]
    fn test_offline_for_absent_user_is_noop() {
        let mut presence = PresenceTracker::new();
        presence.set_online(UserId::from("2"));

        assert!(!presence.set_offline(&UserId::from("3")));
        assert_eq!(presence.online_count(), 1);

        assert!(presence.set_offline(&UserId::from("2")));
        assert!(!presence.set_offline(&UserId::from("2")));
        assert_eq!(presence.online_count(), 0);
    }

    #[test]
    fn test_reset_clears_everyone() {
        let mut presence = PresenceTracker::new();
        presence.set_online(UserId::from("2"));
        presence.set_online(UserId::from("3"));
        presence.reset();
        assert!(!presence.is_online(&UserId::from("2")));
        assert_eq!(presence.online_count(), 0);
    }
}
