use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use matchpoint_core::game::UserId;
use matchpoint_core::session::SessionId;

struct ConnectionEntry {
    connections: HashSet<String>,
    last_activity: Instant,
}

/// Tracks live transport connections per user, plus the reconnection
/// deadlines armed for users who dropped their last connection mid-game.
///
/// A deadline entry keyed by (session, user) is the cancellable delayed
/// action for the reconnection window: arming inserts it, reconnection
/// removes it, and the scheduler sweep drains whatever has expired.
/// Firing after cancellation is therefore impossible, and double-arming
/// just resets the window.
pub struct ConnectionTracker {
    entries: Mutex<HashMap<UserId, ConnectionEntry>>,
    deadlines: Mutex<HashMap<(SessionId, UserId), Instant>>,
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            deadlines: Mutex::new(HashMap::new()),
        }
    }

    /// Record a connection. Multiple devices are additive. Returns true if
    /// this was the user's first live connection.
    pub fn connect(&self, user_id: UserId, connection_id: &str) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(user_id).or_insert_with(|| ConnectionEntry {
            connections: HashSet::new(),
            last_activity: Instant::now(),
        });
        let was_offline = entry.connections.is_empty();
        entry.connections.insert(connection_id.to_string());
        entry.last_activity = Instant::now();
        was_offline
    }

    /// Drop one connection. Returns true if the user is now fully offline.
    pub fn disconnect(&self, user_id: UserId, connection_id: &str) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get_mut(&user_id) else {
            return false;
        };
        entry.connections.remove(connection_id);
        if entry.connections.is_empty() {
            entries.remove(&user_id);
            true
        } else {
            false
        }
    }

    /// A user is connected iff their connection set is non-empty.
    pub fn is_connected(&self, user_id: UserId) -> bool {
        self.entries
            .lock()
            .unwrap()
            .get(&user_id)
            .is_some_and(|e| !e.connections.is_empty())
    }

    /// Refresh a user's last-activity stamp (call on any inbound traffic).
    pub fn touch(&self, user_id: UserId) {
        if let Some(entry) = self.entries.lock().unwrap().get_mut(&user_id) {
            entry.last_activity = Instant::now();
        }
    }

    /// Arm the reconnection window for (session, user). Re-arming resets it.
    pub fn arm_reconnect(&self, session_id: SessionId, user_id: UserId, grace: Duration) {
        self.deadlines
            .lock()
            .unwrap()
            .insert((session_id, user_id), Instant::now() + grace);
    }

    /// Cancel a pending window; a later expiry check becomes a no-op.
    pub fn cancel_reconnect(&self, session_id: SessionId, user_id: UserId) {
        self.deadlines.lock().unwrap().remove(&(session_id, user_id));
    }

    /// Drain every (session, user) pair whose window has expired.
    pub fn take_expired(&self) -> Vec<(SessionId, UserId)> {
        let now = Instant::now();
        let mut deadlines = self.deadlines.lock().unwrap();
        let expired: Vec<(SessionId, UserId)> = deadlines
            .iter()
            .filter(|&(_, &deadline)| deadline <= now)
            .map(|(&key, _)| key)
            .collect();
        for key in &expired {
            deadlines.remove(key);
        }
        expired
    }

    pub fn connected_users(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Force a pending window to expire immediately.
    #[cfg(test)]
    pub fn force_expire(&self, session_id: SessionId, user_id: UserId) {
        let mut deadlines = self.deadlines.lock().unwrap();
        if let Some(deadline) = deadlines.get_mut(&(session_id, user_id)) {
            *deadline = Instant::now() - Duration::from_secs(1);
        }
    }
}
