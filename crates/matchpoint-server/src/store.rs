use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use matchpoint_core::session::{GameSession, Participant, SessionId, SessionStatus};

/// A failed persistence write.
#[derive(Debug)]
pub struct StoreError(pub String);

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "store error: {}", self.0)
    }
}

impl std::error::Error for StoreError {}

/// Persistence collaborator. Implementations are assumed durable and
/// synchronous; a successful save commits the mutation.
pub trait SessionStore: Send + Sync {
    fn load_session(&self, id: SessionId) -> Option<GameSession>;
    fn save_session(&self, session: &GameSession) -> Result<(), StoreError>;
    fn load_participants(&self, session_id: SessionId) -> Vec<Participant>;
    fn save_participant(&self, participant: &Participant) -> Result<(), StoreError>;
    /// Sessions in `status` created before `cutoff` (stale-sweep query).
    fn sessions_created_before(
        &self,
        status: SessionStatus,
        cutoff: DateTime<Utc>,
    ) -> Vec<GameSession>;
    /// Sessions in `status` started before `cutoff` (stuck-sweep query).
    fn sessions_started_before(
        &self,
        status: SessionStatus,
        cutoff: DateTime<Utc>,
    ) -> Vec<GameSession>;
}

/// In-memory store for single-process deployments and tests.
#[derive(Default)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<SessionId, GameSession>>,
    participants: Mutex<HashMap<SessionId, Vec<Participant>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

impl SessionStore for MemoryStore {
    fn load_session(&self, id: SessionId) -> Option<GameSession> {
        self.sessions.lock().unwrap().get(&id).cloned()
    }

    fn save_session(&self, session: &GameSession) -> Result<(), StoreError> {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.session_id, session.clone());
        Ok(())
    }

    fn load_participants(&self, session_id: SessionId) -> Vec<Participant> {
        let mut participants = self
            .participants
            .lock()
            .unwrap()
            .get(&session_id)
            .cloned()
            .unwrap_or_default();
        participants.sort_by_key(|p| p.position);
        participants
    }

    fn save_participant(&self, participant: &Participant) -> Result<(), StoreError> {
        let mut map = self.participants.lock().unwrap();
        let rows = map.entry(participant.session_id).or_default();
        match rows.iter_mut().find(|p| p.user_id == participant.user_id) {
            Some(existing) => *existing = participant.clone(),
            None => rows.push(participant.clone()),
        }
        Ok(())
    }

    fn sessions_created_before(
        &self,
        status: SessionStatus,
        cutoff: DateTime<Utc>,
    ) -> Vec<GameSession> {
        self.sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.status == status && s.created_at < cutoff)
            .cloned()
            .collect()
    }

    fn sessions_started_before(
        &self,
        status: SessionStatus,
        cutoff: DateTime<Utc>,
    ) -> Vec<GameSession> {
        self.sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| {
                s.status == status && s.started_at.is_some_and(|started| started < cutoff)
            })
            .cloned()
            .collect()
    }
}
