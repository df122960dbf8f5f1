use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};

use matchpoint_core::game::{GameType, SkillLevel, UserId};
use matchpoint_core::notify::{Notification, RosterEntry};
use matchpoint_core::rules::RulesRegistry;
use matchpoint_core::session::{
    GameSession, GameState, Participant, SessionId, SessionStatus, generate_session_code,
};
use matchpoint_core::update::{StateUpdate, UpdateType, fold_update};

use crate::config::ServerConfig;
use crate::connections::ConnectionTracker;
use crate::directory::PlayerDirectory;
use crate::error::CoordinatorError;
use crate::notifier::Notifier;
use crate::store::{SessionStore, StoreError};

/// Actor id stamped on coordinator-originated updates (forfeits with no
/// survivor, voided sessions).
pub const SYSTEM_ACTOR: UserId = 0;

struct SessionEntry {
    session: GameSession,
    participants: Vec<Participant>,
}

/// Owns the lifecycle and mutable state of every live session.
///
/// Each session sits behind its own mutex so concurrent moves on one
/// session serialize while different sessions proceed in parallel; the
/// outer map lock is only ever held to look up or insert entries.
/// Broadcasts are issued inside the per-session critical section, which
/// preserves commit order on every participant's channel.
pub struct SessionCoordinator {
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<SessionEntry>>>>,
    store: Arc<dyn SessionStore>,
    notifier: Arc<dyn Notifier>,
    tracker: Arc<ConnectionTracker>,
    directory: Arc<dyn PlayerDirectory>,
    rules: RulesRegistry,
    reconnect_grace: Duration,
    stale_after: chrono::Duration,
}

/// Participant-facing snapshot of one session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub session_code: String,
    pub game_type: GameType,
    pub status: SessionStatus,
    pub players: Vec<PlayerInfo>,
    pub state: GameState,
    pub winner_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayerInfo {
    pub user_id: UserId,
    pub display_name: String,
    pub position: u8,
    pub final_score: i64,
    pub connected: bool,
}

/// Aggregate counts for the health endpoint.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SessionStats {
    pub live: usize,
    pub in_progress: usize,
}

fn internal(e: StoreError) -> CoordinatorError {
    CoordinatorError::Internal(e.to_string())
}

impl SessionCoordinator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        notifier: Arc<dyn Notifier>,
        tracker: Arc<ConnectionTracker>,
        directory: Arc<dyn PlayerDirectory>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            store,
            notifier,
            tracker,
            directory,
            rules: RulesRegistry::new(),
            reconnect_grace: config.reconnect_grace(),
            stale_after: chrono::Duration::seconds(config.sessions.stale_after_secs as i64),
        }
    }

    pub fn rules(&self) -> &RulesRegistry {
        &self.rules
    }

    /// Look up a live entry, rehydrating from the store if the session was
    /// evicted from memory (e.g. by the cleanup sweep).
    fn entry(&self, session_id: SessionId) -> Option<Arc<Mutex<SessionEntry>>> {
        if let Some(entry) = self.sessions.read().unwrap().get(&session_id) {
            return Some(Arc::clone(entry));
        }
        let session = self.store.load_session(session_id)?;
        let participants = self.store.load_participants(session_id);
        let mut sessions = self.sessions.write().unwrap();
        let entry = sessions.entry(session_id).or_insert_with(|| {
            Arc::new(Mutex::new(SessionEntry {
                session,
                participants,
            }))
        });
        Some(Arc::clone(entry))
    }

    /// Materialize a matched group into a running session. Participants are
    /// seated in the order given (FIFO order from the queue), and the
    /// session starts immediately: matching only calls this once the
    /// game's minimum is met.
    pub fn create_matched_session(
        &self,
        game_type: GameType,
        players: &[(UserId, SkillLevel)],
    ) -> Result<SessionId, StoreError> {
        let mut session = GameSession::new(game_type, generate_session_code());
        session.current_players = players.len() as u8;
        let participants: Vec<Participant> = players
            .iter()
            .enumerate()
            .map(|(i, &(user_id, _))| {
                Participant::new(session.session_id, user_id, (i + 1) as u8)
            })
            .collect();

        self.store.save_session(&session)?;
        for participant in &participants {
            self.store.save_participant(participant)?;
        }

        Self::start(&mut session, &participants);
        self.store.save_session(&session)?;

        let session_id = session.session_id;
        tracing::info!(
            session = %session_id,
            game = %game_type,
            players = players.len(),
            "Matched session started"
        );
        self.sessions.write().unwrap().insert(
            session_id,
            Arc::new(Mutex::new(SessionEntry {
                session,
                participants,
            })),
        );
        Ok(session_id)
    }

    /// Create a non-matchmade session with `host` seated first. Stays
    /// WAITING until `join_session` brings it to the game's minimum.
    pub fn create_session(
        &self,
        game_type: GameType,
        host: UserId,
    ) -> Result<SessionId, StoreError> {
        let mut session = GameSession::new(game_type, generate_session_code());
        session.current_players = 1;
        let participant = Participant::new(session.session_id, host, 1);

        self.store.save_session(&session)?;
        self.store.save_participant(&participant)?;

        let session_id = session.session_id;
        tracing::info!(session = %session_id, game = %game_type, host, "Session created");
        self.sessions.write().unwrap().insert(
            session_id,
            Arc::new(Mutex::new(SessionEntry {
                session,
                participants: vec![participant],
            })),
        );
        Ok(session_id)
    }

    /// Seat `user_id` in a waiting session; starts it once the game's
    /// minimum player count is reached. Joining a session the user is
    /// already in is a no-op.
    pub fn join_session(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> Result<(), CoordinatorError> {
        let entry = self
            .entry(session_id)
            .ok_or_else(|| CoordinatorError::NotFound("unknown session".to_string()))?;
        let mut guard = entry.lock().unwrap();

        if guard.participants.iter().any(|p| p.user_id == user_id) {
            return Ok(());
        }
        if guard.session.status != SessionStatus::Waiting {
            return Err(CoordinatorError::InvalidState(
                "session is not accepting players".to_string(),
            ));
        }
        if guard.session.current_players >= guard.session.max_players {
            return Err(CoordinatorError::InvalidState("session is full".to_string()));
        }

        let position = guard.participants.len() as u8 + 1;
        let participant = Participant::new(session_id, user_id, position);
        let mut session = guard.session.clone();
        let mut participants = guard.participants.clone();
        participants.push(participant.clone());
        session.current_players += 1;
        let starting = session.current_players >= session.game_type.min_players();
        if starting {
            Self::start(&mut session, &participants);
        }

        self.store.save_participant(&participant).map_err(internal)?;
        self.store.save_session(&session).map_err(internal)?;
        guard.session = session;
        guard.participants = participants;

        tracing::info!(session = %session_id, user = user_id, starting, "User joined session");
        self.broadcast_roster(&guard);
        Ok(())
    }

    /// Validate and apply one player move, then run end-condition
    /// detection and broadcast. A rejected move never mutates state.
    pub fn apply_move(
        &self,
        session_id: SessionId,
        acting_user_id: UserId,
        update_type: UpdateType,
        payload: Value,
    ) -> Result<(), CoordinatorError> {
        let entry = self
            .entry(session_id)
            .ok_or_else(|| CoordinatorError::NotFound("unknown session".to_string()))?;
        let mut guard = entry.lock().unwrap();

        if !guard.participants.iter().any(|p| p.user_id == acting_user_id) {
            return Err(CoordinatorError::Unauthorized(
                "user is not a participant of this session".to_string(),
            ));
        }
        if guard.session.status != SessionStatus::InProgress {
            return Err(CoordinatorError::InvalidState(
                "session is not in progress".to_string(),
            ));
        }

        let update = StateUpdate::new(update_type, acting_user_id, payload);
        let rules = self.rules.get(guard.session.game_type);
        rules
            .validate_move(&guard.session.state, &update)
            .map_err(|rejection| CoordinatorError::InvalidMove(rejection.to_string()))?;

        // Commit on a scratch copy so a failed save leaves nothing behind.
        let mut session = guard.session.clone();
        let mut participants = guard.participants.clone();
        fold_update(&mut session.state, &update);

        let outcome = rules.detect_end(&session.state);
        if let Some(outcome) = outcome {
            self.finish(&mut session, &mut participants, outcome.winner_id)?;
        }
        self.store.save_session(&session).map_err(internal)?;

        let ended = outcome.is_some();
        let winner_id = session.winner_id;
        guard.session = session;
        guard.participants = participants;

        self.broadcast(&guard, update);
        if ended {
            tracing::info!(session = %session_id, winner = ?winner_id, "Session completed");
            self.broadcast_game_end(&guard, winner_id);
        }
        Ok(())
    }

    /// Forced termination: forfeit resolution and scheduler-driven
    /// timeouts. `winner_id` is nullable for voided sessions.
    pub fn end_session(
        &self,
        session_id: SessionId,
        winner_id: Option<UserId>,
    ) -> Result<(), CoordinatorError> {
        let entry = self
            .entry(session_id)
            .ok_or_else(|| CoordinatorError::NotFound("unknown session".to_string()))?;
        let mut guard = entry.lock().unwrap();

        if guard.session.status != SessionStatus::InProgress {
            return Err(CoordinatorError::InvalidState(
                "session is not in progress".to_string(),
            ));
        }
        if let Some(winner) = winner_id
            && !guard.participants.iter().any(|p| p.user_id == winner)
        {
            return Err(CoordinatorError::InvalidArgument(
                "winner is not a participant of this session".to_string(),
            ));
        }

        let mut session = guard.session.clone();
        let mut participants = guard.participants.clone();
        self.finish(&mut session, &mut participants, winner_id)?;
        self.store.save_session(&session).map_err(internal)?;

        guard.session = session;
        guard.participants = participants;
        tracing::info!(session = %session_id, winner = ?winner_id, "Session ended");
        self.broadcast_game_end(&guard, winner_id);
        Ok(())
    }

    /// Snapshot for a participant, with live connection flags on the
    /// roster.
    pub fn session_info(
        &self,
        session_id: SessionId,
        requesting_user: UserId,
    ) -> Result<SessionInfo, CoordinatorError> {
        let entry = self
            .entry(session_id)
            .ok_or_else(|| CoordinatorError::NotFound("unknown session".to_string()))?;
        let guard = entry.lock().unwrap();

        if !guard.participants.iter().any(|p| p.user_id == requesting_user) {
            return Err(CoordinatorError::Unauthorized(
                "user is not a participant of this session".to_string(),
            ));
        }

        let mut players: Vec<PlayerInfo> = guard
            .participants
            .iter()
            .map(|p| PlayerInfo {
                user_id: p.user_id,
                display_name: self.directory.display_name(p.user_id),
                position: p.position,
                final_score: p.final_score,
                connected: self.tracker.is_connected(p.user_id),
            })
            .collect();
        players.sort_by_key(|p| p.position);

        Ok(SessionInfo {
            session_id: guard.session.session_id,
            session_code: guard.session.session_code.clone(),
            game_type: guard.session.game_type,
            status: guard.session.status,
            players,
            state: guard.session.state.clone(),
            winner_id: guard.session.winner_id,
            created_at: guard.session.created_at,
            started_at: guard.session.started_at,
            ended_at: guard.session.ended_at,
        })
    }

    /// Record a transport connection for a participant and tell the rest
    /// of the session. Cancels any pending reconnection window.
    pub fn handle_player_connection(
        &self,
        session_id: SessionId,
        user_id: UserId,
        connection_id: &str,
    ) -> Result<(), CoordinatorError> {
        let entry = self
            .entry(session_id)
            .ok_or_else(|| CoordinatorError::NotFound("unknown session".to_string()))?;
        let guard = entry.lock().unwrap();

        if !guard.participants.iter().any(|p| p.user_id == user_id) {
            return Err(CoordinatorError::Unauthorized(
                "user is not a participant of this session".to_string(),
            ));
        }

        self.tracker.connect(user_id, connection_id);
        self.tracker.cancel_reconnect(session_id, user_id);

        let update = StateUpdate::new(
            UpdateType::PlayerConnected,
            user_id,
            json!({ "userId": user_id, "connected": true }),
        );
        self.broadcast(&guard, update);
        self.broadcast_roster(&guard);
        Ok(())
    }

    /// Drop one transport connection. When the user's last connection goes
    /// and the game is running, a reconnection window is armed; its expiry
    /// is the forfeit path below.
    pub fn handle_player_disconnection(
        &self,
        session_id: SessionId,
        user_id: UserId,
        connection_id: &str,
    ) -> Result<(), CoordinatorError> {
        let entry = self
            .entry(session_id)
            .ok_or_else(|| CoordinatorError::NotFound("unknown session".to_string()))?;
        let guard = entry.lock().unwrap();

        if !guard.participants.iter().any(|p| p.user_id == user_id) {
            return Err(CoordinatorError::Unauthorized(
                "user is not a participant of this session".to_string(),
            ));
        }

        let fully_offline = self.tracker.disconnect(user_id, connection_id);
        if fully_offline && guard.session.status == SessionStatus::InProgress {
            self.tracker
                .arm_reconnect(session_id, user_id, self.reconnect_grace);
            tracing::info!(
                session = %session_id,
                user = user_id,
                grace_secs = self.reconnect_grace.as_secs(),
                "Player fully disconnected, reconnection window armed"
            );
        }

        let update = StateUpdate::new(
            UpdateType::PlayerDisconnected,
            user_id,
            json!({
                "userId": user_id,
                "connected": false,
                "reconnectionWindow": self.reconnect_grace.as_secs(),
            }),
        );
        self.broadcast(&guard, update);
        self.broadcast_roster(&guard);
        Ok(())
    }

    /// Scheduler-driven: resolve every expired reconnection window into a
    /// forfeit. Never raises; persistence failures re-arm for the next
    /// sweep.
    pub fn process_reconnect_timeouts(&self) {
        for (session_id, user_id) in self.tracker.take_expired() {
            if self.tracker.is_connected(user_id) {
                continue;
            }
            let Some(entry) = self.entry(session_id) else {
                continue;
            };
            let mut guard = entry.lock().unwrap();
            if guard.session.status != SessionStatus::InProgress
                || guard.session.state.is_forfeited(user_id)
            {
                continue;
            }
            if let Err(e) = self.apply_forfeit(&mut guard, session_id, user_id) {
                tracing::error!(
                    session = %session_id,
                    user = user_id,
                    error = %e,
                    "Forfeit persistence failed, retrying next sweep"
                );
                self.tracker.arm_reconnect(session_id, user_id, Duration::ZERO);
            }
        }
    }

    fn apply_forfeit(
        &self,
        guard: &mut SessionEntry,
        session_id: SessionId,
        user_id: UserId,
    ) -> Result<(), CoordinatorError> {
        let mut session = guard.session.clone();
        let mut participants = guard.participants.clone();
        session.state.mark_forfeited(user_id);

        let active: Vec<UserId> = participants
            .iter()
            .filter(|p| !session.state.is_forfeited(p.user_id))
            .map(|p| p.user_id)
            .collect();
        let ended = active.len() <= 1;
        if ended {
            self.finish(&mut session, &mut participants, active.first().copied())?;
        }
        self.store.save_session(&session).map_err(internal)?;

        let winner_id = session.winner_id;
        guard.session = session;
        guard.participants = participants;
        tracing::info!(
            session = %session_id,
            user = user_id,
            ended,
            "Player forfeited after reconnection window expired"
        );

        let update = StateUpdate::new(
            UpdateType::PlayerForfeit,
            user_id,
            json!({ "userId": user_id, "reason": "disconnection_timeout" }),
        );
        self.broadcast(guard, update);
        if ended {
            self.broadcast_game_end(guard, winner_id);
        }
        Ok(())
    }

    /// Scheduler-driven: cancel abandoned WAITING sessions, void stuck
    /// IN_PROGRESS sessions, and drop long-finished entries from memory.
    /// Never raises.
    pub fn cleanup_stale_sessions(&self) {
        let cutoff = Utc::now() - self.stale_after;

        for stale in self
            .store
            .sessions_created_before(SessionStatus::Waiting, cutoff)
        {
            let Some(entry) = self.entry(stale.session_id) else {
                continue;
            };
            let mut guard = entry.lock().unwrap();
            if guard.session.status != SessionStatus::Waiting || guard.session.created_at >= cutoff
            {
                continue;
            }
            let mut session = guard.session.clone();
            session.status = SessionStatus::Cancelled;
            session.ended_at = Some(Utc::now());
            if let Err(e) = self.store.save_session(&session) {
                tracing::error!(session = %session.session_id, error = %e, "Cancel save failed");
                continue;
            }
            guard.session = session;
            tracing::info!(session = %stale.session_id, "Cancelled abandoned waiting session");
        }

        for stuck in self
            .store
            .sessions_started_before(SessionStatus::InProgress, cutoff)
        {
            match self.end_session(stuck.session_id, None) {
                Ok(()) => {
                    tracing::info!(session = %stuck.session_id, "Voided stuck in-progress session");
                },
                Err(e) => {
                    // Ended or cancelled between the query and now.
                    tracing::debug!(session = %stuck.session_id, error = %e, "Skipping stuck-session cleanup");
                },
            }
        }

        self.evict_finished(cutoff);
    }

    /// Drop terminal sessions that finished before `cutoff` from the live
    /// map; they remain loadable from the store.
    fn evict_finished(&self, cutoff: DateTime<Utc>) {
        let mut sessions = self.sessions.write().unwrap();
        let before = sessions.len();
        sessions.retain(|_, entry| {
            let guard = entry.lock().unwrap();
            !(guard.session.status.is_terminal()
                && guard.session.ended_at.is_some_and(|ended| ended < cutoff))
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::debug!(evicted, "Evicted finished sessions from memory");
        }
    }

    pub fn stats(&self) -> SessionStats {
        let sessions = self.sessions.read().unwrap();
        let mut in_progress = 0;
        for entry in sessions.values() {
            if entry.lock().unwrap().session.status == SessionStatus::InProgress {
                in_progress += 1;
            }
        }
        SessionStats {
            live: sessions.len(),
            in_progress,
        }
    }

    /// Move a freshly started session's turn bookkeeping into place.
    fn start(session: &mut GameSession, participants: &[Participant]) {
        let order: Vec<UserId> = participants.iter().map(|p| p.user_id).collect();
        session.state.set_player_order(&order);
        if let Some(&first) = order.first() {
            session.state.set_current_player(first);
        }
        session.status = SessionStatus::InProgress;
        session.started_at = Some(Utc::now());
    }

    /// Complete a session: terminal status, winner, and final scores
    /// copied out of the state's score map (missing entries keep 0).
    fn finish(
        &self,
        session: &mut GameSession,
        participants: &mut [Participant],
        winner_id: Option<UserId>,
    ) -> Result<(), CoordinatorError> {
        session.status = SessionStatus::Completed;
        session.ended_at = Some(Utc::now());
        session.winner_id = match winner_id {
            Some(winner) if !participants.iter().any(|p| p.user_id == winner) => {
                tracing::warn!(
                    session = %session.session_id,
                    winner,
                    "Detected winner is not a participant, recording no winner"
                );
                None
            },
            other => other,
        };
        for participant in participants.iter_mut() {
            if let Some(score) = session.state.score(participant.user_id) {
                participant.final_score = score;
            }
            self.store.save_participant(participant).map_err(internal)?;
        }
        Ok(())
    }

    fn broadcast(&self, guard: &SessionEntry, update: StateUpdate) {
        let session_id = guard.session.session_id;
        for participant in &guard.participants {
            self.notifier.send_to_user(
                participant.user_id,
                &Notification::StateUpdate {
                    session_id,
                    update: update.clone(),
                },
            );
        }
    }

    fn broadcast_game_end(&self, guard: &SessionEntry, winner_id: Option<UserId>) {
        let update = StateUpdate::new(
            UpdateType::GameEnd,
            winner_id.unwrap_or(SYSTEM_ACTOR),
            json!({ "winner": winner_id }),
        );
        self.broadcast(guard, update);
    }

    fn broadcast_roster(&self, guard: &SessionEntry) {
        let session_id = guard.session.session_id;
        let mut roster: Vec<RosterEntry> = guard
            .participants
            .iter()
            .map(|p| RosterEntry {
                user_id: p.user_id,
                display_name: self.directory.display_name(p.user_id),
                position: p.position,
                connected: self.tracker.is_connected(p.user_id),
            })
            .collect();
        roster.sort_by_key(|r| r.position);
        for participant in &guard.participants {
            self.notifier.send_to_user(
                participant.user_id,
                &Notification::Participants {
                    session_id,
                    roster: roster.clone(),
                },
            );
        }
    }
}
