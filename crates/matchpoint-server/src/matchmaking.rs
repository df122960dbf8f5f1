use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use matchpoint_core::game::{GameType, SkillLevel, UserId};
use matchpoint_core::matchmaking::{MatchedPlayer, QueueStatus};
use matchpoint_core::notify::Notification;

use crate::config::MatchmakingConfig;
use crate::coordinator::SessionCoordinator;
use crate::directory::PlayerDirectory;
use crate::error::CoordinatorError;
use crate::notifier::Notifier;

/// A user waiting in a game-type queue. Exists only while queued; removed
/// on match, explicit leave, or timeout eviction.
#[derive(Debug, Clone)]
struct MatchRequest {
    user_id: UserId,
    skill_level: SkillLevel,
    enqueued_at: Instant,
}

type Queue = Arc<Mutex<VecDeque<MatchRequest>>>;

/// Skill-based matchmaking over one FIFO queue per game type.
///
/// Each queue has its own lock, so matching on CHESS never blocks a join
/// on UNO; the membership index serializes per-user bookkeeping and
/// enforces the one-request-per-user invariant.
pub struct MatchmakingEngine {
    queues: RwLock<HashMap<GameType, Queue>>,
    memberships: Mutex<HashMap<UserId, GameType>>,
    coordinator: Arc<SessionCoordinator>,
    notifier: Arc<dyn Notifier>,
    directory: Arc<dyn PlayerDirectory>,
    skill_relaxation: Duration,
    queue_timeout: Duration,
}

impl MatchmakingEngine {
    pub fn new(
        coordinator: Arc<SessionCoordinator>,
        notifier: Arc<dyn Notifier>,
        directory: Arc<dyn PlayerDirectory>,
        config: &MatchmakingConfig,
    ) -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            memberships: Mutex::new(HashMap::new()),
            coordinator,
            notifier,
            directory,
            skill_relaxation: Duration::from_secs(config.skill_relaxation_secs),
            queue_timeout: Duration::from_secs(config.queue_timeout_secs),
        }
    }

    /// Enqueue `user_id` for `game_type`, replacing any request they
    /// already hold, then attempt an immediate match. Returns the caller's
    /// resulting queue status (not-queued when the join itself matched).
    pub fn join_queue(
        &self,
        user_id: UserId,
        game_type: &str,
        skill_level: SkillLevel,
    ) -> Result<QueueStatus, CoordinatorError> {
        let trimmed = game_type.trim();
        if trimmed.is_empty() {
            return Err(CoordinatorError::InvalidArgument(
                "game type is required".to_string(),
            ));
        }
        let game_type = GameType::from_str_opt(trimmed).ok_or_else(|| {
            CoordinatorError::InvalidArgument(format!("unknown game type: {trimmed}"))
        })?;

        self.remove_request(user_id);

        let queue = self.queue_for(game_type);
        queue.lock().unwrap().push_back(MatchRequest {
            user_id,
            skill_level,
            enqueued_at: Instant::now(),
        });
        self.memberships.lock().unwrap().insert(user_id, game_type);
        tracing::info!(user = user_id, game = %game_type, skill = ?skill_level, "User joined queue");

        self.try_match(game_type);
        Ok(self.queue_status(user_id))
    }

    /// Remove the user's request if present. Always succeeds.
    pub fn leave_queue(&self, user_id: UserId) -> QueueStatus {
        if self.remove_request(user_id) {
            tracing::info!(user = user_id, "User left queue");
        }
        QueueStatus::not_queued()
    }

    /// Read-only snapshot: 1-based FIFO position plus the documented wait
    /// estimate.
    pub fn queue_status(&self, user_id: UserId) -> QueueStatus {
        let Some(game_type) = self.memberships.lock().unwrap().get(&user_id).copied() else {
            return QueueStatus::not_queued();
        };
        let Some(queue) = self.existing_queue(game_type) else {
            return QueueStatus::not_queued();
        };
        let queue = queue.lock().unwrap();
        let Some(index) = queue.iter().position(|r| r.user_id == user_id) else {
            return QueueStatus::not_queued();
        };
        let position = index + 1;
        let skill_level = queue[index].skill_level;
        QueueStatus {
            in_queue: true,
            game_type: Some(game_type),
            skill_level: Some(skill_level),
            position,
            estimated_wait_secs: game_type.estimated_wait_secs(position),
            alternative_games: GameType::alternatives().to_vec(),
        }
    }

    /// Scan `game_type`'s queue in FIFO order and materialize a match when
    /// enough compatible candidates are waiting. Invoked after every join
    /// and periodically by the scheduler sweep.
    pub fn try_match(&self, game_type: GameType) {
        let Some(queue) = self.existing_queue(game_type) else {
            return;
        };
        let min = game_type.min_players() as usize;
        let max = game_type.max_players() as usize;

        let candidates: Vec<MatchRequest> = {
            let mut queue = queue.lock().unwrap();
            if queue.len() < min {
                return;
            }

            let now = Instant::now();
            let mut picked: Vec<usize> = Vec::new();
            for (index, request) in queue.iter().enumerate() {
                if picked.is_empty() || self.compatible(&queue[picked[0]], request, now) {
                    picked.push(index);
                    if picked.len() >= max {
                        break;
                    }
                }
            }
            if picked.len() < min {
                return;
            }

            // Pull the candidates out back-to-front so indices stay valid.
            let mut candidates = Vec::with_capacity(picked.len());
            for &index in picked.iter().rev() {
                candidates.push(queue.remove(index).unwrap());
            }
            candidates.reverse();
            candidates
        };

        {
            let mut memberships = self.memberships.lock().unwrap();
            for request in &candidates {
                memberships.remove(&request.user_id);
            }
        }
        self.materialize(game_type, candidates);
        self.push_queue_positions(game_type);
    }

    /// Run the match scan on every queue.
    pub fn try_match_all(&self) {
        let game_types: Vec<GameType> = self.queues.read().unwrap().keys().copied().collect();
        for game_type in game_types {
            self.try_match(game_type);
        }
    }

    /// Scheduler-driven: evict requests older than the staleness threshold
    /// and tell each evicted user which games are moving faster.
    pub fn process_queue_timeouts(&self) {
        let queues: Vec<(GameType, Queue)> = self
            .queues
            .read()
            .unwrap()
            .iter()
            .map(|(&gt, q)| (gt, Arc::clone(q)))
            .collect();

        for (game_type, queue) in queues {
            let evicted: Vec<MatchRequest> = {
                let mut queue = queue.lock().unwrap();
                let mut evicted = Vec::new();
                queue.retain(|request| {
                    if request.enqueued_at.elapsed() >= self.queue_timeout {
                        evicted.push(request.clone());
                        false
                    } else {
                        true
                    }
                });
                evicted
            };
            if evicted.is_empty() {
                continue;
            }

            let mut memberships = self.memberships.lock().unwrap();
            for request in &evicted {
                memberships.remove(&request.user_id);
            }
            drop(memberships);

            tracing::info!(game = %game_type, evicted = evicted.len(), "Evicted stale queue entries");
            for request in &evicted {
                self.notifier.send_to_user(
                    request.user_id,
                    &Notification::QueueTimeout {
                        message: "Queue timeout - try alternative games".to_string(),
                        alternatives: GameType::alternatives().to_vec(),
                    },
                );
            }
            self.push_queue_positions(game_type);
        }
    }

    /// Total requests currently waiting, across all queues.
    pub fn queued_players(&self) -> usize {
        self.queues
            .read()
            .unwrap()
            .values()
            .map(|q| q.lock().unwrap().len())
            .sum()
    }

    /// Two requests are match-compatible when their skill levels agree, or
    /// either has waited past the relaxation threshold.
    fn compatible(&self, seed: &MatchRequest, other: &MatchRequest, now: Instant) -> bool {
        seed.skill_level == other.skill_level
            || now.duration_since(seed.enqueued_at) >= self.skill_relaxation
            || now.duration_since(other.enqueued_at) >= self.skill_relaxation
    }

    /// Turn a candidate set into a running session and notify every
    /// matched user individually.
    fn materialize(&self, game_type: GameType, candidates: Vec<MatchRequest>) {
        let seats: Vec<(UserId, SkillLevel)> = candidates
            .iter()
            .map(|r| (r.user_id, r.skill_level))
            .collect();
        let session_id = match self.coordinator.create_matched_session(game_type, &seats) {
            Ok(session_id) => session_id,
            Err(e) => {
                tracing::error!(game = %game_type, error = %e, "Failed to materialize match");
                return;
            },
        };

        let players: Vec<MatchedPlayer> = candidates
            .iter()
            .map(|r| MatchedPlayer {
                user_id: r.user_id,
                display_name: self.directory.display_name(r.user_id),
                skill_level: r.skill_level,
            })
            .collect();
        for player in &players {
            self.notifier.send_to_user(
                player.user_id,
                &Notification::MatchFound {
                    session_id,
                    game_type,
                    players: players.clone(),
                },
            );
        }
    }

    /// Push refreshed positions to everyone still waiting in a queue;
    /// called after a match or eviction shifts the line.
    fn push_queue_positions(&self, game_type: GameType) {
        let Some(queue) = self.existing_queue(game_type) else {
            return;
        };
        let waiting: Vec<(UserId, SkillLevel)> = queue
            .lock()
            .unwrap()
            .iter()
            .map(|r| (r.user_id, r.skill_level))
            .collect();
        for (index, &(user_id, skill_level)) in waiting.iter().enumerate() {
            let position = index + 1;
            let status = QueueStatus {
                in_queue: true,
                game_type: Some(game_type),
                skill_level: Some(skill_level),
                position,
                estimated_wait_secs: game_type.estimated_wait_secs(position),
                alternative_games: GameType::alternatives().to_vec(),
            };
            self.notifier
                .send_to_user(user_id, &Notification::QueueStatus { status });
        }
    }

    fn queue_for(&self, game_type: GameType) -> Queue {
        if let Some(queue) = self.queues.read().unwrap().get(&game_type) {
            return Arc::clone(queue);
        }
        let mut queues = self.queues.write().unwrap();
        Arc::clone(queues.entry(game_type).or_default())
    }

    fn existing_queue(&self, game_type: GameType) -> Option<Queue> {
        self.queues.read().unwrap().get(&game_type).map(Arc::clone)
    }

    /// Drop the user's request wherever it is. Returns whether one existed.
    fn remove_request(&self, user_id: UserId) -> bool {
        let Some(game_type) = self.memberships.lock().unwrap().remove(&user_id) else {
            return false;
        };
        if let Some(queue) = self.existing_queue(game_type) {
            queue.lock().unwrap().retain(|r| r.user_id != user_id);
        }
        true
    }

    /// Backdate a queued request, standing in for waited wall-clock time.
    #[cfg(test)]
    fn age_request(&self, user_id: UserId, by: Duration) {
        let queues = self.queues.read().unwrap();
        for queue in queues.values() {
            for request in queue.lock().unwrap().iter_mut() {
                if request.user_id == user_id {
                    request.enqueued_at -= by;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::connections::ConnectionTracker;
    use crate::coordinator::SessionCoordinator;
    use crate::directory::MemoryDirectory;
    use crate::notifier::ChannelNotifier;
    use crate::store::{MemoryStore, SessionStore};
    use matchpoint_core::session::SessionStatus;

    struct Fixture {
        engine: MatchmakingEngine,
        coordinator: Arc<SessionCoordinator>,
        notifier: Arc<ChannelNotifier>,
    }

    fn fixture() -> Fixture {
        let config = ServerConfig::default();
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(ChannelNotifier::new(64));
        let tracker = Arc::new(ConnectionTracker::new());
        let directory = Arc::new(MemoryDirectory::new());
        let coordinator = Arc::new(SessionCoordinator::new(
            store as Arc<dyn SessionStore>,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            tracker,
            Arc::clone(&directory) as Arc<dyn PlayerDirectory>,
            &config,
        ));
        let engine = MatchmakingEngine::new(
            Arc::clone(&coordinator),
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            directory,
            &config.matchmaking,
        );
        Fixture {
            engine,
            coordinator,
            notifier,
        }
    }

    #[test]
    fn blank_game_type_is_rejected() {
        let fx = fixture();
        let err = fx
            .engine
            .join_queue(1, "  ", SkillLevel::Beginner)
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::InvalidArgument(_)));

        let err = fx
            .engine
            .join_queue(1, "POKER", SkillLevel::Beginner)
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::InvalidArgument(_)));
    }

    #[test]
    fn first_in_queue_waits_at_position_one() {
        let fx = fixture();
        let status = fx.engine.join_queue(1, "CHESS", SkillLevel::Beginner).unwrap();
        assert!(status.in_queue);
        assert_eq!(status.game_type, Some(GameType::Chess));
        assert_eq!(status.position, 1);
        assert_eq!(status.estimated_wait_secs, 10);
    }

    #[test]
    fn equal_skill_pair_matches_immediately() {
        let fx = fixture();
        let mut rx1 = fx.notifier.register(1);
        let mut rx2 = fx.notifier.register(2);

        fx.engine.join_queue(1, "CHESS", SkillLevel::Beginner).unwrap();
        let status = fx.engine.join_queue(2, "CHESS", SkillLevel::Beginner).unwrap();

        // Both matched out of the queue.
        assert!(!status.in_queue);
        assert_eq!(fx.engine.queued_players(), 0);

        // Both users got an individual match-found with the full roster.
        for rx in [&mut rx1, &mut rx2] {
            let frame = rx.try_recv().unwrap();
            let value: serde_json::Value = serde_json::from_slice(&frame).unwrap();
            assert_eq!(value["topic"], "matchmaking/match-found");
            assert_eq!(value["payload"]["players"].as_array().unwrap().len(), 2);
        }
    }

    #[test]
    fn matched_session_is_in_progress_with_fifo_positions() {
        let fx = fixture();
        let mut rx = fx.notifier.register(1);
        fx.engine.join_queue(1, "CHESS", SkillLevel::Beginner).unwrap();
        fx.engine.join_queue(2, "CHESS", SkillLevel::Beginner).unwrap();

        let frame = rx.try_recv().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&frame).unwrap();
        let session_id: matchpoint_core::session::SessionId =
            serde_json::from_value(value["payload"]["session_id"].clone()).unwrap();

        let info = fx.coordinator.session_info(session_id, 1).unwrap();
        assert_eq!(info.status, SessionStatus::InProgress);
        assert_eq!(info.players.len(), 2);
        assert_eq!(info.players[0].user_id, 1);
        assert_eq!(info.players[0].position, 1);
        assert_eq!(info.players[1].user_id, 2);
        assert_eq!(info.players[1].position, 2);
    }

    #[test]
    fn mixed_skill_pair_waits_for_relaxation() {
        let fx = fixture();
        fx.engine.join_queue(1, "CHESS", SkillLevel::Beginner).unwrap();
        fx.engine.join_queue(2, "CHESS", SkillLevel::Expert).unwrap();

        // Different skills, nobody has waited 30 s: no match.
        assert_eq!(fx.engine.queued_players(), 2);

        // Once one of them has waited past the threshold, criteria widen.
        fx.engine.age_request(1, Duration::from_secs(31));
        fx.engine.try_match(GameType::Chess);
        assert_eq!(fx.engine.queued_players(), 0);
    }

    #[test]
    fn rejoining_replaces_the_previous_request() {
        let fx = fixture();
        fx.engine.join_queue(1, "CHESS", SkillLevel::Beginner).unwrap();
        let status = fx.engine.join_queue(1, "UNO", SkillLevel::Beginner).unwrap();

        assert_eq!(status.game_type, Some(GameType::Uno));
        // Only the UNO request remains anywhere.
        assert_eq!(fx.engine.queued_players(), 1);

        // A same-skill CHESS join must not match against the stale request.
        fx.engine.join_queue(2, "CHESS", SkillLevel::Beginner).unwrap();
        assert_eq!(fx.engine.queued_players(), 2);
    }

    #[test]
    fn leave_queue_is_idempotent() {
        let fx = fixture();
        let status = fx.engine.leave_queue(1);
        assert!(!status.in_queue);

        fx.engine.join_queue(1, "LUDO", SkillLevel::Beginner).unwrap();
        fx.engine.leave_queue(1);
        let status = fx.engine.leave_queue(1);
        assert!(!status.in_queue);
        assert_eq!(fx.engine.queued_players(), 0);
    }

    #[test]
    fn queue_positions_are_fifo_and_estimates_grow() {
        let fx = fixture();
        // LUDO needs 2 but these three all differ in skill, so no match.
        fx.engine.join_queue(1, "LUDO", SkillLevel::Beginner).unwrap();
        fx.engine.join_queue(2, "LUDO", SkillLevel::Intermediate).unwrap();
        fx.engine.join_queue(3, "LUDO", SkillLevel::Expert).unwrap();

        let first = fx.engine.queue_status(1);
        let second = fx.engine.queue_status(2);
        let third = fx.engine.queue_status(3);
        assert_eq!(first.position, 1);
        assert_eq!(second.position, 2);
        assert_eq!(third.position, 3);
        assert!(first.estimated_wait_secs <= second.estimated_wait_secs);
        assert!(second.estimated_wait_secs <= third.estimated_wait_secs);
    }

    #[test]
    fn matching_triggers_at_minimum_not_capacity() {
        let fx = fixture();
        // UNO: min 2, max 4. Matching runs on every join, so same-skill
        // users pair off as soon as the minimum is met.
        for user in 1..=4 {
            fx.engine
                .join_queue(user, "UNO", SkillLevel::Beginner)
                .unwrap();
        }
        assert_eq!(fx.engine.queued_players(), 0);
    }

    #[test]
    fn sweep_matches_players_who_aged_into_compatibility() {
        let fx = fixture();
        fx.engine.join_queue(1, "FIGHTING", SkillLevel::Beginner).unwrap();
        fx.engine.join_queue(2, "FIGHTING", SkillLevel::Advanced).unwrap();
        assert_eq!(fx.engine.queued_players(), 2);

        fx.engine.age_request(2, Duration::from_secs(35));
        fx.engine.try_match_all();
        assert_eq!(fx.engine.queued_players(), 0);
    }

    #[test]
    fn stale_requests_are_evicted_with_a_timeout_notice() {
        let fx = fixture();
        let mut rx = fx.notifier.register(1);
        fx.engine.join_queue(1, "RUMMY", SkillLevel::Beginner).unwrap();

        // Not stale yet: the sweep leaves it alone.
        fx.engine.process_queue_timeouts();
        assert_eq!(fx.engine.queued_players(), 1);

        fx.engine.age_request(1, Duration::from_secs(61));
        fx.engine.process_queue_timeouts();
        assert_eq!(fx.engine.queued_players(), 0);
        assert!(!fx.engine.queue_status(1).in_queue);

        let frame = rx.try_recv().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(value["topic"], "matchmaking/queue-timeout");
        assert!(
            value["payload"]["alternatives"]
                .as_array()
                .is_some_and(|a| !a.is_empty())
        );
    }

    #[test]
    fn bypassed_players_get_a_position_refresh() {
        let fx = fixture();
        let mut rx = fx.notifier.register(2);

        fx.engine.join_queue(1, "CHESS", SkillLevel::Beginner).unwrap();
        fx.engine.join_queue(2, "CHESS", SkillLevel::Expert).unwrap();
        // The third beginner matches the first, skipping over player 2.
        fx.engine.join_queue(3, "CHESS", SkillLevel::Beginner).unwrap();

        assert_eq!(fx.engine.queued_players(), 1);
        let frame = rx.try_recv().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(value["topic"], "matchmaking/queue-status");
        assert_eq!(value["payload"]["status"]["position"], 1);
    }

    #[test]
    fn relaxed_match_spans_skill_levels_in_fifo_order() {
        let fx = fixture();
        fx.engine.join_queue(1, "UNO", SkillLevel::Beginner).unwrap();
        fx.engine.join_queue(2, "UNO", SkillLevel::Expert).unwrap();
        fx.engine.join_queue(3, "UNO", SkillLevel::Advanced).unwrap();

        fx.engine.age_request(1, Duration::from_secs(31));
        fx.engine.age_request(2, Duration::from_secs(31));
        fx.engine.age_request(3, Duration::from_secs(31));
        fx.engine.try_match(GameType::Uno);

        // All three relaxed into one UNO session (min 2, max 4).
        assert_eq!(fx.engine.queued_players(), 0);
    }

    proptest::proptest! {
        /// A user holds at most one queue slot under any join/leave mix.
        #[test]
        fn one_request_per_user(ops in proptest::collection::vec((1u64..4, 0usize..3), 1..40)) {
            let fx = fixture();
            let games = ["CHESS", "LUDO", "RUMMY"];
            for (user, game_index) in ops {
                if game_index == 0 {
                    fx.engine.leave_queue(user);
                } else {
                    fx.engine
                        .join_queue(user, games[game_index], SkillLevel::Beginner)
                        .unwrap();
                }
                // Membership and queue contents stay mutually consistent:
                // nobody appears in more than one queue.
                let queues = fx.engine.queues.read().unwrap();
                let mut seen = std::collections::HashSet::new();
                for queue in queues.values() {
                    for request in queue.lock().unwrap().iter() {
                        proptest::prop_assert!(
                            seen.insert(request.user_id),
                            "user {} queued twice", request.user_id
                        );
                    }
                }
            }
        }
    }
}
