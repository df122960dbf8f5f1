use std::sync::Arc;

use crate::config::ServerConfig;
use crate::connections::ConnectionTracker;
use crate::coordinator::SessionCoordinator;
use crate::directory::{MemoryDirectory, PlayerDirectory};
use crate::matchmaking::MatchmakingEngine;
use crate::notifier::{ChannelNotifier, Notifier};
use crate::store::{MemoryStore, SessionStore};

#[derive(Clone)]
pub struct AppState {
    pub matchmaking: Arc<MatchmakingEngine>,
    pub coordinator: Arc<SessionCoordinator>,
    pub tracker: Arc<ConnectionTracker>,
    pub notifier: Arc<ChannelNotifier>,
    pub directory: Arc<MemoryDirectory>,
    pub store: Arc<dyn SessionStore>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let notifier = Arc::new(ChannelNotifier::new(config.limits.notification_buffer));
        let tracker = Arc::new(ConnectionTracker::new());
        let directory = Arc::new(MemoryDirectory::new());
        let coordinator = Arc::new(SessionCoordinator::new(
            Arc::clone(&store) as Arc<dyn SessionStore>,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            Arc::clone(&tracker),
            Arc::clone(&directory) as Arc<dyn PlayerDirectory>,
            &config,
        ));
        let matchmaking = Arc::new(MatchmakingEngine::new(
            Arc::clone(&coordinator),
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            Arc::clone(&directory) as Arc<dyn PlayerDirectory>,
            &config.matchmaking,
        ));
        Self {
            matchmaking,
            coordinator,
            tracker,
            notifier,
            directory,
            store,
            config: Arc::new(config),
        }
    }
}
