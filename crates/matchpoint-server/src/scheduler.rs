use std::time::Duration;

use crate::state::AppState;

/// Spawn the periodic maintenance loops: queue re-match + eviction,
/// reconnection-window expiry, and stale-session cleanup. Cadences are
/// deployment parameters from the config; each concern owns its own loop
/// so a slow sweep never delays the others.
pub fn spawn_timeout_scheduler(state: AppState) {
    let queue_interval = Duration::from_secs(state.config.matchmaking.sweep_interval_secs);
    let reconnect_interval =
        Duration::from_secs(state.config.sessions.reconnect_check_interval_secs);
    let cleanup_interval = Duration::from_secs(state.config.sessions.cleanup_interval_secs);

    {
        let state = state.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(queue_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                tracing::debug!("Running matchmaking sweep");
                state.matchmaking.try_match_all();
                state.matchmaking.process_queue_timeouts();
            }
        });
    }

    {
        let state = state.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(reconnect_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                state.coordinator.process_reconnect_timeouts();
            }
        });
    }

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            tracing::debug!("Running stale-session cleanup");
            state.coordinator.cleanup_stale_sessions();
        }
    });
}
