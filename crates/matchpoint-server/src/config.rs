use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Top-level server configuration, loaded from `matchpoint.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub matchmaking: MatchmakingConfig,
    pub sessions: SessionsConfig,
    pub limits: LimitsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            matchmaking: MatchmakingConfig::default(),
            sessions: SessionsConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

/// Matchmaking cadence and thresholds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchmakingConfig {
    /// Queue age after which skill criteria widen to any level.
    pub skill_relaxation_secs: u64,
    /// Queue age after which a request is evicted by the sweep.
    pub queue_timeout_secs: u64,
    /// Cadence of the scheduler's re-match + eviction sweep.
    pub sweep_interval_secs: u64,
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            skill_relaxation_secs: 30,
            queue_timeout_secs: 60,
            sweep_interval_secs: 30,
        }
    }
}

/// Session lifecycle windows.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Grace period a fully disconnected player has to return before
    /// forfeiting.
    pub reconnect_grace_secs: u64,
    /// Cadence of the reconnection-window expiry check.
    pub reconnect_check_interval_secs: u64,
    /// Age at which waiting sessions are cancelled and in-progress
    /// sessions are voided by the cleanup sweep.
    pub stale_after_secs: u64,
    /// Cadence of the stale-session cleanup sweep.
    pub cleanup_interval_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            reconnect_grace_secs: 60,
            reconnect_check_interval_secs: 5,
            stale_after_secs: 7200,
            cleanup_interval_secs: 300,
        }
    }
}

/// Infrastructure limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Per-user outbound notification buffer; slow consumers beyond this
    /// drop frames rather than blocking the coordinator.
    pub notification_buffer: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            notification_buffer: 256,
        }
    }
}

impl ServerConfig {
    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist. A file that exists but fails to parse is fatal.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No config file found, using defaults");
                return Self::default();
            },
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to read config file");
                std::process::exit(1);
            },
        };
        match toml::from_str(&raw) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to parse config file");
                std::process::exit(1);
            },
        }
    }

    /// Validate configuration, exiting on values the server cannot run with.
    pub fn validate(&self) {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            tracing::error!(
                addr = %self.listen_addr,
                "listen_addr is not a valid socket address"
            );
            std::process::exit(1);
        }
        if self.matchmaking.sweep_interval_secs == 0 {
            tracing::error!("matchmaking.sweep_interval_secs must be > 0");
            std::process::exit(1);
        }
        if self.sessions.reconnect_check_interval_secs == 0 {
            tracing::error!("sessions.reconnect_check_interval_secs must be > 0");
            std::process::exit(1);
        }
        if self.sessions.cleanup_interval_secs == 0 {
            tracing::error!("sessions.cleanup_interval_secs must be > 0");
            std::process::exit(1);
        }
        if self.limits.notification_buffer == 0 {
            tracing::error!("limits.notification_buffer must be > 0");
            std::process::exit(1);
        }
        if self.matchmaking.queue_timeout_secs < self.matchmaking.skill_relaxation_secs {
            tracing::warn!(
                "queue_timeout_secs is below skill_relaxation_secs — requests will be \
                 evicted before skill criteria ever widen"
            );
        }
    }

    pub fn skill_relaxation(&self) -> Duration {
        Duration::from_secs(self.matchmaking.skill_relaxation_secs)
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_secs(self.matchmaking.queue_timeout_secs)
    }

    pub fn reconnect_grace(&self) -> Duration {
        Duration::from_secs(self.sessions.reconnect_grace_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_cadences() {
        let config = ServerConfig::default();
        assert_eq!(config.matchmaking.skill_relaxation_secs, 30);
        assert_eq!(config.matchmaking.queue_timeout_secs, 60);
        assert_eq!(config.matchmaking.sweep_interval_secs, 30);
        assert_eq!(config.sessions.reconnect_grace_secs, 60);
        assert_eq!(config.sessions.stale_after_secs, 7200);
        assert_eq!(config.sessions.cleanup_interval_secs, 300);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            listen_addr = "127.0.0.1:9000"

            [sessions]
            reconnect_grace_secs = 15
            "#,
        )
        .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.sessions.reconnect_grace_secs, 15);
        // Untouched sections keep their defaults.
        assert_eq!(config.sessions.cleanup_interval_secs, 300);
        assert_eq!(config.matchmaking.skill_relaxation_secs, 30);
        assert_eq!(config.limits.notification_buffer, 256);
    }

    #[test]
    fn duration_helpers() {
        let config = ServerConfig::default();
        assert_eq!(config.skill_relaxation(), Duration::from_secs(30));
        assert_eq!(config.queue_timeout(), Duration::from_secs(60));
        assert_eq!(config.reconnect_grace(), Duration::from_secs(60));
    }
}
