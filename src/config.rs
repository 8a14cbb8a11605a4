//! Application-level configuration loading: scoring, leaderboard, lifecycle and gameplay tunables.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, DurationSeconds, serde_as};
use tracing::{info, warn};

use crate::{scoring::ScoringConfig, state::leaderboard::LeaderboardConfig};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "LIVE_QUIZ_CONFIG_PATH";
const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Scoring constants.
    pub scoring: ScoringConfig,
    /// Ranking and preview sizes.
    pub leaderboard: LeaderboardConfig,
    /// Stale game reconciliation.
    pub lifecycle: LifecycleConfig,
    /// Per-game limits and timeouts.
    pub gameplay: GameplayConfig,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
/// Background reconciliation of abandoned games.
pub struct LifecycleConfig {
    /// Inactivity after which an active game is finalized or expired.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub stale_after: Duration,
    /// Pause between two sweeps.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub expiry_sweep_interval: Duration,
    /// Lease length of the sweep lock; bounds how long a crashed holder blocks others.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub lock_ttl: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(3600),
            expiry_sweep_interval: Duration::from_secs(300),
            lock_ttl: Duration::from_secs(60),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
/// Limits applied while a game is played.
pub struct GameplayConfig {
    /// Players allowed in one game.
    pub max_players: usize,
    /// Upper bound on one load/apply/save cycle.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub transition_timeout: Duration,
    /// Slack added to a question's deadline before its timer closes it.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub deadline_grace: Duration,
    /// Shortest nickname accepted.
    pub nickname_min_length: usize,
    /// Longest nickname accepted.
    pub nickname_max_length: usize,
}

impl Default for GameplayConfig {
    fn default() -> Self {
        Self {
            max_players: 100,
            transition_timeout: Duration::from_millis(5000),
            deadline_grace: Duration::from_millis(250),
            nickname_min_length: 2,
            nickname_max_length: 20,
        }
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), "loaded configuration");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a JSON document; missing sections and fields keep their defaults.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str(contents)
    }
}

/// Storage backend selected through the `STORE` environment variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Process-local maps, lost on restart.
    Memory,
    /// MongoDB, shared by every instance.
    Mongo,
}

/// Process settings read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Listening port.
    pub port: u16,
    /// Storage backend.
    pub store: StoreKind,
}

impl ServerSettings {
    /// Read `PORT` and `STORE`, defaulting to port 8080 and MongoDB when the
    /// `mongo-store` feature is enabled.
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let store = match env::var("STORE").ok().as_deref() {
            Some("memory") => StoreKind::Memory,
            Some("mongo") => StoreKind::Mongo,
            Some(other) => {
                warn!(store = other, "unknown STORE value; using default backend");
                default_store()
            }
            None => default_store(),
        };
        Self { port, store }
    }
}

fn default_store() -> StoreKind {
    if cfg!(feature = "mongo-store") {
        StoreKind::Mongo
    } else {
        StoreKind::Memory
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::leaderboard::TieBreak;

    #[test]
    fn empty_document_yields_defaults() {
        let config = AppConfig::from_json("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.leaderboard.preview_size, 5);
        assert_eq!(config.lifecycle.stale_after, Duration::from_secs(3600));
        assert_eq!(config.gameplay.deadline_grace, Duration::from_millis(250));
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = AppConfig::from_json(
            r#"{
                "scoring": { "time_factor_floor": 0.25 },
                "leaderboard": { "tie_break": "join_order" },
                "lifecycle": { "stale_after": 120 },
                "gameplay": { "transition_timeout": 750 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.scoring.time_factor_floor, 0.25);
        assert_eq!(config.scoring.distance_factor_floor, 0.1);
        assert_eq!(config.leaderboard.tie_break, TieBreak::JoinOrder);
        assert_eq!(config.leaderboard.preview_size, 5);
        assert_eq!(config.lifecycle.stale_after, Duration::from_secs(120));
        assert_eq!(config.lifecycle.lock_ttl, Duration::from_secs(60));
        assert_eq!(
            config.gameplay.transition_timeout,
            Duration::from_millis(750)
        );
    }

    #[test]
    fn unknown_tie_break_is_rejected() {
        assert!(AppConfig::from_json(r#"{ "leaderboard": { "tie_break": "random" } }"#).is_err());
    }
}
