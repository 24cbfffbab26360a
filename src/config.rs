//! Application-level configuration loading: lobby policy, settlement retries and operator access.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, serde_as};
use thiserror::Error;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZ_ARENA_CONFIG_PATH";

/// Lobby and session-retention policy.
#[serde_as]
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LobbyPolicy {
    /// Smallest roster that may start a game.
    pub min_players: usize,
    /// Roster size that starts the game immediately; further joins are refused.
    pub max_players: usize,
    /// How long a lobby waits for more players once the minimum is reached.
    #[serde(rename = "lobby_timeout_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub lobby_timeout: Duration,
    /// How long finished sessions stay queryable in memory.
    #[serde(rename = "retention_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub retention: Duration,
    /// Network latency tolerated when reconciling client and server elapsed times.
    #[serde(rename = "latency_allowance_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub latency_allowance: Duration,
}

impl Default for LobbyPolicy {
    fn default() -> Self {
        Self {
            min_players: 2,
            max_players: 20,
            lobby_timeout: Duration::from_secs(300),
            retention: Duration::from_secs(600),
            latency_allowance: Duration::from_millis(1500),
        }
    }
}

/// Retry policy applied to final-score submissions.
#[serde_as]
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SettlementPolicy {
    /// Score submission endpoint. Without it every score becomes a pending obligation.
    pub endpoint: Option<String>,
    /// Attempts per player before giving up.
    pub max_attempts: u32,
    #[serde(rename = "initial_backoff_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub initial_backoff: Duration,
    #[serde(rename = "max_backoff_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub max_backoff: Duration,
    #[serde(rename = "request_timeout_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub request_timeout: Duration,
}

impl Default for SettlementPolicy {
    fn default() -> Self {
        Self {
            endpoint: None,
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Rejected policy values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("min_players must be at least 1")]
    MinPlayersTooSmall,
    #[error("max_players ({max}) must be greater than or equal to min_players ({min})")]
    MaxBelowMin { min: usize, max: usize },
    #[error("settlement max_attempts must be at least 1")]
    NoSettlementAttempts,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Lobby sizing and timing.
    pub lobby: LobbyPolicy,
    /// Final score submission.
    pub settlement: SettlementPolicy,
    /// Token expected in the `X-Ops-Token` header. Operator routes are closed without it.
    pub ops_token: Option<String>,
    /// Optional question bank file replacing the built-in one.
    pub questions_path: Option<PathBuf>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        min_players = config.lobby.min_players,
                        max_players = config.lobby.max_players,
                        settlement = config.settlement.endpoint.is_some(),
                        "loaded configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "invalid config; falling back to defaults"
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

    /// Parse and validate a JSON configuration document.
    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check policy consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lobby.min_players < 1 {
            return Err(ConfigError::MinPlayersTooSmall);
        }
        if self.lobby.max_players < self.lobby.min_players {
            return Err(ConfigError::MaxBelowMin {
                min: self.lobby.min_players,
                max: self.lobby.max_players,
            });
        }
        if self.settlement.max_attempts == 0 {
            return Err(ConfigError::NoSettlementAttempts);
        }
        Ok(())
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

    #[test]
    fn partial_documents_keep_defaults() {
        let config = AppConfig::parse(r#"{"lobby": {"min_players": 3, "lobby_timeout_ms": 1000}}"#)
            .unwrap();
        assert_eq!(config.lobby.min_players, 3);
        assert_eq!(config.lobby.max_players, 20);
        assert_eq!(config.lobby.lobby_timeout, Duration::from_secs(1));
        assert_eq!(config.lobby.latency_allowance, Duration::from_millis(1500));
        assert_eq!(config.settlement, SettlementPolicy::default());
        assert!(config.ops_token.is_none());
    }

    #[test]
    fn settlement_section_is_read_in_milliseconds() {
        let config = AppConfig::parse(
            r#"{"settlement": {"endpoint": "http://ledger.local/api/submit-score", "max_attempts": 2, "initial_backoff_ms": 10, "max_backoff_ms": 40}, "ops_token": "secret"}"#,
        )
        .unwrap();
        assert_eq!(config.settlement.max_attempts, 2);
        assert_eq!(config.settlement.initial_backoff, Duration::from_millis(10));
        assert_eq!(config.settlement.max_backoff, Duration::from_millis(40));
        assert_eq!(config.ops_token.as_deref(), Some("secret"));
    }

    #[test]
    fn inconsistent_lobby_bounds_are_rejected() {
        let err = AppConfig::parse(r#"{"lobby": {"min_players": 5, "max_players": 4}}"#)
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::MaxBelowMin { min: 5, max: 4 })
        );

        let zero = AppConfig::parse(r#"{"lobby": {"min_players": 0}}"#).unwrap_err();
        assert_eq!(
            zero.downcast_ref::<ConfigError>(),
            Some(&ConfigError::MinPlayersTooSmall)
        );
    }
}
