//! Application-level configuration loading: scoring, rewards, session pacing and notifications.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "DUEL_ARENA_CONFIG_PATH";

const DEFAULT_POINTS_PER_CORRECT: u32 = 100;
const DEFAULT_PARTICIPATION_XP: u32 = 10;
const DEFAULT_XP_REWARD: u32 = 50;
const DEFAULT_COUNTDOWN_MS: u64 = 3_000;
const DEFAULT_QUESTION_TIME_MS: u64 = 15_000;
const DEFAULT_REVEAL_DWELL_MS: u64 = 2_500;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    points_per_correct: u32,
    participation_xp: u32,
    default_xp_reward: u32,
    countdown: Duration,
    question_time: Duration,
    reveal_dwell: Duration,
    notifier_webhook_url: Option<String>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        points_per_correct = app_config.points_per_correct,
                        webhook = app_config.notifier_webhook_url.is_some(),
                        "loaded duel configuration"
                    );
                    app_config
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

    /// Parse a JSON document; absent fields keep their default value.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }

    /// Points granted for each correct answer.
    pub fn points_per_correct(&self) -> u32 {
        self.points_per_correct
    }

    /// XP granted to a natural loser, and to both players on a draw.
    pub fn participation_xp(&self) -> u32 {
        self.participation_xp
    }

    /// Reward attached to duels created without an explicit amount.
    pub fn default_xp_reward(&self) -> u32 {
        self.default_xp_reward
    }

    /// Length of the pre-game countdown.
    pub fn countdown(&self) -> Duration {
        self.countdown
    }

    /// Time allowed for each question.
    pub fn question_time(&self) -> Duration {
        self.question_time
    }

    /// How long a revealed answer stays on screen.
    pub fn reveal_dwell(&self) -> Duration {
        self.reveal_dwell
    }

    /// Endpoint receiving outcome notifications, if configured.
    pub fn notifier_webhook_url(&self) -> Option<&str> {
        self.notifier_webhook_url.as_deref()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    points_per_correct: Option<u32>,
    participation_xp: Option<u32>,
    default_xp_reward: Option<u32>,
    countdown_ms: Option<u64>,
    question_time_ms: Option<u64>,
    reveal_dwell_ms: Option<u64>,
    notifier_webhook_url: Option<String>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            points_per_correct: value
                .points_per_correct
                .filter(|points| *points > 0)
                .unwrap_or(DEFAULT_POINTS_PER_CORRECT),
            participation_xp: value.participation_xp.unwrap_or(DEFAULT_PARTICIPATION_XP),
            default_xp_reward: value.default_xp_reward.unwrap_or(DEFAULT_XP_REWARD),
            countdown: Duration::from_millis(value.countdown_ms.unwrap_or(DEFAULT_COUNTDOWN_MS)),
            question_time: Duration::from_millis(
                value.question_time_ms.unwrap_or(DEFAULT_QUESTION_TIME_MS),
            ),
            reveal_dwell: Duration::from_millis(
                value.reveal_dwell_ms.unwrap_or(DEFAULT_REVEAL_DWELL_MS),
            ),
            notifier_webhook_url: value
                .notifier_webhook_url
                .filter(|url| !url.trim().is_empty()),
        }
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
    fn defaults_match_reward_schedule() {
        let config = AppConfig::default();
        assert_eq!(config.points_per_correct(), 100);
        assert_eq!(config.participation_xp(), 10);
        assert_eq!(config.default_xp_reward(), 50);
        assert_eq!(config.countdown(), Duration::from_secs(3));
        assert_eq!(config.question_time(), Duration::from_secs(15));
        assert_eq!(config.reveal_dwell(), Duration::from_millis(2_500));
        assert_eq!(config.notifier_webhook_url(), None);
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let config =
            AppConfig::from_json(r#"{"points_per_correct": 250, "countdown_ms": 1000}"#).unwrap();
        assert_eq!(config.points_per_correct(), 250);
        assert_eq!(config.countdown(), Duration::from_secs(1));
        assert_eq!(config.question_time(), Duration::from_secs(15));
    }

    #[test]
    fn zero_points_and_blank_webhook_are_ignored() {
        let config =
            AppConfig::from_json(r#"{"points_per_correct": 0, "notifier_webhook_url": "  "}"#)
                .unwrap();
        assert_eq!(config.points_per_correct(), 100);
        assert_eq!(config.notifier_webhook_url(), None);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(AppConfig::from_json("{points").is_err());
    }
}
