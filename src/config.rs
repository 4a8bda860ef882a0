//! Engine configuration loaded from environment variables with baked-in
//! defaults.

use std::{env, fmt::Display, str::FromStr, time::Duration};

use tracing::warn;

/// Environment variable overriding the lobby countdown length.
const COUNTDOWN_ENV: &str = "CHALLENGE_SYNC_COUNTDOWN_SECS";
/// Environment variable overriding the results display duration.
const RESULTS_DISPLAY_ENV: &str = "CHALLENGE_SYNC_RESULTS_DISPLAY_SECS";
/// Environment variable overriding the minimum player count.
const MIN_PLAYERS_ENV: &str = "CHALLENGE_SYNC_MIN_PLAYERS";

const DEFAULT_COUNTDOWN_SECS: u32 = 3;
const DEFAULT_RESULTS_DISPLAY_SECS: u64 = 5;
const DEFAULT_MIN_PLAYERS: usize = 2;

/// Immutable runtime configuration shared across the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Seconds of lobby countdown between GAME_START and the first question.
    pub countdown_seconds: u32,
    /// Seconds the host leaves round results on display before advancing.
    pub results_display_seconds: u64,
    /// Minimum number of registered players required to start a game.
    pub min_players: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            countdown_seconds: DEFAULT_COUNTDOWN_SECS,
            results_display_seconds: DEFAULT_RESULTS_DISPLAY_SECS,
            min_players: DEFAULT_MIN_PLAYERS,
        }
    }
}

impl EngineConfig {
    /// Load the configuration, taking environment overrides into account.
    pub fn load() -> Self {
        Self {
            countdown_seconds: env_or(COUNTDOWN_ENV, DEFAULT_COUNTDOWN_SECS),
            results_display_seconds: env_or(RESULTS_DISPLAY_ENV, DEFAULT_RESULTS_DISPLAY_SECS),
            min_players: env_or(MIN_PLAYERS_ENV, DEFAULT_MIN_PLAYERS),
        }
    }

    /// Results display window as a [`Duration`].
    pub fn results_display(&self) -> Duration {
        Duration::from_secs(self.results_display_seconds)
    }

    /// Lobby countdown as a [`Duration`].
    pub fn countdown(&self) -> Duration {
        Duration::from_secs(u64::from(self.countdown_seconds))
    }
}

/// Parse an environment variable, falling back to `default` when unset or
/// unparsable.
fn env_or<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(err) => {
                warn!(
                    variable = name,
                    value = %raw,
                    error = %err,
                    "failed to parse override; using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.countdown_seconds, 3);
        assert_eq!(config.results_display(), Duration::from_secs(5));
        assert_eq!(config.min_players, 2);
    }
}
