//! Stream controller configuration.
//!
//! Configuration is loaded from environment variables. Every timeout and
//! delay the controller uses is tunable here; defaults are the values the
//! controller is designed around. The relay feed URL is redacted in Debug
//! output because it usually carries a stream key.

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default fixed delay between reconnection attempts, in milliseconds.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5_000;

/// Default bound on `MediaEngine::open`, in milliseconds.
pub const DEFAULT_OPEN_TIMEOUT_MS: u64 = 5_000;

/// Default bound on waiting for encoders to report ready, in milliseconds.
pub const DEFAULT_ENCODER_READY_TIMEOUT_MS: u64 = 3_000;

/// Default bound on `MediaEngine::start_stream`, in milliseconds.
pub const DEFAULT_START_TIMEOUT_MS: u64 = 5_000;

/// Default bound on `MediaEngine::stop_stream`, in milliseconds.
pub const DEFAULT_STOP_STREAM_TIMEOUT_MS: u64 = 3_000;

/// Default bound on closing an engine that never reached streaming, in milliseconds.
pub const DEFAULT_FAST_CLOSE_TIMEOUT_MS: u64 = 1_000;

/// Default bound on the background close after a live stream, in milliseconds.
pub const DEFAULT_SLOW_CLOSE_TIMEOUT_MS: u64 = 10_000;

/// Default bound on waiting for the engine to report not-streaming, in milliseconds.
pub const DEFAULT_NOT_STREAMING_WAIT_MS: u64 = 2_000;

/// Default bound on auto-initializing missing sources, in milliseconds.
pub const DEFAULT_SOURCE_INIT_TIMEOUT_MS: u64 = 3_000;

/// Default bound on a relay playback session reaching ready, in milliseconds.
pub const DEFAULT_RELAY_READY_TIMEOUT_MS: u64 = 8_000;

/// Default hardware settling delay before switching back to capture, in milliseconds.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 300;

/// Default delay before re-attaching the bitrate regulator, in milliseconds.
pub const DEFAULT_REGULATOR_SETTLE_DELAY_MS: u64 = 500;

/// Default sustained-buffering threshold that counts as an ingest disconnect, in milliseconds.
pub const DEFAULT_BUFFERING_THRESHOLD_MS: u64 = 2_000;

/// Default window for upgrading relay audio to screen capture, in milliseconds.
pub const DEFAULT_AUDIO_UPGRADE_WINDOW_MS: u64 = 10_000;

/// Default capture-token poll interval during the audio upgrade window, in milliseconds.
pub const DEFAULT_AUDIO_UPGRADE_POLL_MS: u64 = 500;

/// Default delay between relay reattach attempts, in milliseconds.
pub const DEFAULT_RELAY_RETRY_DELAY_MS: u64 = 3_000;

/// Stream controller configuration.
///
/// Loaded from environment variables with sensible defaults.
#[derive(Clone)]
pub struct Config {
    /// Relay feed URL. `None` means relay switching fails with a
    /// configuration error.
    pub relay_url: Option<SecretString>,

    /// Whether transient failures are routed into the reconnection protocol.
    pub auto_reconnect: bool,

    /// Fixed delay between reconnection attempts (not exponential).
    pub reconnect_delay: Duration,

    /// Give up after this many failed retries. `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,

    pub open_timeout: Duration,
    pub encoder_ready_timeout: Duration,
    pub start_timeout: Duration,
    pub stop_stream_timeout: Duration,
    pub fast_close_timeout: Duration,
    pub slow_close_timeout: Duration,
    pub not_streaming_wait: Duration,
    pub source_init_timeout: Duration,
    pub relay_ready_timeout: Duration,
    pub settle_delay: Duration,
    pub regulator_settle_delay: Duration,

    /// Buffering longer than this is classified as an ingest disconnect.
    pub buffering_threshold: Duration,

    pub audio_upgrade_window: Duration,
    pub audio_upgrade_poll: Duration,
    pub relay_retry_delay: Duration,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field(
                "relay_url",
                &self.relay_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("auto_reconnect", &self.auto_reconnect)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .field("open_timeout", &self.open_timeout)
            .field("encoder_ready_timeout", &self.encoder_ready_timeout)
            .field("start_timeout", &self.start_timeout)
            .field("stop_stream_timeout", &self.stop_stream_timeout)
            .field("fast_close_timeout", &self.fast_close_timeout)
            .field("slow_close_timeout", &self.slow_close_timeout)
            .field("not_streaming_wait", &self.not_streaming_wait)
            .field("source_init_timeout", &self.source_init_timeout)
            .field("relay_ready_timeout", &self.relay_ready_timeout)
            .field("settle_delay", &self.settle_delay)
            .field("regulator_settle_delay", &self.regulator_settle_delay)
            .field("buffering_threshold", &self.buffering_threshold)
            .field("audio_upgrade_window", &self.audio_upgrade_window)
            .field("audio_upgrade_poll", &self.audio_upgrade_poll)
            .field("relay_retry_delay", &self.relay_retry_delay)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            relay_url: None,
            auto_reconnect: true,
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            max_reconnect_attempts: None,
            open_timeout: Duration::from_millis(DEFAULT_OPEN_TIMEOUT_MS),
            encoder_ready_timeout: Duration::from_millis(DEFAULT_ENCODER_READY_TIMEOUT_MS),
            start_timeout: Duration::from_millis(DEFAULT_START_TIMEOUT_MS),
            stop_stream_timeout: Duration::from_millis(DEFAULT_STOP_STREAM_TIMEOUT_MS),
            fast_close_timeout: Duration::from_millis(DEFAULT_FAST_CLOSE_TIMEOUT_MS),
            slow_close_timeout: Duration::from_millis(DEFAULT_SLOW_CLOSE_TIMEOUT_MS),
            not_streaming_wait: Duration::from_millis(DEFAULT_NOT_STREAMING_WAIT_MS),
            source_init_timeout: Duration::from_millis(DEFAULT_SOURCE_INIT_TIMEOUT_MS),
            relay_ready_timeout: Duration::from_millis(DEFAULT_RELAY_READY_TIMEOUT_MS),
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
            regulator_settle_delay: Duration::from_millis(DEFAULT_REGULATOR_SETTLE_DELAY_MS),
            buffering_threshold: Duration::from_millis(DEFAULT_BUFFERING_THRESHOLD_MS),
            audio_upgrade_window: Duration::from_millis(DEFAULT_AUDIO_UPGRADE_WINDOW_MS),
            audio_upgrade_poll: Duration::from_millis(DEFAULT_AUDIO_UPGRADE_POLL_MS),
            relay_retry_delay: Duration::from_millis(DEFAULT_RELAY_RETRY_DELAY_MS),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a variable is set but cannot be
    /// parsed. A set-but-empty relay URL is also rejected.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let relay_url = match vars.get("SC_RELAY_URL") {
            Some(url) if url.trim().is_empty() => {
                return Err(ConfigError::InvalidValue(
                    "SC_RELAY_URL is set but empty".to_string(),
                ));
            }
            Some(url) => Some(SecretString::from(url.clone())),
            None => None,
        };

        let auto_reconnect = parse_or(vars, "SC_AUTO_RECONNECT", true)?;

        let max_reconnect_attempts = match vars.get("SC_MAX_RECONNECT_ATTEMPTS") {
            Some(raw) => {
                let n: u32 = raw.parse().map_err(|_| {
                    ConfigError::InvalidValue(format!("SC_MAX_RECONNECT_ATTEMPTS={raw}"))
                })?;
                // Zero means "no limit", same as leaving it unset.
                (n > 0).then_some(n)
            }
            None => None,
        };

        Ok(Config {
            relay_url,
            auto_reconnect,
            reconnect_delay: millis(vars, "SC_RECONNECT_DELAY_MS", DEFAULT_RECONNECT_DELAY_MS)?,
            max_reconnect_attempts,
            open_timeout: millis(vars, "SC_OPEN_TIMEOUT_MS", DEFAULT_OPEN_TIMEOUT_MS)?,
            encoder_ready_timeout: millis(
                vars,
                "SC_ENCODER_READY_TIMEOUT_MS",
                DEFAULT_ENCODER_READY_TIMEOUT_MS,
            )?,
            start_timeout: millis(vars, "SC_START_TIMEOUT_MS", DEFAULT_START_TIMEOUT_MS)?,
            stop_stream_timeout: millis(
                vars,
                "SC_STOP_STREAM_TIMEOUT_MS",
                DEFAULT_STOP_STREAM_TIMEOUT_MS,
            )?,
            fast_close_timeout: millis(
                vars,
                "SC_FAST_CLOSE_TIMEOUT_MS",
                DEFAULT_FAST_CLOSE_TIMEOUT_MS,
            )?,
            slow_close_timeout: millis(
                vars,
                "SC_SLOW_CLOSE_TIMEOUT_MS",
                DEFAULT_SLOW_CLOSE_TIMEOUT_MS,
            )?,
            not_streaming_wait: millis(
                vars,
                "SC_NOT_STREAMING_WAIT_MS",
                DEFAULT_NOT_STREAMING_WAIT_MS,
            )?,
            source_init_timeout: millis(
                vars,
                "SC_SOURCE_INIT_TIMEOUT_MS",
                DEFAULT_SOURCE_INIT_TIMEOUT_MS,
            )?,
            relay_ready_timeout: millis(
                vars,
                "SC_RELAY_READY_TIMEOUT_MS",
                DEFAULT_RELAY_READY_TIMEOUT_MS,
            )?,
            settle_delay: millis(vars, "SC_SETTLE_DELAY_MS", DEFAULT_SETTLE_DELAY_MS)?,
            regulator_settle_delay: millis(
                vars,
                "SC_REGULATOR_SETTLE_DELAY_MS",
                DEFAULT_REGULATOR_SETTLE_DELAY_MS,
            )?,
            buffering_threshold: millis(
                vars,
                "SC_BUFFERING_THRESHOLD_MS",
                DEFAULT_BUFFERING_THRESHOLD_MS,
            )?,
            audio_upgrade_window: millis(
                vars,
                "SC_AUDIO_UPGRADE_WINDOW_MS",
                DEFAULT_AUDIO_UPGRADE_WINDOW_MS,
            )?,
            audio_upgrade_poll: millis(
                vars,
                "SC_AUDIO_UPGRADE_POLL_MS",
                DEFAULT_AUDIO_UPGRADE_POLL_MS,
            )?,
            relay_retry_delay: millis(
                vars,
                "SC_RELAY_RETRY_DELAY_MS",
                DEFAULT_RELAY_RETRY_DELAY_MS,
            )?,
        })
    }
}

fn parse_or<T: FromStr>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{key}={raw}"))),
        None => Ok(default),
    }
}

fn millis(
    vars: &HashMap<String, String>,
    key: &str,
    default_ms: u64,
) -> Result<Duration, ConfigError> {
    parse_or(vars, key, default_ms).map(Duration::from_millis)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;

    #[test]
    fn test_from_vars_success_with_defaults() {
        let vars = HashMap::new();

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert!(config.relay_url.is_none());
        assert!(config.auto_reconnect);
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.max_reconnect_attempts, None);
        assert_eq!(config.open_timeout, Duration::from_secs(5));
        assert_eq!(config.encoder_ready_timeout, Duration::from_secs(3));
        assert_eq!(config.fast_close_timeout, Duration::from_secs(1));
        assert_eq!(config.slow_close_timeout, Duration::from_secs(10));
        assert_eq!(config.buffering_threshold, Duration::from_secs(2));
        assert_eq!(config.audio_upgrade_window, Duration::from_secs(10));
        assert_eq!(
            config.settle_delay,
            Duration::from_millis(DEFAULT_SETTLE_DELAY_MS)
        );
    }

    #[test]
    fn test_from_vars_matches_default_impl() {
        let from_vars = Config::from_vars(&HashMap::new()).unwrap();
        let default = Config::default();
        assert_eq!(format!("{from_vars:?}"), format!("{default:?}"));
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let vars = HashMap::from([
            (
                "SC_RELAY_URL".to_string(),
                "rtmp://relay.local/live/drone-key".to_string(),
            ),
            ("SC_AUTO_RECONNECT".to_string(), "false".to_string()),
            ("SC_RECONNECT_DELAY_MS".to_string(), "2500".to_string()),
            ("SC_MAX_RECONNECT_ATTEMPTS".to_string(), "4".to_string()),
            ("SC_BUFFERING_THRESHOLD_MS".to_string(), "1500".to_string()),
            ("SC_RELAY_RETRY_DELAY_MS".to_string(), "1000".to_string()),
        ]);

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(
            config.relay_url.as_ref().map(|u| u.expose_secret().to_string()),
            Some("rtmp://relay.local/live/drone-key".to_string())
        );
        assert!(!config.auto_reconnect);
        assert_eq!(config.reconnect_delay, Duration::from_millis(2500));
        assert_eq!(config.max_reconnect_attempts, Some(4));
        assert_eq!(config.buffering_threshold, Duration::from_millis(1500));
        assert_eq!(config.relay_retry_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_zero_max_attempts_means_unbounded() {
        let vars = HashMap::from([("SC_MAX_RECONNECT_ATTEMPTS".to_string(), "0".to_string())]);
        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.max_reconnect_attempts, None);
    }

    #[test]
    fn test_invalid_duration_is_rejected() {
        let vars = HashMap::from([("SC_OPEN_TIMEOUT_MS".to_string(), "soon".to_string())]);
        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidValue(ref msg)) if msg.contains("SC_OPEN_TIMEOUT_MS"))
        );
    }

    #[test]
    fn test_invalid_bool_is_rejected() {
        let vars = HashMap::from([("SC_AUTO_RECONNECT".to_string(), "maybe".to_string())]);
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_empty_relay_url_is_rejected() {
        let vars = HashMap::from([("SC_RELAY_URL".to_string(), "  ".to_string())]);
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_debug_redacts_relay_url() {
        let vars = HashMap::from([(
            "SC_RELAY_URL".to_string(),
            "rtmp://relay.local/live/super-secret-key".to_string(),
        )]);
        let config = Config::from_vars(&vars).unwrap();

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super-secret-key"));
        assert!(debug_output.contains("reconnect_delay"));
    }
}
