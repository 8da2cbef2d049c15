//! Steerer configuration, poll interval validation, and error types.
//!
//! [`SteererConfig`] is the input for constructing a
//! [`Steerer`](crate::steerer::Steerer). [`validate()`](SteererConfig::validate)
//! checks it once at startup; runtime interval changes go through
//! [`PollInterval`], which can only be constructed from an in-range value.

use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming the default local-attach directory.
pub const STEER_DIRECTORY_ENV: &str = "REG_STEER_DIRECTORY";

/// Smallest poll interval a user may enter, in seconds.
pub const MIN_INTERVAL_SECS: f64 = 0.1;
/// Largest poll interval a user may enter, in seconds.
pub const MAX_INTERVAL_SECS: f64 = 10.0;

const MIN_INTERVAL_MS: u64 = 100;
const MAX_INTERVAL_MS: u64 = 10_000;

// ── PollInterval ───────────────────────────────────────────────────

/// A validated poll interval in milliseconds, within `[100, 10000]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PollInterval(u64);

impl PollInterval {
    /// Default interval used until the user changes it.
    pub const DEFAULT: PollInterval = PollInterval(500);

    /// Build from user-entered seconds.
    ///
    /// Accepts `[0.1, 10.0]` and keeps one decimal place (truncating,
    /// with a small bias so that `0.3` is not read as `0.29999`).
    pub fn from_secs(secs: f64) -> Result<Self, ConfigError> {
        if !secs.is_finite() || !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&secs) {
            return Err(ConfigError::IntervalOutOfRange { secs });
        }
        let tenths = ((secs + 0.001) * 10.0).floor() as u64;
        Ok(Self(tenths * 100))
    }

    /// Build from milliseconds.
    pub fn from_millis(ms: u64) -> Result<Self, ConfigError> {
        if !(MIN_INTERVAL_MS..=MAX_INTERVAL_MS).contains(&ms) {
            return Err(ConfigError::IntervalOutOfRange {
                secs: ms as f64 / 1000.0,
            });
        }
        Ok(Self(ms))
    }

    /// Interval in milliseconds.
    pub fn as_millis(self) -> u64 {
        self.0
    }

    /// Interval in seconds, as shown to the user.
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1000.0
    }

    /// Interval as a [`Duration`].
    pub fn as_duration(self) -> Duration {
        Duration::from_millis(self.0)
    }
}

impl Default for PollInterval {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for PollInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}s", self.as_secs_f64())
    }
}

// ── PollConfig ─────────────────────────────────────────────────────

/// Configuration for the background poller.
#[derive(Clone, Debug)]
pub struct PollConfig {
    /// Fixed poll interval in milliseconds. Default: 500.
    pub interval_ms: u64,
    /// Start with the library-recommended interval instead of the fixed
    /// one. Default: false.
    pub auto_poll: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: PollInterval::DEFAULT.as_millis(),
            auto_poll: false,
        }
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected during [`SteererConfig::validate()`] or when the
/// user changes the poll interval.
#[derive(Debug, PartialEq)]
pub enum ConfigError {
    /// Poll interval outside `[0.1, 10.0]` seconds, or not a number.
    IntervalOutOfRange {
        /// The rejected value, in seconds.
        secs: f64,
    },
    /// The default attach directory is set but empty.
    EmptyAttachDirectory,
    /// The poller thread could not be spawned.
    ThreadSpawnFailed {
        /// Description of the spawn failure.
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IntervalOutOfRange { secs } => write!(
                f,
                "poll interval must be between {MIN_INTERVAL_SECS} and {MAX_INTERVAL_SECS} seconds, got {secs}"
            ),
            Self::EmptyAttachDirectory => write!(f, "default attach directory is empty"),
            Self::ThreadSpawnFailed { reason } => write!(f, "thread spawn failed: {reason}"),
        }
    }
}

impl Error for ConfigError {}

// ── SteererConfig ──────────────────────────────────────────────────

/// Complete configuration for constructing a steerer.
#[derive(Clone, Debug, Default)]
pub struct SteererConfig {
    /// Poller settings.
    pub poll: PollConfig,
    /// Directory used for local attach when the caller supplies none.
    pub default_attach_dir: Option<PathBuf>,
}

impl SteererConfig {
    /// Defaults, with the attach directory taken from
    /// `REG_STEER_DIRECTORY` if it is set and non-empty.
    pub fn from_env() -> Self {
        let default_attach_dir = std::env::var_os(STEER_DIRECTORY_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self {
            default_attach_dir,
            ..Self::default()
        }
    }

    /// Validate all invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.poll_interval()?;
        if let Some(dir) = &self.default_attach_dir {
            if dir.as_os_str().is_empty() {
                return Err(ConfigError::EmptyAttachDirectory);
            }
        }
        Ok(())
    }

    /// The configured fixed interval, validated.
    pub fn poll_interval(&self) -> Result<PollInterval, ConfigError> {
        PollInterval::from_millis(self.poll.interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = SteererConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.poll_interval().unwrap(), PollInterval::DEFAULT);
    }

    #[test]
    fn interval_bounds_are_inclusive() {
        assert_eq!(PollInterval::from_secs(0.1).unwrap().as_millis(), 100);
        assert_eq!(PollInterval::from_secs(10.0).unwrap().as_millis(), 10_000);
    }

    #[test]
    fn interval_keeps_one_decimal_place() {
        assert_eq!(PollInterval::from_secs(0.3).unwrap().as_millis(), 300);
        assert_eq!(PollInterval::from_secs(2.57).unwrap().as_millis(), 2500);
        assert_eq!(PollInterval::from_secs(9.99).unwrap().as_millis(), 9900);
    }

    #[test]
    fn interval_rejects_out_of_range_and_nan() {
        for secs in [0.0, 0.09, 10.01, -1.0, f64::NAN, f64::INFINITY] {
            match PollInterval::from_secs(secs) {
                Err(ConfigError::IntervalOutOfRange { .. }) => {}
                other => panic!("expected IntervalOutOfRange for {secs}, got {other:?}"),
            }
        }
    }

    #[test]
    fn validate_rejects_bad_fixed_interval() {
        let cfg = SteererConfig {
            poll: PollConfig {
                interval_ms: 50,
                auto_poll: false,
            },
            default_attach_dir: None,
        };
        match cfg.validate() {
            Err(ConfigError::IntervalOutOfRange { .. }) => {}
            other => panic!("expected IntervalOutOfRange, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_empty_attach_dir() {
        let cfg = SteererConfig {
            default_attach_dir: Some(PathBuf::new()),
            ..SteererConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::EmptyAttachDirectory));
    }

    #[test]
    fn display_mentions_valid_range() {
        let msg = ConfigError::IntervalOutOfRange { secs: 12.0 }.to_string();
        assert!(msg.contains("0.1"));
        assert!(msg.contains("10"));
    }

    proptest! {
        #[test]
        fn in_range_secs_always_accepted(secs in 0.1f64..=10.0) {
            let interval = PollInterval::from_secs(secs).unwrap();
            prop_assert!((100..=10_000).contains(&interval.as_millis()));
            prop_assert_eq!(interval.as_millis() % 100, 0);
        }

        #[test]
        fn out_of_range_secs_always_rejected(secs in prop_oneof![-100.0f64..0.0999, 10.0001f64..1000.0]) {
            prop_assert!(PollInterval::from_secs(secs).is_err());
        }
    }
}
