//! Agreement configuration from environment variables.

use crate::domain::{ConfigError, Party, DEFAULT_TIME_WINDOW_SECS};
use std::env;
use std::time::Duration;

/// How the proposer picks a notary.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NotarySelection {
    /// Use the notary with this display name; fail if it is not registered.
    Named(String),
    /// Use the first notary ordered by name, then by key.
    #[default]
    FirstByName,
}

impl NotarySelection {
    /// Apply the policy to the available notaries.
    pub fn select<'a>(&self, notaries: &'a [Party]) -> Result<&'a Party, ConfigError> {
        match self {
            NotarySelection::Named(name) => notaries
                .iter()
                .find(|n| &n.name == name)
                .ok_or_else(|| ConfigError::UnknownNotary(name.clone())),
            NotarySelection::FirstByName => notaries
                .iter()
                .min_by(|a, b| {
                    a.name
                        .cmp(&b.name)
                        .then_with(|| a.owning_key.cmp(&b.owning_key))
                })
                .ok_or(ConfigError::NoNotary),
        }
    }
}

/// Tunables of the agreement protocol.
#[derive(Debug, Clone)]
pub struct AgreementConfig {
    /// Length of the validity window attached to every transaction.
    pub time_window: Duration,

    /// How long the proposer waits for the notary.
    pub notary_timeout: Duration,

    /// How long either side waits for the next message.
    pub receive_timeout: Duration,

    /// How far a received window may start from our clock.
    pub max_clock_skew: Duration,

    /// Notary choice.
    pub notary_selection: NotarySelection,

    /// Whether flows persist continuations.
    pub checkpointing: bool,
}

impl Default for AgreementConfig {
    fn default() -> Self {
        Self {
            time_window: Duration::from_secs(DEFAULT_TIME_WINDOW_SECS),
            notary_timeout: Duration::from_secs(10),
            receive_timeout: Duration::from_secs(60),
            max_clock_skew: Duration::from_secs(DEFAULT_TIME_WINDOW_SECS),
            notary_selection: NotarySelection::FirstByName,
            checkpointing: true,
        }
    }
}

impl AgreementConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `PO_TIME_WINDOW_SECS`: validity window length (default: 30)
    /// - `PO_NOTARY_TIMEOUT_SECS`: notary request timeout (default: 10)
    /// - `PO_RECEIVE_TIMEOUT_SECS`: per-message receive timeout (default: 60)
    /// - `PO_MAX_CLOCK_SKEW_SECS`: accepted offset of a peer's window start (default: 30)
    /// - `PO_NOTARY_NAME`: pick this notary; otherwise first by name
    /// - `PO_CHECKPOINTS`: persist flow continuations (default: true)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let secs = |var: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            match lookup(var) {
                None => Ok(default),
                Some(value) => value
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| ConfigError::InvalidEnv { var, value }),
            }
        };

        let config = Self {
            time_window: secs("PO_TIME_WINDOW_SECS", defaults.time_window)?,
            notary_timeout: secs("PO_NOTARY_TIMEOUT_SECS", defaults.notary_timeout)?,
            receive_timeout: secs("PO_RECEIVE_TIMEOUT_SECS", defaults.receive_timeout)?,
            max_clock_skew: secs("PO_MAX_CLOCK_SKEW_SECS", defaults.max_clock_skew)?,
            notary_selection: match lookup("PO_NOTARY_NAME") {
                Some(name) if !name.trim().is_empty() => {
                    NotarySelection::Named(name.trim().to_string())
                }
                _ => NotarySelection::FirstByName,
            },
            checkpointing: lookup("PO_CHECKPOINTS")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(defaults.checkpointing),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject zero durations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.time_window.is_zero() {
            return Err(ConfigError::ZeroDuration("time_window"));
        }
        if self.notary_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("notary_timeout"));
        }
        if self.receive_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("receive_timeout"));
        }
        Ok(())
    }

    /// Window length as a chrono duration.
    pub fn window_length(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.time_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_TIME_WINDOW_SECS as i64))
    }

    /// Clock skew bound as a chrono duration.
    pub fn clock_skew(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.max_clock_skew)
            .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_TIME_WINDOW_SECS as i64))
    }
}
