use std::path::PathBuf;

use embassy_time::Duration;
use serde::Deserialize;

/// Shortest garage mode duration allowed outside of testing
pub const MIN_SHUTDOWN_PREPARE_TIME_MS: u32 = 15 * 60 * 1000;
/// Upper bound for the time spent retrying a failed suspend
pub const MAX_SUSPEND_WAIT_DURATION_MS: u32 = 3 * 60 * 1000;

/// Error loading a configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The document is not valid TOML or has a mistyped field
    Parse(String),
    /// The shutdown polling interval is zero
    ZeroPollingInterval,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ConfigError::Parse(e) => write!(f, "invalid configuration: {e}"),
            ConfigError::ZeroPollingInterval => f.write_str("shutdown polling interval must be non-zero"),
        }
    }
}

/// Power management service configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Garage mode duration
    ///
    /// Raised to [`MIN_SHUTDOWN_PREPARE_TIME_MS`] unless `allow_short_garage_mode` is set
    pub shutdown_prepare_time_ms: u32,
    /// Period of the shutdown postpone keep-alive
    pub shutdown_polling_interval_ms: u32,
    /// Postpone duration sent with each keep-alive
    pub shutdown_extend_max_ms: u32,
    /// Total time spent retrying a failed suspend before shutting down instead
    ///
    /// Clamped to [`MAX_SUSPEND_WAIT_DURATION_MS`]
    pub max_suspend_wait_duration_ms: u32,
    /// Connection attempts made to the policy daemon before giving up
    pub daemon_bind_max_retry: u8,
    pub daemon_bind_retry_interval_ms: u32,
    /// Debounce applied to main display state changes
    pub main_display_event_delay_ms: u32,
    /// Vendor power policy document
    pub vendor_policy_path: PathBuf,
    /// Allow a garage mode shorter than the platform minimum, for testing
    pub allow_short_garage_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shutdown_prepare_time_ms: MIN_SHUTDOWN_PREPARE_TIME_MS,
            shutdown_polling_interval_ms: 2000,
            shutdown_extend_max_ms: 5000,
            max_suspend_wait_duration_ms: MAX_SUSPEND_WAIT_DURATION_MS,
            daemon_bind_max_retry: 3,
            daemon_bind_retry_interval_ms: 500,
            main_display_event_delay_ms: 500,
            vendor_policy_path: PathBuf::from("/vendor/etc/power_policy.xml"),
            allow_short_garage_mode: false,
        }
    }
}

impl Config {
    /// Load a configuration from TOML, missing fields take their default value
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(s).map_err(|e| ConfigError::Parse(e.message().to_string()))?;
        if config.shutdown_polling_interval_ms == 0 {
            return Err(ConfigError::ZeroPollingInterval);
        }
        Ok(config)
    }

    /// Garage mode duration after applying the platform minimum
    pub fn shutdown_prepare_time_ms(&self) -> u32 {
        if self.allow_short_garage_mode {
            self.shutdown_prepare_time_ms
        } else {
            self.shutdown_prepare_time_ms.max(MIN_SHUTDOWN_PREPARE_TIME_MS)
        }
    }

    pub fn shutdown_polling_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.shutdown_polling_interval_ms.max(1)))
    }

    /// Number of keep-alive ticks before garage mode is forced to complete
    pub fn polling_count(&self) -> u32 {
        (self.shutdown_prepare_time_ms() / self.shutdown_polling_interval_ms.max(1)).saturating_add(1)
    }

    pub fn max_suspend_wait_duration_ms(&self) -> u32 {
        self.max_suspend_wait_duration_ms.min(MAX_SUSPEND_WAIT_DURATION_MS)
    }

    pub fn daemon_bind_retry_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.daemon_bind_retry_interval_ms))
    }

    pub fn main_display_event_delay(&self) -> Duration {
        Duration::from_millis(u64::from(self.main_display_event_delay_ms))
    }
}
