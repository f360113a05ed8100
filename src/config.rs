//! Tenantmeter configuration.

use std::time::Duration;

/// Configuration for the usage tracker.
///
/// The defaults reproduce the engine's standard behavior: warn at 80%
/// of a limit, at most once per 24 hours per (tenant, module, usage
/// type), and flush deferred usage every 30 seconds or once 64 entries
/// are pending.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Percentage of a limit at which an approaching-limit warning
    /// fires (1..=100).
    pub warning_threshold_pct: u8,

    /// Minimum interval between two warnings for the same
    /// (tenant, module, usage type).
    pub warning_cooldown: Duration,

    /// Pending deferred-entry count that triggers an inline flush.
    pub batch_max_entries: usize,

    /// Interval of the background flusher task.
    pub batch_flush_interval: Duration,

    /// Capacity of the warning/violation event channel.
    pub event_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            warning_threshold_pct: 80,
            warning_cooldown: Duration::from_secs(24 * 60 * 60),
            batch_max_entries: 64,
            batch_flush_interval: Duration::from_secs(30),
            event_capacity: 256,
        }
    }
}

impl TrackerConfig {
    /// Validate configuration for obvious errors.
    pub fn validate(&self) -> Result<(), crate::EngineError> {
        if self.warning_threshold_pct == 0 || self.warning_threshold_pct > 100 {
            return Err(crate::EngineError::ConfigError(format!(
                "warning_threshold_pct must be within 1..=100, got {}",
                self.warning_threshold_pct
            )));
        }
        if self.batch_max_entries == 0 {
            return Err(crate::EngineError::ConfigError(
                "batch_max_entries cannot be zero".to_string(),
            ));
        }
        // A zero period would panic inside the background flusher
        if self.batch_flush_interval.is_zero() {
            return Err(crate::EngineError::ConfigError(
                "batch_flush_interval cannot be zero".to_string(),
            ));
        }
        if self.warning_cooldown.is_zero() {
            return Err(crate::EngineError::ConfigError(
                "warning_cooldown cannot be zero".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(crate::EngineError::ConfigError(
                "event_capacity cannot be zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(TrackerConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_threshold_rejected() {
        let config = TrackerConfig {
            warning_threshold_pct: 0,
            ..TrackerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn threshold_over_100_rejected() {
        let config = TrackerConfig {
            warning_threshold_pct: 101,
            ..TrackerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_batch_size_rejected() {
        let config = TrackerConfig {
            batch_max_entries: 0,
            ..TrackerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_flush_interval_rejected() {
        let config = TrackerConfig {
            batch_flush_interval: Duration::ZERO,
            ..TrackerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_warning_cooldown_rejected() {
        let config = TrackerConfig {
            warning_cooldown: Duration::ZERO,
            ..TrackerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
