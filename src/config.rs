//! Runtime configuration.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Configuration for the scheduled-job runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Number of maintenance workers.
    pub workers: usize,
    /// Maximum queued jobs.
    pub queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            queue_capacity: 64,
        }
    }
}

/// Top-level configuration.
///
/// Missing fields take their defaults when loaded from JSON:
///
/// ```
/// use courtcache::CoreConfig;
///
/// let cfg = CoreConfig::from_json_str(r#"{ "analytics_ready_threshold": 250 }"#).unwrap();
/// assert_eq!(cfg.analytics_ready_threshold, 250);
/// assert_eq!(cfg.retained_window_years, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Minimum `total_cases_count` for an entity to be analytics-ready.
    pub analytics_ready_threshold: u64,
    /// Calendar years of facts kept by each aggregate rebuild, counting the
    /// reference year.
    pub retained_window_years: u32,
    /// Number of rebuild reports kept for inspection.
    pub rebuild_history_limit: usize,
    /// Job runtime settings.
    pub runtime: RuntimeConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            analytics_ready_threshold: 500,
            retained_window_years: 10,
            rebuild_history_limit: 32,
            runtime: RuntimeConfig::default(),
        }
    }
}

impl CoreConfig {
    const MAX_WINDOW_YEARS: u32 = 200;

    /// Checks the configuration and returns it unchanged if valid.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` naming the first bad field.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.analytics_ready_threshold == 0 {
            return Err(invalid("analytics_ready_threshold must be at least 1"));
        }
        if self.retained_window_years == 0 || self.retained_window_years > Self::MAX_WINDOW_YEARS {
            return Err(invalid(format!(
                "retained_window_years must be in 1..={} (got {})",
                Self::MAX_WINDOW_YEARS,
                self.retained_window_years
            )));
        }
        if self.rebuild_history_limit == 0 {
            return Err(invalid("rebuild_history_limit must be at least 1"));
        }
        if self.runtime.workers == 0 {
            return Err(invalid("runtime.workers must be at least 1"));
        }
        if self.runtime.queue_capacity == 0 {
            return Err(invalid("runtime.queue_capacity must be at least 1"));
        }
        Ok(self)
    }

    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` on malformed JSON or bad values.
    pub fn from_json_str(json: &str) -> Result<Self, ValidationError> {
        let cfg: Self = serde_json::from_str(json).map_err(|e| invalid(e.to_string()))?;
        cfg.validate()
    }
}

fn invalid(reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidConfig {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = CoreConfig::default().validate().unwrap();
        assert_eq!(cfg.analytics_ready_threshold, 500);
        assert_eq!(cfg.runtime.workers, 1);
    }

    #[test]
    fn test_rejects_zero_window() {
        let cfg = CoreConfig {
            retained_window_years: 0,
            ..CoreConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("retained_window_years"));
    }

    #[test]
    fn test_rejects_zero_threshold() {
        let cfg = CoreConfig {
            analytics_ready_threshold: 0,
            ..CoreConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_nested_runtime_from_json() {
        let cfg = CoreConfig::from_json_str(r#"{ "runtime": { "workers": 3 } }"#).unwrap();
        assert_eq!(cfg.runtime.workers, 3);
        assert_eq!(cfg.runtime.queue_capacity, 64);
    }

    #[test]
    fn test_malformed_json() {
        let err = CoreConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidConfig { .. }));
    }
}
