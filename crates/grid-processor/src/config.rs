//! Configuration for the interpolation engine and its snapshot store.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Configuration for the interpolation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpolationConfig {
    /// A query before the first snapshot is clamped to it when within this
    /// many minutes; further out it has no coverage.
    pub time_tolerance_minutes: u32,

    /// Number of most recent forecast cycles retained per product.
    pub max_cycles: usize,

    /// Snapshots valid more than this many hours before the query time are
    /// excluded from queries and evicted from the store.
    pub staleness_hours: u32,

    /// Lapse rate (K/km) below which the tropopause starts.
    pub tropopause_lapse_rate_k_per_km: f64,

    /// Product supplying winds, temperature, humidity, clouds and surface fields.
    pub primary_product: String,

    /// Product supplying eddy dissipation per pressure level.
    pub turbulence_product: String,

    /// Number of extracted vertical columns kept in the LRU cache.
    pub column_cache_entries: usize,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            time_tolerance_minutes: 60,
            max_cycles: 2,
            staleness_hours: 12,
            tropopause_lapse_rate_k_per_km: 2.0,
            primary_product: "gfs".to_string(),
            turbulence_product: "wafs".to_string(),
            column_cache_entries: 256,
        }
    }
}

impl InterpolationConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply environment variable overrides on top of this configuration.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("TIME_TOLERANCE_MINUTES") {
            if let Ok(minutes) = val.parse() {
                self.time_tolerance_minutes = minutes;
            }
        }

        if let Ok(val) = std::env::var("MAX_CYCLES") {
            if let Ok(cycles) = val.parse() {
                self.max_cycles = cycles;
            }
        }

        if let Ok(val) = std::env::var("STALENESS_HOURS") {
            if let Ok(hours) = val.parse() {
                self.staleness_hours = hours;
            }
        }

        if let Ok(val) = std::env::var("TROPOPAUSE_LAPSE_RATE") {
            if let Ok(rate) = val.parse() {
                self.tropopause_lapse_rate_k_per_km = rate;
            }
        }

        if let Ok(val) = std::env::var("PRIMARY_PRODUCT") {
            self.primary_product = val.to_lowercase();
        }

        if let Ok(val) = std::env::var("TURBULENCE_PRODUCT") {
            self.turbulence_product = val.to_lowercase();
        }

        if let Ok(val) = std::env::var("COLUMN_CACHE_ENTRIES") {
            if let Ok(entries) = val.parse() {
                self.column_cache_entries = entries;
            }
        }

        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_cycles == 0 {
            return Err("max_cycles must be > 0".to_string());
        }

        if self.staleness_hours == 0 {
            return Err("staleness_hours must be > 0".to_string());
        }

        if !(self.tropopause_lapse_rate_k_per_km > 0.0 && self.tropopause_lapse_rate_k_per_km < 6.5) {
            return Err("tropopause_lapse_rate_k_per_km must be in (0, 6.5)".to_string());
        }

        if self.primary_product.is_empty() {
            return Err("primary_product must not be empty".to_string());
        }

        if self.column_cache_entries == 0 {
            return Err("column_cache_entries must be > 0".to_string());
        }

        Ok(())
    }

    pub fn time_tolerance(&self) -> Duration {
        Duration::minutes(self.time_tolerance_minutes as i64)
    }

    pub fn staleness(&self) -> Duration {
        Duration::hours(self.staleness_hours as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = InterpolationConfig::default();
        assert_eq!(config.time_tolerance_minutes, 60);
        assert_eq!(config.max_cycles, 2);
        assert_eq!(config.staleness_hours, 12);
        assert_eq!(config.primary_product, "gfs");
        assert_eq!(config.turbulence_product, "wafs");
        assert_eq!(config.staleness(), Duration::hours(12));
    }

    #[test]
    fn test_config_validation() {
        let mut config = InterpolationConfig::default();
        assert!(config.validate().is_ok());

        config.max_cycles = 0;
        assert!(config.validate().is_err());

        config = InterpolationConfig::default();
        config.tropopause_lapse_rate_k_per_km = 0.0;
        assert!(config.validate().is_err());

        config.tropopause_lapse_rate_k_per_km = 7.0;
        assert!(config.validate().is_err());

        config = InterpolationConfig::default();
        config.primary_product = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: InterpolationConfig = serde_json::from_str(r#"{"max_cycles": 3}"#).unwrap();
        assert_eq!(config.max_cycles, 3);
        assert_eq!(config.staleness_hours, 12);
    }
}
