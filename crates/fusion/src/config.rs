//! Configuration for the fusion engine.

use std::path::PathBuf;

use chrono::Duration;
use metar_parser::ObservationSource;
use serde::{Deserialize, Serialize};

/// Hysteresis thresholds. A new state replaces the published one only when
/// some field moved by more than its threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Multiplies every threshold; 0 publishes every change.
    pub aggressiveness: f64,

    /// Minimum base/top movement in feet before a cloud layer is redrawn,
    /// per layer from the lowest. Layers beyond the list use the last entry.
    pub min_cloud_redraw_ft: Vec<f64>,

    pub wind_speed_kt: f64,
    pub wind_direction_deg: f64,
    pub temperature_c: f64,
    pub pressure_hpa: f64,
    pub visibility_m: f64,
    pub turbulence: f64,

    /// Height above ground below which the aircraft is in the low-altitude phase.
    pub low_altitude_ceiling_ft: f64,

    /// Threshold multipliers per flight phase.
    pub ground_scale: f64,
    pub low_altitude_scale: f64,
    pub cruise_scale: f64,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            aggressiveness: 1.0,
            min_cloud_redraw_ft: vec![500.0, 5000.0, 10_000.0],
            wind_speed_kt: 5.0,
            wind_direction_deg: 20.0,
            temperature_c: 1.0,
            pressure_hpa: 0.5,
            visibility_m: 1000.0,
            turbulence: 0.5,
            low_altitude_ceiling_ft: 10_000.0,
            ground_scale: 0.5,
            low_altitude_scale: 1.0,
            cruise_scale: 2.0,
        }
    }
}

/// The `METAR.rwx` file for tools that only read files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyRecordConfig {
    pub enabled: bool,
    pub path: PathBuf,
    pub interval_minutes: u32,
}

impl Default for LegacyRecordConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from(metar_parser::RWX_FILE_NAME),
            interval_minutes: 10,
        }
    }
}

/// Configuration for the fusion engine and its observation store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Provider whose feed format the observation bodies use.
    pub observation_source: ObservationSource,

    /// Reports older than this are never used.
    pub max_observation_age_minutes: u32,

    /// Stations further than this from the aircraft are never used.
    pub max_observation_distance_m: f64,

    /// Height above the station at which the observed surface wind is placed.
    pub metar_agl_limit_m: f64,

    /// Number of wind and cloud layers the host accepts.
    pub max_wind_layers: usize,
    pub max_cloud_layers: usize,

    pub smoothing: SmoothingConfig,

    /// Upper bound of the turbulence intensity scale.
    pub max_turbulence: f64,

    /// Station ids whose reports are dropped on ingest.
    pub ignore_stations: Vec<String>,

    /// Drop automated (`AUTO`) reports.
    pub ignore_auto: bool,

    pub legacy_record: LegacyRecordConfig,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            observation_source: ObservationSource::Noaa,
            max_observation_age_minutes: 120,
            max_observation_distance_m: 100_000.0,
            metar_agl_limit_m: 20.0,
            max_wind_layers: 13,
            max_cloud_layers: 3,
            smoothing: SmoothingConfig::default(),
            max_turbulence: 4.0,
            ignore_stations: Vec::new(),
            ignore_auto: false,
            legacy_record: LegacyRecordConfig::default(),
        }
    }
}

impl FusionConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply environment variable overrides on top of this configuration.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("OBSERVATION_SOURCE") {
            if let Ok(source) = val.parse() {
                self.observation_source = source;
            }
        }

        if let Ok(val) = std::env::var("MAX_OBSERVATION_AGE_MINUTES") {
            if let Ok(minutes) = val.parse() {
                self.max_observation_age_minutes = minutes;
            }
        }

        if let Ok(val) = std::env::var("MAX_OBSERVATION_DISTANCE_M") {
            if let Ok(meters) = val.parse() {
                self.max_observation_distance_m = meters;
            }
        }

        if let Ok(val) = std::env::var("SMOOTHING_AGGRESSIVENESS") {
            if let Ok(aggressiveness) = val.parse() {
                self.smoothing.aggressiveness = aggressiveness;
            }
        }

        if let Ok(val) = std::env::var("MAX_TURBULENCE") {
            if let Ok(max) = val.parse() {
                self.max_turbulence = max;
            }
        }

        if let Ok(val) = std::env::var("IGNORE_STATIONS") {
            self.ignore_stations = val
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Ok(val) = std::env::var("IGNORE_AUTO") {
            self.ignore_auto = val == "1" || val.eq_ignore_ascii_case("true");
        }

        if let Ok(val) = std::env::var("LEGACY_RECORD_PATH") {
            self.legacy_record.path = PathBuf::from(val);
            self.legacy_record.enabled = true;
        }

        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_observation_age_minutes == 0 {
            return Err("max_observation_age_minutes must be > 0".to_string());
        }

        if self.max_observation_distance_m.is_nan() || self.max_observation_distance_m < 0.0 {
            return Err("max_observation_distance_m must be >= 0".to_string());
        }

        if self.metar_agl_limit_m.is_nan() || self.metar_agl_limit_m < 0.0 {
            return Err("metar_agl_limit_m must be >= 0".to_string());
        }

        if self.max_wind_layers < 2 {
            return Err("max_wind_layers must be >= 2".to_string());
        }

        if self.max_cloud_layers == 0 {
            return Err("max_cloud_layers must be > 0".to_string());
        }

        if self.max_turbulence.is_nan() || self.max_turbulence <= 0.0 {
            return Err("max_turbulence must be > 0".to_string());
        }

        let smoothing = &self.smoothing;
        if smoothing.aggressiveness.is_nan() || smoothing.aggressiveness < 0.0 {
            return Err("smoothing.aggressiveness must be >= 0".to_string());
        }

        if smoothing.min_cloud_redraw_ft.is_empty() {
            return Err("smoothing.min_cloud_redraw_ft must not be empty".to_string());
        }

        let scales = [
            smoothing.ground_scale,
            smoothing.low_altitude_scale,
            smoothing.cruise_scale,
        ];
        if scales.iter().any(|s| s.is_nan() || *s < 0.0) {
            return Err("smoothing phase scales must be >= 0".to_string());
        }

        if self.legacy_record.enabled && self.legacy_record.interval_minutes == 0 {
            return Err("legacy_record.interval_minutes must be > 0".to_string());
        }

        Ok(())
    }

    pub fn max_observation_age(&self) -> Duration {
        Duration::minutes(self.max_observation_age_minutes as i64)
    }
}
