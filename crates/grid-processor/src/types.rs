//! Core types for interpolation results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wx_common::atmosphere::{dewpoint_from_rh, kelvin_to_celsius, wind_from_components};
use wx_common::{CloudLayer, GeoPoint, ValidTime};

/// Vertical coordinate of a query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum VerticalTarget {
    /// Pressure level in hPa
    Pressure(f64),
    /// Geometric altitude above mean sea level in meters
    Altitude(f64),
}

/// Atmospheric values at one pressure level of a resolved column.
///
/// Fields the snapshot did not provide stay `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelSample {
    pub pressure_hpa: f64,
    /// Geopotential height in meters
    pub height_m: Option<f64>,
    pub temperature_k: Option<f64>,
    /// Eastward wind component in m/s
    pub u_ms: Option<f64>,
    /// Northward wind component in m/s
    pub v_ms: Option<f64>,
    pub rh_percent: Option<f64>,
    /// Eddy dissipation parameter from the turbulence product
    pub edr: Option<f64>,
}

impl LevelSample {
    /// A level with no values yet.
    pub fn empty(pressure_hpa: f64) -> Self {
        Self {
            pressure_hpa,
            height_m: None,
            temperature_k: None,
            u_ms: None,
            v_ms: None,
            rh_percent: None,
            edr: None,
        }
    }

    /// Meteorological wind direction (degrees true, FROM) and speed (m/s).
    pub fn wind(&self) -> Option<(f64, f64)> {
        Some(wind_from_components(self.u_ms?, self.v_ms?))
    }

    /// Dew point in degrees Celsius, from temperature and relative humidity.
    pub fn dewpoint_c(&self) -> Option<f64> {
        Some(dewpoint_from_rh(kelvin_to_celsius(self.temperature_k?), self.rh_percent?))
    }
}

/// Near-surface fields of a resolved column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SurfaceSample {
    pub msl_pressure_hpa: Option<f64>,
    /// 2 m temperature in K
    pub temperature_k: Option<f64>,
    /// 2 m dew point in K
    pub dewpoint_k: Option<f64>,
    /// 10 m wind components in m/s
    pub u_ms: Option<f64>,
    pub v_ms: Option<f64>,
    /// Model terrain height in meters
    pub elevation_m: Option<f64>,
    /// Convective available potential energy in J/kg
    pub cape_j_per_kg: Option<f64>,
    /// Precipitation rate in kg m-2 s-1
    pub precipitation_rate: Option<f64>,
    pub visibility_m: Option<f64>,
}

impl SurfaceSample {
    pub fn wind(&self) -> Option<(f64, f64)> {
        Some(wind_from_components(self.u_ms?, self.v_ms?))
    }
}

/// How a tropopause altitude was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TropopauseSource {
    /// Lapse-rate scan of the resolved column
    LapseRate,
    /// The snapshot's own tropopause-level fields
    ModelField,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tropopause {
    pub altitude_m: f64,
    pub pressure_hpa: f64,
    pub temperature_k: Option<f64>,
    pub source: TropopauseSource,
}

/// The result of resolving the atmosphere at one point and time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpolatedPoint {
    pub location: GeoPoint,
    pub time: DateTime<Utc>,
    /// Every pressure level of the primary product, highest pressure first
    pub levels: Vec<LevelSample>,
    /// Values at the requested vertical coordinate
    pub target: LevelSample,
    pub tropopause: Option<Tropopause>,
    pub surface: SurfaceSample,
    /// Model cloud layers, altitudes above mean sea level
    pub clouds: Vec<CloudLayer>,
    /// Snapshots the result was computed from
    pub sources: Vec<ValidTime>,
}

impl InterpolatedPoint {
    /// The sample at a pressure level, if the column has that level.
    pub fn level(&self, pressure_hpa: f64) -> Option<&LevelSample> {
        self.levels
            .iter()
            .find(|l| (l.pressure_hpa - pressure_hpa).abs() < 1e-6)
    }

    /// Whether the result blends two snapshots in time.
    pub fn is_blended(&self) -> bool {
        self.sources.len() > 1
    }
}

/// Column cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 - 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_wind() {
        let mut level = LevelSample::empty(500.0);
        assert!(level.wind().is_none());

        level.u_ms = Some(0.0);
        level.v_ms = Some(-10.0);
        let (dir, speed) = level.wind().unwrap();
        assert!(dir.abs() < 1e-9);
        assert!((speed - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_level_dewpoint_needs_humidity() {
        let mut level = LevelSample::empty(850.0);
        level.temperature_k = Some(283.15);
        assert!(level.dewpoint_c().is_none());

        level.rh_percent = Some(100.0);
        assert!((level.dewpoint_c().unwrap() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_vertical_target_serialization() {
        let json = serde_json::to_string(&VerticalTarget::Altitude(3000.0)).unwrap();
        assert_eq!(json, r#"{"kind":"altitude","value":3000.0}"#);
    }

    #[test]
    fn test_cache_stats_hit_rate() {
        let mut stats = CacheStats::default();
        assert!((stats.hit_rate() - 0.0).abs() < f64::EPSILON);

        stats.hits = 80;
        stats.misses = 20;
        assert!((stats.hit_rate() - 0.8).abs() < f64::EPSILON);
    }
}
