//! The fused weather state handed to the host.

use chrono::{DateTime, Utc};
use grid_processor::Tropopause;
use serde::{Deserialize, Serialize};
use wx_common::{CloudLayer, GeoPoint};

/// Where the aircraft is, as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AircraftPosition {
    pub location: GeoPoint,
    /// Altitude above mean sea level in meters
    pub altitude_m: f64,
    /// Terrain elevation under the aircraft, when the host knows it
    #[serde(default)]
    pub ground_elevation_m: Option<f64>,
    #[serde(default)]
    pub on_ground: bool,
}

impl AircraftPosition {
    pub fn new(location: GeoPoint, altitude_m: f64) -> Self {
        Self {
            location,
            altitude_m,
            ground_elevation_m: None,
            on_ground: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightPhase {
    Ground,
    LowAltitude,
    Cruise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerSource {
    Observation,
    Grid,
}

/// One wind layer. Altitudes are meters above mean sea level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindLayer {
    pub altitude_m: f64,
    /// Degrees true the wind blows from
    pub direction_deg: f64,
    pub speed_kt: f64,
    pub gust_kt: Option<f64>,
    /// Width of a reported variable-direction sector
    pub variation_deg: Option<f64>,
    /// Gust direction swing near thunderstorms
    pub shear_deg: f64,
    pub temperature_c: Option<f64>,
    pub dewpoint_c: Option<f64>,
    pub turbulence: f64,
    pub source: LayerSource,
}

/// One cloud layer, base and top above mean sea level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusedCloudLayer {
    #[serde(flatten)]
    pub layer: CloudLayer,
    pub source: LayerSource,
}

/// Surface conditions. The observation wins field by field; missing
/// observation fields fall back to the grid and otherwise stay unknown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SurfaceConditions {
    pub temperature_c: Option<f64>,
    pub dewpoint_c: Option<f64>,
    /// Sea-level pressure (QNH) in hPa
    pub pressure_hpa: Option<f64>,
    pub visibility_m: Option<f64>,
    pub elevation_m: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunwayCondition {
    Dry,
    Wet,
    /// Standing water under heavy rain
    Puddly,
    Snowy,
    Icy,
}

/// Rising air available to the aircraft.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Thermals {
    /// Share of the area with active lift, 0 to 1
    pub probability: f64,
    /// Climb rate in feet per minute
    pub rate_fpm: f64,
    /// Top of the lift in meters MSL
    pub top_m: f64,
    /// Near-surface lapse rate in °C per 100 m, when it was evaluated
    pub gradient: Option<f64>,
    /// Uplift under a thunderstorm rather than fair-weather thermals
    pub convective: bool,
}

/// The station whose report was fused into the state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRef {
    pub station: String,
    pub distance_m: f64,
    pub observed_at: DateTime<Utc>,
    pub raw: String,
}

/// The externally visible atmospheric state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedWeatherState {
    pub location: GeoPoint,
    /// Simulated time of the tick that produced this state
    pub time: DateTime<Utc>,
    pub phase: FlightPhase,

    /// Ordered by altitude, at most `max_wind_layers`
    pub winds: Vec<WindLayer>,
    /// Ordered by base, non-overlapping, at most `max_cloud_layers`
    pub clouds: Vec<FusedCloudLayer>,
    pub surface: SurfaceConditions,
    pub tropopause: Option<Tropopause>,

    /// Turbulence intensity at the aircraft, 0 to `max_turbulence`
    pub turbulence: f64,
    pub runway_condition: RunwayCondition,
    /// Braking coefficient of the runway surface
    pub runway_friction: f64,
    /// Precipitation intensity, 0 to 1
    pub precipitation: f64,
    /// Thunderstorm intensity, 0 to 1
    pub thunderstorm: f64,
    pub thermals: Thermals,

    pub observation: Option<ObservationRef>,

    /// Largest change against the previously published state, in units of
    /// the smoothing thresholds
    pub change_magnitude: f64,
    /// Set when the grid could not be resolved and this is an older state
    pub stale: bool,
    /// Incremented each time a new state replaces the published one
    pub revision: u64,
}

impl FusedWeatherState {
    /// The wind layer nearest below `altitude_m`, or the lowest one.
    pub fn wind_at(&self, altitude_m: f64) -> Option<&WindLayer> {
        self.winds
            .iter()
            .rev()
            .find(|w| w.altitude_m <= altitude_m)
            .or_else(|| self.winds.first())
    }

    pub fn surface_wind(&self) -> Option<&WindLayer> {
        self.winds.first()
    }
}
