//! Quantities derived from the fused layers.
//!
//! The mappings are empirical. Each is monotone in its inputs: more shear or
//! convection never lowers turbulence, heavier or colder precipitation never
//! raises runway friction.

use std::ops::RangeInclusive;

use chrono::{DateTime, Duration, Timelike, Utc};
use metar_parser::{Intensity, ObservationRecord};
use grid_processor::SurfaceSample;
use wx_common::atmosphere::{components_from_wind, meters_to_feet};

use crate::state::{FusedCloudLayer, LayerSource, RunwayCondition, Thermals, WindLayer};

/// Turbulence scale units per unit of eddy dissipation (EDR^1/3).
pub const EDR_SCALE: f64 = 8.0;

/// Shear below this (knots per 1000 ft) adds no turbulence.
const SHEAR_ONSET_KT_PER_KFT: f64 = 3.0;
/// Knots per 1000 ft of shear per turbulence unit above the onset.
const SHEAR_KT_PER_UNIT: f64 = 3.0;

/// Turbulence added at full thunderstorm intensity.
const CONVECTIVE_TURBULENCE: f64 = 2.0;

/// Model precipitation rate in mm/h that counts as full intensity.
const HEAVY_PRECIPITATION_MM_H: f64 = 10.0;
const TRACE_PRECIPITATION_MM_H: f64 = 0.1;

/// CAPE (J/kg) above which model precipitation is treated as convective.
const CAPE_CONVECTIVE: f64 = 1000.0;
const CAPE_STRONG: f64 = 2500.0;

/// Local solar time window of fair-weather thermals, seconds of day.
const THERMALS_START_S: u32 = 10 * 3600;
const THERMALS_END_S: u32 = 18 * 3600 + 30 * 60;
const THERMALS_MIN_VISIBILITY_M: f64 = 2000.0;
const THERMALS_MIN_BASE_AGL_M: f64 = 500.0;
/// Depth over which the near-surface lapse rate is measured.
const THERMALS_PROBE_DEPTH_M: f64 = 1000.0;
/// Top of dry thermals above the surface.
const THERMALS_DRY_DEPTH_M: f64 = 2000.0;
const THERMALS_CLOUD_BONUS: f64 = 0.1;

/// Top of thunderstorm uplift.
const CONVECTIVE_TOP_M: f64 = 10_000.0;

/// Intensity of a weather group on a 0 to 1 scale.
fn intensity_value(intensity: Intensity) -> f64 {
    match intensity {
        Intensity::Light | Intensity::Vicinity => 0.25,
        Intensity::Moderate => 0.5,
        Intensity::Heavy => 1.0,
    }
}

/// Position of `t` in `range` scaled by `position` in `[0, 1]`.
fn within(range: RangeInclusive<f64>, position: f64) -> f64 {
    range.start() + (range.end() - range.start()) * position.clamp(0.0, 1.0)
}

fn precipitation_mm_h(surface: &SurfaceSample) -> f64 {
    surface.precipitation_rate.map(|rate| rate * 3600.0).unwrap_or(0.0)
}

/// Thunderstorm intensity, 0 to 1. The observation decides when there is
/// one; otherwise convective model precipitation counts.
pub fn thunderstorm_intensity(observation: Option<&ObservationRecord>, surface: &SurfaceSample) -> f64 {
    if let Some(record) = observation {
        return record
            .current_weather()
            .filter(|w| w.is_thunderstorm())
            .map(|w| intensity_value(w.intensity))
            .fold(0.0, f64::max);
    }

    if precipitation_mm_h(surface) < TRACE_PRECIPITATION_MM_H {
        return 0.0;
    }
    match surface.cape_j_per_kg {
        Some(cape) if cape >= CAPE_STRONG => 0.5,
        Some(cape) if cape >= CAPE_CONVECTIVE => 0.25,
        _ => 0.0,
    }
}

/// Precipitation intensity at the surface, 0 to 1.
pub fn precipitation_intensity(observation: Option<&ObservationRecord>, surface: &SurfaceSample) -> f64 {
    if let Some(record) = observation {
        return record
            .current_weather()
            .filter(|w| w.has_precipitation() && w.intensity != Intensity::Vicinity)
            .map(|w| intensity_value(w.intensity))
            .fold(0.0, f64::max);
    }

    let mm_h = precipitation_mm_h(surface);
    if mm_h < TRACE_PRECIPITATION_MM_H {
        0.0
    } else {
        (mm_h / HEAVY_PRECIPITATION_MM_H).min(1.0)
    }
}

/// Runway surface from present weather and temperature.
pub fn runway_condition(
    observation: Option<&ObservationRecord>,
    temperature_c: Option<f64>,
    precipitation: f64,
) -> RunwayCondition {
    let freezing = temperature_c.is_some_and(|t| t <= 0.0);

    if let Some(record) = observation {
        let falling: Vec<_> = record
            .current_weather()
            .filter(|w| w.has_precipitation() && w.intensity != Intensity::Vicinity)
            .collect();

        if falling.iter().any(|w| w.is_freezing()) {
            return RunwayCondition::Icy;
        }
        if falling.iter().any(|w| w.phenomena.iter().any(|p| p.is_frozen())) {
            return RunwayCondition::Snowy;
        }
        if !falling.is_empty() {
            return if freezing {
                RunwayCondition::Icy
            } else if falling.iter().any(|w| w.intensity == Intensity::Heavy) {
                RunwayCondition::Puddly
            } else {
                RunwayCondition::Wet
            };
        }
        if record.weather.iter().any(|w| w.recent && w.has_precipitation()) {
            return RunwayCondition::Wet;
        }
        return RunwayCondition::Dry;
    }

    if precipitation <= 0.0 {
        RunwayCondition::Dry
    } else if freezing {
        RunwayCondition::Snowy
    } else if precipitation >= 0.75 {
        RunwayCondition::Puddly
    } else {
        RunwayCondition::Wet
    }
}

impl RunwayCondition {
    /// Braking coefficient of the surface.
    pub fn friction(&self) -> f64 {
        match self {
            Self::Dry => 0.8,
            Self::Wet => 0.5,
            Self::Puddly => 0.35,
            Self::Snowy => 0.25,
            Self::Icy => 0.1,
        }
    }
}

/// Turbulence intensity from the eddy dissipation parameter.
pub fn edr_turbulence(edr: f64) -> f64 {
    (edr * EDR_SCALE).max(0.0)
}

/// Turbulence intensity from the vector wind difference between two layers.
pub fn shear_turbulence(lower: &WindLayer, upper: &WindLayer) -> f64 {
    let depth_kft = meters_to_feet(upper.altitude_m - lower.altitude_m) / 1000.0;
    if depth_kft <= 0.0 {
        return 0.0;
    }
    let (u0, v0) = components_from_wind(lower.direction_deg, lower.speed_kt);
    let (u1, v1) = components_from_wind(upper.direction_deg, upper.speed_kt);
    let shear = (u1 - u0).hypot(v1 - v0) / depth_kft;
    ((shear - SHEAR_ONSET_KT_PER_KFT) / SHEAR_KT_PER_UNIT).max(0.0)
}

/// Raise each layer's turbulence to at least the shear turbulence of the
/// layer below it, capped at `max`.
pub fn apply_shear_turbulence(winds: &mut [WindLayer], max: f64) {
    for i in 1..winds.len() {
        let shear = shear_turbulence(&winds[i - 1], &winds[i]);
        winds[i].turbulence = winds[i].turbulence.max(shear);
    }
    for layer in winds.iter_mut() {
        layer.turbulence = layer.turbulence.min(max);
    }
}

/// Turbulence at `altitude_m`, interpolated between the bracketing layers,
/// plus convective turbulence under thunderstorms.
pub fn turbulence_at(winds: &[WindLayer], altitude_m: f64, thunderstorm: f64, max: f64) -> f64 {
    let layered = match winds.iter().position(|w| w.altitude_m > altitude_m) {
        None => winds.last().map(|w| w.turbulence).unwrap_or(0.0),
        Some(0) => winds[0].turbulence,
        Some(k) => {
            let (lower, upper) = (&winds[k - 1], &winds[k]);
            let weight = (altitude_m - lower.altitude_m) / (upper.altitude_m - lower.altitude_m);
            lower.turbulence + (upper.turbulence - lower.turbulence) * weight
        }
    };
    (layered + thunderstorm * CONVECTIVE_TURBULENCE).clamp(0.0, max)
}

/// Swing of the surface gust direction near thunderstorms, in degrees.
pub fn surface_shear_deg(thunderstorm: f64) -> f64 {
    if thunderstorm <= 0.0 {
        0.0
    } else if thunderstorm > 0.5 {
        within(30.0..=60.0, (thunderstorm - 0.5) / 0.5)
    } else if thunderstorm > 0.25 {
        within(15.0..=30.0, (thunderstorm - 0.25) / 0.25)
    } else {
        within(5.0..=15.0, thunderstorm / 0.25)
    }
}

/// What the thermal model looks at.
#[derive(Debug, Clone, Copy)]
pub struct ThermalInputs<'a> {
    pub time: DateTime<Utc>,
    pub longitude: f64,
    pub surface_elevation_m: Option<f64>,
    pub surface_temperature_c: Option<f64>,
    pub visibility_m: Option<f64>,
    pub clouds: &'a [FusedCloudLayer],
    pub winds: &'a [WindLayer],
    pub thunderstorm: f64,
}

/// Seconds since local solar midnight.
fn local_solar_seconds(time: DateTime<Utc>, longitude: f64) -> u32 {
    let offset = Duration::seconds((longitude / 15.0 * 3600.0).round() as i64);
    (time + offset).num_seconds_from_midnight()
}

/// Thunderstorm uplift, or fair-weather thermals from the near-surface
/// lapse rate during the afternoon.
pub fn thermals(inputs: &ThermalInputs<'_>) -> Thermals {
    let ts = inputs.thunderstorm;
    if ts > 0.0 {
        let rate = if ts > 0.5 {
            within(1500.0..=3000.0, (ts - 0.5) / 0.5)
        } else if ts > 0.25 {
            within(1000.0..=2000.0, (ts - 0.25) / 0.25)
        } else {
            within(500.0..=1500.0, ts / 0.25)
        };
        return Thermals {
            probability: (ts / 2.0).clamp(0.15, 0.25),
            rate_fpm: rate,
            top_m: CONVECTIVE_TOP_M,
            gradient: None,
            convective: true,
        };
    }

    let seconds = local_solar_seconds(inputs.time, inputs.longitude);
    if !(THERMALS_START_S..=THERMALS_END_S).contains(&seconds)
        || inputs.clouds.iter().any(|c| c.layer.coverage.is_ceiling())
        || inputs.visibility_m.is_some_and(|v| v < THERMALS_MIN_VISIBILITY_M)
    {
        return Thermals::default();
    }

    let Some(t0) = inputs.surface_temperature_c else {
        return Thermals::default();
    };
    let alt0 = inputs.surface_elevation_m.unwrap_or(0.0);

    let cloud = inputs.clouds.first().map(|c| c.layer);
    if cloud.is_some_and(|c| c.base_m - alt0 <= THERMALS_MIN_BASE_AGL_M) {
        return Thermals::default();
    }

    let probe = inputs.winds.iter().find_map(|w| match (w.source, w.temperature_c) {
        (LayerSource::Grid, Some(t)) if w.altitude_m > alt0 + THERMALS_PROBE_DEPTH_M => Some((w.altitude_m, t)),
        _ => None,
    });
    let Some((alt1, t1)) = probe else {
        return Thermals::default();
    };

    let gradient = (t1 - t0) / (alt1 - alt0) * 100.0;
    if gradient >= -0.7 {
        return Thermals {
            gradient: Some(gradient),
            ..Thermals::default()
        };
    }

    let (top_m, bonus) = match cloud {
        Some(c) => (c.top_m, THERMALS_CLOUD_BONUS),
        None => (alt0 + THERMALS_DRY_DEPTH_M, 0.0),
    };
    let (probability, rate_fpm) = if gradient >= -1.0 {
        (0.05, within(100.0..=300.0, (-0.7 - gradient) / 0.3))
    } else if gradient >= -2.0 {
        (0.1, within(200.0..=800.0, -1.0 - gradient))
    } else {
        (0.15, within(600.0..=1200.0, -2.0 - gradient))
    };

    Thermals {
        probability: probability + bonus,
        rate_fpm,
        top_m,
        gradient: Some(gradient),
        convective: false,
    }
}
