//! Hysteresis between consecutive states.
//!
//! A freshly fused state only replaces the published one when some field
//! moved further than its threshold. Thresholds scale with the flight
//! phase: tight on the ground, loose in cruise.

use wx_common::atmosphere::{feet_to_meters, heading_difference};

use crate::config::SmoothingConfig;
use crate::state::{AircraftPosition, FlightPhase, FusedWeatherState, WindLayer};

/// Magnitude reported for changes that cannot be measured on a scale:
/// layers appearing or disappearing, or a different runway surface.
pub const STRUCTURAL_CHANGE: f64 = 10.0;

/// Height above ground below which the aircraft counts as on the ground.
const GROUND_AGL_M: f64 = 15.0;

/// Directions of lighter winds are not compared.
const CALM_KT: f64 = 3.0;

const PRECIPITATION_STEP: f64 = 0.25;
const THUNDERSTORM_STEP: f64 = 0.25;
const THERMAL_PROBABILITY_STEP: f64 = 0.1;
const THERMAL_RATE_STEP_FPM: f64 = 100.0;
const THERMAL_TOP_STEP_M: f64 = 20.0;
const TROPOPAUSE_STEP_M: f64 = 300.0;

pub fn flight_phase(position: &AircraftPosition, ground_elevation_m: Option<f64>, config: &SmoothingConfig) -> FlightPhase {
    let ground = position.ground_elevation_m.or(ground_elevation_m).unwrap_or(0.0);
    let agl = position.altitude_m - ground;

    if position.on_ground || agl < GROUND_AGL_M {
        FlightPhase::Ground
    } else if agl < feet_to_meters(config.low_altitude_ceiling_ft) {
        FlightPhase::LowAltitude
    } else {
        FlightPhase::Cruise
    }
}

/// Effective thresholds for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    pub wind_speed_kt: f64,
    pub wind_direction_deg: f64,
    pub temperature_c: f64,
    pub pressure_hpa: f64,
    pub visibility_m: f64,
    pub turbulence: f64,
    /// Scale applied to the fixed steps
    pub scale: f64,
    /// Cloud base/top movement per layer index, meters
    pub cloud_m: Vec<f64>,
}

impl Thresholds {
    pub fn new(config: &SmoothingConfig, phase: FlightPhase, altitude_m: f64) -> Self {
        let phase_scale = match phase {
            FlightPhase::Ground => config.ground_scale,
            FlightPhase::LowAltitude => config.low_altitude_scale,
            FlightPhase::Cruise => config.cruise_scale,
        };
        let scale = config.aggressiveness * phase_scale;

        // Clouds far below or above the aircraft may drift further
        let distance_allowance = altitude_m.max(0.0) / 10.0;

        Self {
            wind_speed_kt: config.wind_speed_kt * scale,
            wind_direction_deg: config.wind_direction_deg * scale,
            temperature_c: config.temperature_c * scale,
            pressure_hpa: config.pressure_hpa * scale,
            visibility_m: config.visibility_m * scale,
            turbulence: config.turbulence * scale,
            scale,
            cloud_m: config
                .min_cloud_redraw_ft
                .iter()
                .map(|ft| (feet_to_meters(*ft) + distance_allowance) * scale)
                .collect(),
        }
    }

    fn cloud(&self, index: usize) -> f64 {
        self.cloud_m
            .get(index)
            .or(self.cloud_m.last())
            .copied()
            .unwrap_or(0.0)
    }
}

/// `diff` in units of `threshold`. A zero threshold makes any difference
/// significant.
fn ratio(diff: f64, threshold: f64) -> f64 {
    if threshold <= 0.0 {
        if diff > 0.0 {
            STRUCTURAL_CHANGE
        } else {
            0.0
        }
    } else {
        diff / threshold
    }
}

fn ratio_opt(a: Option<f64>, b: Option<f64>, threshold: f64) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => ratio((a - b).abs(), threshold),
        (None, None) => 0.0,
        _ => STRUCTURAL_CHANGE,
    }
}

fn wind_change(a: &WindLayer, b: &WindLayer, t: &Thresholds) -> f64 {
    if a.source != b.source {
        return STRUCTURAL_CHANGE;
    }
    let mut magnitude = ratio((a.speed_kt - b.speed_kt).abs(), t.wind_speed_kt);
    if a.speed_kt >= CALM_KT && b.speed_kt >= CALM_KT {
        magnitude = magnitude.max(ratio(
            heading_difference(a.direction_deg, b.direction_deg),
            t.wind_direction_deg,
        ));
    }
    [
        ratio_opt(a.gust_kt, b.gust_kt, t.wind_speed_kt),
        ratio_opt(a.temperature_c, b.temperature_c, t.temperature_c),
        ratio_opt(a.dewpoint_c, b.dewpoint_c, t.temperature_c),
        ratio((a.turbulence - b.turbulence).abs(), t.turbulence),
    ]
    .into_iter()
    .fold(magnitude, f64::max)
}

/// The largest change between two states, in units of the thresholds.
/// Values above 1 are significant.
pub fn change_magnitude(previous: &FusedWeatherState, next: &FusedWeatherState, t: &Thresholds) -> f64 {
    let mut magnitude: f64 = 0.0;
    let mut track = |m: f64| magnitude = magnitude.max(m);

    if previous.winds.len() != next.winds.len() {
        track(STRUCTURAL_CHANGE);
    } else {
        for (a, b) in previous.winds.iter().zip(&next.winds) {
            track(wind_change(a, b, t));
        }
    }

    if previous.clouds.len() != next.clouds.len() {
        track(STRUCTURAL_CHANGE);
    } else {
        for (i, (a, b)) in previous.clouds.iter().zip(&next.clouds).enumerate() {
            if a.source != b.source || a.layer.coverage != b.layer.coverage {
                track(STRUCTURAL_CHANGE);
                continue;
            }
            let threshold = t.cloud(i);
            track(ratio((a.layer.base_m - b.layer.base_m).abs(), threshold));
            track(ratio((a.layer.top_m - b.layer.top_m).abs(), threshold));
        }
    }

    let (sa, sb) = (&previous.surface, &next.surface);
    track(ratio_opt(sa.temperature_c, sb.temperature_c, t.temperature_c));
    track(ratio_opt(sa.dewpoint_c, sb.dewpoint_c, t.temperature_c));
    track(ratio_opt(sa.pressure_hpa, sb.pressure_hpa, t.pressure_hpa));
    track(ratio_opt(sa.visibility_m, sb.visibility_m, t.visibility_m));

    track(ratio_opt(
        previous.tropopause.map(|tp| tp.altitude_m),
        next.tropopause.map(|tp| tp.altitude_m),
        TROPOPAUSE_STEP_M * t.scale,
    ));

    track(ratio((previous.turbulence - next.turbulence).abs(), t.turbulence));

    if previous.runway_condition != next.runway_condition {
        track(STRUCTURAL_CHANGE);
    }
    track(ratio(
        (previous.precipitation - next.precipitation).abs(),
        PRECIPITATION_STEP * t.scale,
    ));
    track(ratio(
        (previous.thunderstorm - next.thunderstorm).abs(),
        THUNDERSTORM_STEP * t.scale,
    ));

    let (ta, tb) = (&previous.thermals, &next.thermals);
    if ta.convective != tb.convective {
        track(STRUCTURAL_CHANGE);
    }
    track(ratio(
        (ta.probability - tb.probability).abs(),
        THERMAL_PROBABILITY_STEP * t.scale,
    ));
    track(ratio((ta.rate_fpm - tb.rate_fpm).abs(), THERMAL_RATE_STEP_FPM * t.scale));
    track(ratio((ta.top_m - tb.top_m).abs(), THERMAL_TOP_STEP_M * t.scale));

    magnitude
}

/// Whether `next` should replace the published state, and the magnitude
/// of the change. The first state and any state following a stale one are
/// always accepted.
pub fn should_publish(previous: Option<&FusedWeatherState>, next: &FusedWeatherState, t: &Thresholds) -> (bool, f64) {
    match previous {
        None => (true, STRUCTURAL_CHANGE),
        Some(previous) => {
            let magnitude = change_magnitude(previous, next, t);
            (previous.stale || magnitude > 1.0, magnitude)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use wx_common::{CloudLayer, Coverage, GeoPoint};

    use crate::state::{FusedCloudLayer, LayerSource, RunwayCondition, SurfaceConditions, Thermals};

    fn wind(altitude_m: f64, direction_deg: f64, speed_kt: f64) -> WindLayer {
        WindLayer {
            altitude_m,
            direction_deg,
            speed_kt,
            gust_kt: None,
            variation_deg: None,
            shear_deg: 0.0,
            temperature_c: Some(10.0),
            dewpoint_c: Some(5.0),
            turbulence: 0.0,
            source: LayerSource::Grid,
        }
    }

    fn state() -> FusedWeatherState {
        FusedWeatherState {
            location: GeoPoint::new(47.0, 8.0),
            time: Utc.with_ymd_and_hms(2024, 3, 12, 17, 0, 0).unwrap(),
            phase: FlightPhase::LowAltitude,
            winds: vec![wind(500.0, 270.0, 10.0), wind(3000.0, 280.0, 30.0)],
            clouds: vec![FusedCloudLayer {
                layer: CloudLayer::with_default_top(1500.0, Coverage::Broken, None),
                source: LayerSource::Observation,
            }],
            surface: SurfaceConditions {
                temperature_c: Some(15.0),
                dewpoint_c: Some(8.0),
                pressure_hpa: Some(1013.0),
                visibility_m: Some(10_000.0),
                elevation_m: Some(400.0),
            },
            tropopause: None,
            turbulence: 0.0,
            runway_condition: RunwayCondition::Dry,
            runway_friction: RunwayCondition::Dry.friction(),
            precipitation: 0.0,
            thunderstorm: 0.0,
            thermals: Thermals::default(),
            observation: None,
            change_magnitude: 0.0,
            stale: false,
            revision: 1,
        }
    }

    fn thresholds() -> Thresholds {
        Thresholds::new(&SmoothingConfig::default(), FlightPhase::LowAltitude, 0.0)
    }

    #[test]
    fn test_flight_phase() {
        let config = SmoothingConfig::default();
        let mut position = AircraftPosition::new(GeoPoint::new(47.0, 8.0), 410.0);
        assert_eq!(flight_phase(&position, Some(400.0), &config), FlightPhase::Ground);

        position.altitude_m = 2000.0;
        assert_eq!(flight_phase(&position, Some(400.0), &config), FlightPhase::LowAltitude);

        position.altitude_m = 11_000.0;
        assert_eq!(flight_phase(&position, Some(400.0), &config), FlightPhase::Cruise);

        // Host terrain wins over the model
        position.altitude_m = 2000.0;
        position.ground_elevation_m = Some(1995.0);
        assert_eq!(flight_phase(&position, Some(400.0), &config), FlightPhase::Ground);

        position.ground_elevation_m = None;
        position.on_ground = true;
        assert_eq!(flight_phase(&position, Some(400.0), &config), FlightPhase::Ground);
    }

    #[test]
    fn test_thresholds_scale_with_phase() {
        let config = SmoothingConfig::default();
        let ground = Thresholds::new(&config, FlightPhase::Ground, 0.0);
        let cruise = Thresholds::new(&config, FlightPhase::Cruise, 0.0);
        assert_eq!(ground.wind_speed_kt, 2.5);
        assert_eq!(cruise.wind_speed_kt, 10.0);

        let high = Thresholds::new(&config, FlightPhase::LowAltitude, 3000.0);
        assert!((high.cloud(0) - (feet_to_meters(500.0) + 300.0)).abs() < 1e-9);
        // Beyond the configured list the last entry applies
        assert_eq!(high.cloud(7), high.cloud(2));
    }

    #[test]
    fn test_identical_states_do_not_change() {
        assert_eq!(change_magnitude(&state(), &state(), &thresholds()), 0.0);
        let (publish, _) = should_publish(Some(&state()), &state(), &thresholds());
        assert!(!publish);
    }

    #[test]
    fn test_small_drift_is_suppressed() {
        let mut next = state();
        next.winds[1].speed_kt += 2.0;
        next.surface.temperature_c = Some(15.4);
        next.clouds[0].layer.base_m += 50.0;

        let (publish, magnitude) = should_publish(Some(&state()), &next, &thresholds());
        assert!(!publish);
        assert!((magnitude - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_large_change_is_published() {
        let mut next = state();
        next.winds[1].direction_deg = 320.0;
        let (publish, magnitude) = should_publish(Some(&state()), &next, &thresholds());
        assert!(publish);
        assert!((magnitude - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_direction_ignored_in_calm() {
        let mut previous = state();
        previous.winds[0].speed_kt = 2.0;
        let mut next = previous.clone();
        next.winds[0].direction_deg = 90.0;
        assert_eq!(change_magnitude(&previous, &next, &thresholds()), 0.0);
    }

    #[test]
    fn test_structural_changes() {
        let t = thresholds();

        let mut next = state();
        next.clouds.clear();
        assert_eq!(change_magnitude(&state(), &next, &t), STRUCTURAL_CHANGE);

        let mut next = state();
        next.clouds[0].layer.coverage = Coverage::Overcast;
        assert_eq!(change_magnitude(&state(), &next, &t), STRUCTURAL_CHANGE);

        let mut next = state();
        next.runway_condition = RunwayCondition::Wet;
        assert_eq!(change_magnitude(&state(), &next, &t), STRUCTURAL_CHANGE);

        let mut next = state();
        next.surface.visibility_m = None;
        assert_eq!(change_magnitude(&state(), &next, &t), STRUCTURAL_CHANGE);
    }

    #[test]
    fn test_zero_aggressiveness_publishes_any_change() {
        let config = SmoothingConfig {
            aggressiveness: 0.0,
            ..Default::default()
        };
        let t = Thresholds::new(&config, FlightPhase::Cruise, 10_000.0);

        let mut next = state();
        next.surface.pressure_hpa = Some(1013.01);
        let (publish, _) = should_publish(Some(&state()), &next, &t);
        assert!(publish);

        let (publish, _) = should_publish(Some(&state()), &state(), &t);
        assert!(!publish);
    }

    #[test]
    fn test_first_and_after_stale_are_published() {
        let (publish, magnitude) = should_publish(None, &state(), &thresholds());
        assert!(publish);
        assert_eq!(magnitude, STRUCTURAL_CHANGE);

        let mut previous = state();
        previous.stale = true;
        let (publish, magnitude) = should_publish(Some(&previous), &state(), &thresholds());
        assert!(publish);
        assert_eq!(magnitude, 0.0);
    }
}
