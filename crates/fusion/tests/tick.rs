//! Fusion ticks against synthetic snapshots and decoded reports.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use fusion::{
    AircraftPosition, FlightPhase, FusionConfig, FusionEngine, FusionError, LayerSource, ObservationStore,
    RunwayCondition,
};
use grid_processor::{InterpolationConfig, InterpolationEngine, SnapshotStore};
use metar_parser::{decode_report, ObservationRecord};
use test_utils::{assert_approx_eq, SyntheticAtmosphere};
use wx_common::{GeoPoint, GridSnapshot, InterpolationError, LatLonGrid, ValidTime};

fn cycle() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 12, 0, 0, 0).unwrap()
}

fn at_hour(h: i64) -> DateTime<Utc> {
    cycle() + Duration::hours(h)
}

fn snapshot(product: &str, atmosphere: &SyntheticAtmosphere, fh: u32) -> GridSnapshot {
    atmosphere.build(product, ValidTime::new(cycle(), fh), LatLonGrid::global(1.0))
}

fn setup(snapshots: Vec<GridSnapshot>) -> FusionEngine {
    setup_with(snapshots, FusionConfig::default())
}

fn setup_with(snapshots: Vec<GridSnapshot>, config: FusionConfig) -> FusionEngine {
    let interpolation_config = InterpolationConfig::default();
    let store = Arc::new(SnapshotStore::new(&interpolation_config));
    for snapshot in snapshots {
        store.publish(snapshot).unwrap();
    }
    let interpolation = Arc::new(InterpolationEngine::new(store, interpolation_config).unwrap());
    let observations = Arc::new(ObservationStore::new(&config));
    FusionEngine::new(interpolation, observations, config).unwrap()
}

fn position() -> AircraftPosition {
    AircraftPosition::new(GeoPoint::new(47.0, 8.0), 3000.0)
}

fn report(text: &str, lat: f64, lon: f64, elevation_m: f64, reference: DateTime<Utc>) -> ObservationRecord {
    let mut record = decode_report(text, reference).unwrap();
    record.location = Some(GeoPoint::new(lat, lon));
    record.elevation_m = Some(elevation_m);
    record
}

// ============================================================================
// Publication and hysteresis
// ============================================================================

#[test]
fn test_first_tick_publishes() {
    let engine = setup(vec![snapshot("gfs", &SyntheticAtmosphere::standard(), 0)]);
    assert!(engine.current().is_none());

    let state = engine.tick(&position(), at_hour(0)).unwrap();
    assert_eq!(state.revision, 1);
    assert!(!state.stale);
    assert_eq!(state.phase, FlightPhase::LowAltitude);
    assert!(state.observation.is_none());
    assert_eq!(state.winds[0].source, LayerSource::Grid);
    assert!(state.winds.len() <= engine.config().max_wind_layers);
    assert!(state.winds.windows(2).all(|w| w[0].altitude_m < w[1].altitude_m));
    assert_approx_eq!(state.surface.pressure_hpa.unwrap(), 1013.25, 1e-3);
    assert_eq!(state.runway_condition, RunwayCondition::Dry);
    assert_eq!(state.thunderstorm, 0.0);
}

#[test]
fn test_tick_is_idempotent() {
    let engine = setup(vec![
        snapshot("gfs", &SyntheticAtmosphere::standard(), 0),
        snapshot("gfs", &SyntheticAtmosphere::standard().with_temperature_offset(2.0), 6),
    ]);

    let first = engine.tick(&position(), at_hour(2)).unwrap();
    let second = engine.tick(&position(), at_hour(2)).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(*first, *second);
    assert_eq!(second.revision, 1);
}

#[test]
fn test_small_change_keeps_published_state() {
    let engine = setup(vec![
        snapshot("gfs", &SyntheticAtmosphere::standard(), 0),
        snapshot("gfs", &SyntheticAtmosphere::standard().with_temperature_offset(0.3), 6),
    ]);

    let first = engine.tick(&position(), at_hour(0)).unwrap();
    let later = engine.tick(&position(), at_hour(6)).unwrap();

    assert!(Arc::ptr_eq(&first, &later));
    assert_eq!(later.time, at_hour(0));
}

#[test]
fn test_large_change_is_published() {
    let engine = setup(vec![
        snapshot("gfs", &SyntheticAtmosphere::standard(), 0),
        snapshot("gfs", &SyntheticAtmosphere::standard().with_temperature_offset(3.0), 6),
    ]);

    engine.tick(&position(), at_hour(0)).unwrap();
    let later = engine.tick(&position(), at_hour(6)).unwrap();

    assert_eq!(later.revision, 2);
    assert_eq!(later.time, at_hour(6));
    assert_approx_eq!(later.change_magnitude, 3.0, 0.05);
}

#[test]
fn test_zero_aggressiveness_publishes_every_change() {
    let mut config = FusionConfig::default();
    config.smoothing.aggressiveness = 0.0;
    let engine = setup_with(
        vec![
            snapshot("gfs", &SyntheticAtmosphere::standard(), 0),
            snapshot("gfs", &SyntheticAtmosphere::standard().with_temperature_offset(0.3), 6),
        ],
        config,
    );

    engine.tick(&position(), at_hour(0)).unwrap();
    let later = engine.tick(&position(), at_hour(6)).unwrap();
    assert_eq!(later.revision, 2);
}

// ============================================================================
// Failure
// ============================================================================

#[test]
fn test_interpolation_failure_keeps_last_state_as_stale() {
    let engine = setup(vec![snapshot("gfs", &SyntheticAtmosphere::standard(), 0)]);
    let good = engine.tick(&position(), at_hour(0)).unwrap();

    // Past the last forecast hour
    let stale = engine.tick(&position(), at_hour(1)).unwrap();
    assert!(stale.stale);
    assert_eq!(stale.revision, good.revision);
    assert_eq!(stale.winds, good.winds);
    assert_eq!(stale.time, good.time);

    let again = engine.tick(&position(), at_hour(1)).unwrap();
    assert!(Arc::ptr_eq(&stale, &again));

    // Recovery is published even without a significant change
    let recovered = engine.tick(&position(), at_hour(0)).unwrap();
    assert!(!recovered.stale);
    assert_eq!(recovered.revision, 2);
}

#[test]
fn test_no_state_without_data() {
    let engine = setup(Vec::new());
    let err = engine.tick(&position(), at_hour(0)).unwrap_err();
    assert!(matches!(err, FusionError::NoState(InterpolationError::NoCoverage(_))));
    assert!(engine.current().is_none());
}

#[test]
fn test_invalid_config_rejected() {
    let config = FusionConfig {
        max_cloud_layers: 0,
        ..Default::default()
    };
    let interpolation_config = InterpolationConfig::default();
    let store = Arc::new(SnapshotStore::new(&interpolation_config));
    let interpolation = Arc::new(InterpolationEngine::new(store, interpolation_config).unwrap());
    let observations = Arc::new(ObservationStore::new(&config));

    let result = FusionEngine::new(interpolation, observations, config);
    assert!(matches!(result, Err(FusionError::ConfigError(_))));
}

// ============================================================================
// Observations
// ============================================================================

#[test]
fn test_observation_overrides_surface() {
    let engine = setup(vec![
        snapshot("gfs", &SyntheticAtmosphere::standard(), 0),
        snapshot("gfs", &SyntheticAtmosphere::standard(), 6),
    ]);
    engine.observations().ingest([report(
        "LSZH 120050Z 18012KT 9999 SCT030 05/M02 Q1020",
        47.05,
        8.0,
        400.0,
        at_hour(1),
    )]);

    let state = engine.tick(&position(), at_hour(1)).unwrap();

    let observation = state.observation.as_ref().unwrap();
    assert_eq!(observation.station, "LSZH");
    assert_approx_eq!(observation.distance_m, 5560.0, 50.0);

    let surface_wind = state.surface_wind().unwrap();
    assert_eq!(surface_wind.source, LayerSource::Observation);
    assert_eq!(surface_wind.altitude_m, 420.0);
    assert_eq!(surface_wind.direction_deg, 180.0);
    assert_eq!(surface_wind.speed_kt, 12.0);
    // Aloft layers stay grid-derived and sit above the surface layer
    assert!(state.winds[1..].iter().all(|w| w.source == LayerSource::Grid && w.altitude_m > 440.0));

    assert_eq!(state.surface.temperature_c, Some(5.0));
    assert_eq!(state.surface.dewpoint_c, Some(-2.0));
    assert_eq!(state.surface.pressure_hpa, Some(1020.0));
    assert_eq!(state.surface.visibility_m, Some(10_000.0));
    assert_eq!(state.surface.elevation_m, Some(400.0));

    assert_eq!(state.clouds[0].source, LayerSource::Observation);
    assert_approx_eq!(state.clouds[0].layer.base_m, 400.0 + 914.4, 0.1);
}

#[test]
fn test_distant_observation_ignored() {
    let engine = setup(vec![snapshot("gfs", &SyntheticAtmosphere::standard(), 0)]);
    // About 220 km north
    engine.observations().ingest([report(
        "EDDF 112350Z 18012KT 9999 SCT030 05/M02 Q1020",
        49.0,
        8.0,
        100.0,
        at_hour(0),
    )]);

    let state = engine.tick(&position(), at_hour(0)).unwrap();
    assert!(state.observation.is_none());
    assert_eq!(state.surface_wind().unwrap().source, LayerSource::Grid);
}

#[test]
fn test_thunderstorm_report() {
    let engine = setup(vec![snapshot("gfs", &SyntheticAtmosphere::standard(), 0)]);
    engine.observations().ingest([report(
        "KMIA 112353Z 09008KT 4SM +TSRA BKN020CB OVC080 26/24 A2990",
        47.02,
        8.0,
        10.0,
        at_hour(0),
    )]);

    let state = engine.tick(&position(), at_hour(0)).unwrap();
    assert_eq!(state.thunderstorm, 1.0);
    assert_eq!(state.precipitation, 1.0);
    assert_eq!(state.runway_condition, RunwayCondition::Puddly);
    assert_eq!(state.runway_friction, RunwayCondition::Puddly.friction());
    assert_eq!(state.surface_wind().unwrap().shear_deg, 60.0);
    assert!(state.thermals.convective);
    assert_eq!(state.thermals.rate_fpm, 3000.0);
    assert!(state.turbulence >= 2.0);
    assert!(state.clouds[0].layer.convective);
}

// ============================================================================
// Turbulence
// ============================================================================

#[test]
fn test_turbulence_from_edr_product() {
    let engine = setup(vec![
        snapshot("gfs", &SyntheticAtmosphere::standard(), 0),
        snapshot("wafs", &SyntheticAtmosphere::standard().with_edr(0.3), 0),
    ]);

    let state = engine.tick(&position(), at_hour(0)).unwrap();
    assert_approx_eq!(state.turbulence, 2.4, 1e-3);
    assert!(state.winds.iter().all(|w| w.turbulence <= engine.config().max_turbulence));
}

#[test]
fn test_shear_raises_turbulence() {
    let calm = setup(vec![snapshot("gfs", &SyntheticAtmosphere::standard(), 0)]);
    let sheared = setup(vec![snapshot("gfs", &SyntheticAtmosphere::standard().with_shear(15.0), 0)]);

    let calm = calm.tick(&position(), at_hour(0)).unwrap();
    let sheared = sheared.tick(&position(), at_hour(0)).unwrap();
    assert_eq!(calm.turbulence, 0.0);
    assert!(sheared.turbulence > calm.turbulence);
}

// ============================================================================
// Change notification
// ============================================================================

#[tokio::test]
async fn test_subscribers_see_published_states() {
    let engine = setup(vec![snapshot("gfs", &SyntheticAtmosphere::standard(), 0)]);
    let mut rx = engine.subscribe();
    assert!(rx.borrow().is_none());

    let state = engine.tick(&position(), at_hour(0)).unwrap();
    rx.changed().await.unwrap();
    assert_eq!(rx.borrow_and_update().as_ref().map(|s| s.revision), Some(state.revision));

    // A retained state is not re-sent
    engine.tick(&position(), at_hour(0)).unwrap();
    assert!(!rx.has_changed().unwrap());

    engine.tick(&position(), at_hour(1)).unwrap();
    rx.changed().await.unwrap();
    assert!(rx.borrow().as_ref().is_some_and(|s| s.stale));
}
