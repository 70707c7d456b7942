//! The fusion tick.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use grid_processor::{InterpolatedPoint, InterpolationEngine, VerticalTarget};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use wx_common::atmosphere::kelvin_to_celsius;
use wx_common::InterpolationError;

use crate::config::FusionConfig;
use crate::derived::{
    precipitation_intensity, runway_condition, surface_shear_deg, thermals, thunderstorm_intensity, turbulence_at,
    ThermalInputs,
};
use crate::error::{FusionError, Result};
use crate::layers::{build_wind_layers, merge_clouds};
use crate::observations::{NearestObservation, ObservationStore};
use crate::smoothing::{flight_phase, should_publish, Thresholds};
use crate::state::{AircraftPosition, FusedWeatherState, ObservationRef, SurfaceConditions};

pub type StateReceiver = watch::Receiver<Option<Arc<FusedWeatherState>>>;

/// Combines the interpolated grid with the nearest report on every tick
/// and publishes the result through hysteresis.
pub struct FusionEngine {
    interpolation: Arc<InterpolationEngine>,
    observations: Arc<ObservationStore>,
    config: FusionConfig,
    published: Mutex<Option<Arc<FusedWeatherState>>>,
    sender: watch::Sender<Option<Arc<FusedWeatherState>>>,
}

impl FusionEngine {
    pub fn new(
        interpolation: Arc<InterpolationEngine>,
        observations: Arc<ObservationStore>,
        config: FusionConfig,
    ) -> Result<Self> {
        config.validate().map_err(FusionError::config)?;
        let (sender, _) = watch::channel(None);
        Ok(Self {
            interpolation,
            observations,
            config,
            published: Mutex::new(None),
            sender,
        })
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn observations(&self) -> &Arc<ObservationStore> {
        &self.observations
    }

    pub fn interpolation(&self) -> &Arc<InterpolationEngine> {
        &self.interpolation
    }

    /// Receive every state the engine publishes.
    pub fn subscribe(&self) -> StateReceiver {
        self.sender.subscribe()
    }

    /// The published state, if any.
    pub fn current(&self) -> Option<Arc<FusedWeatherState>> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Fuse the weather at `position` and `time`.
    ///
    /// Returns the published state: the new one when it differs enough from
    /// the previous, otherwise the previous one unchanged. When the grid
    /// cannot be resolved the previous state is returned marked stale.
    pub fn tick(&self, position: &AircraftPosition, time: DateTime<Utc>) -> Result<Arc<FusedWeatherState>> {
        metrics::counter!("wx_ticks_total").increment(1);

        let point = match self.interpolation.resolve(
            &position.location,
            VerticalTarget::Altitude(position.altitude_m),
            time,
        ) {
            Ok(point) => point,
            Err(e) => return self.fall_back(e),
        };

        let nearest = self.observations.nearest(&position.location, time);
        let candidate = self.fuse(position, time, &point, nearest.as_ref());

        let mut published = self.published.lock().unwrap_or_else(PoisonError::into_inner);
        let thresholds = Thresholds::new(&self.config.smoothing, candidate.phase, position.altitude_m);
        let (accept, magnitude) = should_publish(published.as_deref(), &candidate, &thresholds);

        if let (false, Some(previous)) = (accept, published.as_ref()) {
            debug!(magnitude, "Change below threshold, keeping published state");
            return Ok(Arc::clone(previous));
        }

        let revision = published.as_ref().map_or(0, |p| p.revision) + 1;
        let state = Arc::new(FusedWeatherState {
            change_magnitude: magnitude,
            revision,
            ..candidate
        });
        *published = Some(Arc::clone(&state));
        drop(published);

        self.sender.send_replace(Some(Arc::clone(&state)));
        metrics::counter!("wx_state_redraws_total").increment(1);
        metrics::gauge!("wx_state_stale").set(0.0);
        info!(
            revision,
            magnitude,
            phase = ?state.phase,
            station = state.observation.as_ref().map(|o| o.station.as_str()),
            "Published weather state"
        );
        Ok(state)
    }

    fn fall_back(&self, error: InterpolationError) -> Result<Arc<FusedWeatherState>> {
        let mut published = self.published.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(previous) = published.as_ref() else {
            warn!(error = %error, "Interpolation failed with no earlier state");
            return Err(FusionError::NoState(error));
        };
        metrics::gauge!("wx_state_stale").set(1.0);
        if previous.stale {
            return Ok(Arc::clone(previous));
        }

        warn!(error = %error, revision = previous.revision, "Interpolation failed, keeping last state as stale");
        let state = Arc::new(FusedWeatherState {
            stale: true,
            ..FusedWeatherState::clone(previous)
        });
        *published = Some(Arc::clone(&state));
        drop(published);

        self.sender.send_replace(Some(Arc::clone(&state)));
        Ok(state)
    }

    /// Build a candidate state. Revision and change magnitude are left for
    /// the caller.
    fn fuse(
        &self,
        position: &AircraftPosition,
        time: DateTime<Utc>,
        point: &InterpolatedPoint,
        nearest: Option<&NearestObservation>,
    ) -> FusedWeatherState {
        let record = nearest.map(|n| n.record.as_ref());
        let grid = &point.surface;

        let surface = SurfaceConditions {
            temperature_c: record
                .and_then(|r| r.temperature_c)
                .or_else(|| grid.temperature_k.map(kelvin_to_celsius)),
            dewpoint_c: record
                .and_then(|r| r.dewpoint_c)
                .or_else(|| grid.dewpoint_k.map(kelvin_to_celsius)),
            pressure_hpa: record
                .and_then(|r| r.pressure.map(|p| p.hpa()))
                .or(grid.msl_pressure_hpa),
            visibility_m: record
                .and_then(|r| r.visibility.map(|v| v.meters()))
                .or(grid.visibility_m),
            elevation_m: record.and_then(|r| r.elevation_m).or(grid.elevation_m),
        };

        let thunderstorm = thunderstorm_intensity(record, grid);
        let precipitation = precipitation_intensity(record, grid);
        let runway = runway_condition(record, surface.temperature_c, precipitation);

        let mut winds = build_wind_layers(point, record, &self.config);
        if let Some(surface_wind) = winds.first_mut() {
            surface_wind.shear_deg = surface_shear_deg(thunderstorm);
        }
        let clouds = merge_clouds(&point.clouds, record, self.config.max_cloud_layers);

        let turbulence = turbulence_at(&winds, position.altitude_m, thunderstorm, self.config.max_turbulence);
        let thermals = thermals(&ThermalInputs {
            time,
            longitude: position.location.lon,
            surface_elevation_m: surface.elevation_m,
            surface_temperature_c: surface.temperature_c,
            visibility_m: surface.visibility_m,
            clouds: &clouds,
            winds: &winds,
            thunderstorm,
        });
        let phase = flight_phase(position, surface.elevation_m, &self.config.smoothing);

        FusedWeatherState {
            location: position.location,
            time,
            phase,
            winds,
            clouds,
            surface,
            tropopause: point.tropopause,
            turbulence,
            runway_condition: runway,
            runway_friction: runway.friction(),
            precipitation,
            thunderstorm,
            thermals,
            observation: nearest.map(|n| ObservationRef {
                station: n.record.station.clone(),
                distance_m: n.distance_m,
                observed_at: n.record.observed_at,
                raw: n.record.raw.clone(),
            }),
            change_magnitude: 0.0,
            stale: false,
            revision: 0,
        }
    }
}
