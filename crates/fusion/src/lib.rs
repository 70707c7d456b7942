//! Weather fusion and state cache.
//!
//! On every host tick the [`FusionEngine`] resolves the grid at the aircraft,
//! finds the nearest usable report in the [`ObservationStore`], and fuses
//! both into a [`FusedWeatherState`]:
//!
//! ```text
//! tick(position, time)
//!      │
//!      ├─► InterpolationEngine::resolve ──(error)──► last state, marked stale
//!      │
//!      ├─► ObservationStore::nearest (fresh, within range)
//!      │
//!      ├─► Surface wind and conditions from the report, aloft from the grid
//!      ├─► Observed clouds below, model clouds above
//!      ├─► Turbulence, runway friction, thunderstorms, thermals
//!      │
//!      └─► Hysteresis against the published state
//!               │
//!               ▼
//!          published state ──► watch channel
//! ```

pub mod config;
pub mod derived;
pub mod engine;
pub mod error;
pub mod layers;
pub mod observations;
pub mod smoothing;
pub mod state;

pub use config::{FusionConfig, LegacyRecordConfig, SmoothingConfig};
pub use engine::{FusionEngine, StateReceiver};
pub use error::{FusionError, Result};
pub use observations::{IngestSummary, NearestObservation, ObservationSet, ObservationStore};
pub use smoothing::{change_magnitude, flight_phase, Thresholds, STRUCTURAL_CHANGE};
pub use state::{
    AircraftPosition, FlightPhase, FusedCloudLayer, FusedWeatherState, LayerSource, ObservationRef,
    RunwayCondition, SurfaceConditions, Thermals, WindLayer,
};
