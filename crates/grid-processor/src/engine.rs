//! Resolving the atmosphere at a point in space and time.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, trace};
use wx_common::{GeoPoint, GridSnapshot, InterpolationError, ValidTime};

use crate::cache::{column_key, ColumnCache};
use crate::column::Column;
use crate::config::InterpolationConfig;
use crate::error::{GridProcessorError, Result};
use crate::interpolation::{bracket_time, TimeBracket};
use crate::store::{SnapshotStore, StoreState};
use crate::tropopause::resolve_tropopause;
use crate::types::{CacheStats, InterpolatedPoint, VerticalTarget};

/// Answers point queries from the snapshots currently published in a
/// [`SnapshotStore`].
///
/// Each query works on one consistent store state; snapshots published
/// while a query runs are picked up by the next one.
pub struct InterpolationEngine {
    store: Arc<SnapshotStore>,
    config: InterpolationConfig,
    cache: Mutex<ColumnCache>,
}

impl InterpolationEngine {
    pub fn new(store: Arc<SnapshotStore>, config: InterpolationConfig) -> Result<Self> {
        config.validate().map_err(GridProcessorError::config)?;
        let cache = Mutex::new(ColumnCache::new(config.column_cache_entries));
        Ok(Self { store, config, cache })
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    pub fn config(&self) -> &InterpolationConfig {
        &self.config
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).stats()
    }

    /// Resolve every pressure level, the requested vertical coordinate, the
    /// tropopause, surface fields and model clouds at `point` and `time`.
    ///
    /// Fails with `NoCoverage` when no snapshot of the primary product covers
    /// the point or the time, and with `StaleData` when the time lies beyond
    /// the last forecast hour or the nearest earlier one is too old.
    pub fn resolve(
        &self,
        point: &GeoPoint,
        target: VerticalTarget,
        time: DateTime<Utc>,
    ) -> std::result::Result<InterpolatedPoint, InterpolationError> {
        let state = self.store.current();
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sync_generation(state.generation());

        let (mut column, sources) = self.column_at(&state, &self.config.primary_product, point, time)?;

        let turbulence = &self.config.turbulence_product;
        if !turbulence.is_empty() && turbulence != &self.config.primary_product {
            match self.column_at(&state, turbulence, point, time) {
                Ok((turbulence_column, _)) => column.attach_edr(&turbulence_column),
                Err(e) => debug!(product = %turbulence, error = %e, "No turbulence data for query"),
            }
        }

        let tropopause = resolve_tropopause(&column, self.config.tropopause_lapse_rate_k_per_km);
        let target_sample = column.sample(target);

        trace!(
            point = %point,
            time = %time,
            sources = sources.len(),
            levels = column.levels.len(),
            "Resolved column"
        );

        Ok(InterpolatedPoint {
            location: *point,
            time,
            levels: column.levels,
            target: target_sample,
            tropopause,
            surface: column.surface,
            clouds: column.clouds,
            sources,
        })
    }

    /// The column of `product` at `time`, blended between forecast hours
    /// when the time falls between them.
    fn column_at(
        &self,
        state: &StoreState,
        product: &str,
        point: &GeoPoint,
        time: DateTime<Utc>,
    ) -> std::result::Result<(Column, Vec<ValidTime>), InterpolationError> {
        let timeline = state.timeline(product);
        let valid_times: Vec<DateTime<Utc>> = timeline.iter().map(|s| s.valid_time()).collect();

        let bracket = bracket_time(
            &valid_times,
            time,
            self.config.time_tolerance(),
            self.config.staleness(),
        )
        .map_err(|e| match e {
            InterpolationError::NoCoverage(msg) => {
                InterpolationError::NoCoverage(format!("{}: {}", product, msg))
            }
            InterpolationError::StaleData(msg) => {
                InterpolationError::StaleData(format!("{}: {}", product, msg))
            }
        })?;

        match bracket {
            TimeBracket::Exact(k) => {
                let column = self.cached_column(&timeline[k], point)?;
                Ok(((*column).clone(), vec![timeline[k].valid]))
            }
            TimeBracket::Between { earlier, weight } => {
                let a = self.cached_column(&timeline[earlier], point)?;
                let b = self.cached_column(&timeline[earlier + 1], point)?;
                Ok((
                    a.blend(&b, weight),
                    vec![timeline[earlier].valid, timeline[earlier + 1].valid],
                ))
            }
        }
    }

    fn cached_column(
        &self,
        snapshot: &GridSnapshot,
        point: &GeoPoint,
    ) -> std::result::Result<Arc<Column>, InterpolationError> {
        let key = column_key(&snapshot.product, snapshot.valid, point);
        if let Some(column) = self.cache.lock().unwrap_or_else(PoisonError::into_inner).get(&key) {
            return Ok(column);
        }

        let column = Arc::new(Column::extract(snapshot, point)?);
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::clone(&column));
        Ok(column)
    }
}
