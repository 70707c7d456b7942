//! Store of the latest report per station.
//!
//! Like the snapshot store, readers take an `Arc` to an immutable set and
//! writers swap in a rebuilt one. Each set carries its own spatial index.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use metar_parser::{write_rwx_file, FeedBatch, FeedError, ObservationRecord};
use spatial_index::SpatialIndex;
use tracing::{debug, info, warn};
use wx_common::GeoPoint;

use crate::config::FusionConfig;

/// An immutable set of located reports, one per station.
#[derive(Debug, Default)]
pub struct ObservationSet {
    records: HashMap<String, Arc<ObservationRecord>>,
    index: SpatialIndex<String, Arc<ObservationRecord>>,
    generation: u64,
}

impl ObservationSet {
    fn build(records: HashMap<String, Arc<ObservationRecord>>, generation: u64) -> Self {
        let index = SpatialIndex::build(records.iter().filter_map(|(id, record)| {
            Some((id.clone(), record.location?, Arc::clone(record)))
        }));
        Self {
            records,
            index,
            generation,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, station: &str) -> Option<&Arc<ObservationRecord>> {
        self.records.get(station)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records ordered by station id.
    pub fn sorted(&self) -> Vec<&ObservationRecord> {
        let mut records: Vec<&ObservationRecord> = self.records.values().map(|r| r.as_ref()).collect();
        records.sort_by(|a, b| a.station.cmp(&b.station));
        records
    }
}

/// The nearest usable report.
#[derive(Debug, Clone)]
pub struct NearestObservation {
    pub record: Arc<ObservationRecord>,
    pub distance_m: f64,
}

/// Counts from one ingest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub accepted: usize,
    /// Older than the report already held for the station
    pub outdated: usize,
    /// Dropped by configuration, or carrying no data or position
    pub filtered: usize,
}

pub struct ObservationStore {
    state: RwLock<Arc<ObservationSet>>,
    max_age: Duration,
    max_distance_m: f64,
    ignore_stations: HashSet<String>,
    ignore_auto: bool,
}

impl ObservationStore {
    pub fn new(config: &FusionConfig) -> Self {
        Self {
            state: RwLock::new(Arc::new(ObservationSet::default())),
            max_age: config.max_observation_age(),
            max_distance_m: config.max_observation_distance_m,
            ignore_stations: config
                .ignore_stations
                .iter()
                .map(|s| s.to_uppercase())
                .collect(),
            ignore_auto: config.ignore_auto,
        }
    }

    /// The current set. Cheap; holds no lock after returning.
    pub fn current(&self) -> Arc<ObservationSet> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn generation(&self) -> u64 {
        self.current().generation
    }

    /// Record the outcome of a decoded feed and ingest its reports.
    pub fn ingest_batch(&self, batch: FeedBatch) -> IngestSummary {
        metrics::counter!("wx_reports_decoded_total").increment(batch.records.len() as u64);
        metrics::counter!("wx_reports_rejected_total").increment(batch.rejected.len() as u64);
        if let Some((text, error)) = batch.rejected.first() {
            warn!(
                rejected = batch.rejected.len(),
                first = %text,
                error = %error,
                "Dropped undecodable reports"
            );
        }
        self.ingest(batch.records)
    }

    /// Add reports. A report replaces the one held for its station unless
    /// it is older.
    pub fn ingest(&self, records: impl IntoIterator<Item = ObservationRecord>) -> IngestSummary {
        let mut summary = IngestSummary::default();

        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let mut map = guard.records.clone();

        for record in records {
            if !self.accepts(&record) {
                summary.filtered += 1;
                continue;
            }
            match map.get(&record.station) {
                Some(held) if held.observed_at > record.observed_at => summary.outdated += 1,
                _ => {
                    map.insert(record.station.clone(), Arc::new(record));
                    summary.accepted += 1;
                }
            }
        }

        if summary.accepted > 0 {
            let generation = guard.generation + 1;
            *guard = Arc::new(ObservationSet::build(map, generation));
            info!(
                accepted = summary.accepted,
                outdated = summary.outdated,
                filtered = summary.filtered,
                stations = guard.len(),
                "Ingested observations"
            );
        }
        summary
    }

    fn accepts(&self, record: &ObservationRecord) -> bool {
        if record.location.is_none() || !record.has_data() {
            return false;
        }
        if self.ignore_auto && record.auto {
            debug!(station = %record.station, "Ignoring automated report");
            return false;
        }
        !self.ignore_stations.contains(&record.station)
    }

    /// Remove reports older than the maximum age at `now`.
    pub fn evict_stale(&self, now: DateTime<Utc>) -> usize {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let mut map = guard.records.clone();
        let before = map.len();
        map.retain(|_, record| !record.is_stale(now, self.max_age));
        let removed = before - map.len();

        if removed > 0 {
            let generation = guard.generation + 1;
            *guard = Arc::new(ObservationSet::build(map, generation));
            info!(removed, "Evicted stale observations");
        }
        removed
    }

    /// The closest report within the maximum distance that is not stale at
    /// `now`. Stale reports are skipped, never used.
    pub fn nearest(&self, point: &GeoPoint, now: DateTime<Utc>) -> Option<NearestObservation> {
        let set = self.current();
        set.index
            .within_radius(point, self.max_distance_m)
            .into_iter()
            .find(|n| !n.value.is_stale(now, self.max_age))
            .map(|n| NearestObservation {
                record: Arc::clone(n.value),
                distance_m: n.distance_m,
            })
    }

    /// Write every held report to the legacy `METAR.rwx` file.
    pub fn write_legacy(&self, path: &Path) -> Result<usize, FeedError> {
        let set = self.current();
        write_rwx_file(path, set.sorted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use metar_parser::decode_report;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 12, 17, 0, 0).unwrap()
    }

    fn record(text: &str, lat: f64, lon: f64) -> ObservationRecord {
        let mut record = decode_report(text, now()).unwrap();
        record.location = Some(GeoPoint::new(lat, lon));
        record.elevation_m = Some(100.0);
        record
    }

    fn store() -> ObservationStore {
        ObservationStore::new(&FusionConfig::default())
    }

    #[test]
    fn test_newer_report_supersedes() {
        let store = store();
        store.ingest([record("KAAA 121600Z 27010KT 10SM CLR 15/05 A2992", 40.0, -100.0)]);
        store.ingest([record("KAAA 121650Z 28012KT 10SM CLR 16/05 A2991", 40.0, -100.0)]);
        let summary = store.ingest([record("KAAA 121620Z 29014KT 10SM CLR 15/05 A2992", 40.0, -100.0)]);

        assert_eq!(summary.outdated, 1);
        let set = store.current();
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("KAAA").unwrap().temperature_c, Some(16.0));
    }

    #[test]
    fn test_filters() {
        let config = FusionConfig {
            ignore_stations: vec!["kbbb".to_string()],
            ignore_auto: true,
            ..Default::default()
        };
        let store = ObservationStore::new(&config);

        let mut unlocated = record("KCCC 121650Z 27010KT 10SM CLR 15/05 A2992", 0.0, 0.0);
        unlocated.location = None;
        let summary = store.ingest([
            record("KBBB 121650Z 27010KT 10SM CLR 15/05 A2992", 40.0, -100.0),
            record("KDDD 121650Z AUTO 27010KT 10SM CLR 15/05 A2992", 40.0, -100.0),
            record("KEEE 121650Z NIL", 40.0, -100.0),
            unlocated,
        ]);

        assert_eq!(summary.filtered, 4);
        assert_eq!(summary.accepted, 0);
        assert!(store.current().is_empty());
        assert_eq!(store.generation(), 0);
    }

    #[test]
    fn test_nearest_skips_stale_and_distant() {
        let store = store();
        store.ingest([
            // 10 km away but three hours old
            record("KOLD 121400Z 27010KT 10SM CLR 15/05 A2992", 40.09, -100.0),
            // 50 km away, fresh
            record("KNEW 121650Z 27010KT 10SM CLR 15/05 A2992", 40.45, -100.0),
            // 300 km away
            record("KFAR 121650Z 27010KT 10SM CLR 15/05 A2992", 42.7, -100.0),
        ]);

        let nearest = store.nearest(&GeoPoint::new(40.0, -100.0), now()).unwrap();
        assert_eq!(nearest.record.station, "KNEW");
        assert!((nearest.distance_m - 50_000.0).abs() < 1000.0);

        assert!(store.nearest(&GeoPoint::new(45.0, -100.0), now()).is_none());
    }

    #[test]
    fn test_empty_store_has_no_nearest() {
        assert!(store().nearest(&GeoPoint::new(0.0, 0.0), now()).is_none());
    }

    #[test]
    fn test_evict_stale() {
        let store = store();
        store.ingest([
            record("KOLD 121400Z 27010KT 10SM CLR 15/05 A2992", 40.0, -100.0),
            record("KNEW 121650Z 27010KT 10SM CLR 15/05 A2992", 41.0, -100.0),
        ]);
        assert_eq!(store.evict_stale(now()), 1);
        assert_eq!(store.evict_stale(now()), 0);
        assert!(store.current().get("KNEW").is_some());
    }

    #[test]
    fn test_write_legacy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("METAR.rwx");
        let store = store();
        store.ingest([
            record("KZZZ 121650Z 27010KT 10SM CLR 15/05 A2992", 40.0, -100.0),
            record("KAAA 121650Z 27010KT 10SM CLR 15/05 A2992", 41.0, -100.0),
        ]);

        assert_eq!(store.write_legacy(&path).unwrap(), 2);
        let text = std::fs::read_to_string(&path).unwrap();
        let stations: Vec<&str> = text.lines().map(|l| &l[..4]).collect();
        assert_eq!(stations, vec!["KAAA", "KZZZ"]);
    }
}
