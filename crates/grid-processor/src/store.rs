//! Published forecast snapshots.
//!
//! The store is a single-writer, multi-reader structure. Writers build a new
//! [`StoreState`] and swap it in; readers take an `Arc` to the current state
//! and keep a consistent view for as long as they hold it, even while newer
//! cycles are published or old ones evicted.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use wx_common::GridSnapshot;

use crate::config::InterpolationConfig;
use crate::error::{GridProcessorError, Result};

/// An immutable view of every published snapshot.
#[derive(Debug, Default)]
pub struct StoreState {
    /// Per product, ordered by valid time then reference time
    products: HashMap<String, Vec<Arc<GridSnapshot>>>,
    generation: u64,
}

impl StoreState {
    /// Incremented by every change to the store.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_empty(&self) -> bool {
        self.products.values().all(|s| s.is_empty())
    }

    pub fn products(&self) -> impl Iterator<Item = &str> {
        self.products.keys().map(|k| k.as_str())
    }

    /// Every retained snapshot of a product, including superseded cycles.
    pub fn snapshots(&self, product: &str) -> &[Arc<GridSnapshot>] {
        self.products.get(product).map(|s| s.as_slice()).unwrap_or(&[])
    }

    /// One snapshot per valid time, from the newest cycle that has it,
    /// ordered by valid time.
    pub fn timeline(&self, product: &str) -> Vec<Arc<GridSnapshot>> {
        let mut timeline: Vec<Arc<GridSnapshot>> = Vec::new();
        for snapshot in self.snapshots(product) {
            match timeline.last_mut() {
                // Same valid time: sorted by reference time, so the later one wins
                Some(last) if last.valid_time() == snapshot.valid_time() => *last = Arc::clone(snapshot),
                _ => timeline.push(Arc::clone(snapshot)),
            }
        }
        timeline
    }

    pub fn len(&self) -> usize {
        self.products.values().map(|s| s.len()).sum()
    }
}

/// What [`SnapshotStore::publish`] did with a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Swapped into the store
    Published { generation: u64 },
    /// Its cycle is older than every retained cycle; the store is unchanged
    Superseded,
}

/// Owned store of decoded snapshots with newest-N-cycles retention.
#[derive(Debug)]
pub struct SnapshotStore {
    state: RwLock<Arc<StoreState>>,
    max_cycles: usize,
    staleness: Duration,
}

impl SnapshotStore {
    pub fn new(config: &InterpolationConfig) -> Self {
        Self::with_policy(config.max_cycles, config.staleness())
    }

    pub fn with_policy(max_cycles: usize, staleness: Duration) -> Self {
        Self {
            state: RwLock::new(Arc::new(StoreState::default())),
            max_cycles: max_cycles.max(1),
            staleness,
        }
    }

    /// The current state. Cheap; holds no lock after returning.
    pub fn current(&self) -> Arc<StoreState> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn generation(&self) -> u64 {
        self.current().generation
    }

    /// Publish a decoded snapshot.
    ///
    /// A snapshot with the same product, cycle and forecast hour replaces the
    /// earlier one. The newest `max_cycles` cycles of each product are
    /// retained. An older cycle is retired once the retained cycles cover its
    /// valid times; its snapshots valid past their last forecast hour stay
    /// until they are covered too. A snapshot that would be retired at once
    /// leaves the store unchanged and is reported as
    /// [`PublishOutcome::Superseded`].
    pub fn publish(&self, snapshot: GridSnapshot) -> Result<PublishOutcome> {
        if snapshot.field_count() == 0 {
            return Err(GridProcessorError::invalid_snapshot(format!(
                "{} {} holds no fields",
                snapshot.product, snapshot.valid
            )));
        }

        let product = snapshot.product.clone();
        let valid = snapshot.valid;
        let snapshot = Arc::new(snapshot);

        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let mut products = guard.products.clone();
        let list = products.entry(product.clone()).or_default();

        list.retain(|s| s.valid != valid);
        list.push(Arc::clone(&snapshot));
        list.sort_by_key(|s| (s.valid_time(), s.reference_time()));

        let before = list.len();
        let cycles: BTreeSet<DateTime<Utc>> = list.iter().map(|s| s.reference_time()).collect();
        let excess_cycles = cycles.len().saturating_sub(self.max_cycles);
        if let Some(&oldest_kept) = cycles.iter().nth(excess_cycles) {
            let covered_until = list
                .iter()
                .filter(|s| s.reference_time() >= oldest_kept)
                .map(|s| s.valid_time())
                .max();
            list.retain(|s| {
                s.reference_time() >= oldest_kept || covered_until.map_or(true, |end| s.valid_time() > end)
            });
        }
        let retired = before - list.len();

        if !list.iter().any(|s| Arc::ptr_eq(s, &snapshot)) {
            drop(guard);
            info!(
                product = %product,
                valid = %valid,
                "Dropped snapshot from a superseded cycle"
            );
            metrics::counter!("wx_snapshots_superseded_total").increment(1);
            return Ok(PublishOutcome::Superseded);
        }
        let retained = list.len();

        let generation = guard.generation + 1;
        *guard = Arc::new(StoreState {
            products,
            generation,
        });
        drop(guard);

        if retired > 0 {
            debug!(product = %product, retired, "Retired covered forecast hours of old cycles");
        }
        info!(
            product = %product,
            valid = %valid,
            retained,
            generation,
            "Published snapshot"
        );
        metrics::counter!("wx_snapshots_published_total").increment(1);
        Ok(PublishOutcome::Published { generation })
    }

    /// Remove snapshots valid more than the staleness bound before `now`.
    ///
    /// Returns the number of snapshots removed.
    pub fn evict_stale(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.staleness;

        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let mut products = guard.products.clone();
        let mut removed = 0;
        for list in products.values_mut() {
            let before = list.len();
            list.retain(|s| s.valid_time() >= cutoff);
            removed += before - list.len();
        }
        products.retain(|_, list| !list.is_empty());

        if removed > 0 {
            let generation = guard.generation + 1;
            *guard = Arc::new(StoreState {
                products,
                generation,
            });
            info!(removed, cutoff = %cutoff, "Evicted stale snapshots");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use test_utils::SyntheticAtmosphere;
    use wx_common::{LatLonGrid, ValidTime};

    fn cycle(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 12, hour, 0, 0).unwrap()
    }

    fn snapshot(product: &str, reference: DateTime<Utc>, fh: u32) -> GridSnapshot {
        SyntheticAtmosphere::standard().build(product, ValidTime::new(reference, fh), LatLonGrid::global(30.0))
    }

    fn store() -> SnapshotStore {
        SnapshotStore::with_policy(2, Duration::hours(12))
    }

    #[test]
    fn test_publish_bumps_generation() {
        let store = store();
        assert_eq!(store.generation(), 0);
        store.publish(snapshot("gfs", cycle(0), 0)).unwrap();
        store.publish(snapshot("gfs", cycle(0), 3)).unwrap();

        let state = store.current();
        assert_eq!(state.generation(), 2);
        assert_eq!(state.timeline("gfs").len(), 2);
        assert!(state.timeline("wafs").is_empty());
    }

    #[test]
    fn test_republish_replaces() {
        let store = store();
        store.publish(snapshot("gfs", cycle(0), 3)).unwrap();
        store.publish(snapshot("gfs", cycle(0), 3)).unwrap();
        assert_eq!(store.current().snapshots("gfs").len(), 1);
    }

    #[test]
    fn test_keeps_newest_cycles() {
        let store = store();
        for hour in [0, 6, 12] {
            store.publish(snapshot("gfs", cycle(hour), 0)).unwrap();
        }
        let state = store.current();
        let cycles: Vec<_> = state.snapshots("gfs").iter().map(|s| s.reference_time()).collect();
        assert_eq!(cycles, vec![cycle(6), cycle(12)]);
    }

    #[test]
    fn test_older_cycle_is_superseded() {
        let store = store();
        store.publish(snapshot("gfs", cycle(6), 0)).unwrap();
        store.publish(snapshot("gfs", cycle(12), 0)).unwrap();
        let generation = store.generation();

        let outcome = store.publish(snapshot("gfs", cycle(0), 12)).unwrap();
        assert_eq!(outcome, PublishOutcome::Superseded);
        assert_eq!(store.generation(), generation);
        let cycles: Vec<_> = store.current().snapshots("gfs").iter().map(|s| s.reference_time()).collect();
        assert_eq!(cycles, vec![cycle(6), cycle(12)]);

        // Within the retained window an older cycle is still accepted
        let outcome = store.publish(snapshot("gfs", cycle(6), 3)).unwrap();
        assert_eq!(outcome, PublishOutcome::Published { generation: generation + 1 });
    }

    #[test]
    fn test_old_cycle_kept_until_covered() {
        let store = store();
        store.publish(snapshot("gfs", cycle(0), 0)).unwrap();
        store.publish(snapshot("gfs", cycle(0), 24)).unwrap();
        store.publish(snapshot("gfs", cycle(6), 0)).unwrap();
        store.publish(snapshot("gfs", cycle(12), 0)).unwrap();

        // 00z+24 is past everything the newer cycles hold
        let held: Vec<_> = store
            .current()
            .snapshots("gfs")
            .iter()
            .map(|s| (s.reference_time(), s.valid.forecast_hour))
            .collect();
        assert_eq!(held, vec![(cycle(6), 0), (cycle(12), 0), (cycle(0), 24)]);

        // Once 12z reaches that valid time the old cycle is gone
        store.publish(snapshot("gfs", cycle(12), 12)).unwrap();
        let state = store.current();
        assert!(state.snapshots("gfs").iter().all(|s| s.reference_time() >= cycle(6)));
        assert_eq!(state.timeline("gfs").last().unwrap().reference_time(), cycle(12));
    }

    #[test]
    fn test_timeline_prefers_newest_cycle() {
        let store = store();
        // 00z+6 and 06z+0 are both valid at 06z
        store.publish(snapshot("gfs", cycle(0), 6)).unwrap();
        store.publish(snapshot("gfs", cycle(6), 0)).unwrap();
        store.publish(snapshot("gfs", cycle(0), 3)).unwrap();

        let timeline = store.current().timeline("gfs");
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[0].valid_time(), cycle(3));
        assert_eq!(timeline[1].reference_time(), cycle(6));
    }

    #[test]
    fn test_readers_keep_their_view() {
        let store = store();
        store.publish(snapshot("gfs", cycle(0), 0)).unwrap();
        let before = store.current();

        store.publish(snapshot("gfs", cycle(0), 3)).unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(store.current().len(), 2);
    }

    #[test]
    fn test_evict_stale() {
        let store = store();
        store.publish(snapshot("gfs", cycle(0), 0)).unwrap();
        store.publish(snapshot("gfs", cycle(0), 12)).unwrap();
        let generation = store.generation();

        assert_eq!(store.evict_stale(cycle(0) + Duration::hours(13)), 1);
        assert_eq!(store.generation(), generation + 1);
        assert_eq!(store.evict_stale(cycle(0) + Duration::hours(13)), 0);
        assert_eq!(store.generation(), generation + 1);
    }

    #[test]
    fn test_rejects_empty_snapshot() {
        let store = store();
        let empty = GridSnapshot::new("gfs", ValidTime::new(cycle(0), 0), LatLonGrid::global(30.0));
        assert!(store.publish(empty).is_err());
        assert_eq!(store.generation(), 0);
    }
}
