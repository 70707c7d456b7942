//! LRU cache of extracted columns.
//!
//! Extracting a column touches every field of a snapshot, while the fusion
//! tick asks for nearly the same point many times in a row. Entries are
//! tied to a store generation and dropped wholesale when the store changes.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use wx_common::{GeoPoint, ValidTime};

use crate::column::Column;
use crate::types::CacheStats;

/// Cache key: product, snapshot, and the point in units of 1e-5 degrees.
pub type ColumnKey = (String, ValidTime, i64, i64);

pub fn column_key(product: &str, valid: ValidTime, point: &GeoPoint) -> ColumnKey {
    (
        product.to_string(),
        valid,
        (point.lat * 1e5).round() as i64,
        (point.lon * 1e5).round() as i64,
    )
}

pub struct ColumnCache {
    cache: LruCache<ColumnKey, Arc<Column>>,
    generation: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl ColumnCache {
    /// Create a cache holding at most `capacity` columns (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
            generation: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Drop every entry if the store generation moved on.
    pub fn sync_generation(&mut self, generation: u64) {
        if generation != self.generation {
            self.cache.clear();
            self.generation = generation;
        }
    }

    pub fn get(&mut self, key: &ColumnKey) -> Option<Arc<Column>> {
        match self.cache.get(key) {
            Some(column) => {
                self.hits += 1;
                Some(Arc::clone(column))
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, key: ColumnKey, column: Arc<Column>) {
        if let Some((evicted, _)) = self.cache.push(key.clone(), column) {
            if evicted != key {
                self.evictions += 1;
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.cache.len(),
            evictions: self.evictions,
        }
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn valid() -> ValidTime {
        ValidTime::new(Utc.with_ymd_and_hms(2024, 3, 12, 0, 0, 0).unwrap(), 0)
    }

    fn column() -> Arc<Column> {
        Arc::new(Column {
            valid: valid(),
            levels: Vec::new(),
            surface: Default::default(),
            clouds: Vec::new(),
            model_tropopause: None,
        })
    }

    #[test]
    fn test_insert_and_get() {
        let mut cache = ColumnCache::new(4);
        let key = column_key("gfs", valid(), &GeoPoint::new(47.0, 8.0));

        assert!(cache.get(&key).is_none());
        cache.insert(key.clone(), column());
        assert!(cache.get(&key).is_some());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_nearby_points_share_a_key() {
        let a = column_key("gfs", valid(), &GeoPoint::new(47.000001, 8.0));
        let b = column_key("gfs", valid(), &GeoPoint::new(47.000002, 8.0));
        assert_eq!(a, b);
        assert_ne!(a, column_key("wafs", valid(), &GeoPoint::new(47.000001, 8.0)));
    }

    #[test]
    fn test_lru_eviction() {
        let mut cache = ColumnCache::new(2);
        for lon in 0..3 {
            cache.insert(column_key("gfs", valid(), &GeoPoint::new(0.0, lon as f64)), column());
        }
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 1);
        assert!(cache
            .get(&column_key("gfs", valid(), &GeoPoint::new(0.0, 0.0)))
            .is_none());
    }

    #[test]
    fn test_generation_change_clears() {
        let mut cache = ColumnCache::new(4);
        cache.sync_generation(1);
        cache.insert(column_key("gfs", valid(), &GeoPoint::new(0.0, 0.0)), column());

        cache.sync_generation(1);
        assert_eq!(cache.len(), 1);
        cache.sync_generation(2);
        assert!(cache.is_empty());
    }
}
