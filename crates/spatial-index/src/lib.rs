//! Nearest-neighbour lookup on the sphere.
//!
//! Entries are stored as points on the unit sphere in an R-tree. Chord
//! length between unit vectors grows monotonically with great-circle
//! distance, so a Euclidean k-nearest search in three dimensions returns
//! entries in great-circle order. The antimeridian and the poles need no
//! special handling because the embedding has no seams.
//!
//! # Example
//!
//! ```
//! use spatial_index::SpatialIndex;
//! use wx_common::GeoPoint;
//!
//! let index = SpatialIndex::build(vec![
//!     ("KDEN".to_string(), GeoPoint::new(39.86, -104.67), 1655.0),
//!     ("KCOS".to_string(), GeoPoint::new(38.81, -104.70), 1881.0),
//! ]);
//! let nearest = index.nearest(&GeoPoint::new(39.7, -104.9), 1).unwrap();
//! assert_eq!(nearest[0].id, "KDEN");
//! ```

use rstar::{PointDistance, RTree, RTreeObject, AABB};
use tracing::debug;
use wx_common::geo::{chord_to_meters, meters_to_chord};
use wx_common::{GeoPoint, IndexError, LatLonGrid};

/// Distances that round to the same millimetre are ties, broken by id.
const TIE_RESOLUTION_M: f64 = 0.001;

#[derive(Debug, Clone)]
struct Entry<K, T> {
    id: K,
    location: GeoPoint,
    xyz: [f64; 3],
    value: T,
}

impl<K, T> RTreeObject for Entry<K, T> {
    type Envelope = AABB<[f64; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.xyz)
    }
}

impl<K, T> PointDistance for Entry<K, T> {
    fn distance_2(&self, point: &[f64; 3]) -> f64 {
        let dx = self.xyz[0] - point[0];
        let dy = self.xyz[1] - point[1];
        let dz = self.xyz[2] - point[2];
        dx * dx + dy * dy + dz * dz
    }
}

/// One query result.
#[derive(Debug)]
pub struct Neighbor<'a, K, T> {
    pub id: &'a K,
    pub location: GeoPoint,
    /// Great-circle distance from the query point in meters
    pub distance_m: f64,
    pub value: &'a T,
}

impl<K, T> Neighbor<'_, K, T> {
    fn tie_key(&self) -> i64 {
        (self.distance_m / TIE_RESOLUTION_M).round() as i64
    }
}

/// Read-only k-nearest index keyed by `K` with payload `T`.
///
/// The index is rebuilt, not mutated, when the underlying set changes.
#[derive(Clone)]
pub struct SpatialIndex<K, T> {
    tree: RTree<Entry<K, T>>,
}

impl<K, T> Default for SpatialIndex<K, T> {
    fn default() -> Self {
        Self { tree: RTree::new() }
    }
}

impl<K, T> std::fmt::Debug for SpatialIndex<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("entries", &self.tree.size())
            .finish()
    }
}

impl<K: Ord, T> SpatialIndex<K, T> {
    /// Bulk-load an index from `(id, location, payload)` triples.
    pub fn build(entries: impl IntoIterator<Item = (K, GeoPoint, T)>) -> Self {
        let entries: Vec<Entry<K, T>> = entries
            .into_iter()
            .map(|(id, location, value)| {
                let location = GeoPoint::new(location.lat, location.lon);
                Entry {
                    id,
                    xyz: location.to_unit_vector(),
                    location,
                    value,
                }
            })
            .collect();

        debug!(entries = entries.len(), "Built spatial index");
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// The `k` entries closest to `point`, nearest first.
    ///
    /// Entries at equal distance are ordered by ascending id, so the result
    /// is deterministic even when several stations share a position.
    pub fn nearest(&self, point: &GeoPoint, k: usize) -> Result<Vec<Neighbor<'_, K, T>>, IndexError> {
        if self.is_empty() {
            return Err(IndexError::Empty);
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let query = point.to_unit_vector();
        let mut candidates: Vec<Neighbor<'_, K, T>> = Vec::with_capacity(k + 1);

        for (entry, d2) in self.tree.nearest_neighbor_iter_with_distance_2(&query) {
            let distance_m = chord_to_meters(d2.sqrt());
            // Keep collecting past k while the distance still ties with the k-th
            if candidates.len() >= k && distance_m > candidates[k - 1].distance_m + TIE_RESOLUTION_M {
                break;
            }
            candidates.push(Neighbor {
                id: &entry.id,
                location: entry.location,
                distance_m,
                value: &entry.value,
            });
        }

        sort_neighbors(&mut candidates);
        candidates.truncate(k);
        Ok(candidates)
    }

    /// Like [`nearest`](Self::nearest), dropping results beyond `max_distance_m`.
    pub fn nearest_within(
        &self,
        point: &GeoPoint,
        k: usize,
        max_distance_m: f64,
    ) -> Result<Vec<Neighbor<'_, K, T>>, IndexError> {
        let mut found = self.nearest(point, k)?;
        found.retain(|n| n.distance_m <= max_distance_m);
        Ok(found)
    }

    /// Every entry within `radius_m` of `point`, nearest first.
    pub fn within_radius(&self, point: &GeoPoint, radius_m: f64) -> Vec<Neighbor<'_, K, T>> {
        let query = point.to_unit_vector();
        let chord = meters_to_chord(radius_m);

        let mut found: Vec<Neighbor<'_, K, T>> = self
            .tree
            .locate_within_distance(query, chord * chord)
            .map(|entry| Neighbor {
                id: &entry.id,
                location: entry.location,
                distance_m: chord_to_meters(entry.distance_2(&query).sqrt()),
                value: &entry.value,
            })
            .collect();
        sort_neighbors(&mut found);
        found
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &GeoPoint, &T)> {
        self.tree.iter().map(|e| (&e.id, &e.location, &e.value))
    }
}

impl SpatialIndex<(usize, usize), usize> {
    /// Index the points of a regular grid. Ids are `(row, column)` and the
    /// payload is the flat offset into the grid's values.
    pub fn from_grid(grid: &LatLonGrid) -> Self {
        let points = (0..grid.nj).flat_map(|j| {
            (0..grid.ni).map(move |i| {
                (
                    (j, i),
                    GeoPoint::new(grid.lat_at(j), grid.lon_at(i)),
                    grid.index(i, j),
                )
            })
        });
        Self::build(points)
    }
}

fn sort_neighbors<K: Ord, T>(neighbors: &mut [Neighbor<'_, K, T>]) {
    neighbors.sort_by(|a, b| a.tie_key().cmp(&b.tie_key()).then_with(|| a.id.cmp(b.id)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(id: &str, lat: f64, lon: f64) -> (String, GeoPoint, ()) {
        (id.to_string(), GeoPoint::new(lat, lon), ())
    }

    #[test]
    fn test_empty_index() {
        let index: SpatialIndex<String, ()> = SpatialIndex::default();
        assert!(index.is_empty());
        assert_eq!(index.nearest(&GeoPoint::new(0.0, 0.0), 1).unwrap_err(), IndexError::Empty);
    }

    #[test]
    fn test_zero_k() {
        let index = SpatialIndex::build(vec![station("AAAA", 0.0, 0.0)]);
        assert!(index.nearest(&GeoPoint::new(0.0, 0.0), 0).unwrap().is_empty());
    }

    #[test]
    fn test_ties_broken_by_id() {
        let index = SpatialIndex::build(vec![
            station("ZZZZ", 10.0, 10.0),
            station("MMMM", 10.0, 10.0),
            station("AAAA", 10.0, 10.0),
        ]);
        let found = index.nearest(&GeoPoint::new(11.0, 10.0), 2).unwrap();
        let ids: Vec<&str> = found.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["AAAA", "MMMM"]);
    }

    #[test]
    fn test_ties_at_mirrored_positions() {
        // Equidistant north and south of the query
        let index = SpatialIndex::build(vec![station("SOUTH", -1.0, 20.0), station("NORTH", 1.0, 20.0)]);
        let found = index.nearest(&GeoPoint::new(0.0, 20.0), 1).unwrap();
        assert_eq!(found[0].id, "NORTH");
    }

    #[test]
    fn test_distance_matches_haversine() {
        let a = GeoPoint::new(51.47, -0.45);
        let b = GeoPoint::new(49.01, 2.55);
        let index = SpatialIndex::build(vec![("LFPG".to_string(), b, ())]);
        let found = index.nearest(&a, 1).unwrap();
        assert!((found[0].distance_m - a.distance_to(&b)).abs() < 1.0);
    }
}
