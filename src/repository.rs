//! Route repository abstraction.
//!
//! Storage is append-only: records are inserted once, keyed by activity ID,
//! and never updated or deleted. The uniqueness of `activity_id` is the only
//! concurrency control; inserting an existing ID is a silent no-op.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::cluster::{ClusterConfig, RouteCluster, cluster_routes};
use crate::error::{RideError, Result};
use crate::{ElevationRange, RouteRecord};

/// Persistence collaborator for stored routes.
pub trait RouteRepository: Send + Sync {
    /// Subset of `candidate_ids` already stored.
    fn find_existing_ids(&self, candidate_ids: &HashSet<i64>) -> Result<HashSet<i64>>;

    /// Unordered bulk insert. Records whose `activity_id` already exists are
    /// skipped without error. Returns the number of records actually added.
    fn insert_new(&self, records: &[RouteRecord]) -> Result<usize>;

    /// Routes with elevation inside `range` (inclusive), in insertion order.
    fn find_by_elevation_range(&self, range: ElevationRange) -> Result<Vec<RouteRecord>>;

    /// Popular route buckets. Must match [`cluster_routes`] over all stored
    /// routes in insertion order. An invalid `config` fails with `InvalidInput`.
    fn aggregate_by_similarity(&self, config: &ClusterConfig) -> Result<Vec<RouteCluster>> {
        config.validate()?;
        let routes = self.find_by_elevation_range(ElevationRange::any())?;
        Ok(cluster_routes(&routes, config))
    }
}

/// In-memory repository, used for tests and embedding without a database.
#[derive(Debug, Default)]
pub struct MemoryRouteStore {
    inner: RwLock<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    routes: Vec<RouteRecord>,
    by_id: HashMap<i64, usize>,
}

impl MemoryRouteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|s| s.routes.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned(operation: &'static str) -> RideError {
    RideError::storage(operation, "route store lock poisoned")
}

impl RouteRepository for MemoryRouteStore {
    fn find_existing_ids(&self, candidate_ids: &HashSet<i64>) -> Result<HashSet<i64>> {
        let state = self
            .inner
            .read()
            .map_err(|_| poisoned("find_existing_ids"))?;
        Ok(candidate_ids
            .iter()
            .filter(|id| state.by_id.contains_key(*id))
            .copied()
            .collect())
    }

    fn insert_new(&self, records: &[RouteRecord]) -> Result<usize> {
        let mut state = self.inner.write().map_err(|_| poisoned("insert_new"))?;
        let mut inserted = 0;
        for record in records {
            if state.by_id.contains_key(&record.activity_id) {
                continue;
            }
            let position = state.routes.len();
            state.by_id.insert(record.activity_id, position);
            state.routes.push(record.clone());
            inserted += 1;
        }
        Ok(inserted)
    }

    fn find_by_elevation_range(&self, range: ElevationRange) -> Result<Vec<RouteRecord>> {
        let state = self
            .inner
            .read()
            .map_err(|_| poisoned("find_by_elevation_range"))?;
        Ok(state
            .routes
            .iter()
            .filter(|r| range.contains(r.elevation))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(activity_id: i64, distance: f64, elevation: f64) -> RouteRecord {
        RouteRecord {
            activity_id,
            distance,
            elevation,
            duration: 1800,
            coordinates: "_p~iF~ps|U".to_string(),
            date: None,
            activity_type: "Ride".to_string(),
        }
    }

    #[test]
    fn test_insert_skips_duplicates() {
        let store = MemoryRouteStore::new();
        let inserted = store
            .insert_new(&[route(1, 1000.0, 10.0), route(2, 2000.0, 20.0)])
            .unwrap();
        assert_eq!(inserted, 2);

        // Existing ID and an in-batch repeat are both ignored
        let inserted = store
            .insert_new(&[
                route(2, 2500.0, 25.0),
                route(3, 3000.0, 30.0),
                route(3, 3100.0, 31.0),
            ])
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(store.len(), 3);

        let stored = store.find_by_elevation_range(ElevationRange::any()).unwrap();
        assert_eq!(stored[1].distance, 2000.0);
        assert_eq!(stored[2].distance, 3000.0);
    }

    #[test]
    fn test_find_existing_ids() {
        let store = MemoryRouteStore::new();
        store
            .insert_new(&[route(1, 1000.0, 10.0), route(5, 2000.0, 20.0)])
            .unwrap();

        let candidates: HashSet<i64> = [1, 2, 5, 9].into_iter().collect();
        let existing = store.find_existing_ids(&candidates).unwrap();
        assert_eq!(existing, [1, 5].into_iter().collect());
    }

    #[test]
    fn test_elevation_range_query() {
        let store = MemoryRouteStore::new();
        store
            .insert_new(&[
                route(1, 1000.0, 50.0),
                route(2, 1000.0, 100.0),
                route(3, 1000.0, 150.0),
                route(4, 1000.0, 200.0),
            ])
            .unwrap();

        let ids = |range| -> Vec<i64> {
            store
                .find_by_elevation_range(range)
                .unwrap()
                .iter()
                .map(|r| r.activity_id)
                .collect()
        };

        assert_eq!(ids(ElevationRange::new(Some(100.0), Some(150.0))), vec![2, 3]);
        assert_eq!(ids(ElevationRange::new(Some(150.0), None)), vec![3, 4]);
        assert_eq!(ids(ElevationRange::new(None, Some(50.0))), vec![1]);
        assert_eq!(ids(ElevationRange::any()), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_default_aggregate_uses_clusterer() {
        let store = MemoryRouteStore::new();
        store
            .insert_new(&[
                route(1, 1400.0, 60.0),
                route(2, 1450.0, 55.0),
                route(3, 9000.0, 500.0),
            ])
            .unwrap();

        let clusters = store.aggregate_by_similarity(&ClusterConfig::default()).unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].count, 2);
        assert_eq!(clusters[0].representative.activity_id, 1);
    }

    #[test]
    fn test_default_aggregate_validates_config() {
        let store = MemoryRouteStore::new();
        store.insert_new(&[route(1, 1400.0, 60.0)]).unwrap();

        let config = ClusterConfig {
            elevation_tolerance: 0.0,
            ..ClusterConfig::default()
        };
        let err = store.aggregate_by_similarity(&config).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidInput);
    }
}
