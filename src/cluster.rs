//! Popular route detection.
//!
//! Rides are bucketed by flooring their distance and elevation gain to fixed
//! tolerances. Rides sharing a bucket count as the same route; buckets with
//! more than one ride are ranked by size.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{RideError, Result};
use crate::RouteRecord;

/// Configuration for popular route bucketing.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterConfig {
    /// Distance bucket width in meters.
    /// Default: 1000.0
    pub distance_tolerance: f64,

    /// Elevation bucket width in meters.
    /// Default: 50.0
    pub elevation_tolerance: f64,

    /// Smallest bucket reported as popular.
    /// Default: 2
    pub min_count: u32,

    /// Maximum number of buckets returned.
    /// Default: 10
    pub limit: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            distance_tolerance: 1000.0,
            elevation_tolerance: 50.0,
            min_count: 2,
            limit: 10,
        }
    }
}

impl ClusterConfig {
    /// Tolerances must be finite and positive.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("distance_tolerance", self.distance_tolerance),
            ("elevation_tolerance", self.elevation_tolerance),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(RideError::InvalidInput {
                    message: format!("{} must be a positive number, got {}", name, value),
                });
            }
        }
        Ok(())
    }
}

/// Tolerance-floored `(distance, elevation)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketKey {
    pub normalized_distance: f64,
    pub normalized_elevation: f64,
}

impl BucketKey {
    pub fn for_route(route: &RouteRecord, config: &ClusterConfig) -> Self {
        Self {
            normalized_distance: floor_to(route.distance, config.distance_tolerance),
            normalized_elevation: floor_to(route.elevation, config.elevation_tolerance),
        }
    }

    /// Ascending by distance bucket, then elevation bucket.
    fn cmp_key(&self, other: &Self) -> std::cmp::Ordering {
        self.normalized_distance
            .total_cmp(&other.normalized_distance)
            .then(self.normalized_elevation.total_cmp(&other.normalized_elevation))
    }

    // f64 is not Hash; bucket values are exact multiples so bit patterns are stable
    fn hash_key(&self) -> (u64, u64) {
        (
            self.normalized_distance.to_bits(),
            self.normalized_elevation.to_bits(),
        )
    }
}

/// `value - (value mod tolerance)`. Values are non-negative and the tolerance
/// has passed [`ClusterConfig::validate`].
fn floor_to(value: f64, tolerance: f64) -> f64 {
    value - value % tolerance
}

/// A bucket of similar rides.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteCluster {
    pub key: BucketKey,
    pub count: u32,
    /// First ride encountered in the bucket
    pub representative: RouteRecord,
}

/// Group routes into popular buckets.
///
/// Buckets smaller than `min_count` are dropped. The rest are ordered by count
/// descending; equal counts are ordered by bucket key ascending so results are
/// deterministic. At most `limit` buckets are returned. The representative of
/// each bucket is its first member in input order.
///
/// `config` is expected to be valid; repositories check it with
/// [`ClusterConfig::validate`] before aggregating.
pub fn cluster_routes(routes: &[RouteRecord], config: &ClusterConfig) -> Vec<RouteCluster> {
    let mut index: HashMap<(u64, u64), usize> = HashMap::new();
    let mut clusters: Vec<RouteCluster> = Vec::new();

    for route in routes {
        let key = BucketKey::for_route(route, config);
        match index.get(&key.hash_key()) {
            Some(&i) => clusters[i].count += 1,
            None => {
                index.insert(key.hash_key(), clusters.len());
                clusters.push(RouteCluster {
                    key,
                    count: 1,
                    representative: route.clone(),
                });
            }
        }
    }

    clusters.retain(|c| c.count >= config.min_count);
    clusters.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp_key(&b.key)));
    clusters.truncate(config.limit);
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(activity_id: i64, distance: f64, elevation: f64) -> RouteRecord {
        RouteRecord {
            activity_id,
            distance,
            elevation,
            duration: 3600,
            coordinates: "_p~iF~ps|U".to_string(),
            date: None,
            activity_type: "Ride".to_string(),
        }
    }

    #[test]
    fn test_validate_rejects_non_positive_tolerances() {
        assert!(ClusterConfig::default().validate().is_ok());

        for (distance_tolerance, elevation_tolerance) in [
            (0.0, 50.0),
            (1000.0, -5.0),
            (f64::NAN, 50.0),
            (1000.0, f64::INFINITY),
        ] {
            let config = ClusterConfig {
                distance_tolerance,
                elevation_tolerance,
                ..ClusterConfig::default()
            };
            let err = config.validate().unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::InvalidInput);
        }
    }

    #[test]
    fn test_bucket_key_floors() {
        let config = ClusterConfig::default();
        let key = BucketKey::for_route(&route(1, 1450.0, 55.0), &config);
        assert_eq!(key.normalized_distance, 1000.0);
        assert_eq!(key.normalized_elevation, 50.0);

        let key = BucketKey::for_route(&route(2, 2000.0, 49.9), &config);
        assert_eq!(key.normalized_distance, 2000.0);
        assert_eq!(key.normalized_elevation, 0.0);
    }

    #[test]
    fn test_similar_routes_grouped() {
        let routes = vec![
            route(1, 500.0, 10.0),
            route(2, 1400.0, 60.0),
            route(3, 1450.0, 55.0),
            route(4, 9000.0, 500.0),
        ];

        let clusters = cluster_routes(&routes, &ClusterConfig::default());

        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].count, 2);
        assert_eq!(clusters[0].key.normalized_distance, 1000.0);
        assert_eq!(clusters[0].key.normalized_elevation, 50.0);
        assert_eq!(clusters[0].representative.activity_id, 2);
    }

    #[test]
    fn test_singletons_excluded() {
        let routes = vec![route(1, 500.0, 10.0), route(2, 9000.0, 500.0)];
        assert!(cluster_routes(&routes, &ClusterConfig::default()).is_empty());
        assert!(cluster_routes(&[], &ClusterConfig::default()).is_empty());
    }

    #[test]
    fn test_top_n_ordered_by_count() {
        // 12 buckets; bucket i (0-based) holds i + 2 rides
        let mut routes = Vec::new();
        let mut id = 0;
        for bucket in 0..12 {
            for _ in 0..(bucket + 2) {
                id += 1;
                routes.push(route(id, bucket as f64 * 1000.0 + 100.0, 20.0));
            }
        }

        let clusters = cluster_routes(&routes, &ClusterConfig::default());

        assert_eq!(clusters.len(), 10);
        assert_eq!(clusters[0].count, 13);
        assert_eq!(clusters[9].count, 4);
        assert!(clusters.windows(2).all(|w| w[0].count >= w[1].count));
    }

    #[test]
    fn test_ties_broken_by_bucket_key() {
        let routes = vec![
            route(1, 5100.0, 10.0),
            route(2, 5200.0, 20.0),
            route(3, 2100.0, 110.0),
            route(4, 2900.0, 120.0),
            route(5, 2500.0, 10.0),
            route(6, 2600.0, 40.0),
        ];

        let clusters = cluster_routes(&routes, &ClusterConfig::default());
        let keys: Vec<(f64, f64)> = clusters
            .iter()
            .map(|c| (c.key.normalized_distance, c.key.normalized_elevation))
            .collect();

        assert_eq!(keys, vec![(2000.0, 0.0), (2000.0, 100.0), (5000.0, 0.0)]);
    }

    #[test]
    fn test_custom_tolerances() {
        let config = ClusterConfig {
            distance_tolerance: 5000.0,
            elevation_tolerance: 500.0,
            ..ClusterConfig::default()
        };
        let routes = vec![route(1, 500.0, 10.0), route(2, 4900.0, 450.0)];

        let clusters = cluster_routes(&routes, &config);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].count, 2);
    }
}
