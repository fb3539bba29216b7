//! Read-side queries over stored routes.
//!
//! Geometry is stored encoded and decoded here, on the way out. A route whose
//! polyline fails to decode fails the whole query with a `Decode` error
//! naming the activity.

use std::sync::Arc;

use log::debug;

use crate::cluster::ClusterConfig;
use crate::error::{RideError, Result};
use crate::polyline;
use crate::repository::RouteRepository;
use crate::{ElevationRange, GpsPoint, PopularRouteView, RouteRecord, RouteView};

pub struct RouteQueries {
    repo: Arc<dyn RouteRepository>,
    cluster: ClusterConfig,
}

impl RouteQueries {
    pub fn new(repo: Arc<dyn RouteRepository>) -> Self {
        Self::with_config(repo, ClusterConfig::default())
    }

    pub fn with_config(repo: Arc<dyn RouteRepository>, cluster: ClusterConfig) -> Self {
        Self { repo, cluster }
    }

    /// Routes whose elevation gain lies within `range`, in insertion order.
    pub fn filtered_routes(&self, range: ElevationRange) -> Result<Vec<RouteView>> {
        let routes = self.repo.find_by_elevation_range(range)?;
        debug!(
            "[RouteQueries] {} routes in elevation range {:?}..{:?}",
            routes.len(),
            range.min,
            range.max
        );

        routes
            .iter()
            .map(|route| {
                Ok(RouteView {
                    distance: route.distance,
                    elevation: route.elevation,
                    duration: route.duration,
                    coordinates: decode_geometry(route)?,
                })
            })
            .collect()
    }

    /// Most frequently repeated rides, most popular first.
    pub fn popular_routes(&self) -> Result<Vec<PopularRouteView>> {
        let clusters = self.repo.aggregate_by_similarity(&self.cluster)?;
        debug!("[RouteQueries] {} popular route buckets", clusters.len());

        clusters
            .iter()
            .map(|cluster| {
                let route = &cluster.representative;
                Ok(PopularRouteView {
                    distance: route.distance,
                    elevation: route.elevation,
                    count: cluster.count,
                    coordinates: decode_geometry(route)?,
                })
            })
            .collect()
    }
}

fn decode_geometry(route: &RouteRecord) -> Result<Vec<GpsPoint>> {
    polyline::decode(&route.coordinates).map_err(|e| RideError::decode(route.activity_id, e))
}
