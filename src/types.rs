//! Data model shared by the synchronizer, repositories and query facade.

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{RideError, Result};

// ============================================================================
// Geometry
// ============================================================================

/// A GPS coordinate. Serializes as a `[latitude, longitude]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl From<[f64; 2]> for GpsPoint {
    fn from([latitude, longitude]: [f64; 2]) -> Self {
        Self::new(latitude, longitude)
    }
}

impl From<GpsPoint> for [f64; 2] {
    fn from(point: GpsPoint) -> Self {
        [point.latitude, point.longitude]
    }
}

// ============================================================================
// Stored Routes
// ============================================================================

/// A persisted ride. Immutable once written; `activity_id` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRecord {
    /// Provider activity ID (natural key)
    pub activity_id: i64,
    /// Distance in meters
    pub distance: f64,
    /// Total elevation gain in meters
    pub elevation: f64,
    /// Moving time in seconds
    pub duration: u32,
    /// Encoded polyline; decoded only when read
    pub coordinates: String,
    /// Activity start, if the provider reported one
    pub date: Option<DateTime<Utc>>,
    /// Provider activity type (e.g. "Ride")
    #[serde(rename = "type")]
    pub activity_type: String,
}

impl RouteRecord {
    /// Build a record from a remote activity that passed [`RemoteActivity::qualifies`].
    ///
    /// Returns `None` for activities without an ID or geometry.
    pub fn from_remote(activity: &RemoteActivity) -> Option<Self> {
        let activity_id = activity.id.filter(|id| *id > 0)?;
        let coordinates = activity.summary_polyline()?.to_string();

        Some(Self {
            activity_id,
            distance: non_negative(activity_id, "distance", activity.distance),
            elevation: non_negative(
                activity_id,
                "total_elevation_gain",
                activity.total_elevation_gain,
            ),
            duration: activity.moving_time,
            coordinates,
            date: activity.start_date,
            activity_type: activity.activity_type.clone(),
        })
    }
}

fn non_negative(activity_id: i64, field: &str, value: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        debug!(
            "[RouteRecord] Activity {} has {} = {}, storing 0",
            activity_id, field, value
        );
        0.0
    }
}

// ============================================================================
// Remote Feed
// ============================================================================

/// One activity as returned by the provider's paged activity list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteActivity {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(rename = "type", default)]
    pub activity_type: String,
    #[serde(default)]
    pub map: Option<ActivityMap>,
    #[serde(default)]
    pub total_elevation_gain: f64,
    #[serde(default)]
    pub moving_time: u32,
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
}

/// Map summary attached to a remote activity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityMap {
    #[serde(default)]
    pub summary_polyline: Option<String>,
}

impl RemoteActivity {
    /// Non-empty summary polyline, if any.
    pub fn summary_polyline(&self) -> Option<&str> {
        self.map
            .as_ref()
            .and_then(|m| m.summary_polyline.as_deref())
            .filter(|p| !p.is_empty())
    }

    /// Whether this activity should be ingested: matching type, a geometry and a valid ID.
    pub fn qualifies(&self, activity_type: &str) -> bool {
        self.activity_type == activity_type
            && self.summary_polyline().is_some()
            && self.id.is_some_and(|id| id > 0)
    }
}

// ============================================================================
// Query Types
// ============================================================================

/// Inclusive elevation bounds; a missing bound is unbounded on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ElevationRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ElevationRange {
    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }

    /// Range that matches every route.
    pub fn any() -> Self {
        Self::default()
    }

    /// Parse raw query-string bounds. Empty strings count as absent.
    pub fn parse(min: Option<&str>, max: Option<&str>) -> Result<Self> {
        Ok(Self {
            min: parse_bound("minElevation", min)?,
            max: parse_bound("maxElevation", max)?,
        })
    }

    pub fn contains(&self, elevation: f64) -> bool {
        self.min.is_none_or(|min| elevation >= min) && self.max.is_none_or(|max| elevation <= max)
    }
}

fn parse_bound(name: &str, raw: Option<&str>) -> Result<Option<f64>> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(RideError::InvalidInput {
            message: format!("{} must be a number, got '{}'", name, raw),
        }),
    }
}

/// A stored route with decoded geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteView {
    pub distance: f64,
    pub elevation: f64,
    pub duration: u32,
    pub coordinates: Vec<GpsPoint>,
}

/// A popular route: the representative's metrics and geometry plus how many
/// rides fell into its bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopularRouteView {
    pub distance: f64,
    pub elevation: f64,
    pub count: u32,
    pub coordinates: Vec<GpsPoint>,
}
