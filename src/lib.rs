//! # Ridebank
//!
//! Ingests a cyclist's Strava ride history into a local route store and
//! answers simple questions about it.
//!
//! This library provides:
//! - Paged, idempotent synchronization of the remote activity feed
//! - Google encoded polyline decoding and encoding
//! - Elevation range queries and "popular route" bucketing
//!
//! ## Features
//!
//! - **`http`** - Strava activity feed and OAuth clients (reqwest)
//! - **`persistence`** - SQLite route store (rusqlite)
//!
//! Both are enabled by default. Without them, [`MemoryFeed`] and
//! [`MemoryRouteStore`] provide the same interfaces in memory.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use ridebank::{ElevationRange, MemoryRouteStore, RouteQueries, RouteRecord, RouteRepository};
//!
//! let store = Arc::new(MemoryRouteStore::new());
//! store.insert_new(&[RouteRecord {
//!     activity_id: 1,
//!     distance: 10_000.0,
//!     elevation: 120.0,
//!     duration: 1800,
//!     coordinates: "_p~iF~ps|U".to_string(),
//!     date: None,
//!     activity_type: "Ride".to_string(),
//! }])?;
//!
//! let queries = RouteQueries::new(store);
//! let routes = queries.filtered_routes(ElevationRange::new(Some(100.0), None))?;
//! assert_eq!(routes[0].coordinates[0].latitude, 38.5);
//! # Ok::<(), ridebank::RideError>(())
//! ```

// Unified error handling
pub mod error;
pub use error::{ErrorKind, Result, RideError, SyncFailure};

// Encoded polyline codec
pub mod polyline;

// Core data model
pub mod types;
pub use types::{
    ActivityMap, ElevationRange, GpsPoint, PopularRouteView, RemoteActivity, RouteRecord,
    RouteView,
};

// Bearer token lifecycle
pub mod auth;
pub use auth::{AccessToken, TokenState};

// Popular route bucketing
pub mod cluster;
pub use cluster::{BucketKey, ClusterConfig, RouteCluster, cluster_routes};

// Storage abstraction with in-memory implementation
pub mod repository;
pub use repository::{MemoryRouteStore, RouteRepository};

// SQLite storage
#[cfg(feature = "persistence")]
pub mod persistence;
#[cfg(feature = "persistence")]
pub use persistence::SqliteRouteStore;

// Remote feed abstraction
pub mod feed;
pub use feed::{ActivityFeed, MemoryFeed};

// HTTP clients for the Strava API
#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub use http::{OAuthClient, StravaClient};

// Ingestion state machine
pub mod sync;
pub use sync::{
    CancelFlag, PageOutcome, StopReason, SyncConfig, SyncReport, SyncState, Synchronizer,
    TerminationPolicy,
};

// Read-side queries
pub mod query;
pub use query::RouteQueries;

// Environment configuration
pub mod config;
pub use config::{Config, FeedConfig, OAuthConfig};
