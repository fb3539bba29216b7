//! # SQLite Route Store
//!
//! Append-only route table keyed by provider activity ID.
//!
//! - Dedup lookups are chunked so candidate sets of any size stay under
//!   SQLite's bound-parameter limit.
//! - Bulk inserts use `ON CONFLICT(activity_id) DO NOTHING`, so duplicates are
//!   skipped but any other constraint or I/O fault still fails the batch.
//! - Popular route aggregation runs in SQL and matches
//!   [`cluster_routes`](crate::cluster::cluster_routes) exactly.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use chrono::DateTime;
use log::{debug, info};
use rusqlite::{Connection, Row, params, params_from_iter};

use crate::cluster::{BucketKey, ClusterConfig, RouteCluster};
use crate::config::Config;
use crate::error::{RideError, Result};
use crate::repository::RouteRepository;
use crate::{ElevationRange, RouteRecord};

/// Maximum IDs bound into a single `IN (...)` lookup.
const ID_LOOKUP_CHUNK: usize = 500;

const ROUTE_COLUMNS: &str =
    "activity_id, distance, elevation, duration, coordinates, start_date, activity_type";

/// Route repository backed by a SQLite database file.
pub struct SqliteRouteStore {
    db: Mutex<Connection>,
}

impl SqliteRouteStore {
    /// Open (or create) the database at `db_path`.
    pub fn new(db_path: &str) -> Result<Self> {
        let db = Connection::open(db_path).map_err(|e| RideError::storage("open", e))?;
        Self::init_schema(&db).map_err(|e| RideError::storage("init_schema", e))?;
        info!("[SqliteRouteStore] Opened {}", db_path);

        Ok(Self { db: Mutex::new(db) })
    }

    /// Open the database at `RIDEBANK_DATABASE_PATH`.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.database_path)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }

    fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            r#"
            -- One row per ingested ride; rowid order is insertion order
            CREATE TABLE IF NOT EXISTS routes (
                activity_id INTEGER NOT NULL UNIQUE,
                distance REAL NOT NULL,
                elevation REAL NOT NULL,
                duration INTEGER NOT NULL,
                coordinates TEXT NOT NULL,
                start_date INTEGER,           -- Unix timestamp (seconds)
                activity_type TEXT NOT NULL,
                created_at INTEGER DEFAULT (strftime('%s', 'now'))
            );

            CREATE INDEX IF NOT EXISTS idx_routes_elevation ON routes(elevation);
            "#,
        )
    }

    fn conn(&self, operation: &'static str) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| RideError::storage(operation, "connection lock poisoned"))
    }

    /// Number of stored routes.
    pub fn route_count(&self) -> Result<u64> {
        let conn = self.conn("route_count")?;
        conn.query_row("SELECT COUNT(*) FROM routes", [], |row| row.get(0))
            .map_err(|e| RideError::storage("route_count", e))
    }
}

fn read_route(row: &Row<'_>, offset: usize) -> rusqlite::Result<RouteRecord> {
    let start_date: Option<i64> = row.get(offset + 5)?;
    Ok(RouteRecord {
        activity_id: row.get(offset)?,
        distance: row.get(offset + 1)?,
        elevation: row.get(offset + 2)?,
        duration: row.get(offset + 3)?,
        coordinates: row.get(offset + 4)?,
        date: start_date.and_then(|secs| DateTime::from_timestamp(secs, 0)),
        activity_type: row.get(offset + 6)?,
    })
}

impl RouteRepository for SqliteRouteStore {
    fn find_existing_ids(&self, candidate_ids: &HashSet<i64>) -> Result<HashSet<i64>> {
        const OP: &str = "find_existing_ids";
        let conn = self.conn(OP)?;
        let ids: Vec<i64> = candidate_ids.iter().copied().collect();
        let mut existing = HashSet::new();

        for chunk in ids.chunks(ID_LOOKUP_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!(
                "SELECT activity_id FROM routes WHERE activity_id IN ({})",
                placeholders
            );
            let mut stmt = conn.prepare(&sql).map_err(|e| RideError::storage(OP, e))?;
            let rows = stmt
                .query_map(params_from_iter(chunk.iter()), |row| row.get::<_, i64>(0))
                .map_err(|e| RideError::storage(OP, e))?;
            for id in rows {
                existing.insert(id.map_err(|e| RideError::storage(OP, e))?);
            }
        }

        Ok(existing)
    }

    fn insert_new(&self, records: &[RouteRecord]) -> Result<usize> {
        const OP: &str = "insert_new";
        if records.is_empty() {
            return Ok(0);
        }

        let start = Instant::now();
        let mut conn = self.conn(OP)?;
        let tx = conn.transaction().map_err(|e| RideError::storage(OP, e))?;
        let mut inserted = 0;
        {
            let mut stmt = tx
                .prepare_cached(&format!(
                    "INSERT INTO routes ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(activity_id) DO NOTHING",
                    ROUTE_COLUMNS
                ))
                .map_err(|e| RideError::storage(OP, e))?;

            for record in records {
                inserted += stmt
                    .execute(params![
                        record.activity_id,
                        record.distance,
                        record.elevation,
                        record.duration,
                        record.coordinates,
                        record.date.map(|d| d.timestamp()),
                        record.activity_type,
                    ])
                    .map_err(|e| RideError::storage(OP, e))?;
            }
        }
        tx.commit().map_err(|e| RideError::storage(OP, e))?;

        debug!(
            "[SqliteRouteStore] Inserted {}/{} routes in {:?}",
            inserted,
            records.len(),
            start.elapsed()
        );
        Ok(inserted)
    }

    fn find_by_elevation_range(&self, range: ElevationRange) -> Result<Vec<RouteRecord>> {
        const OP: &str = "find_by_elevation_range";
        let conn = self.conn(OP)?;
        let mut stmt = conn
            .prepare_cached(&format!(
                "SELECT {} FROM routes
                 WHERE (?1 IS NULL OR elevation >= ?1) AND (?2 IS NULL OR elevation <= ?2)
                 ORDER BY rowid",
                ROUTE_COLUMNS
            ))
            .map_err(|e| RideError::storage(OP, e))?;

        let rows = stmt
            .query_map(params![range.min, range.max], |row| read_route(row, 0))
            .map_err(|e| RideError::storage(OP, e))?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| RideError::storage(OP, e))
    }

    fn aggregate_by_similarity(&self, config: &ClusterConfig) -> Result<Vec<RouteCluster>> {
        const OP: &str = "aggregate_by_similarity";
        config.validate()?;
        let start = Instant::now();
        let conn = self.conn(OP)?;

        // SQLite's `%` truncates its operands to integers; take the REAL
        // remainder via truncating division (values are non-negative).
        let mut stmt = conn
            .prepare_cached(&format!(
                "WITH buckets AS (
                     SELECT rowid AS rid,
                            distance - (distance - CAST(distance / ?1 AS INTEGER) * ?1) AS nd,
                            elevation - (elevation - CAST(elevation / ?2 AS INTEGER) * ?2) AS ne
                     FROM routes
                 ),
                 groups AS (
                     SELECT nd, ne, COUNT(*) AS cnt, MIN(rid) AS rep
                     FROM buckets
                     GROUP BY nd, ne
                     HAVING COUNT(*) >= ?3
                 )
                 SELECT g.nd, g.ne, g.cnt, {}
                 FROM groups g JOIN routes r ON r.rowid = g.rep
                 ORDER BY g.cnt DESC, g.nd ASC, g.ne ASC
                 LIMIT ?4",
                ROUTE_COLUMNS
                    .split(", ")
                    .map(|c| format!("r.{}", c))
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
            .map_err(|e| RideError::storage(OP, e))?;

        let rows = stmt
            .query_map(
                params![
                    config.distance_tolerance,
                    config.elevation_tolerance,
                    config.min_count,
                    config.limit as i64,
                ],
                |row| {
                    Ok(RouteCluster {
                        key: BucketKey {
                            normalized_distance: row.get(0)?,
                            normalized_elevation: row.get(1)?,
                        },
                        count: row.get(2)?,
                        representative: read_route(row, 3)?,
                    })
                },
            )
            .map_err(|e| RideError::storage(OP, e))?;

        let clusters = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| RideError::storage(OP, e))?;

        debug!(
            "[SqliteRouteStore] Aggregated {} popular buckets in {:?}",
            clusters.len(),
            start.elapsed()
        );
        Ok(clusters)
    }
}
