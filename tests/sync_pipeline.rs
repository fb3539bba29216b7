//! Synchronization integration tests.
//!
//! Full pipeline: mocked Strava feed -> Synchronizer -> SQLite store -> queries.

use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use ridebank::{
    AccessToken, ElevationRange, ErrorKind, FeedConfig, RouteQueries, RouteRepository,
    SqliteRouteStore, StopReason, StravaClient, SyncConfig, Synchronizer, TerminationPolicy,
    TokenState,
};
use serde_json::{Value, json};
use tempfile::TempDir;

const ACTIVITIES: &str = "/api/v3/athlete/activities";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn ride(id: i64, distance: f64, elevation: f64) -> Value {
    json!({
        "id": id,
        "type": "Ride",
        "distance": distance,
        "moving_time": 3600,
        "total_elevation_gain": elevation,
        "start_date": "2024-06-01T08:00:00Z",
        "map": { "summary_polyline": "_p~iF~ps|U_ulLnnqC" }
    })
}

fn other(id: i64, activity_type: &str) -> Value {
    json!({
        "id": id,
        "type": activity_type,
        "distance": 5000.0,
        "moving_time": 1500,
        "total_elevation_gain": 12.0,
        "map": { "summary_polyline": "_p~iF~ps|U" }
    })
}

async fn serve_page(server: &MockServer, page: u32, body: Value) {
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path(ACTIVITIES)
                .query_param("page", page.to_string())
                .header("authorization", "Bearer tok");
            then.status(200).json_body(body);
        })
        .await;
}

struct Harness {
    store: Arc<SqliteRouteStore>,
    feed: Arc<StravaClient>,
    _dir: TempDir,
}

impl Harness {
    fn new(server: &MockServer) -> Self {
        init_logging();
        let dir = TempDir::new().expect("failed to create temp dir");
        let db_path = dir.path().join("routes.db");
        let store = Arc::new(
            SqliteRouteStore::new(db_path.to_str().unwrap()).expect("failed to open store"),
        );
        let feed = Arc::new(
            StravaClient::new(&FeedConfig {
                api_base_url: server.url("/api/v3"),
                timeout: Duration::from_secs(5),
            })
            .expect("failed to build client"),
        );
        Self {
            store,
            feed,
            _dir: dir,
        }
    }

    fn synchronizer(&self, config: SyncConfig) -> Synchronizer {
        Synchronizer::new(self.feed.clone(), self.store.clone(), config)
    }
}

fn token() -> TokenState {
    TokenState::authorized(AccessToken::new("tok"))
}

#[tokio::test]
async fn test_multi_page_sync_then_query() {
    let server = MockServer::start_async().await;
    serve_page(
        &server,
        1,
        json!([ride(1, 10_200.0, 120.0), ride(2, 10_900.0, 140.0), other(3, "Run")]),
    )
    .await;
    serve_page(&server, 2, json!([ride(4, 25_000.0, 300.0)])).await;
    serve_page(&server, 3, json!([])).await;

    let h = Harness::new(&server);
    let report = h.synchronizer(SyncConfig::default()).run(&token()).await.unwrap();

    assert_eq!(report.inserted, 3);
    assert_eq!(report.filtered_out, 1);
    assert_eq!(report.stop, Some(StopReason::EmptyPage { page: 3 }));
    assert_eq!(h.store.route_count().unwrap(), 3);

    let queries = RouteQueries::new(h.store.clone());
    let hilly = queries
        .filtered_routes(ElevationRange::new(Some(130.0), None))
        .unwrap();
    assert_eq!(hilly.len(), 2);
    assert_eq!(hilly[0].distance, 10_900.0);
    assert_eq!(hilly[0].coordinates.len(), 2);

    let popular = queries.popular_routes().unwrap();
    assert_eq!(popular.len(), 1);
    assert_eq!(popular[0].count, 2);
    assert_eq!(popular[0].distance, 10_200.0);
}

#[tokio::test]
async fn test_second_sync_is_idempotent() {
    let server = MockServer::start_async().await;
    serve_page(&server, 1, json!([ride(1, 10_000.0, 100.0), ride(2, 20_000.0, 200.0)])).await;
    serve_page(&server, 2, json!([])).await;

    let h = Harness::new(&server);
    let sync = h.synchronizer(SyncConfig::default());

    let first = sync.run(&token()).await.unwrap();
    let second = sync.run(&token()).await.unwrap();

    assert_eq!(first.inserted, 2);
    assert_eq!(second.inserted, 0);
    assert_eq!(second.skipped_existing, 2);
    assert_eq!(h.store.route_count().unwrap(), 2);
}

#[tokio::test]
async fn test_empty_first_page() {
    let server = MockServer::start_async().await;
    serve_page(&server, 1, json!([])).await;

    let h = Harness::new(&server);
    let report = h.synchronizer(SyncConfig::default()).run(&token()).await.unwrap();

    assert_eq!(report.inserted, 0);
    assert_eq!(report.pages_fetched, 1);
    assert_eq!(h.store.route_count().unwrap(), 0);
}

#[tokio::test]
async fn test_server_error_keeps_earlier_pages() {
    let server = MockServer::start_async().await;
    serve_page(&server, 1, json!([ride(1, 10_000.0, 100.0), ride(2, 20_000.0, 200.0)])).await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(ACTIVITIES).query_param("page", "2");
            then.status(500);
        })
        .await;

    let h = Harness::new(&server);
    let failure = h
        .synchronizer(SyncConfig::default())
        .run(&token())
        .await
        .unwrap_err();

    assert_eq!(failure.kind(), ErrorKind::Fetch);
    assert_eq!(failure.inserted, 2);
    assert_eq!(failure.pages_completed, 1);
    assert_eq!(h.store.route_count().unwrap(), 2);
}

#[tokio::test]
async fn test_rejected_token() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(ACTIVITIES);
            then.status(401);
        })
        .await;

    let h = Harness::new(&server);
    let failure = h
        .synchronizer(SyncConfig::default())
        .run(&token())
        .await
        .unwrap_err();

    assert_eq!(failure.kind(), ErrorKind::Unauthenticated);
    assert_eq!(failure.inserted, 0);
}

#[tokio::test]
async fn test_termination_policies() {
    let server = MockServer::start_async().await;
    serve_page(&server, 1, json!([ride(1, 10_000.0, 100.0)])).await;
    serve_page(&server, 2, json!([other(2, "Run"), other(3, "Swim")])).await;
    serve_page(&server, 3, json!([ride(4, 40_000.0, 400.0)])).await;
    serve_page(&server, 4, json!([])).await;

    let h = Harness::new(&server);

    let stopped = h.synchronizer(SyncConfig::default()).run(&token()).await.unwrap();
    assert_eq!(stopped.inserted, 1);
    assert_eq!(
        stopped.stop,
        Some(StopReason::NoQualifyingActivities { page: 2 })
    );

    let skipping = h
        .synchronizer(SyncConfig {
            termination: TerminationPolicy::SkipUnqualifiedPages,
            ..SyncConfig::default()
        })
        .run(&token())
        .await
        .unwrap();
    assert_eq!(skipping.inserted, 1);
    assert_eq!(skipping.skipped_existing, 1);
    assert_eq!(skipping.stop, Some(StopReason::EmptyPage { page: 4 }));

    let ids: Vec<i64> = h
        .store
        .find_by_elevation_range(ElevationRange::any())
        .unwrap()
        .iter()
        .map(|r| r.activity_id)
        .collect();
    assert_eq!(ids, vec![1, 4]);
}
