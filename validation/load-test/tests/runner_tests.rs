//! End-to-end batches against an in-process tile server.

mod common;

use std::collections::HashSet;
use std::io::Write;
use std::time::Duration;

use common::{ServerBehavior, TileServer, DESCRIPTOR, TILE_BYTES};
use dzi_load_test::{BenchConfig, LoadRunner};
use tokio_test::{assert_err, assert_ok};

fn config(server: &TileServer, cols: u32, rows: u32, concurrency: usize) -> BenchConfig {
    BenchConfig {
        base_url: server.base_url.clone(),
        col_range: cols,
        row_range: rows,
        concurrency,
        ..Default::default()
    }
}

// ============================================================================
// Grid coverage and ordering
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_by_two_grid_requests_descriptor_then_every_tile() {
    let server = TileServer::start(ServerBehavior::default()).await;
    let runner = LoadRunner::new(config(&server, 2, 2, 50)).unwrap();

    let run = assert_ok!(runner.run().await);

    let requests = server.requests();
    assert_eq!(requests.len(), 5);
    assert_eq!(requests[0], "/slide_1.dzi");

    let tiles: HashSet<_> = requests[1..].iter().cloned().collect();
    let expected: HashSet<_> = [
        "/slide_1_files/18/0_0.jpg",
        "/slide_1_files/18/1_0.jpg",
        "/slide_1_files/18/0_1.jpg",
        "/slide_1_files/18/1_1.jpg",
    ]
    .into_iter()
    .map(String::from)
    .collect();
    assert_eq!(tiles, expected);

    assert_eq!(run.descriptor, DESCRIPTOR);
    assert_eq!(run.results.label, "4 total requests");
    assert!(run.timing_line.starts_with("4 total requests: "));
    assert_eq!(run.results.total_requests, 4);
    assert_eq!(run.results.successful_requests, 4);
    assert_eq!(run.results.total_bytes, 4 * TILE_BYTES as u64);
    assert_eq!(run.tile_sizes(), vec![TILE_BYTES; 4]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_outcomes_cover_grid_exactly_once() {
    let server = TileServer::start(ServerBehavior::default()).await;
    let runner = LoadRunner::new(config(&server, 6, 3, 5)).unwrap();

    let run = runner.run().await.unwrap();

    assert_eq!(run.outcomes.len(), 18);
    let pairs: HashSet<_> = run.outcomes.iter().map(|o| (o.coord.col, o.coord.row)).collect();
    assert_eq!(pairs.len(), 18);
    assert!(run.outcomes.iter().all(|o| o.coord.level == 18));
    assert_eq!(server.tile_requests().len(), 18);
}

#[tokio::test]
async fn test_empty_grid_only_fetches_descriptor() {
    let server = TileServer::start(ServerBehavior::default()).await;
    let runner = LoadRunner::new(config(&server, 0, 4, 50)).unwrap();

    let run = runner.run().await.unwrap();

    assert_eq!(server.requests(), vec!["/slide_1.dzi".to_string()]);
    assert_eq!(run.results.label, "0 total requests");
    assert!(run.timing_line.starts_with("0 total requests: "));
    assert!(run.outcomes.is_empty());
}

// ============================================================================
// Concurrency ceiling
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_in_flight_requests_never_exceed_ceiling() {
    let server = TileServer::start(ServerBehavior {
        tile_delay: Duration::from_millis(20),
        ..Default::default()
    })
    .await;
    let runner = LoadRunner::new(config(&server, 10, 5, 4)).unwrap();

    let run = runner.run().await.unwrap();

    assert_eq!(run.results.successful_requests, 50);
    assert!(server.peak_in_flight() <= 4);
    assert!(run.executor.peak_running <= 4);
    assert_eq!(run.executor.completed, 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_slot_fetches_tiles_one_at_a_time() {
    let server = TileServer::start(ServerBehavior {
        tile_delay: Duration::from_millis(10),
        ..Default::default()
    })
    .await;
    let runner = LoadRunner::new(config(&server, 5, 1, 1)).unwrap();

    let run = runner.run().await.unwrap();

    assert_eq!(server.peak_in_flight(), 1);
    assert_eq!(server.tile_requests().len(), 5);
    assert_eq!(run.outcomes.len(), 5);
    assert!(run.outcomes.iter().all(|o| o.is_success()));
}

// ============================================================================
// Failure handling
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_all_tiles_failing_still_completes_batch() {
    let server = TileServer::start(ServerBehavior {
        fail_tiles: true,
        ..Default::default()
    })
    .await;
    let runner = LoadRunner::new(config(&server, 3, 2, 50)).unwrap();

    let run = assert_ok!(runner.run().await);

    assert_eq!(run.results.total_requests, 6);
    assert_eq!(run.results.failed_requests, 6);
    assert_eq!(run.results.successful_requests, 0);
    assert!(run.tile_sizes().is_empty());
    assert!(run.timing_line.starts_with("6 total requests: "));
    assert_eq!(run.outcomes.len(), 6);
    for outcome in &run.outcomes {
        let err = outcome.result.as_ref().unwrap_err();
        assert_eq!(err.status(), Some(reqwest::StatusCode::INTERNAL_SERVER_ERROR));
    }
}

#[tokio::test]
async fn test_unreachable_server_fails_before_any_tile() {
    // Bind then drop to get a port nothing listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let runner = LoadRunner::new(BenchConfig {
        base_url: format!("http://{}", addr),
        col_range: 2,
        row_range: 2,
        ..Default::default()
    })
    .unwrap();

    let err = assert_err!(runner.run().await);
    assert!(err.to_string().contains("descriptor"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_request_timeout_settles_tiles_as_failures() {
    let server = TileServer::start(ServerBehavior {
        tile_delay: Duration::from_millis(1500),
        ..Default::default()
    })
    .await;
    let runner = LoadRunner::new(BenchConfig {
        request_timeout_secs: Some(1),
        ..config(&server, 2, 1, 50)
    })
    .unwrap();

    let run = runner.run().await.unwrap();

    assert_eq!(run.results.failed_requests, 2);
    assert_eq!(run.results.timed_out_requests, 2);
    assert!(run.outcomes.iter().all(|o| {
        o.result
            .as_ref()
            .err()
            .map(|e| e.is_timeout())
            .unwrap_or(false)
    }));
}

#[test]
fn test_invalid_config_is_rejected() {
    let result = LoadRunner::new(BenchConfig {
        concurrency: 0,
        ..Default::default()
    });
    assert!(result.is_err());
}

// ============================================================================
// Scenario files
// ============================================================================

#[tokio::test]
async fn test_scenario_file_drives_batch() {
    let server = TileServer::start(ServerBehavior::default()).await;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        "name: scenario\nbase_url: {}/\nslide: slide_1\nlevel: 12\ncol_range: 3\nrow_range: 1\nconcurrency: 2\n",
        server.base_url
    )
    .unwrap();

    let config = BenchConfig::from_file(file.path()).unwrap();
    let runner = LoadRunner::new(config).unwrap();
    let run = runner.run().await.unwrap();

    assert_eq!(run.results.successful_requests, 3);
    assert_eq!(run.results.grid.level, 12);
    let mut tiles = server.tile_requests();
    tiles.sort();
    assert_eq!(
        tiles,
        vec![
            "/slide_1_files/12/0_0.jpg",
            "/slide_1_files/12/1_0.jpg",
            "/slide_1_files/12/2_0.jpg",
        ]
    );
}
