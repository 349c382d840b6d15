//! Batch orchestration: descriptor warm-up, tile fan-out, timing.

use crate::config::BenchConfig;
use crate::dzi_client::{DziClient, DziDescriptor};
use crate::error::{RequestError, RequestResult};
use crate::executor::{BoundedExecutor, ExecutorStats, TaskError, TaskHandle};
use crate::generator::{TileCoord, TileGrid};
use crate::metrics::{BatchResults, GridShape, MetricsCollector};
use crate::report::ResultsReport;
use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Settled result of one tile request.
#[derive(Debug)]
pub struct TileOutcome {
    pub coord: TileCoord,
    pub latency: Duration,
    /// Body length in bytes, or why the request failed.
    pub result: RequestResult<usize>,
}

impl TileOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Everything a finished batch produced.
#[derive(Debug)]
pub struct BatchRun {
    /// Descriptor body, verbatim.
    pub descriptor: String,
    /// Time from the first tile submission until the executor went idle.
    pub elapsed: Duration,
    /// The elapsed-time line printed when the batch went idle.
    pub timing_line: String,
    /// One entry per grid tile, in submission order.
    pub outcomes: Vec<TileOutcome>,
    pub results: BatchResults,
    pub executor: ExecutorStats,
}

impl BatchRun {
    /// Body sizes of the tiles that were fetched successfully.
    pub fn tile_sizes(&self) -> Vec<usize> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().copied())
            .collect()
    }
}

/// Drives one batch of tile requests against a DZI server.
pub struct LoadRunner {
    client: DziClient,
    config: BenchConfig,
    grid: TileGrid,
}

impl LoadRunner {
    /// Create a new load runner.
    pub fn new(config: BenchConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let client = DziClient::new(config.request_timeout(), config.concurrency)
            .context("Failed to create HTTP client")?;
        let grid = TileGrid::new(&config);
        Ok(Self {
            client,
            config,
            grid,
        })
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// Run the batch.
    ///
    /// The descriptor is fetched and printed first; its failure aborts the run.
    /// Tile failures never do: each is logged, counted and kept in the outcome
    /// list, and the timing line is printed regardless.
    pub async fn run(&self) -> anyhow::Result<BatchRun> {
        let descriptor_url = self.grid.descriptor_url();
        info!(url = %descriptor_url, "Fetching slide descriptor");
        let descriptor = self
            .client
            .fetch_descriptor(&descriptor_url)
            .await
            .context("Failed to fetch slide descriptor")?;
        println!("{}", descriptor);
        self.check_descriptor(&descriptor);

        let label = self.config.batch_label();
        info!(
            tiles = self.grid.len(),
            level = self.config.level,
            concurrency = self.config.concurrency,
            "Starting batch"
        );

        let pb = self.progress_bar();
        let executor = BoundedExecutor::new(self.config.concurrency);
        let start = Instant::now();

        let handles: Vec<(TileCoord, TaskHandle<TileOutcome>)> = self
            .grid
            .coords()
            .map(|coord| {
                let client = self.client.clone();
                let url = self.grid.tile_url(coord);
                let pb = pb.clone();
                let handle = executor.submit(move || async move {
                    let outcome = fetch_tile(client, url, coord).await;
                    pb.inc(1);
                    outcome
                });
                (coord, handle)
            })
            .collect();

        executor.wait_idle().await;
        let elapsed = start.elapsed();
        pb.finish_and_clear();
        let timing_line = ResultsReport::timing_line(&label, elapsed);
        println!("{}", timing_line);

        let mut metrics = MetricsCollector::new();
        let mut outcomes = Vec::with_capacity(handles.len());
        for (coord, handle) in handles {
            let outcome = settle(coord, handle.await);
            match &outcome.result {
                Ok(bytes) => metrics.record_success(outcome.latency.as_micros() as u64, *bytes),
                Err(e) => metrics.record_failure(e.is_timeout()),
            }
            outcomes.push(outcome);
        }

        let results = metrics.results(
            label,
            GridShape {
                level: self.config.level,
                cols: self.config.col_range,
                rows: self.config.row_range,
            },
            self.config.concurrency,
            elapsed,
        );
        info!(
            succeeded = results.successful_requests,
            failed = results.failed_requests,
            elapsed_ms = elapsed.as_millis() as u64,
            "Batch complete"
        );

        Ok(BatchRun {
            descriptor,
            elapsed,
            timing_line,
            outcomes,
            results,
            executor: executor.stats(),
        })
    }

    /// Compare the requested grid with what the slide advertises. Advisory only.
    fn check_descriptor(&self, body: &str) {
        let dzi = match DziDescriptor::parse(body) {
            Ok(dzi) => dzi,
            Err(e) => {
                debug!(error = %e, "Descriptor not understood, skipping grid check");
                return;
            }
        };

        let level = self.config.level;
        match dzi.tile_grid(level) {
            Some((cols, rows)) => {
                info!(level, cols, rows, tile_size = dzi.tile_size, "Slide tile grid");
                if self.config.col_range as u64 > cols || self.config.row_range as u64 > rows {
                    warn!(
                        level,
                        requested_cols = self.config.col_range,
                        requested_rows = self.config.row_range,
                        available_cols = cols,
                        available_rows = rows,
                        "Requested grid extends past the slide; those tiles will fail"
                    );
                }
            }
            None => warn!(
                level,
                levels = dzi.level_count(),
                "Requested level is deeper than the slide's pyramid"
            ),
        }
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.config.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(self.grid.len() as u64);
        let style = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} tiles {msg}");
        if let Ok(style) = style {
            pb.set_style(style.progress_chars("##-"));
        }
        pb
    }
}

/// Turn a settled task into an outcome. A task that never produced one is a
/// failed tile.
fn settle(coord: TileCoord, settled: Result<TileOutcome, TaskError>) -> TileOutcome {
    settled.unwrap_or_else(|e| {
        error!(%coord, error = %e, "Tile task did not complete");
        TileOutcome {
            coord,
            latency: Duration::ZERO,
            result: Err(RequestError::from(e)),
        }
    })
}

async fn fetch_tile(client: DziClient, url: String, coord: TileCoord) -> TileOutcome {
    let start = Instant::now();
    let result = client.fetch_tile(&url).await;
    let latency = start.elapsed();

    match &result {
        Ok(bytes) => debug!(
            %coord,
            bytes,
            latency_ms = latency.as_millis() as u64,
            "Tile fetched"
        ),
        Err(e) => error!(%coord, error = %e, "Tile request failed"),
    }

    TileOutcome {
        coord,
        latency,
        result,
    }
}
