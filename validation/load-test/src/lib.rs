//! Load testing tool for Deep Zoom Image (DZI) tile servers.
//!
//! This crate provides tools to:
//! - Enumerate a rectangular grid of tiles at one pyramid level
//! - Fetch them through a bounded-concurrency executor
//! - Time the batch and aggregate per-tile outcomes
//! - Output results in multiple formats (console, JSON, CSV)

pub mod config;
pub mod dzi_client;
pub mod error;
pub mod executor;
pub mod generator;
pub mod metrics;
pub mod report;
pub mod runner;

pub use config::BenchConfig;
pub use dzi_client::{DziClient, DziDescriptor};
pub use error::{RequestError, RequestResult};
pub use executor::{BoundedExecutor, ExecutorStats, TaskError, TaskHandle};
pub use generator::{TileCoord, TileGrid};
pub use metrics::{BatchResults, GridShape, MetricsCollector};
pub use report::{OutputFormat, ResultsReport};
pub use runner::{BatchRun, LoadRunner, TileOutcome};
