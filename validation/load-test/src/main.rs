//! Load test CLI for Deep Zoom Image tile servers.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, EnvFilter};

use dzi_load_test::{BenchConfig, LoadRunner, OutputFormat, ResultsReport};

#[derive(Parser)]
#[command(name = "dzi-load-test")]
#[command(about = "Concurrent tile load test for Deep Zoom Image servers", long_about = None)]
struct Cli {
    /// Log level or filter directive. Per-tile error lines stay on even
    /// when this is `off`.
    #[arg(long, default_value = "info", env = "RUST_LOG", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a batch described by a scenario file
    Run {
        /// Path to scenario YAML file
        #[arg(short, long)]
        scenario: PathBuf,

        /// Override concurrency level
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Output format: table (default), json, csv
        #[arg(short, long, default_value = "table")]
        output: OutputFormat,

        /// Show a progress bar
        #[arg(long)]
        progress: bool,
    },

    /// Fetch a tile grid using command-line parameters
    Quick {
        /// Base URL of the tile server
        #[arg(short, long, env = "DZI_BASE_URL", default_value = "http://localhost:8080")]
        url: String,

        /// Slide name (descriptor is <slide>.dzi)
        #[arg(long, default_value = "slide_1")]
        slide: String,

        /// Pyramid level to request tiles from
        #[arg(short, long, default_value = "18")]
        level: u32,

        /// Number of tile columns
        #[arg(long, default_value = "30")]
        cols: u32,

        /// Number of tile rows
        #[arg(long, default_value = "20")]
        rows: u32,

        /// Maximum requests in flight
        #[arg(short, long, default_value = "50")]
        concurrency: usize,

        /// Per-request timeout in seconds (default: none)
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Output format: table (default), json, csv
        #[arg(short, long, default_value = "table")]
        output: OutputFormat,

        /// Show a progress bar
        #[arg(long)]
        progress: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    fmt()
        .with_env_filter(log_filter(&cli.log_level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let (config, output) = match cli.command {
        Commands::Run {
            scenario,
            concurrency,
            output,
            progress,
        } => {
            info!(scenario = %scenario.display(), "Loading scenario");
            let mut config = BenchConfig::from_file(&scenario)?;
            if let Some(c) = concurrency {
                config.concurrency = c;
            }
            config.progress |= progress;
            (config, output)
        }
        Commands::Quick {
            url,
            slide,
            level,
            cols,
            rows,
            concurrency,
            timeout,
            output,
            progress,
        } => {
            let config = BenchConfig {
                name: "quick".to_string(),
                description: "Command-line tile grid".to_string(),
                base_url: url,
                slide,
                level,
                col_range: cols,
                row_range: rows,
                concurrency,
                request_timeout_secs: timeout,
                progress,
            };
            (config, output)
        }
    };

    let runner = LoadRunner::new(config)?;
    let config = runner.config();
    info!(
        name = %config.name,
        base_url = %config.base_url,
        slide = %config.slide,
        level = config.level,
        cols = config.col_range,
        rows = config.row_range,
        concurrency = config.concurrency,
        "Configuration loaded"
    );

    let run = runner.run().await?;

    println!("{}", ResultsReport::format(&run.results, output)?);

    Ok(())
}

/// Per-tile failures are reported through this target.
const TILE_ERRORS: &str = "dzi_load_test::runner=error";

/// Build the log filter, falling back to `info` on a bad directive.
///
/// Silencing everything still leaves tile failures visible.
fn log_filter(directive: &str) -> EnvFilter {
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"));
    if filter.max_level_hint() != Some(LevelFilter::OFF) {
        return filter;
    }
    match TILE_ERRORS.parse() {
        Ok(tile_errors) => filter.add_directive(tile_errors),
        Err(_) => filter,
    }
}
