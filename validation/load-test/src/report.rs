//! Results reporting and formatting.

use crate::metrics::BatchResults;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use std::str::FromStr;
use std::time::Duration;

/// Output format for the results summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Csv,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            other => anyhow::bail!(
                "unknown output format '{}' (expected table, json or csv)",
                other
            ),
        }
    }
}

/// Formats batch results for output.
pub struct ResultsReport;

impl ResultsReport {
    /// The elapsed-time line printed when a batch finishes, e.g.
    /// `600 total requests: 1.234s`.
    pub fn timing_line(label: &str, elapsed: Duration) -> String {
        let ms = elapsed.as_secs_f64() * 1000.0;
        if ms >= 1000.0 {
            format!("{}: {:.3}s", label, ms / 1000.0)
        } else {
            format!("{}: {:.3}ms", label, ms)
        }
    }

    /// Render results in the requested format.
    pub fn format(results: &BatchResults, format: OutputFormat) -> anyhow::Result<String> {
        Ok(match format {
            OutputFormat::Table => Self::format_table(results),
            OutputFormat::Json => Self::format_json(results)?,
            OutputFormat::Csv => format!("{}\n{}", Self::csv_header(), Self::format_csv(results)),
        })
    }

    /// Format results as a console table.
    pub fn format_table(results: &BatchResults) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![format!("DZI Load Test: {}", results.label)]);

        table.add_row(vec![
            "Grid:",
            &format!(
                "{} x {} @ level {}",
                results.grid.cols, results.grid.rows, results.grid.level
            ),
        ]);
        table.add_row(vec!["Concurrency:", &results.concurrency.to_string()]);
        table.add_row(vec!["Duration:", &format!("{:.3}s", results.duration_secs)]);
        table.add_row(vec![
            "Total Requests:",
            &format!("{}", results.total_requests),
        ]);
        table.add_row(vec![
            "Success Rate:",
            &format!(
                "{:.1}% ({} failed, {} timed out)",
                results.success_rate(),
                results.failed_requests,
                results.timed_out_requests
            ),
        ]);
        table.add_row(vec![
            "Requests/sec:",
            &format!("{:.1}", results.requests_per_second),
        ]);

        table.add_row(vec!["", ""]);
        table.add_row(vec!["Latency (ms)", "p50 / p90 / p95 / p99 / max"]);
        table.add_row(vec![
            "",
            &format!(
                "{:.1} / {:.1} / {:.1} / {:.1} / {:.1}",
                results.latency_p50,
                results.latency_p90,
                results.latency_p95,
                results.latency_p99,
                results.latency_max
            ),
        ]);

        table.add_row(vec!["", ""]);
        table.add_row(vec!["Bytes Received:", &results.total_bytes.to_string()]);
        table.add_row(vec![
            "Throughput:",
            &format!("{:.1} MB/s", results.bytes_per_second / 1_000_000.0),
        ]);

        table.to_string()
    }

    /// Format results as JSON.
    pub fn format_json(results: &BatchResults) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(results)?)
    }

    /// Format results as CSV row.
    pub fn format_csv(results: &BatchResults) -> String {
        format!(
            "{},{},{},{},{},{},{:.3},{},{},{},{:.1},{:.1},{:.1},{:.1}",
            results.timestamp,
            results.grid.level,
            results.grid.cols,
            results.grid.rows,
            results.concurrency,
            results.total_requests,
            results.duration_secs,
            results.successful_requests,
            results.failed_requests,
            results.total_bytes,
            results.requests_per_second,
            results.latency_p50,
            results.latency_p90,
            results.latency_p99
        )
    }

    /// CSV header row.
    pub fn csv_header() -> &'static str {
        "timestamp,level,cols,rows,concurrency,requests,duration,succeeded,failed,bytes,rps,p50,p90,p99"
    }
}
