pub mod exit_codes;
pub mod models;
pub mod pipeline;
pub mod processor;
pub mod storage;
pub mod utils;

pub use exit_codes::ExitCode;
pub use pipeline::{PipelineConfig, PipelineDriver, PipelineError, PipelineState, RunSummary};

use anyhow::Context;
use chrono::NaiveDate;
use common::config::Settings;
use etl::HttpPageSource;
use std::sync::Arc;
use tracing::info;

/// Loads settings and builds a driver for one run. `date_override` wins over
/// the configured run date.
pub fn build_driver(
    config_path: &str,
    date_override: Option<NaiveDate>,
) -> anyhow::Result<(Settings, PipelineDriver)> {
    let settings = Settings::new(config_path)
        .with_context(|| format!("Cannot load configuration from {}", config_path))?;
    let run_date = match date_override {
        Some(date) => date,
        None => settings.run_date().context("Invalid run date in configuration")?,
    };

    let source = HttpPageSource::new(&settings.api).context("Cannot build HTTP client")?;
    let driver = PipelineDriver::new(
        PipelineConfig::from_settings(&settings, run_date),
        Arc::new(source),
    );
    Ok((settings, driver))
}

/// Runs the pipeline and maps the outcome to a process exit code.
pub async fn run_pipeline(driver: &mut PipelineDriver) -> ExitCode {
    match driver.run().await {
        Ok(summary) => {
            info!(
                run_id = %summary.run_id,
                bronze = %summary.bronze_path.display(),
                silver = %summary.silver_path.display(),
                gold = %summary.gold_path.display(),
                "Partitions committed"
            );
            ExitCode::Success
        }
        Err(e) => e.exit_code(),
    }
}
