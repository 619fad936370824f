use crate::exit_codes::ExitCode;
use crate::processor::{BronzeWriter, GoldAggregator, PartitionRef, SilverTransformer};
use crate::storage::LakeStorage;
use chrono::NaiveDate;
use common::config::Settings;
use etl::{FetchError, Fetcher, PageSource, RetryPolicy, Sleeper, TokioSleeper};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

/// Stages of one run. `Failed` is reachable from every stage before `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    Fetching,
    BronzeWritten,
    SilverWritten,
    GoldWritten,
    Done,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Fetching => "FETCHING",
            Self::BronzeWritten => "BRONZE_WRITTEN",
            Self::SilverWritten => "SILVER_WRITTEN",
            Self::GoldWritten => "GOLD_WRITTEN",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Bronze write failed: {0}")]
    Write(#[source] common::Error),

    #[error("Silver transform failed: {0}")]
    Validation(#[source] common::Error),

    #[error("Gold aggregation failed: {0}")]
    Aggregation(#[source] common::Error),
}

impl PipelineError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Fetch(_) => ExitCode::FetchFailed,
            Self::Write(_) => ExitCode::BronzeFailed,
            Self::Validation(_) => ExitCode::SilverFailed,
            Self::Aggregation(_) => ExitCode::GoldFailed,
        }
    }
}

/// Everything one run needs, passed in explicitly.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub storage_root: PathBuf,
    pub retry: RetryPolicy,
    pub per_page: u32,
    pub max_pages: u32,
    pub max_reject_ratio: f64,
    pub run_date: NaiveDate,
}

impl PipelineConfig {
    pub fn from_settings(settings: &Settings, run_date: NaiveDate) -> Self {
        Self {
            storage_root: PathBuf::from(&settings.storage.root),
            retry: RetryPolicy::from(&settings.retry),
            per_page: settings.api.per_page,
            max_pages: settings.api.max_pages,
            max_reject_ratio: settings.silver.max_reject_ratio,
            run_date,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub run_date: NaiveDate,
    pub state: PipelineState,
    pub fetched: usize,
    pub bronze_rows: usize,
    pub curated_rows: usize,
    pub rejected_rows: usize,
    pub gold_rows: usize,
    pub bronze_path: PathBuf,
    pub silver_path: PathBuf,
    pub gold_path: PathBuf,
}

/// Runs fetch, bronze, silver and gold in order for one run date. A failing
/// stage ends the run; later stages are never attempted.
pub struct PipelineDriver {
    config: PipelineConfig,
    source: Arc<dyn PageSource>,
    sleeper: Arc<dyn Sleeper>,
    state: PipelineState,
}

impl PipelineDriver {
    pub fn new(config: PipelineConfig, source: Arc<dyn PageSource>) -> Self {
        Self {
            config,
            source,
            sleeper: Arc::new(TokioSleeper),
            state: PipelineState::Init,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// State of the latest run: `Done` after success, `Failed` after any
    /// stage error, `Init` before the first run.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub async fn run(&mut self) -> Result<RunSummary, PipelineError> {
        let run_id = Uuid::new_v4();
        self.state = PipelineState::Init;
        let result = self.execute(run_id).await;
        if let Err(e) = &result {
            error!(
                run_id = %run_id,
                from = %self.state,
                to = %PipelineState::Failed,
                exit_code = e.exit_code().as_i32(),
                error = %e,
                "Pipeline run failed"
            );
            self.state = PipelineState::Failed;
        }
        result
    }

    #[tracing::instrument(
        name = "pipeline_run",
        skip(self),
        fields(run_id = %run_id, run_date = %self.config.run_date)
    )]
    async fn execute(&mut self, run_id: Uuid) -> Result<RunSummary, PipelineError> {
        let run_date = self.config.run_date;
        let storage = LakeStorage::new(&self.config.storage_root);

        self.transition(PipelineState::Fetching);
        let fetcher = Fetcher::new(
            self.source.clone(),
            self.config.retry.clone(),
            self.config.per_page,
            self.config.max_pages,
        )
        .with_sleeper(self.sleeper.clone());
        let records = fetcher.fetch_all().await?;
        info!(fetched = records.len(), "Fetch complete");

        let bronze = BronzeWriter::new(storage.clone())
            .write_bronze(&records, run_date)
            .map_err(PipelineError::Write)?;
        self.transition(PipelineState::BronzeWritten);

        let silver = SilverTransformer::new(storage.clone(), self.config.max_reject_ratio)
            .transform(&bronze)
            .map_err(PipelineError::Validation)?;
        self.transition(PipelineState::SilverWritten);

        let gold = GoldAggregator::new(storage)
            .aggregate(&silver.partition)
            .await
            .map_err(PipelineError::Aggregation)?;
        self.transition(PipelineState::GoldWritten);

        self.transition(PipelineState::Done);
        let summary = summarize(run_id, run_date, self.state, records.len(), &bronze, &silver, &gold);

        info!(
            fetched = summary.fetched,
            bronze_rows = summary.bronze_rows,
            curated_rows = summary.curated_rows,
            rejected_rows = summary.rejected_rows,
            gold_rows = summary.gold_rows,
            countries = silver.countries.len(),
            "Pipeline run complete"
        );
        Ok(summary)
    }

    fn transition(&mut self, next: PipelineState) {
        info!(from = %self.state, to = %next, "Pipeline state transition");
        self.state = next;
    }
}

fn summarize(
    run_id: Uuid,
    run_date: NaiveDate,
    state: PipelineState,
    fetched: usize,
    bronze: &PartitionRef,
    silver: &crate::processor::SilverOutcome,
    gold: &PartitionRef,
) -> RunSummary {
    RunSummary {
        run_id,
        run_date,
        state,
        fetched,
        bronze_rows: bronze.rows,
        curated_rows: silver.partition.rows,
        rejected_rows: silver.rejected.len(),
        gold_rows: gold.rows,
        bronze_path: bronze.path.clone(),
        silver_path: silver.partition.path.clone(),
        gold_path: gold.path.clone(),
    }
}
