use crate::client::PageSource;
use crate::models::BreweryRecord;
use crate::utils::retry::RetryPolicy;
use crate::utils::time::{Sleeper, TokioSleeper};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
#[error("Fetching page {page} failed after {attempts} attempt(s): {cause}")]
pub struct FetchError {
    pub page: u32,
    pub attempts: u32,
    #[source]
    pub cause: common::Error,
}

/// Walks the paginated endpoint and collects every record of one run.
pub struct Fetcher {
    source: Arc<dyn PageSource>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    per_page: u32,
    max_pages: u32,
}

impl Fetcher {
    pub fn new(
        source: Arc<dyn PageSource>,
        policy: RetryPolicy,
        per_page: u32,
        max_pages: u32,
    ) -> Self {
        Self {
            source,
            policy,
            sleeper: Arc::new(TokioSleeper),
            per_page: per_page.max(1),
            max_pages,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Requests pages from 1 until a short page or `max_pages`. Any page that
    /// still fails after its retries fails the whole fetch; nothing partial is
    /// returned.
    pub async fn fetch_all(&self) -> Result<Vec<BreweryRecord>, FetchError> {
        let mut records = Vec::new();
        let mut page = 1;

        loop {
            if page > self.max_pages {
                warn!(
                    max_pages = self.max_pages,
                    fetched = records.len(),
                    "Page limit reached before the end of data"
                );
                break;
            }

            let batch = self
                .policy
                .run(self.sleeper.as_ref(), |_| self.source.fetch_page(page, self.per_page))
                .await
                .map_err(|exhausted| FetchError {
                    page,
                    attempts: exhausted.attempts,
                    cause: exhausted.error,
                })?;

            let received = batch.len();
            records.extend(batch);
            info!(page, received, total = records.len(), "Fetched page");

            if received < self.per_page as usize {
                break;
            }
            page += 1;
        }

        info!(records = records.len(), pages = page.min(self.max_pages), "Fetch complete");
        Ok(records)
    }
}
