use crate::models::BreweryRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::config::ApiConfig;
use common::{Error, Result};
use http::HeaderMap;
use http::header::RETRY_AFTER;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Something that can return one page of breweries.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, page: u32, per_page: u32) -> Result<Vec<BreweryRecord>>;
}

pub struct HttpPageSource {
    client: rquest::Client,
    base_url: Url,
}

impl HttpPageSource {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = rquest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: Url::parse(&config.base_url)?,
        })
    }

    pub fn page_url(&self, page: u32, per_page: u32) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("per_page", &per_page.to_string());
        url
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_page(&self, page: u32, per_page: u32) -> Result<Vec<BreweryRecord>> {
        let url = self.page_url(page, per_page);
        debug!(%url, "Requesting page");

        let response = self.client.get(url.as_str()).send().await?;
        let status = response.status();

        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers(), Utc::now());
            return Err(Error::from_status(status.as_u16(), retry_after));
        }

        let body = response.text().await?;
        let records: Vec<BreweryRecord> = serde_json::from_str(&body)?;
        Ok(records)
    }
}

/// Reads a `Retry-After` header given either as delta-seconds or as an HTTP date.
pub fn parse_retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}
