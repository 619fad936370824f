use chrono::NaiveDate;
use etl::BreweryRecord;
use serde::Serialize;
use std::fmt;

/// Stands in for a missing country or state so partitions never key on null.
pub const UNKNOWN: &str = "unknown";

/// A brewery after curation: trimmed id, resolved location, fixed field set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CuratedRecord {
    pub id: String,
    pub name: Option<String>,
    pub brewery_type: Option<String>,
    pub address_1: Option<String>,
    pub address_2: Option<String>,
    pub address_3: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state_province: Option<String>,
    pub state: String,
    pub postal_code: Option<String>,
    pub country: String,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub phone: Option<String>,
    pub website_url: Option<String>,
    pub updated_at: Option<String>,
    pub date_request: NaiveDate,
}

impl CuratedRecord {
    /// Projects a raw record onto the curated shape. Unknown fields are dropped.
    /// Returns `None` when the id is missing or blank.
    pub fn curate(raw: BreweryRecord, date_request: NaiveDate) -> Option<Self> {
        let id = raw.id.as_deref().map(str::trim).filter(|id| !id.is_empty())?.to_string();

        let state = non_blank(raw.state.as_deref())
            .or_else(|| non_blank(raw.state_province.as_deref()))
            .unwrap_or(UNKNOWN)
            .to_string();
        let country = non_blank(raw.country.as_deref()).unwrap_or(UNKNOWN).to_string();

        Some(Self {
            id,
            name: raw.name,
            brewery_type: raw.brewery_type,
            address_1: raw.address_1,
            address_2: raw.address_2,
            address_3: raw.address_3,
            street: raw.street,
            city: raw.city,
            state_province: raw.state_province,
            state,
            postal_code: raw.postal_code,
            country,
            longitude: raw.longitude,
            latitude: raw.latitude,
            phone: raw.phone,
            website_url: raw.website_url,
            updated_at: raw.updated_at,
            date_request,
        })
    }

    pub fn text_field(&self, name: &str) -> Option<&str> {
        match name {
            "id" => Some(&self.id),
            "state" => Some(&self.state),
            "country" => Some(&self.country),
            "name" => self.name.as_deref(),
            "brewery_type" => self.brewery_type.as_deref(),
            "address_1" => self.address_1.as_deref(),
            "address_2" => self.address_2.as_deref(),
            "address_3" => self.address_3.as_deref(),
            "street" => self.street.as_deref(),
            "city" => self.city.as_deref(),
            "state_province" => self.state_province.as_deref(),
            "postal_code" => self.postal_code.as_deref(),
            "phone" => self.phone.as_deref(),
            "website_url" => self.website_url.as_deref(),
            "updated_at" => self.updated_at.as_deref(),
            _ => None,
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// One gold row: how many curated breweries share a type and location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AggregateRow {
    pub date_request: NaiveDate,
    pub brewery_type: Option<String>,
    pub country: String,
    pub state: String,
    pub count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RejectReason {
    EmptyId,
    DuplicateId,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyId => f.write_str("empty id"),
            Self::DuplicateId => f.write_str("duplicate id"),
        }
    }
}

/// A bronze row that curation dropped. Never fatal on its own.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowRejected {
    pub row: usize,
    pub id: Option<String>,
    pub reason: RejectReason,
}
