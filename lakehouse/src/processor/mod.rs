pub mod bronze;
pub mod gold;
pub mod silver;

pub use bronze::BronzeWriter;
pub use gold::{GoldAggregator, load_aggregates};
pub use silver::{SilverOutcome, SilverTransformer, load_silver};

use crate::models::Layer;
use chrono::NaiveDate;
use std::path::PathBuf;

/// A committed partition of one layer for one run date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionRef {
    pub layer: Layer,
    pub date_request: NaiveDate,
    pub path: PathBuf,
    pub rows: usize,
}
