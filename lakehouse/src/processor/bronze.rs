use crate::models::Layer;
use crate::models::schema::{DATE_REQUEST, bronze_schema};
use crate::processor::PartitionRef;
use crate::storage::LakeStorage;
use crate::utils::arrow::json_to_text;
use crate::utils::paths::DATA_FILE;
use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use common::{Error, Result};
use etl::BreweryRecord;
use etl::models::KNOWN_FIELDS;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Lands fetched records unmodified, tagged with the run date.
pub struct BronzeWriter {
    storage: LakeStorage,
}

impl BronzeWriter {
    pub fn new(storage: LakeStorage) -> Self {
        Self { storage }
    }

    /// Replaces the bronze partition of `run_date` with `records`. Every record
    /// must carry an id; otherwise nothing is written.
    pub fn write_bronze(
        &self,
        records: &[BreweryRecord],
        run_date: NaiveDate,
    ) -> Result<PartitionRef> {
        if let Some(index) = records.iter().position(|r| r.id.is_none()) {
            return Err(Error::MissingId { index });
        }

        let extra_columns = passthrough_columns(records);
        let batch = build_batch(records, &extra_columns, run_date)?;

        let staged = self.storage.stage(Layer::Bronze, run_date)?;
        staged.write_parquet(Path::new(DATA_FILE), batch.schema(), &[batch])?;
        let path = staged.commit()?;

        info!(
            rows = records.len(),
            passthrough_columns = extra_columns.len(),
            partition = %path.display(),
            "Bronze partition written"
        );

        Ok(PartitionRef {
            layer: Layer::Bronze,
            date_request: run_date,
            path,
            rows: records.len(),
        })
    }
}

// Unknown API fields become their own columns, sorted by name. A field that
// collides with the injected run date is not passed through.
fn passthrough_columns(records: &[BreweryRecord]) -> Vec<String> {
    let mut names = BTreeSet::new();
    for record in records {
        for key in record.extra.keys() {
            if key == DATE_REQUEST {
                continue;
            }
            names.insert(key.clone());
        }
    }
    if records.iter().any(|r| r.extra.contains_key(DATE_REQUEST)) {
        warn!("Upstream records carry a date_request field; the run date takes precedence");
    }
    names.into_iter().collect()
}

fn build_batch(
    records: &[BreweryRecord],
    extra_columns: &[String],
    run_date: NaiveDate,
) -> Result<RecordBatch> {
    let schema = Arc::new(bronze_schema(extra_columns));
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());

    for name in KNOWN_FIELDS {
        let column: ArrayRef = match name {
            "longitude" => Arc::new(Float64Array::from(
                records.iter().map(|r| r.longitude).collect::<Vec<_>>(),
            )),
            "latitude" => Arc::new(Float64Array::from(
                records.iter().map(|r| r.latitude).collect::<Vec<_>>(),
            )),
            text => Arc::new(StringArray::from(
                records.iter().map(|r| r.text_field(text)).collect::<Vec<_>>(),
            )),
        };
        columns.push(column);
    }

    for name in extra_columns {
        let values: Vec<Option<String>> = records
            .iter()
            .map(|r| r.extra.get(name).and_then(json_to_text))
            .collect();
        columns.push(Arc::new(StringArray::from(values)));
    }

    let date = run_date.format("%Y-%m-%d").to_string();
    columns.push(Arc::new(StringArray::from(vec![date.as_str(); records.len()])));

    Ok(RecordBatch::try_new(schema, columns)?)
}
