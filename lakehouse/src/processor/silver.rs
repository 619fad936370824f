use crate::models::schema::{DATE_REQUEST, SchemaVersion, get_schema};
use crate::models::{CuratedRecord, Layer, RejectReason, RowRejected};
use crate::processor::PartitionRef;
use crate::storage::{LakeStorage, list_parquet_files, read_parquet};
use crate::utils::arrow::{float_at, float_column, string_at, string_column};
use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use common::{Error, Result};
use etl::BreweryRecord;
use etl::models::KNOWN_FIELDS;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of curating one bronze partition.
#[derive(Debug, Clone)]
pub struct SilverOutcome {
    pub partition: PartitionRef,
    pub countries: Vec<String>,
    pub rejected: Vec<RowRejected>,
}

/// Cleans bronze rows into the fixed curated shape, partitioned by country.
pub struct SilverTransformer {
    storage: LakeStorage,
    max_reject_ratio: f64,
}

impl SilverTransformer {
    pub fn new(storage: LakeStorage, max_reject_ratio: f64) -> Self {
        Self {
            storage,
            max_reject_ratio,
        }
    }

    pub fn transform(&self, bronze: &PartitionRef) -> Result<SilverOutcome> {
        let raw = load_bronze(bronze)?;
        let total = raw.len();
        let (curated, rejected) = curate(raw, bronze.date_request);

        for rejection in &rejected {
            warn!(
                row = rejection.row,
                id = ?rejection.id,
                reason = %rejection.reason,
                "Row rejected"
            );
        }

        if total > 0 && rejected.len() as f64 / total as f64 > self.max_reject_ratio {
            return Err(Error::RejectThresholdExceeded {
                rejected: rejected.len(),
                total,
                max_ratio: self.max_reject_ratio,
            });
        }

        let mut by_country: BTreeMap<String, Vec<CuratedRecord>> = BTreeMap::new();
        for record in curated {
            by_country
                .entry(record.country.clone())
                .or_default()
                .push(record);
        }

        let staged = self.storage.stage(Layer::Silver, bronze.date_request)?;
        let schema = Arc::new(get_schema(SchemaVersion::Silver).clone());
        let mut rows = 0;
        for (country, records) in &by_country {
            let batch = to_batch(records)?;
            let relative = self
                .storage
                .paths(Layer::Silver, bronze.date_request)
                .with_country(country)
                .build_relative_file_path();
            staged.write_parquet(&relative, schema.clone(), &[batch])?;
            rows += records.len();
        }
        let path = staged.commit()?;

        info!(
            curated = rows,
            rejected = rejected.len(),
            countries = by_country.len(),
            partition = %path.display(),
            "Silver partition written"
        );

        Ok(SilverOutcome {
            partition: PartitionRef {
                layer: Layer::Silver,
                date_request: bronze.date_request,
                path,
                rows,
            },
            countries: by_country.into_keys().collect(),
            rejected,
        })
    }
}

/// Reads a bronze partition back into typed records. Passthrough columns are
/// not read: curation drops them anyway.
fn load_bronze(bronze: &PartitionRef) -> Result<Vec<BreweryRecord>> {
    if !bronze.path.is_dir() {
        return Err(Error::Storage(format!(
            "Bronze partition {} does not exist",
            bronze.path.display()
        )));
    }

    let expected_date = bronze.date_request.format("%Y-%m-%d").to_string();
    let mut records = Vec::new();

    for file in list_parquet_files(&bronze.path)? {
        for batch in read_parquet(&file)? {
            let dates = string_column(&batch, DATE_REQUEST)?;
            let mut text_columns = Vec::with_capacity(KNOWN_FIELDS.len());
            for name in KNOWN_FIELDS {
                if matches!(name, "longitude" | "latitude") {
                    continue;
                }
                text_columns.push((name, string_column(&batch, name)?));
            }
            let longitude = float_column(&batch, "longitude")?;
            let latitude = float_column(&batch, "latitude")?;

            for row in 0..batch.num_rows() {
                if let Some(date) = string_at(dates.as_ref(), row) {
                    if date != expected_date {
                        return Err(Error::SchemaValidation(format!(
                            "Bronze row {} in {} is dated {}, expected {}",
                            row,
                            file.display(),
                            date,
                            expected_date
                        )));
                    }
                }

                let mut record = BreweryRecord::default();
                for (name, column) in &text_columns {
                    record.set_text_field(name, string_at(column.as_ref(), row));
                }
                record.longitude = float_at(longitude.as_ref(), row);
                record.latitude = float_at(latitude.as_ref(), row);
                records.push(record);
            }
        }
    }

    Ok(records)
}

/// Keeps the first occurrence of every trimmed id; blank and repeated ids are rejected.
pub fn curate(
    raw: Vec<BreweryRecord>,
    date_request: NaiveDate,
) -> (Vec<CuratedRecord>, Vec<RowRejected>) {
    let mut seen = HashSet::new();
    let mut curated = Vec::with_capacity(raw.len());
    let mut rejected = Vec::new();

    for (row, record) in raw.into_iter().enumerate() {
        let original_id = record.id.clone();
        match CuratedRecord::curate(record, date_request) {
            None => rejected.push(RowRejected {
                row,
                id: original_id,
                reason: RejectReason::EmptyId,
            }),
            Some(record) if !seen.insert(record.id.clone()) => rejected.push(RowRejected {
                row,
                id: Some(record.id),
                reason: RejectReason::DuplicateId,
            }),
            Some(record) => curated.push(record),
        }
    }

    (curated, rejected)
}

fn to_batch(records: &[CuratedRecord]) -> Result<RecordBatch> {
    let schema = Arc::new(get_schema(SchemaVersion::Silver).clone());
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

    columns.push(Arc::new(StringArray::from(
        records
            .iter()
            .map(|r| r.date_request.format("%Y-%m-%d").to_string())
            .collect::<Vec<_>>(),
    )));

    Ok(RecordBatch::try_new(schema, columns)?)
}

/// Reads every country sub-partition of a silver partition.
pub fn load_silver(silver: &PartitionRef) -> Result<Vec<RecordBatch>> {
    if !silver.path.is_dir() {
        return Err(Error::Storage(format!(
            "Silver partition {} does not exist",
            silver.path.display()
        )));
    }

    let mut batches = Vec::new();
    for file in list_parquet_files(&silver.path)? {
        batches.extend(read_parquet(&file)?);
    }
    Ok(batches)
}
