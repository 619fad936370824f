use crate::models::schema::{COUNT, DATE_REQUEST, GROUP_COLUMNS, SchemaVersion, get_schema};
use crate::models::{AggregateRow, Layer};
use crate::processor::PartitionRef;
use crate::processor::silver::load_silver;
use crate::storage::{LakeStorage, list_parquet_files, read_parquet};
use crate::utils::arrow::{int_column, string_at, string_column};
use crate::utils::paths::DATA_FILE;
use arrow::array::{ArrayRef, Int64Array, StringArray};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use common::{Error, Result};
use datafusion::datasource::MemTable;
use datafusion::functions_aggregate::expr_fn::count;
use datafusion::prelude::*;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Counts curated breweries per (type, country, state) for one run date.
pub struct GoldAggregator {
    storage: LakeStorage,
    ctx: SessionContext,
}

impl GoldAggregator {
    pub fn new(storage: LakeStorage) -> Self {
        Self {
            storage,
            ctx: SessionContext::new(),
        }
    }

    pub async fn aggregate(&self, silver: &PartitionRef) -> Result<PartitionRef> {
        let batches = load_silver(silver)?;
        let rows = self.group_counts(batches, silver.date_request).await?;

        let batch = to_batch(&rows)?;
        let staged = self.storage.stage(Layer::Gold, silver.date_request)?;
        staged.write_parquet(Path::new(DATA_FILE), batch.schema(), &[batch])?;
        let path = staged.commit()?;

        info!(groups = rows.len(), partition = %path.display(), "Gold partition written");

        Ok(PartitionRef {
            layer: Layer::Gold,
            date_request: silver.date_request,
            path,
            rows: rows.len(),
        })
    }

    async fn group_counts(
        &self,
        batches: Vec<RecordBatch>,
        date_request: NaiveDate,
    ) -> Result<Vec<AggregateRow>> {
        let schema = Arc::new(get_schema(SchemaVersion::AggregationInput).clone());

        // Re-wrap the grouping columns under one schema; file-level metadata
        // differs between sub-partitions.
        let mut inputs = Vec::with_capacity(batches.len());
        for batch in &batches {
            let columns = GROUP_COLUMNS
                .iter()
                .map(|name| {
                    batch.column_by_name(name).cloned().ok_or_else(|| {
                        Error::SchemaValidation(format!("Silver data has no {} column", name))
                    })
                })
                .collect::<Result<Vec<ArrayRef>>>()?;
            inputs.push(RecordBatch::try_new(schema.clone(), columns)?);
        }

        let table = MemTable::try_new(schema, vec![inputs])?;
        let grouped = self
            .ctx
            .read_table(Arc::new(table))?
            .aggregate(
                GROUP_COLUMNS.iter().map(|name| col(*name)).collect(),
                vec![count(lit(1)).alias(COUNT)],
            )?
            .sort(
                GROUP_COLUMNS
                    .iter()
                    .map(|name| col(*name).sort(true, true))
                    .collect(),
            )?
            .collect()
            .await?;

        let mut rows = Vec::new();
        for batch in &grouped {
            rows.extend(rows_from_batch(batch, date_request)?);
        }
        Ok(rows)
    }
}

fn rows_from_batch(batch: &RecordBatch, date_request: NaiveDate) -> Result<Vec<AggregateRow>> {
    let missing =
        |name: &str| Error::SchemaValidation(format!("Gold data has no {} column", name));
    let brewery_type =
        string_column(batch, "brewery_type")?.ok_or_else(|| missing("brewery_type"))?;
    let country = string_column(batch, "country")?.ok_or_else(|| missing("country"))?;
    let state = string_column(batch, "state")?.ok_or_else(|| missing("state"))?;
    let counts = int_column(batch, COUNT)?.ok_or_else(|| missing(COUNT))?;

    Ok((0..batch.num_rows())
        .map(|row| AggregateRow {
            date_request,
            brewery_type: string_at(Some(&brewery_type), row),
            country: string_at(Some(&country), row).unwrap_or_default(),
            state: string_at(Some(&state), row).unwrap_or_default(),
            count: counts.value(row),
        })
        .collect())
}

fn to_batch(rows: &[AggregateRow]) -> Result<RecordBatch> {
    let schema = Arc::new(get_schema(SchemaVersion::Gold).clone());
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(
            rows.iter()
                .map(|r| r.date_request.format("%Y-%m-%d").to_string())
                .collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            rows.iter().map(|r| r.brewery_type.as_deref()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            rows.iter().map(|r| r.country.as_str()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            rows.iter().map(|r| r.state.as_str()).collect::<Vec<_>>(),
        )),
        Arc::new(Int64Array::from(
            rows.iter().map(|r| r.count).collect::<Vec<_>>(),
        )),
    ];
    Ok(RecordBatch::try_new(schema, columns)?)
}

/// Reads a gold partition back as rows, in stored order.
pub fn load_aggregates(gold: &PartitionRef) -> Result<Vec<AggregateRow>> {
    if !gold.path.is_dir() {
        return Err(Error::Storage(format!(
            "Gold partition {} does not exist",
            gold.path.display()
        )));
    }

    let mut rows = Vec::new();
    for file in list_parquet_files(&gold.path)? {
        for batch in read_parquet(&file)? {
            let dates = string_column(&batch, DATE_REQUEST)?;
            for row in 0..batch.num_rows() {
                let date = string_at(dates.as_ref(), row);
                let parsed = date
                    .as_deref()
                    .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());
                if parsed != Some(gold.date_request) {
                    return Err(Error::SchemaValidation(format!(
                        "Gold row {} in {} is dated {:?}, expected {}",
                        row,
                        file.display(),
                        date,
                        gold.date_request
                    )));
                }
            }
            rows.extend(rows_from_batch(&batch, gold.date_request)?);
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UNKNOWN;
    use crate::processor::bronze::BronzeWriter;
    use crate::processor::silver::SilverTransformer;
    use etl::BreweryRecord;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn brewery(
        id: &str,
        kind: Option<&str>,
        country: Option<&str>,
        state: Option<&str>,
    ) -> BreweryRecord {
        let mut record = BreweryRecord::with_id(id);
        record.brewery_type = kind.map(str::to_string);
        record.country = country.map(str::to_string);
        record.state = state.map(str::to_string);
        record
    }

    fn silver(tmp: &tempfile::TempDir, records: &[BreweryRecord]) -> PartitionRef {
        let storage = LakeStorage::new(tmp.path());
        let bronze = BronzeWriter::new(storage.clone())
            .write_bronze(records, date())
            .unwrap();
        SilverTransformer::new(storage, 1.0)
            .transform(&bronze)
            .unwrap()
            .partition
    }

    #[tokio::test]
    async fn test_counts_per_group() {
        let tmp = tempfile::tempdir().unwrap();
        let silver = silver(
            &tmp,
            &[
                brewery("b1", Some("micro"), Some("United States"), Some("California")),
                brewery("b2", Some("micro"), Some("United States"), Some("California")),
                brewery("b3", Some("large"), Some("United States"), Some("New York")),
                brewery("b4", Some("micro"), None, None),
                brewery("b5", None, Some("Ireland"), Some("Dublin")),
            ],
        );

        let gold = GoldAggregator::new(LakeStorage::new(tmp.path()))
            .aggregate(&silver)
            .await
            .unwrap();
        let rows = load_aggregates(&gold).unwrap();

        let summary: Vec<(Option<&str>, &str, &str, i64)> = rows
            .iter()
            .map(|r| (r.brewery_type.as_deref(), r.country.as_str(), r.state.as_str(), r.count))
            .collect();
        assert_eq!(
            summary,
            vec![
                (None, "Ireland", "Dublin", 1),
                (Some("large"), "United States", "New York", 1),
                (Some("micro"), "United States", "California", 2),
                (Some("micro"), UNKNOWN, UNKNOWN, 1),
            ]
        );
        assert_eq!(gold.rows, 4);
        assert!(rows.iter().all(|r| r.date_request == date()));
    }

    #[tokio::test]
    async fn test_empty_silver_yields_empty_gold() {
        let tmp = tempfile::tempdir().unwrap();
        let silver = silver(&tmp, &[]);

        let gold = GoldAggregator::new(LakeStorage::new(tmp.path()))
            .aggregate(&silver)
            .await
            .unwrap();

        assert_eq!(gold.rows, 0);
        assert!(load_aggregates(&gold).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_silver_partition_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = PartitionRef {
            layer: Layer::Silver,
            date_request: date(),
            path: tmp.path().join("silver").join("date_request=2024-01-01"),
            rows: 0,
        };

        let err = GoldAggregator::new(LakeStorage::new(tmp.path()))
            .aggregate(&missing)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert!(!tmp.path().join("gold").join("date_request=2024-01-01").exists());
    }
}
