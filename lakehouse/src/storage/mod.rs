use crate::models::Layer;
use crate::utils::paths::PathBuilder;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use common::{Error, Result};
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use uuid::Uuid;

const STAGING_PREFIX: &str = ".staging-";
const REPLACED_PREFIX: &str = ".replaced-";

/// Local, directory-partitioned parquet storage rooted at one path.
#[derive(Debug, Clone)]
pub struct LakeStorage {
    root: PathBuf,
}

impl LakeStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn paths(&self, layer: Layer, date_request: NaiveDate) -> PathBuilder {
        PathBuilder::new(&self.root, layer, date_request)
    }

    pub fn partition_path(&self, layer: Layer, date_request: NaiveDate) -> PathBuf {
        self.paths(layer, date_request).build_partition_path()
    }

    /// Opens a staging directory next to the layer's partitions. Nothing in it
    /// is visible to readers until `commit`.
    pub fn stage(&self, layer: Layer, date_request: NaiveDate) -> Result<StagedPartition> {
        let layer_path = self.paths(layer, date_request).build_layer_path();
        fs::create_dir_all(&layer_path).map_err(|e| {
            Error::Storage(format!(
                "Cannot create layer directory {}: {}",
                layer_path.display(),
                e
            ))
        })?;

        sweep_layer(&layer_path)?;

        let dir = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&layer_path)?;
        debug!(layer = %layer, staging = %dir.path().display(), "Opened staging directory");

        Ok(StagedPartition {
            dir,
            layer,
            target: self.partition_path(layer, date_request),
            metadata: vec![
                KeyValue {
                    key: "layer".to_string(),
                    value: Some(layer.as_str().to_string()),
                },
                KeyValue {
                    key: "date_request".to_string(),
                    value: Some(date_request.format("%Y-%m-%d").to_string()),
                },
            ],
        })
    }
}

pub struct StagedPartition {
    dir: TempDir,
    layer: Layer,
    target: PathBuf,
    metadata: Vec<KeyValue>,
}

impl StagedPartition {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Writes one parquet file at `relative` inside the staged partition.
    pub fn write_parquet(
        &self,
        relative: &Path,
        schema: SchemaRef,
        batches: &[RecordBatch],
    ) -> Result<PathBuf> {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .set_key_value_metadata(Some(self.metadata.clone()))
            .build();

        let file = File::create(&path)?;
        let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
        for batch in batches {
            writer.write(batch)?;
        }
        writer.close()?;

        debug!(layer = %self.layer, file = %path.display(), "Staged parquet file");
        Ok(path)
    }

    /// Swaps the staged directory into place. An existing partition is moved
    /// aside first and restored if the swap fails, so readers only ever see a
    /// complete partition.
    pub fn commit(self) -> Result<PathBuf> {
        let parent = self
            .target
            .parent()
            .ok_or_else(|| Error::Storage(format!("No parent for {}", self.target.display())))?;
        let partition = self
            .target
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Storage(format!("Bad partition path {}", self.target.display())))?;

        if !self.target.exists() {
            fs::rename(self.dir.path(), &self.target)?;
            info!(layer = %self.layer, partition = %self.target.display(), "Partition written");
            return Ok(self.target);
        }

        let previous = parent.join(replaced_name(partition));
        fs::rename(&self.target, &previous)?;

        if let Err(e) = fs::rename(self.dir.path(), &self.target) {
            if let Err(restore) = fs::rename(&previous, &self.target) {
                warn!(
                    partition = %self.target.display(),
                    error = %restore,
                    "Could not restore previous partition"
                );
            }
            return Err(Error::Storage(format!(
                "Failed to replace partition {}: {}",
                self.target.display(),
                e
            )));
        }

        if let Err(e) = fs::remove_dir_all(&previous) {
            warn!(path = %previous.display(), error = %e, "Could not remove replaced partition");
        }
        info!(layer = %self.layer, partition = %self.target.display(), "Partition replaced");
        Ok(self.target)
    }
}

// `.replaced-<uuid>-<partition>`; the partition name lets a later sweep put
// it back if a commit died between its two renames.
fn replaced_name(partition: &str) -> String {
    format!("{}{}-{}", REPLACED_PREFIX, Uuid::new_v4(), partition)
}

fn replaced_partition(name: &str) -> Option<&str> {
    let rest = name.strip_prefix(REPLACED_PREFIX)?;
    let (id, partition) = rest.split_at_checked(36)?;
    Uuid::parse_str(id).ok()?;
    partition.strip_prefix('-').filter(|p| !p.is_empty())
}

/// Clears what interrupted runs left in a layer directory. Staging
/// directories are removed. A set-aside partition is moved back when its
/// partition is missing, and removed otherwise. Runs never overlap, so
/// nothing here belongs to a live writer.
fn sweep_layer(layer_path: &Path) -> Result<()> {
    for entry in fs::read_dir(layer_path)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if name.starts_with(STAGING_PREFIX) {
            warn!(path = %path.display(), "Removing abandoned staging directory");
            if let Err(e) = fs::remove_dir_all(&path) {
                warn!(path = %path.display(), error = %e, "Could not remove staging directory");
            }
            continue;
        }

        if !name.starts_with(REPLACED_PREFIX) {
            continue;
        }
        let target = replaced_partition(name).map(|p| layer_path.join(p));
        match target {
            Some(target) if !target.exists() => {
                warn!(
                    from = %path.display(),
                    partition = %target.display(),
                    "Restoring partition left aside by an interrupted commit"
                );
                fs::rename(&path, &target)?;
            }
            _ => {
                warn!(path = %path.display(), "Removing replaced partition");
                if let Err(e) = fs::remove_dir_all(&path) {
                    warn!(path = %path.display(), error = %e, "Could not remove replaced partition");
                }
            }
        }
    }
    Ok(())
}

/// All parquet files below `dir`, in a stable order.
pub fn list_parquet_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current)? {
            let path = entry?.path();
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'));
            if hidden {
                continue;
            }
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "parquet") {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

pub fn read_parquet(path: &Path) -> Result<Vec<RecordBatch>> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(batches)
}
