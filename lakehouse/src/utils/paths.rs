use crate::models::Layer;
use crate::models::schema::DATE_REQUEST;
use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

pub const DATA_FILE: &str = "part-00000.parquet";

/// Longest escaped value kept verbatim in a directory name. Filesystems cap a
/// name at 255 bytes.
pub const MAX_SEGMENT_VALUE_BYTES: usize = 200;
const DIGEST_HEX_LEN: usize = 16;

pub struct PathBuilder {
    root: PathBuf,
    layer: Layer,
    date_request: NaiveDate,
    country: Option<String>,
}

impl PathBuilder {
    pub fn new(root: &Path, layer: Layer, date_request: NaiveDate) -> Self {
        Self {
            root: root.to_path_buf(),
            layer,
            date_request,
            country: None,
        }
    }

    pub fn with_country(mut self, country: &str) -> Self {
        self.country = Some(country.to_string());
        self
    }

    pub fn build_layer_path(&self) -> PathBuf {
        self.root.join(self.layer.as_str())
    }

    /// `<root>/<layer>/date_request=<YYYY-MM-DD>`
    pub fn build_partition_path(&self) -> PathBuf {
        self.build_layer_path().join(partition_dir(self.date_request))
    }

    /// Path of a leaf inside a partition, relative to the partition directory.
    pub fn build_relative_file_path(&self) -> PathBuf {
        match &self.country {
            Some(country) => PathBuf::from(partition_segment("country", country)).join(DATA_FILE),
            None => PathBuf::from(DATA_FILE),
        }
    }

    pub fn build_file_path(&self) -> PathBuf {
        self.build_partition_path().join(self.build_relative_file_path())
    }
}

pub fn partition_dir(date_request: NaiveDate) -> String {
    partition_segment(DATE_REQUEST, &date_request.format("%Y-%m-%d").to_string())
}

pub fn partition_segment(key: &str, value: &str) -> String {
    format!("{}={}", key, bound_partition_value(escape_partition_value(value), value))
}

// Over-long values keep a prefix plus a digest of the full value, so distinct
// values still land in distinct directories.
fn bound_partition_value(escaped: String, value: &str) -> String {
    if escaped.len() <= MAX_SEGMENT_VALUE_BYTES {
        return escaped;
    }

    let digest = Sha256::digest(value.as_bytes());
    let suffix: String = digest
        .iter()
        .take(DIGEST_HEX_LEN / 2)
        .map(|b| format!("{:02x}", b))
        .collect();

    let mut cut = MAX_SEGMENT_VALUE_BYTES - DIGEST_HEX_LEN - 1;
    while !escaped.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}~{}", &escaped[..cut], suffix)
}

/// Hive-style escaping so any value is a single safe directory name.
pub fn escape_partition_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '/' | '\\' | ':' | '=' | '%' | '?' | '*' | '"' | '<' | '>' | '|' => {
                escaped.push_str(&format!("%{:02X}", c as u32));
            }
            c if c.is_control() => escaped.push_str(&format!("%{:02X}", c as u32)),
            c => escaped.push(c),
        }
    }
    if escaped == "." || escaped == ".." {
        return escaped.replace('.', "%2E");
    }
    escaped
}
