use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{DatasetName, SourceUrl};
use crate::error::GeoError;
use crate::fs_util::write_atomic;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: u64,
    pub source_url: String,
    pub downloaded_filename: String,
    pub data_name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub download_timestamp: String,
}

impl Record {
    fn matches(&self, needle: &str) -> bool {
        self.data_name.to_lowercase().contains(needle)
            || self.tags.iter().any(|tag| tag.to_lowercase().contains(needle))
    }
}

#[derive(Debug, Clone)]
pub struct NewRecord {
    pub source_url: SourceUrl,
    pub downloaded_filename: String,
    pub data_name: DatasetName,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum AddOutcome {
    Inserted(Record),
    Updated(Record),
}

impl AddOutcome {
    pub fn record(&self) -> &Record {
        match self {
            AddOutcome::Inserted(record) | AddOutcome::Updated(record) => record,
        }
    }
}

/// Flat JSON list of [`Record`]s, read and rewritten whole on every call.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: Utf8PathBuf,
}

impl MetadataStore {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.as_std_path().exists()
    }

    /// Creates the file as an empty list when it does not exist yet.
    pub fn ensure_initialized(&self) -> Result<(), GeoError> {
        if self.exists() {
            return Ok(());
        }
        debug!(path = %self.path, "initializing metadata file");
        self.save(&[])
    }

    /// Missing or undecodable files read as an empty list.
    pub fn load(&self) -> Vec<Record> {
        match self.read_records() {
            Ok(records) => records,
            Err(err) => {
                warn!(path = %self.path, error = %err, "unable to read metadata, starting with empty metadata");
                Vec::new()
            }
        }
    }

    // Like `load`, but an unreadable file is an error so it never gets
    // overwritten by a shorter list.
    fn read_records(&self) -> Result<Vec<Record>, GeoError> {
        let content = match fs::read_to_string(self.path.as_std_path()) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(GeoError::Filesystem(format!("read {}: {err}", self.path))),
        };
        match serde_json::from_str::<Vec<Record>>(&content) {
            Ok(records) => Ok(records),
            Err(err) => {
                warn!(path = %self.path, error = %err, "error decoding metadata, starting with empty metadata");
                Ok(Vec::new())
            }
        }
    }

    pub fn save(&self, records: &[Record]) -> Result<(), GeoError> {
        let mut content = serde_json::to_vec_pretty(records)
            .map_err(|err| GeoError::Serialization(err.to_string()))?;
        content.push(b'\n');
        write_atomic(&self.path, &content)
    }

    /// Fails with `DuplicateName` when `name` belongs to a record for another
    /// URL and `url` has no record of its own. Nothing is written.
    pub fn check_name(&self, url: &SourceUrl, name: &DatasetName) -> Result<(), GeoError> {
        let records = self.read_records()?;
        match name_clash(&records, url, name) {
            Some(clash) => Err(duplicate(name, clash)),
            None => Ok(()),
        }
    }

    pub fn add_record(&self, entry: NewRecord) -> Result<AddOutcome, GeoError> {
        let mut records = self.read_records()?;
        if let Some(clash) = name_clash(&records, &entry.source_url, &entry.data_name) {
            return Err(duplicate(&entry.data_name, clash));
        }
        let timestamp = iso_timestamp();

        let outcome = if let Some(existing) = records
            .iter_mut()
            .find(|record| record.source_url == entry.source_url.as_str())
        {
            existing.downloaded_filename = entry.downloaded_filename;
            existing.data_name = entry.data_name.as_str().to_string();
            existing.tags = entry.tags;
            existing.download_timestamp = timestamp;
            info!(url = %entry.source_url, path = %self.path, "metadata updated");
            AddOutcome::Updated(existing.clone())
        } else {
            let record = Record {
                id: next_id(&records),
                source_url: entry.source_url.as_str().to_string(),
                downloaded_filename: entry.downloaded_filename,
                data_name: entry.data_name.as_str().to_string(),
                tags: entry.tags,
                download_timestamp: timestamp,
            };
            info!(url = %entry.source_url, path = %self.path, id = record.id, "metadata recorded");
            records.push(record.clone());
            AddOutcome::Inserted(record)
        };

        self.save(&records)?;
        Ok(outcome)
    }

    /// Exact, case-sensitive lookup by `data_name`.
    pub fn find(&self, name: &str) -> Result<Record, GeoError> {
        if !self.exists() {
            return Err(GeoError::MetadataFileMissing(self.path.clone()));
        }
        self.read_records()?
            .into_iter()
            .find(|record| record.data_name == name)
            .ok_or_else(|| GeoError::NotFound(name.to_string()))
    }

    /// Case-insensitive substring match on the name or any tag.
    pub fn search(&self, query: &str) -> Vec<Record> {
        let needle = query.to_lowercase();
        self.load()
            .into_iter()
            .filter(|record| record.matches(&needle))
            .collect()
    }
}

// A re-ingest of a known URL may rename freely; a new URL may not take a
// name that is already in use.
fn name_clash<'a>(records: &'a [Record], url: &SourceUrl, name: &DatasetName) -> Option<&'a Record> {
    if records.iter().any(|record| record.source_url == url.as_str()) {
        return None;
    }
    records
        .iter()
        .find(|record| record.data_name == name.as_str())
}

fn duplicate(name: &DatasetName, clash: &Record) -> GeoError {
    GeoError::DuplicateName {
        name: name.as_str().to_string(),
        source_url: clash.source_url.clone(),
    }
}

// One past the largest id on file, so ids stay unique even if the list
// was edited by hand.
fn next_id(records: &[Record]) -> u64 {
    records
        .iter()
        .map(|record| record.id)
        .max()
        .map_or(1, |max| max + 1)
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
