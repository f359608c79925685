use std::fmt::Write as _;
use std::io::{self, Write};

use camino::Utf8Path;
use serde::Serialize;

use crate::app::{ConfigResult, FindResult, IngestOutcome, ListResult, SearchResult};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::store::{AddOutcome, Record};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_ingest(result: &IngestOutcome) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_list(result: &ListResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_search(result: &SearchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_find(result: &FindResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_config(result: &ConfigResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Human-readable renderings printed to stdout.
pub struct TextOutput;

impl TextOutput {
    pub fn ingest(result: &IngestOutcome, metadata_file: &Utf8Path) -> String {
        match result {
            IngestOutcome::Recorded {
                outcome: AddOutcome::Inserted(_),
                ..
            } => format!("Metadata recorded in {metadata_file}"),
            IngestOutcome::Recorded {
                outcome: AddOutcome::Updated(record),
                ..
            } => format!(
                "Metadata for URL {} updated in {metadata_file}",
                record.source_url
            ),
            IngestOutcome::Skipped { .. } => {
                "Metadata recording skipped due to download failure.".to_string()
            }
        }
    }

    pub fn list(result: &ListResult) -> String {
        if result.datasets.is_empty() {
            return "No datasets found in metadata.".to_string();
        }
        Self::entries("Datasets and their associated tags:", &result.datasets)
    }

    pub fn search(result: &SearchResult) -> String {
        if result.datasets.is_empty() {
            return "No matching datasets found.".to_string();
        }
        Self::entries("Search results:", &result.datasets)
    }

    pub fn find(result: &FindResult) -> String {
        result.path.to_string()
    }

    pub fn config(result: &ConfigResult) -> String {
        let unset = "(unset)".to_string();
        let mut out = String::from("Current configuration:");
        let _ = write!(out, "\nconfig_file: {}", result.config_file);
        let _ = write!(
            out,
            "\ndownload_directory: {}",
            result
                .download_directory
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| unset.clone())
        );
        let _ = write!(
            out,
            "\nmetadata_file: {}",
            result
                .metadata_file
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or(unset)
        );
        out
    }

    fn entries(header: &str, records: &[Record]) -> String {
        let mut out = header.to_string();
        for record in records {
            let _ = write!(out, "\n- {}: {}", record.data_name, record.tags.join(", "));
        }
        out
    }
}
