use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::error;

use crate::config::{Config, ConfigStore, Settings};
use crate::domain::{DatasetName, SourceUrl};
use crate::download::DownloadClient;
use crate::error::GeoError;
use crate::fs_util::extract_member;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::store::{AddOutcome, MetadataStore, NewRecord, Record};

#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub url: SourceUrl,
    pub name: DatasetName,
    pub tags: Vec<String>,
    /// Member to pull out of a downloaded zip archive instead of keeping the
    /// archive itself.
    pub extract: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum IngestOutcome {
    Recorded {
        outcome: AddOutcome,
        path: Utf8PathBuf,
    },
    Skipped {
        url: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub datasets: Vec<Record>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub query: String,
    pub datasets: Vec<Record>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FindResult {
    pub data_name: String,
    pub path: Utf8PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigResult {
    pub config_file: Utf8PathBuf,
    pub download_directory: Option<Utf8PathBuf>,
    pub metadata_file: Option<Utf8PathBuf>,
}

impl ConfigResult {
    pub fn new(store: &ConfigStore, config: &Config) -> Self {
        Self {
            config_file: store.path().to_owned(),
            download_directory: config.download_directory().map(Utf8Path::to_owned),
            metadata_file: config.metadata_path(),
        }
    }
}

/// Commands that need a configured download directory.
#[derive(Clone)]
pub struct App<D: DownloadClient> {
    settings: Settings,
    store: MetadataStore,
    downloader: D,
}

impl<D: DownloadClient> App<D> {
    pub fn new(settings: Settings, downloader: D) -> Self {
        let store = settings.metadata_store();
        Self {
            settings,
            store,
            downloader,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Downloads and then records metadata. A failed download is reported as
    /// [`IngestOutcome::Skipped`] and leaves the metadata untouched. A name
    /// already held by another URL is rejected before anything is fetched.
    pub fn ingest(
        &self,
        request: IngestRequest,
        sink: &dyn ProgressSink,
    ) -> Result<IngestOutcome, GeoError> {
        self.store.check_name(&request.url, &request.name)?;
        let url = request.url.as_str().to_string();
        let fetched = match request.extract.as_deref() {
            Some(member) => self.fetch_member(&url, member, sink),
            None => self.downloader.download(
                &url,
                self.settings.download_directory.as_std_path(),
                sink,
            ),
        };
        let downloaded_filename = match fetched {
            Ok(filename) => filename,
            Err(err) => {
                error!(url = %url, error = %err, "download failed, metadata recording skipped");
                return Ok(IngestOutcome::Skipped {
                    url,
                    reason: err.to_string(),
                });
            }
        };

        let path = self.settings.download_directory.join(&downloaded_filename);
        sink.event(ProgressEvent::Status(format!(
            "Successfully downloaded {url} to {path}"
        )));
        let outcome = self.store.add_record(NewRecord {
            source_url: request.url,
            downloaded_filename,
            data_name: request.name,
            tags: request.tags,
        })?;
        Ok(IngestOutcome::Recorded { outcome, path })
    }

    pub fn list(&self) -> ListResult {
        ListResult {
            datasets: self.store.load(),
        }
    }

    pub fn search(&self, query: &str) -> SearchResult {
        SearchResult {
            query: query.to_string(),
            datasets: self.store.search(query),
        }
    }

    pub fn find(&self, name: &str) -> Result<FindResult, GeoError> {
        let record = self.store.find(name)?;
        Ok(FindResult {
            path: self
                .settings
                .download_directory
                .join(&record.downloaded_filename),
            data_name: record.data_name,
        })
    }

    // The archive is staged in a temp dir inside the download directory and
    // dropped once the member is out.
    fn fetch_member(
        &self,
        url: &str,
        member: &str,
        sink: &dyn ProgressSink,
    ) -> Result<String, GeoError> {
        let download_dir = self.settings.download_directory.as_std_path();
        let staging = tempfile::Builder::new()
            .prefix(".geoprovenance-archive")
            .tempdir_in(download_dir)
            .map_err(|err| GeoError::Download {
                url: url.to_string(),
                message: format!("create staging directory: {err}"),
            })?;
        let archive = self.downloader.download(url, staging.path(), sink)?;
        sink.event(ProgressEvent::Status(format!(
            "Extracting {member} from {archive}"
        )));
        let extracted = extract_member(&staging.path().join(&archive), member, download_dir)?;
        Ok(extracted.into_string())
    }
}
