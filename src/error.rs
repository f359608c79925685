use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum GeoError {
    #[error("download directory is not configured (run `geoprovenance config --dir <path>`)")]
    Configuration,

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("unable to resolve config location: {0}")]
    ConfigLocation(String),

    #[error("dataset name '{name}' is already used by {source_url}")]
    DuplicateName { name: String, source_url: String },

    #[error("Dataset with name '{0}' not found in metadata.")]
    NotFound(String),

    #[error("Metadata file not found at {0}")]
    MetadataFileMissing(Utf8PathBuf),

    #[error("error downloading {url}: {message}")]
    Download { url: String, message: String },

    #[error("failed to build http client: {0}")]
    HttpClient(String),

    #[error("{url} returned status {status}")]
    DownloadStatus { url: String, status: u16 },

    #[error("failed to extract '{member}': {message}")]
    Extraction { member: String, message: String },

    #[error("invalid dataset name: {0:?}")]
    InvalidName(String),

    #[error("invalid source url: {0}")]
    InvalidUrl(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to serialize JSON: {0}")]
    Serialization(String),
}

impl GeoError {
    /// True for failures raised while fetching or unpacking a download.
    pub fn is_download(&self) -> bool {
        matches!(
            self,
            GeoError::Download { .. }
                | GeoError::DownloadStatus { .. }
                | GeoError::Extraction { .. }
                | GeoError::HttpClient(_)
        )
    }
}
