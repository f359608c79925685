use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, info};

use crate::error::GeoError;
use crate::progress::{ProgressEvent, ProgressSink};

pub const CHUNK_SIZE: usize = 8192;

pub trait DownloadClient: Send + Sync {
    /// Fetches `url` into `destination_dir` and returns the file name written.
    fn download(
        &self,
        url: &str,
        destination_dir: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<String, GeoError>;
}

#[derive(Clone)]
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new() -> Result<Self, GeoError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("geoprovenance/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| GeoError::HttpClient(format!("user agent: {err}")))?,
        );
        // Large rasters take minutes; only the connect phase is bounded.
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .timeout(Option::<Duration>::None)
            .build()
            .map_err(|err| GeoError::HttpClient(err.to_string()))?;
        Ok(Self { client })
    }

    fn stream_to_file(
        url: &str,
        mut response: Response,
        destination: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<u64, GeoError> {
        let save_error = |err: std::io::Error| GeoError::Download {
            url: url.to_string(),
            message: format!("error saving file to {}: {err}", destination.display()),
        };

        let mut file = File::create(destination).map_err(save_error)?;
        let mut buffer = [0u8; CHUNK_SIZE];
        let mut written = 0u64;
        loop {
            let read = response
                .read(&mut buffer)
                .map_err(|err| GeoError::Download {
                    url: url.to_string(),
                    message: err.to_string(),
                })?;
            if read == 0 {
                break;
            }
            file.write_all(&buffer[..read]).map_err(save_error)?;
            written += read as u64;
            sink.event(ProgressEvent::Advanced { bytes: read as u64 });
        }
        file.flush().map_err(save_error)?;
        Ok(written)
    }
}

impl DownloadClient for HttpDownloader {
    fn download(
        &self,
        url: &str,
        destination_dir: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<String, GeoError> {
        sink.event(ProgressEvent::Status(format!(
            "Attempting to download from: {url}"
        )));
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| GeoError::Download {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(GeoError::DownloadStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let filename = derive_filename(url);
        fs::create_dir_all(destination_dir).map_err(|err| GeoError::Download {
            url: url.to_string(),
            message: format!("create {}: {err}", destination_dir.display()),
        })?;
        let destination = destination_dir.join(&filename);
        debug!(url, path = %destination.display(), "streaming response body");

        sink.event(ProgressEvent::Started {
            label: filename.clone(),
            total: response.content_length(),
        });
        let result = Self::stream_to_file(url, response, &destination, sink);
        sink.event(ProgressEvent::Finished);
        let written = result?;

        info!(url, path = %destination.display(), bytes = written, "download complete");
        Ok(filename)
    }
}

/// Picks the local file name for `url`: the last path segment, then the last
/// segment of the raw text, then a timestamped placeholder.
pub fn derive_filename(url: &str) -> String {
    let from_path = Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.path().rsplit('/').next().map(str::to_string))
        .filter(|name| !name.is_empty());
    if let Some(name) = from_path {
        return name;
    }

    let raw = url.split(['?', '#']).next().unwrap_or_default();
    let separator = if raw.contains('/') { '/' } else { ':' };
    let fallback = raw.rsplit(separator).next().unwrap_or_default();
    if !fallback.is_empty() {
        return fallback.to_string();
    }

    format!(
        "downloaded_file{}",
        chrono::Local::now().format("%Y%m%d%H%M%S")
    )
}
