use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::GeoError;
use crate::fs_util::write_atomic;
use crate::store::MetadataStore;

/// Overrides the config file location.
pub const CONFIG_ENV: &str = "GEOPROVENANCE_CONFIG";
pub const METADATA_FILE: &str = "metadata.json";

const APP_DIR: &str = ".geoprovenance";
const CONFIG_FILE: &str = "config.json";
const DEFAULT_DOWNLOAD_DIR: &str = "downloads";

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(?:\{(\w+)\}|(\w+))").expect("env var pattern"));

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_directory: Option<Utf8PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_file: Option<Utf8PathBuf>,
}

impl Config {
    pub fn with_download_directory(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            download_directory: Some(path.into()),
            metadata_file: None,
        }
    }

    /// The download directory, treating an empty string as unset.
    pub fn download_directory(&self) -> Option<&Utf8Path> {
        self.download_directory
            .as_deref()
            .filter(|path| !path.as_str().trim().is_empty())
    }

    pub fn metadata_path(&self) -> Option<Utf8PathBuf> {
        let dir = self.download_directory()?;
        Some(match &self.metadata_file {
            Some(file) if file.is_absolute() => file.clone(),
            Some(file) if !file.as_str().is_empty() => dir.join(file),
            _ => dir.join(METADATA_FILE),
        })
    }

    pub fn resolve(&self) -> Result<Settings, GeoError> {
        let download_directory = self
            .download_directory()
            .ok_or(GeoError::Configuration)?
            .to_owned();
        let metadata_file = self.metadata_path().ok_or(GeoError::Configuration)?;
        Ok(Settings {
            download_directory,
            metadata_file,
        })
    }

    fn merge(&mut self, partial: Config) {
        if partial.download_directory.is_some() {
            self.download_directory = partial.download_directory;
        }
        if partial.metadata_file.is_some() {
            self.metadata_file = partial.metadata_file;
        }
    }

    // Relative download directories are relative to the config file.
    fn anchored(mut self, base: &Utf8Path) -> Self {
        let anchored = self
            .download_directory()
            .filter(|dir| dir.is_relative())
            .map(|dir| base.join(dir));
        if anchored.is_some() {
            self.download_directory = anchored;
        }
        self
    }
}

/// A config whose download directory is known to be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub download_directory: Utf8PathBuf,
    pub metadata_file: Utf8PathBuf,
}

impl Settings {
    pub fn metadata_store(&self) -> MetadataStore {
        MetadataStore::new(self.metadata_file.clone())
    }
}

/// Chooses the download directory the first time the tool runs.
pub trait DirectoryPrompt {
    fn choose(&self, default: &Utf8Path) -> Result<Utf8PathBuf, GeoError>;
}

pub struct DefaultDirectory;

impl DirectoryPrompt for DefaultDirectory {
    fn choose(&self, default: &Utf8Path) -> Result<Utf8PathBuf, GeoError> {
        Ok(default.to_owned())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: Utf8PathBuf,
}

impl ConfigStore {
    /// Uses `$GEOPROVENANCE_CONFIG` when set, else `~/.geoprovenance/config.json`.
    pub fn new() -> Result<Self, GeoError> {
        Self::locate(std::env::var(CONFIG_ENV).ok().as_deref())
    }

    /// Resolves the config location from an optional override, falling back
    /// to the home directory.
    pub fn locate(override_path: Option<&str>) -> Result<Self, GeoError> {
        if let Some(path) = override_path.filter(|path| !path.trim().is_empty()) {
            return Ok(Self::with_path(expand_path(path)?));
        }
        let path = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join(APP_DIR).join(CONFIG_FILE)).ok()
            })
            .ok_or_else(|| {
                GeoError::ConfigLocation("unable to resolve home directory".to_string())
            })?;
        Ok(Self { path })
    }

    pub fn with_path(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn config_dir(&self) -> &Utf8Path {
        self.path.parent().unwrap_or(Utf8Path::new("."))
    }

    pub fn default_download_directory(&self) -> Utf8PathBuf {
        self.config_dir().join(DEFAULT_DOWNLOAD_DIR)
    }

    /// Reads the config, creating it through `prompt` when the file is
    /// missing. A set download directory is created on disk together with an
    /// empty metadata file.
    pub fn load(&self, prompt: &dyn DirectoryPrompt) -> Result<Config, GeoError> {
        let config = match self.read()? {
            Some(config) => config,
            None => {
                warn!(path = %self.path, "configuration file not found, creating a new one");
                let chosen = prompt.choose(&self.default_download_directory())?;
                let config = Config::with_download_directory(expand_path(chosen.as_str())?);
                self.write(&config)?;
                config
            }
        };
        let config = config.anchored(self.config_dir());
        Self::prepare(&config)?;
        Ok(config)
    }

    /// Merges the `Some` fields of `partial` into the stored config and
    /// rewrites the whole file.
    pub fn update(&self, partial: Config) -> Result<Config, GeoError> {
        let mut config = self.read()?.unwrap_or_default();
        config.merge(partial);
        self.write(&config)?;
        let config = config.anchored(self.config_dir());
        Self::prepare(&config)?;
        Ok(config)
    }

    fn read(&self) -> Result<Option<Config>, GeoError> {
        let content = match fs::read_to_string(self.path.as_std_path()) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(_) => return Err(GeoError::ConfigRead(self.path.clone())),
        };
        match serde_json::from_str::<Config>(&content) {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                warn!(path = %self.path, error = %err, "error decoding config, using an empty configuration");
                Ok(Some(Config::default()))
            }
        }
    }

    fn write(&self, config: &Config) -> Result<(), GeoError> {
        let mut content = serde_json::to_vec_pretty(config)
            .map_err(|err| GeoError::Serialization(err.to_string()))?;
        content.push(b'\n');
        write_atomic(&self.path, &content)
    }

    fn prepare(config: &Config) -> Result<(), GeoError> {
        let Some(dir) = config.download_directory() else {
            return Ok(());
        };
        debug!(path = %dir, "ensuring download directory");
        fs::create_dir_all(dir.as_std_path())
            .map_err(|err| GeoError::Filesystem(format!("create {dir}: {err}")))?;
        if let Some(metadata) = config.metadata_path() {
            MetadataStore::new(metadata).ensure_initialized()?;
        }
        Ok(())
    }
}

/// Expands `~`, `$VAR` and `${VAR}` and makes the result absolute.
/// Unknown variables are left untouched.
pub fn expand_path(raw: &str) -> Result<Utf8PathBuf, GeoError> {
    let trimmed = raw.trim();
    let expanded = ENV_VAR.replace_all(trimmed, |caps: &Captures<'_>| {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|name| name.as_str())
            .unwrap_or_default();
        std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
    });

    let expanded = match expanded.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\') => {
            let home = BaseDirs::new()
                .map(|dirs| dirs.home_dir().to_path_buf())
                .ok_or_else(|| {
                    GeoError::ConfigLocation("unable to resolve home directory".to_string())
                })?;
            home.join(rest.trim_start_matches(['/', '\\']))
        }
        _ => PathBuf::from(&*expanded),
    };

    let absolute = std::path::absolute(&expanded)
        .map_err(|err| GeoError::Filesystem(format!("resolve {}: {err}", expanded.display())))?;
    Utf8PathBuf::from_path_buf(absolute)
        .map_err(|path| GeoError::Filesystem(format!("non-utf8 path: {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_path_defaults_under_download_directory() {
        let config = Config::with_download_directory("/data/geo");
        assert_eq!(
            config.metadata_path().unwrap(),
            Utf8PathBuf::from("/data/geo/metadata.json")
        );

        let config = Config {
            download_directory: Some("/data/geo".into()),
            metadata_file: Some("index.json".into()),
        };
        assert_eq!(
            config.metadata_path().unwrap(),
            Utf8PathBuf::from("/data/geo/index.json")
        );
    }

    #[test]
    fn blank_directory_is_unset() {
        let config = Config::with_download_directory("  ");
        assert!(config.download_directory().is_none());
        assert!(matches!(config.resolve(), Err(GeoError::Configuration)));
    }

    #[test]
    fn merge_keeps_unset_fields() {
        let mut config = Config {
            download_directory: Some("/a".into()),
            metadata_file: Some("m.json".into()),
        };
        config.merge(Config::with_download_directory("/b"));
        assert_eq!(config.download_directory.as_deref(), Some(Utf8Path::new("/b")));
        assert_eq!(config.metadata_file.as_deref(), Some(Utf8Path::new("m.json")));
    }
}
