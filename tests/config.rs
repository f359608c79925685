use std::fs;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use geoprovenance::config::{Config, ConfigStore, DefaultDirectory, DirectoryPrompt, expand_path};
use geoprovenance::error::GeoError;

struct FixedDirectory(Utf8PathBuf);

impl DirectoryPrompt for FixedDirectory {
    fn choose(&self, _default: &Utf8Path) -> Result<Utf8PathBuf, GeoError> {
        Ok(self.0.clone())
    }
}

fn utf8(path: std::path::PathBuf) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path).unwrap()
}

#[test]
fn first_load_writes_config_and_initializes_metadata() {
    let temp = tempfile::tempdir().unwrap();
    let store = ConfigStore::with_path(utf8(temp.path().join("conf").join("config.json")));
    let data_dir = utf8(temp.path().join("data"));

    let config = store.load(&FixedDirectory(data_dir.clone())).unwrap();

    assert_eq!(config.download_directory(), Some(data_dir.as_path()));
    assert!(store.path().as_std_path().exists());
    assert!(data_dir.as_std_path().is_dir());
    let metadata = fs::read_to_string(data_dir.join("metadata.json").as_std_path()).unwrap();
    assert_eq!(metadata.trim(), "[]");

    let persisted: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(store.path().as_std_path()).unwrap()).unwrap();
    assert_eq!(persisted["download_directory"], data_dir.as_str());
}

#[test]
fn default_prompt_uses_directory_next_to_config() {
    let temp = tempfile::tempdir().unwrap();
    let store = ConfigStore::with_path(utf8(temp.path().join("config.json")));

    let settings = store.load(&DefaultDirectory).unwrap().resolve().unwrap();

    assert_eq!(settings.download_directory, store.default_download_directory());
    assert!(settings.metadata_file.as_std_path().exists());
}

#[test]
fn malformed_config_falls_back_to_unset() {
    let temp = tempfile::tempdir().unwrap();
    let path = utf8(temp.path().join("config.json"));
    fs::write(path.as_std_path(), b"{ broken").unwrap();
    let store = ConfigStore::with_path(path.clone());

    let config = store.load(&DefaultDirectory).unwrap();

    assert_eq!(config, Config::default());
    assert_matches!(config.resolve(), Err(GeoError::Configuration));
    assert_eq!(fs::read(path.as_std_path()).unwrap(), b"{ broken");
}

#[test]
fn update_merges_and_rewrites() {
    let temp = tempfile::tempdir().unwrap();
    let path = utf8(temp.path().join("config.json"));
    fs::write(
        path.as_std_path(),
        br#"{"download_directory": "/unused", "metadata_file": "index.json"}"#,
    )
    .unwrap();
    let store = ConfigStore::with_path(path);
    let data_dir = utf8(temp.path().join("data"));

    let config = store
        .update(Config::with_download_directory(data_dir.clone()))
        .unwrap();

    assert_eq!(config.download_directory(), Some(data_dir.as_path()));
    assert_eq!(config.metadata_path(), Some(data_dir.join("index.json")));
    assert!(data_dir.join("index.json").as_std_path().exists());

    let reloaded = store.load(&DefaultDirectory).unwrap();
    assert_eq!(reloaded, config);
}

#[test]
fn update_on_missing_file_creates_it() {
    let temp = tempfile::tempdir().unwrap();
    let store = ConfigStore::with_path(utf8(temp.path().join("nested").join("config.json")));
    let data_dir = utf8(temp.path().join("data"));

    store
        .update(Config::with_download_directory(data_dir.clone()))
        .unwrap();

    let settings = store.load(&DefaultDirectory).unwrap().resolve().unwrap();
    assert_eq!(settings.download_directory, data_dir);
}

#[test]
fn relative_download_directory_is_relative_to_config() {
    let temp = tempfile::tempdir().unwrap();
    let path = utf8(temp.path().join("config.json"));
    fs::write(path.as_std_path(), br#"{"download_directory": "downloads"}"#).unwrap();
    let store = ConfigStore::with_path(path);

    let settings = store.load(&DefaultDirectory).unwrap().resolve().unwrap();

    assert_eq!(
        settings.download_directory,
        utf8(temp.path().join("downloads"))
    );
}

#[test]
fn empty_download_directory_requires_configuration() {
    let temp = tempfile::tempdir().unwrap();
    let path = utf8(temp.path().join("config.json"));
    fs::write(path.as_std_path(), br#"{"download_directory": ""}"#).unwrap();
    let store = ConfigStore::with_path(path);

    let config = store.load(&DefaultDirectory).unwrap();
    assert_matches!(config.resolve(), Err(GeoError::Configuration));
}

#[test]
fn expand_path_makes_relative_paths_absolute() {
    let expanded = expand_path("data/rasters").unwrap();
    assert!(expanded.is_absolute());
    assert!(expanded.ends_with("data/rasters"));
}

#[test]
fn expand_path_leaves_unknown_variables() {
    let expanded = expand_path("/srv/$GEOPROVENANCE_TEST_UNSET_VARIABLE/data").unwrap();
    assert_eq!(
        expanded,
        Utf8PathBuf::from("/srv/$GEOPROVENANCE_TEST_UNSET_VARIABLE/data")
    );
}

#[test]
fn expand_path_resolves_home() {
    let home = directories::BaseDirs::new().unwrap().home_dir().to_path_buf();
    let expanded = expand_path("~/geo").unwrap();
    assert_eq!(expanded.as_std_path(), home.join("geo"));
}

#[test]
fn override_path_replaces_home_location() {
    let temp = tempfile::tempdir().unwrap();
    let custom = utf8(temp.path().join("custom").join("geo.json"));

    let store = ConfigStore::locate(Some(custom.as_str())).unwrap();
    assert_eq!(store.path(), custom.as_path());

    let home = directories::BaseDirs::new().unwrap().home_dir().to_path_buf();
    let fallback = ConfigStore::locate(Some("  ")).unwrap();
    assert_eq!(
        fallback.path().as_std_path(),
        home.join(".geoprovenance").join("config.json")
    );
}
