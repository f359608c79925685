use std::fmt;
use std::str::FromStr;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::GeoError;

/// User-chosen logical name of a dataset. Stored exactly as given (trimmed).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetName(String);

impl DatasetName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetName {
    type Err = GeoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(GeoError::InvalidName(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceUrl(String);

impl SourceUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SourceUrl {
    type Err = GeoError;

    // The original text is kept as the record key; parsing only validates it.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let parsed = Url::parse(trimmed).map_err(|_| GeoError::InvalidUrl(value.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(GeoError::InvalidUrl(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn dataset_name_keeps_case() {
        let name: DatasetName = "  SRTM_Elevation ".parse().unwrap();
        assert_eq!(name.as_str(), "SRTM_Elevation");
    }

    #[test]
    fn dataset_name_rejects_blank() {
        let err = "   ".parse::<DatasetName>().unwrap_err();
        assert_matches!(err, GeoError::InvalidName(_));
    }

    #[test]
    fn source_url_requires_http() {
        let err = "ftp://example.com/file.zip".parse::<SourceUrl>().unwrap_err();
        assert_matches!(err, GeoError::InvalidUrl(_));

        let url: SourceUrl = "https://example.com/data/file.zip".parse().unwrap();
        assert_eq!(url.as_str(), "https://example.com/data/file.zip");
    }
}
