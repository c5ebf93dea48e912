use crate::catalog::{CatalogError, StationCatalog};
use crate::reader::LinkSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// On-disk deployment settings: link parameters plus the station catalog.
/// Every field is optional in the file; omissions fall back to the
/// compiled-in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub link: LinkSettings,
    pub catalog: StationCatalog,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&contents)?;
        settings.catalog.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_settings_document_uses_defaults() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.link.port, crate::reader::DEFAULT_PORT);
        assert_eq!(settings.link.baud_rate, crate::reader::DEFAULT_BAUD_RATE);
        assert_eq!(settings.catalog.reference_station(), "Wakanda");
    }

    #[test]
    fn test_partial_link_override() {
        let settings: Settings =
            serde_json::from_str(r#"{"link":{"port":"/dev/ttyACM1"}}"#).unwrap();
        assert_eq!(settings.link.port, "/dev/ttyACM1");
        assert_eq!(settings.link.baud_rate, crate::reader::DEFAULT_BAUD_RATE);
    }
}
