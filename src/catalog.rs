use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_REFERENCE_STATION: &str = "Wakanda";
pub const UNKNOWN_UNIT: &str = "N/A";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Station {
    pub name: String,
    pub variables: Vec<String>,
}

/// Ordered station roster: station order defines the 1-based wire index.
///
/// Built once at start-up and read-only thereafter; every component that
/// needs station or unit information takes it by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationCatalog {
    stations: Vec<Station>,
    #[serde(default)]
    units: HashMap<String, String>,
    reference_station: String,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse catalog file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("catalog defines no stations")]
    Empty,
    #[error("duplicate station name '{0}'")]
    DuplicateStation(String),
    #[error("reference station '{0}' is not in the catalog")]
    UnknownReference(String),
}

impl StationCatalog {
    pub fn new(
        stations: Vec<Station>,
        units: HashMap<String, String>,
        reference_station: impl Into<String>,
    ) -> Result<Self, CatalogError> {
        let catalog = Self {
            stations,
            units,
            reference_station: reference_station.into(),
        };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load a catalog from a JSON file (stations, units, reference station).
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let contents = std::fs::read_to_string(path)?;
        let catalog: Self = serde_json::from_str(&contents)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.stations.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut seen = HashSet::new();
        for station in &self.stations {
            if !seen.insert(station.name.as_str()) {
                return Err(CatalogError::DuplicateStation(station.name.clone()));
            }
        }

        if !seen.contains(self.reference_station.as_str()) {
            return Err(CatalogError::UnknownReference(self.reference_station.clone()));
        }

        Ok(())
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    pub fn station(&self, name: &str) -> Option<&Station> {
        self.stations.iter().find(|station| station.name == name)
    }

    /// Resolve a 1-based wire index to its station.
    pub fn station_by_index(&self, index: usize) -> Option<&Station> {
        if index == 0 {
            return None;
        }
        self.stations.get(index - 1)
    }

    pub fn contains(&self, station: &str, variable: &str) -> bool {
        self.station(station)
            .map(|entry| entry.variables.iter().any(|v| v == variable))
            .unwrap_or(false)
    }

    /// Unit for a variable, `"N/A"` when none is declared.
    pub fn unit(&self, variable: &str) -> &str {
        self.units
            .get(variable)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_UNIT)
    }

    pub fn reference_station(&self) -> &str {
        &self.reference_station
    }

    pub fn is_reference(&self, station: &str) -> bool {
        self.reference_station == station
    }
}

impl Default for StationCatalog {
    fn default() -> Self {
        let station = |name: &str, variables: &[&str]| Station {
            name: name.to_string(),
            variables: variables.iter().map(|v| v.to_string()).collect(),
        };

        let stations = vec![
            station("Rennes", &["Luminosity"]),
            station("Guingamp", &["Pressure(b)", "Oxygen"]),
            station("Pouillac", &["Anemometer"]),
            station("Wakanda", &["Temperature", "Humidity"]),
            station("Thouars", &["Temperature", "Humidity", "CO2"]),
            station("Saint-Leu", &["Fine particles"]),
            station(
                "Perpignan",
                &[
                    "Fine particles",
                    "UV",
                    "Anemometer",
                    "Temperature",
                    "Humidity",
                    "Luminosity",
                    "Pressure",
                    "CO2",
                    "Wind vane",
                    "Rain",
                    "Oxygen",
                    "VOC",
                    "ECO2",
                ],
            ),
        ];

        let units: HashMap<String, String> = [
            ("Temperature", "°C"),
            ("Humidity", "%"),
            ("Pressure", "Pa"),
            ("Pressure(b)", "bar"),
            ("Anemometer", "m/s"),
            ("Rain", "mm"),
            ("Luminosity", "Lux"),
            ("CO2", "ppm"),
            ("Fine particles", "ppm"),
            ("Oxygen", "%"),
        ]
        .iter()
        .map(|(variable, unit)| (variable.to_string(), unit.to_string()))
        .collect();

        Self {
            stations,
            units,
            reference_station: DEFAULT_REFERENCE_STATION.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_wire_indices() {
        let catalog = StationCatalog::default();

        // Wire indices are 1-based and follow declaration order
        assert_eq!(catalog.station_by_index(1).map(|s| s.name.as_str()), Some("Rennes"));
        assert_eq!(catalog.station_by_index(4).map(|s| s.name.as_str()), Some("Wakanda"));
        assert_eq!(catalog.station_by_index(7).map(|s| s.name.as_str()), Some("Perpignan"));
        assert!(catalog.station_by_index(0).is_none());
        assert!(catalog.station_by_index(8).is_none());
    }

    #[test]
    fn test_unit_lookup_defaults_to_na() {
        let catalog = StationCatalog::default();
        assert_eq!(catalog.unit("Temperature"), "°C");
        assert_eq!(catalog.unit("UV"), UNKNOWN_UNIT);
        assert_eq!(catalog.unit("not a variable"), UNKNOWN_UNIT);
    }

    #[test]
    fn test_contains_checks_both_levels() {
        let catalog = StationCatalog::default();
        assert!(catalog.contains("Wakanda", "Temperature"));
        assert!(!catalog.contains("Wakanda", "CO2"));
        assert!(!catalog.contains("Atlantis", "Temperature"));
    }

    #[test]
    fn test_validation_rejects_bad_catalogs() {
        let result = StationCatalog::new(Vec::new(), HashMap::new(), "Wakanda");
        assert!(matches!(result, Err(CatalogError::Empty)));

        let twice = vec![
            Station { name: "A".to_string(), variables: vec!["x".to_string()] },
            Station { name: "A".to_string(), variables: vec!["y".to_string()] },
        ];
        let result = StationCatalog::new(twice, HashMap::new(), "A");
        assert!(matches!(result, Err(CatalogError::DuplicateStation(_))));

        let one = vec![Station { name: "A".to_string(), variables: vec!["x".to_string()] }];
        let result = StationCatalog::new(one, HashMap::new(), "B");
        assert!(matches!(result, Err(CatalogError::UnknownReference(_))));
    }

    #[test]
    fn test_catalog_json_round_trip() {
        let catalog = StationCatalog::default();
        let json = serde_json::to_string(&catalog).unwrap();
        let parsed: StationCatalog = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.station_count(), catalog.station_count());
        assert_eq!(parsed.reference_station(), catalog.reference_station());
        assert_eq!(parsed.unit("Temperature"), "°C");
    }
}
