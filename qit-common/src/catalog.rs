//! Carton serial catalog
//!
//! The set of unit serials packed in each carton is closed and known before
//! inspection starts. The catalog is read from a TOML file:
//!
//! ```toml
//! [[carton]]
//! id = "8884620325076240"
//! serials = ["QX2503A00101", "QX2503A00102"]
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::{Error, Result};

/// Carton shipped with the built-in catalog
pub const DEMO_CARTON_ID: &str = "8884620325076240";

const DEMO_CARTON_SERIALS: [&str; 5] = [
    "QX2503A00101",
    "QX2503A00102",
    "QX2503A00103",
    "QX2503A00104",
    "QX2503A00105",
];

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    carton: Vec<CartonEntry>,
}

#[derive(Debug, Deserialize)]
struct CartonEntry {
    id: String,
    serials: Vec<String>,
}

/// Closed map of carton id → auto serials, in packing order
#[derive(Debug, Clone, Default)]
pub struct CartonCatalog {
    cartons: HashMap<String, Vec<String>>,
}

impl CartonCatalog {
    /// Catalog containing only the demo carton
    pub fn builtin() -> Self {
        let mut cartons = HashMap::new();
        cartons.insert(
            DEMO_CARTON_ID.to_string(),
            DEMO_CARTON_SERIALS.iter().map(|s| s.to_string()).collect(),
        );
        Self { cartons }
    }

    /// Parse a catalog from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(text)
            .map_err(|e| Error::Config(format!("Parse carton catalog failed: {}", e)))?;

        let mut cartons = HashMap::new();
        for entry in file.carton {
            let id = entry.id.trim().to_string();
            if id.is_empty() {
                return Err(Error::Config("Carton with empty id in catalog".to_string()));
            }
            let serials: Vec<String> = entry
                .serials
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if serials.is_empty() {
                return Err(Error::Config(format!("Carton {} has no serials", id)));
            }
            let mut seen = HashSet::new();
            if let Some(dup) = serials.iter().find(|s| !seen.insert(s.as_str())) {
                return Err(Error::Config(format!(
                    "Carton {} lists serial {} twice",
                    id, dup
                )));
            }
            if cartons.insert(id.clone(), serials).is_some() {
                return Err(Error::Config(format!("Carton {} defined twice", id)));
            }
        }
        Ok(Self { cartons })
    }

    /// Load a catalog file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read carton catalog {} failed: {}", path.display(), e)))?;
        let catalog = Self::from_toml_str(&text)?;
        info!(path = %path.display(), cartons = catalog.len(), "Loaded carton catalog");
        Ok(catalog)
    }

    /// Auto serials of a carton, in packing order
    pub fn serials(&self, carton_id: &str) -> Option<&[String]> {
        self.cartons.get(carton_id.trim()).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.cartons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cartons.is_empty()
    }
}
