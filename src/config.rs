use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConversionBackend {
    /// Run the external `ogr2ogr` binary.
    Ogr2ogr,
    /// Convert with the linked GDAL library.
    Gdal,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ConversionConfig {
    pub backend: ConversionBackend,
    pub program: PathBuf,
    /// Declared as both source and target CRS; no reprojection takes place.
    pub crs: String,
    pub encoding: String,
    pub timeout_secs: Option<u64>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            backend: ConversionBackend::Ogr2ogr,
            program: PathBuf::from("ogr2ogr"),
            crs: "EPSG:4326".to_string(),
            encoding: "UTF-8".to_string(),
            timeout_secs: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AddressLookupConfig {
    pub enabled: bool,
    pub endpoint: String,
}

impl Default for AddressLookupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "http://localhost:8080/tarantula".to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct KeyConfig {
    pub commit: char,
    pub discard: char,
    pub save: char,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            commit: 'u',
            discard: 'x',
            save: 's',
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ViewConfig {
    pub initial_lng: f64,
    pub initial_lat: f64,
    pub initial_zoom: u8,
    pub jump_zoom: u8,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            initial_lng: 127.279338989,
            initial_lat: 36.496723678,
            initial_zoom: 14,
            jump_zoom: 25,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    /// Encoding of the source attribute file.
    pub source_encoding: String,
    pub conversion: ConversionConfig,
    pub address_lookup: AddressLookupConfig,
    pub keys: KeyConfig,
    pub view: ViewConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_encoding: "UTF-8".to_string(),
            conversion: ConversionConfig::default(),
            address_lookup: AddressLookupConfig::default(),
            keys: KeyConfig::default(),
            view: ViewConfig::default(),
        }
    }
}

impl Config {
    pub fn from_yaml(contents: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Load the config file at `filepath`, or the defaults when no file is given.
    pub fn load(filepath: Option<&Path>) -> anyhow::Result<Self> {
        match filepath {
            None => Ok(Self::default()),
            Some(filepath) => {
                if !filepath.exists() {
                    return Err(anyhow!("Config file {:?} not found", filepath));
                }
                let contents = std::fs::read_to_string(filepath)
                    .with_context(|| format!("Reading config file {:?}", filepath))?;
                Self::from_yaml(&contents)
            }
        }
    }
}
