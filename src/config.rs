use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::GeoSeriesAccession;
use crate::error::GexError;

pub const DEFAULT_MIN_CELLS: u32 = 3;
pub const DEFAULT_MIN_FEATURES: u32 = 200;

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub series: Vec<SeriesEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SeriesEntry {
    Shorthand(String),
    Detailed(SeriesEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SeriesEntryObject {
    pub accession: String,
    #[serde(default)]
    pub min_cells: Option<u32>,
    #[serde(default)]
    pub min_features: Option<u32>,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SeriesRequest {
    pub accession: GeoSeriesAccession,
    pub min_cells: u32,
    pub min_features: u32,
    pub label: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub series: Vec<SeriesRequest>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, GexError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from("gexfetch.json"),
        };

        if path.is_none() && !config_path.exists() {
            return Err(GexError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| GexError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| GexError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, GexError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let series = config
            .series
            .into_iter()
            .map(|entry| match entry {
                SeriesEntry::Shorthand(value) => Ok(SeriesRequest {
                    accession: value.parse()?,
                    min_cells: DEFAULT_MIN_CELLS,
                    min_features: DEFAULT_MIN_FEATURES,
                    label: None,
                }),
                SeriesEntry::Detailed(obj) => Ok(SeriesRequest {
                    accession: obj.accession.parse()?,
                    min_cells: obj.min_cells.unwrap_or(DEFAULT_MIN_CELLS),
                    min_features: obj.min_features.unwrap_or(DEFAULT_MIN_FEATURES),
                    label: obj.label,
                }),
            })
            .collect::<Result<Vec<_>, GexError>>()?;

        Ok(ResolvedConfig {
            schema_version,
            series,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_config_shorthand() {
        let config = Config {
            schema_version: None,
            series: vec![SeriesEntry::Shorthand("GSE164073".to_string())],
        };

        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.series.len(), 1);
        assert_eq!(resolved.series[0].min_cells, DEFAULT_MIN_CELLS);
        assert_eq!(resolved.series[0].min_features, DEFAULT_MIN_FEATURES);
    }
}
