//! Server configuration.
//!
//! Loaded from a YAML file; every section is optional and falls back to its
//! defaults. Environment variables override the file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use fusion::FusionConfig;
use grib2_parser::DecodeRequest;
use grid_processor::InterpolationConfig;
use serde::{Deserialize, Serialize};

// ============================================================================
// Grid products
// ============================================================================

/// Field set extracted from a product's files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldSet {
    /// Forecast model: isobaric state, surface fields, clouds, tropopause
    Forecast,
    /// Eddy dissipation per pressure level
    Turbulence,
}

impl FieldSet {
    pub fn request(&self) -> DecodeRequest {
        match self {
            Self::Forecast => DecodeRequest::gfs_default(),
            Self::Turbulence => DecodeRequest::wafs_default(),
        }
    }
}

/// Files in the grid directory whose name starts with `file_prefix` belong
/// to product `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductConfig {
    pub name: String,
    pub file_prefix: String,
    pub fields: FieldSet,
}

impl ProductConfig {
    pub fn matches(&self, file_name: &str) -> bool {
        file_name.starts_with(&self.file_prefix)
    }
}

fn default_products() -> Vec<ProductConfig> {
    vec![
        ProductConfig {
            name: "gfs".to_string(),
            file_prefix: "gfs.".to_string(),
            fields: FieldSet::Forecast,
        },
        ProductConfig {
            name: "wafs".to_string(),
            file_prefix: "WAFS_blended_".to_string(),
            fields: FieldSet::Turbulence,
        },
    ]
}

// ============================================================================
// Server
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Directory scanned for GRIB2 files
    pub grid_dir: PathBuf,

    /// Directory scanned for observation feed bodies
    pub observation_dir: PathBuf,

    /// Fixed-column station catalogue used to locate reports
    pub station_table: Option<PathBuf>,

    pub products: Vec<ProductConfig>,

    pub scan_interval_secs: u64,
    pub tick_interval_ms: u64,

    /// Concurrent decode jobs
    pub decode_workers: usize,

    /// Capacity of the queue between the scanner and the workers
    pub queue_depth: usize,

    /// Fixed aircraft position as `lat,lon,altitude_ft`
    pub position: Option<String>,

    /// JSON-lines track replayed instead of a fixed position
    pub track: Option<PathBuf>,

    /// JSON-lines output for published states; stdout when unset
    pub output: Option<PathBuf>,

    pub interpolation: InterpolationConfig,
    pub fusion: FusionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            grid_dir: PathBuf::from("data/grib"),
            observation_dir: PathBuf::from("data/metar"),
            station_table: None,
            products: default_products(),
            scan_interval_secs: 60,
            tick_interval_ms: 1000,
            decode_workers: 2,
            queue_depth: 64,
            position: None,
            track: None,
            output: None,
            interpolation: InterpolationConfig::default(),
            fusion: FusionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load the YAML file at `path`, or the defaults when it does not exist,
    /// then apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            Self::from_yaml(&text).with_context(|| format!("Failed to parse config: {}", path.display()))?
        } else {
            Self::default()
        };

        let config = config.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Apply environment variable overrides on top of this configuration.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("GRID_DIR") {
            self.grid_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("OBSERVATION_DIR") {
            self.observation_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("STATION_TABLE") {
            self.station_table = Some(PathBuf::from(val));
        }

        if let Ok(val) = std::env::var("AIRCRAFT_POSITION") {
            self.position = Some(val);
        }

        if let Ok(val) = std::env::var("TICK_INTERVAL_MS") {
            if let Ok(ms) = val.parse() {
                self.tick_interval_ms = ms;
            }
        }

        if let Ok(val) = std::env::var("DECODE_WORKERS") {
            if let Ok(workers) = val.parse() {
                self.decode_workers = workers;
            }
        }

        self.interpolation = self.interpolation.with_env_overrides();
        self.fusion = self.fusion.with_env_overrides();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            bail!("tick_interval_ms must be > 0");
        }
        if self.scan_interval_secs == 0 {
            bail!("scan_interval_secs must be > 0");
        }
        if self.decode_workers == 0 {
            bail!("decode_workers must be > 0");
        }
        if self.queue_depth == 0 {
            bail!("queue_depth must be > 0");
        }
        if !self.products.iter().any(|p| p.name == self.interpolation.primary_product) {
            bail!(
                "no product configured for primary product '{}'",
                self.interpolation.primary_product
            );
        }

        self.interpolation
            .validate()
            .map_err(|e| anyhow::anyhow!("interpolation: {}", e))?;
        self.fusion
            .validate()
            .map_err(|e| anyhow::anyhow!("fusion: {}", e))?;
        Ok(())
    }

    /// The product a grid file belongs to, by file name.
    pub fn product_for(&self, file_name: &str) -> Option<&ProductConfig> {
        self.products.iter().find(|p| p.matches(file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metar_parser::ObservationSource;

    #[test]
    fn test_defaults_validate() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = r#"
grid_dir: /var/lib/wx/grib
tick_interval_ms: 250
fusion:
  observation_source: ivao
  max_cloud_layers: 5
  smoothing:
    aggressiveness: 0.5
interpolation:
  staleness_hours: 6
"#;
        let config = ServerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.grid_dir, PathBuf::from("/var/lib/wx/grib"));
        assert_eq!(config.tick_interval_ms, 250);
        assert_eq!(config.observation_dir, PathBuf::from("data/metar"));
        assert_eq!(config.fusion.observation_source, ObservationSource::Ivao);
        assert_eq!(config.fusion.max_cloud_layers, 5);
        assert_eq!(config.fusion.smoothing.aggressiveness, 0.5);
        assert_eq!(config.fusion.smoothing.wind_speed_kt, 5.0);
        assert_eq!(config.interpolation.staleness_hours, 6);
        assert_eq!(config.interpolation.primary_product, "gfs");
        assert_eq!(config.products.len(), 2);
        assert!(config.position.is_none());
    }

    #[test]
    fn test_product_matching() {
        let config = ServerConfig::default();
        assert_eq!(config.product_for("gfs.t06z.pgrb2.0p25.f003").unwrap().name, "gfs");
        assert_eq!(
            config.product_for("WAFS_blended_2024031206f06.grib2").unwrap().fields,
            FieldSet::Turbulence
        );
        assert!(config.product_for("readme.txt").is_none());
    }

    #[test]
    fn test_missing_primary_product_rejected() {
        let yaml = r#"
products:
  - name: wafs
    file_prefix: WAFS_
    fields: turbulence
"#;
        let config = ServerConfig::from_yaml(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::load(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.products, default_products());
    }
}
