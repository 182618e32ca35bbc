use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{QuiverError, Result};

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub clustering: ClusteringConfig,
    pub accelerator: AcceleratorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `quiver=debug`.
    pub level: String,
    /// `text` or `json`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Lloyd-iteration parameters for `ClusteringState` and for the trainers
/// IVF and PQ structures run internally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    pub niter: usize,
    /// Independent restarts; the best objective wins.
    pub nredo: usize,
    pub seed: u64,
    /// L2-normalise centroids after each update.
    pub spherical: bool,
    /// Train the quantizer on the final centroids before adding them.
    pub update_index: bool,
    /// Below this many points per centroid a warning is logged.
    pub min_points_per_centroid: usize,
    /// Above this many points per centroid the input is subsampled.
    pub max_points_per_centroid: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            niter: 25,
            nredo: 1,
            seed: 1234,
            spherical: false,
            update_index: false,
            min_points_per_centroid: 39,
            max_points_per_centroid: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcceleratorConfig {
    /// Device count exposed by the emulated backend
    /// (only honoured with the `emulated-accelerator` feature).
    pub emulated_devices: u32,
}

impl Default for AcceleratorConfig {
    fn default() -> Self {
        Self {
            emulated_devices: 1,
        }
    }
}

impl Config {
    /// Load configuration: defaults, then a TOML file (explicit `path` or
    /// `QUIVER_CONFIG`), then `QUIVER_*` environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let file = path
            .map(str::to_string)
            .or_else(|| std::env::var("QUIVER_CONFIG").ok());

        let mut config = match file {
            Some(p) => Self::from_file(Path::new(&p))?,
            None => Self::default(),
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| QuiverError::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| QuiverError::Config(e.to_string()))
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("QUIVER_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = std::env::var("QUIVER_LOG_FORMAT") {
            self.logging.format = v;
        }
        if let Some(v) = env_parse::<usize>("QUIVER_CLUSTERING_NITER")? {
            self.clustering.niter = v;
        }
        if let Some(v) = env_parse::<u64>("QUIVER_CLUSTERING_SEED")? {
            self.clustering.seed = v;
        }
        if let Some(v) = env_parse::<u32>("QUIVER_EMULATED_DEVICES")? {
            self.accelerator.emulated_devices = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        match self.logging.format.as_str() {
            "text" | "json" => {}
            other => {
                return Err(QuiverError::Config(format!(
                    "logging.format must be 'text' or 'json', got '{other}'"
                )))
            }
        }
        if self.clustering.niter == 0 {
            return Err(QuiverError::Config("clustering.niter must be > 0".into()));
        }
        if self.clustering.nredo == 0 {
            return Err(QuiverError::Config("clustering.nredo must be > 0".into()));
        }
        if self.clustering.max_points_per_centroid == 0 {
            return Err(QuiverError::Config(
                "clustering.max_points_per_centroid must be > 0".into(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| QuiverError::Config(format!("{key}: cannot parse '{raw}'"))),
        Err(_) => Ok(None),
    }
}
