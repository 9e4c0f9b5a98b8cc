//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::analyzer::AnalyzerConfig;
use crate::routing::RouterConfig;
use crate::storage::StorageBackend;
use crate::synthesis::SynthesisConfig;
use crate::tracker::TrackerConfig;

/// Overrides the config directory
pub const CONFIG_DIR_ENV: &str = "METARCH_CONFIG_DIR";
/// Overrides the data directory
pub const DATA_DIR_ENV: &str = "METARCH_DATA_DIR";

/// Metarch configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub routing: RouterConfig,
    pub synthesis: SynthesisConfig,
    pub tracker: TrackerConfig,
    pub analyzer: AnalyzerConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Overrides the platform data directory
    pub data_dir: Option<PathBuf>,
}

const KEYS: &[&str] = &[
    "routing.domain_weight",
    "routing.complexity_weight",
    "routing.performance_weight",
    "routing.acceptance_threshold",
    "routing.complexity_tolerance",
    "routing.min_sample_size",
    "synthesis.top_n_tags",
    "synthesis.creation_margin",
    "tracker.quality_weight",
    "analyzer.timeout_ms",
    "analyzer.max_domain_tags",
    "storage.backend",
    "storage.data_dir",
];

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var(CONFIG_DIR_ENV) {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("metarch")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Directory holding the persisted registry
    pub fn data_dir(&self) -> anyhow::Result<PathBuf> {
        if let Ok(custom_dir) = env::var(DATA_DIR_ENV) {
            return Ok(PathBuf::from(custom_dir));
        }
        if let Some(dir) = &self.storage.data_dir {
            return Ok(dir.clone());
        }
        Ok(dirs::data_dir()
            .ok_or_else(|| anyhow!("Could not determine data directory"))?
            .join("metarch"))
    }

    /// Load configuration from file, or use defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    ///
    /// Besides per-section checks, requires that a freshly synthesized worker
    /// clears the acceptance threshold for the profile it was built from.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.routing.validate()?;
        self.synthesis.validate()?;
        self.tracker.validate()?;
        if self.analyzer.timeout_ms == 0 {
            return Err(anyhow!("analyzer.timeout_ms must be positive"));
        }
        if self.analyzer.max_domain_tags == 0 {
            return Err(anyhow!("analyzer.max_domain_tags must be at least 1"));
        }

        let worst = self.synthesis_floor();
        if worst < self.routing.acceptance_threshold {
            return Err(anyhow!(
                "Synthesized workers would score {:.3}, below routing.acceptance_threshold {}. \
                 Raise synthesis.top_n_tags or lower the threshold.",
                worst,
                self.routing.acceptance_threshold
            ));
        }
        Ok(())
    }

    /// Lowest score a synthesized worker can get for its own profile
    fn synthesis_floor(&self) -> f64 {
        let coverage = (self.synthesis.top_n_tags as f64 / self.analyzer.max_domain_tags as f64).min(1.0);
        self.routing.domain_weight * coverage
            + self.routing.complexity_weight
            + self.routing.performance_weight * crate::routing::NEUTRAL_PERFORMANCE
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        let value = match key {
            "routing.domain_weight" => self.routing.domain_weight.to_string(),
            "routing.complexity_weight" => self.routing.complexity_weight.to_string(),
            "routing.performance_weight" => self.routing.performance_weight.to_string(),
            "routing.acceptance_threshold" => self.routing.acceptance_threshold.to_string(),
            "routing.complexity_tolerance" => self.routing.complexity_tolerance.to_string(),
            "routing.min_sample_size" => self.routing.min_sample_size.to_string(),

            "synthesis.top_n_tags" => self.synthesis.top_n_tags.to_string(),
            "synthesis.creation_margin" => self.synthesis.creation_margin.to_string(),

            "tracker.quality_weight" => self.tracker.quality_weight.to_string(),

            "analyzer.timeout_ms" => self.analyzer.timeout_ms.to_string(),
            "analyzer.max_domain_tags" => self.analyzer.max_domain_tags.to_string(),

            "storage.backend" => self.storage.backend.to_string(),
            "storage.data_dir" => match &self.storage.data_dir {
                Some(dir) => dir.display().to_string(),
                None => "(platform default)".to_string(),
            },

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `metarch config list` to see available keys.",
                    key
                ));
            }
        };
        Ok(value)
    }

    /// Set a configuration value by key
    ///
    /// `routing.weights` sets all three weights at once (`domain,complexity,performance`),
    /// since they must keep summing to 1.
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "routing.weights" => {
                let weights = value
                    .split(',')
                    .map(|w| parse_f64(key, w.trim()))
                    .collect::<anyhow::Result<Vec<_>>>()?;
                let [domain, complexity, performance] = weights[..] else {
                    return Err(anyhow!(
                        "routing.weights takes three comma-separated values, got {}",
                        value
                    ));
                };
                self.routing.domain_weight = domain;
                self.routing.complexity_weight = complexity;
                self.routing.performance_weight = performance;
            }
            "routing.domain_weight" => self.routing.domain_weight = parse_unit(key, value)?,
            "routing.complexity_weight" => self.routing.complexity_weight = parse_unit(key, value)?,
            "routing.performance_weight" => self.routing.performance_weight = parse_unit(key, value)?,
            "routing.acceptance_threshold" => {
                self.routing.acceptance_threshold = parse_unit(key, value)?;
            }
            "routing.complexity_tolerance" => {
                let tolerance = parse_f64(key, value)?;
                if tolerance <= 0.0 {
                    return Err(anyhow!("Complexity tolerance must be positive"));
                }
                self.routing.complexity_tolerance = tolerance;
            }
            "routing.min_sample_size" => {
                self.routing.min_sample_size = value
                    .parse()
                    .with_context(|| format!("Invalid min_sample_size value: {}", value))?;
            }

            "synthesis.top_n_tags" => {
                self.synthesis.top_n_tags = value
                    .parse()
                    .with_context(|| format!("Invalid top_n_tags value: {}", value))?;
            }
            "synthesis.creation_margin" => {
                let margin = parse_f64(key, value)?;
                if margin < 0.0 {
                    return Err(anyhow!("Creation margin must be non-negative"));
                }
                self.synthesis.creation_margin = margin;
            }

            "tracker.quality_weight" => self.tracker.quality_weight = parse_unit(key, value)?,

            "analyzer.timeout_ms" => {
                self.analyzer.timeout_ms = value
                    .parse()
                    .with_context(|| format!("Invalid timeout_ms value: {}", value))?;
            }
            "analyzer.max_domain_tags" => {
                self.analyzer.max_domain_tags = value
                    .parse()
                    .with_context(|| format!("Invalid max_domain_tags value: {}", value))?;
            }

            "storage.backend" => {
                self.storage.backend = value.parse().map_err(|e: String| anyhow!(e))?;
            }
            "storage.data_dir" => {
                self.storage.data_dir = if value.trim().is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `metarch config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        KEYS.iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}

fn parse_f64(key: &str, value: &str) -> anyhow::Result<f64> {
    let parsed: f64 = value
        .parse()
        .with_context(|| format!("Invalid {} value: {}", key, value))?;
    if !parsed.is_finite() {
        return Err(anyhow!("{} must be a finite number", key));
    }
    Ok(parsed)
}

fn parse_unit(key: &str, value: &str) -> anyhow::Result<f64> {
    let parsed = parse_f64(key, value)?;
    if !(0.0..=1.0).contains(&parsed) {
        return Err(anyhow!("{} must be between 0.0 and 1.0", key));
    }
    Ok(parsed)
}
