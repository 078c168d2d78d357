use serde::{Deserialize, Serialize};
use anyhow::Result;

use crate::cost::CostModel;

pub const DEFAULT_CONFIG_FILE: &str = "diffsummary.toml";
pub const DEFAULT_TIMEZONE: &str = "UTC";
pub const DEFAULT_TOP_DIMENSIONS: usize = 3;
pub const DEFAULT_WORKER_POOL_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Children kept per expanded slice.
    pub breadth_limit: usize,
    /// Concurrent gateway queries per build.
    pub worker_pool_size: usize,
    /// Slices whose change is below this share of the overall change are not expanded.
    pub min_expand_share: f64,
    pub change_weight: f64,
    pub complexity_discount: f64,
    pub default_top_dimensions: usize,
    pub max_manual_dimensions: usize,
    pub default_timezone: String,
    pub excluded_columns: Vec<String>,
    pub consistency_tolerance: f64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            breadth_limit: 10,
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
            min_expand_share: 0.01,
            change_weight: 1.0,
            complexity_discount: 0.75,
            default_top_dimensions: DEFAULT_TOP_DIMENSIONS,
            max_manual_dimensions: DEFAULT_TOP_DIMENSIONS,
            default_timezone: DEFAULT_TIMEZONE.to_string(),
            excluded_columns: vec!["METRIC".to_string(), "DATETIME_FLAG".to_string()],
            consistency_tolerance: 1e-6,
        }
    }
}

impl SummaryConfig {
    /// Loads `config_path`, or the default file when present, or the defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let config = match config_path {
            Some(path) => Self::read(path)?,
            None if std::path::Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::read(DEFAULT_CONFIG_FILE)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    fn read(config_file: &str) -> Result<Self> {
        let content = std::fs::read_to_string(config_file)
            .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", config_file, e))?;
        let config: SummaryConfig = toml::from_str(&content)?;
        tracing::debug!("Loaded configuration from {}", config_file);
        Ok(config)
    }

    pub fn save(&self, config_path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.breadth_limit == 0 {
            anyhow::bail!("breadth_limit must be at least 1");
        }
        if self.worker_pool_size == 0 {
            anyhow::bail!("worker_pool_size must be at least 1");
        }
        if self.default_top_dimensions == 0 || self.max_manual_dimensions == 0 {
            anyhow::bail!("dimension limits must be at least 1");
        }
        if !(self.min_expand_share >= 0.0 && self.min_expand_share.is_finite()) {
            anyhow::bail!("min_expand_share must be a non-negative number");
        }
        if !(self.change_weight >= 0.0 && self.change_weight.is_finite()) {
            anyhow::bail!("change_weight must be a non-negative number");
        }
        if !(self.complexity_discount > 0.0 && self.complexity_discount <= 1.0) {
            anyhow::bail!("complexity_discount must be in (0, 1]");
        }
        if !(self.consistency_tolerance >= 0.0) {
            anyhow::bail!("consistency_tolerance must be non-negative");
        }
        Ok(())
    }

    pub fn cost_model(&self) -> CostModel {
        CostModel::new(self.change_weight, self.complexity_discount)
    }

    pub fn is_excluded_column(&self, column: &str) -> bool {
        self.excluded_columns
            .iter()
            .any(|excluded| excluded.eq_ignore_ascii_case(column))
    }
}
