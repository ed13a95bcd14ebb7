//! Pipeline configuration
//!
//! Configuration is loaded from:
//! 1. An explicit path (`--config`)
//! 2. `~/.local/share/tally/pipeline.toml` (or the platform equivalent)
//! 3. The embedded default (`config/pipeline.toml`)

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{NewAggregationTask, NewFileConfig};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/pipeline.toml");

/// Category labels the summary routines group on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryLabels {
    pub expenses: String,
    pub earnings: String,
    pub savings: String,
    /// Bucket for accepted rows without a category
    pub uncategorized: String,
}

impl Default for SummaryLabels {
    fn default() -> Self {
        Self {
            expenses: "Expenses".to_string(),
            earnings: "Salary".to_string(),
            savings: "Savings".to_string(),
            uncategorized: "Uncategorized".to_string(),
        }
    }
}

/// Full pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub labels: SummaryLabels,
    #[serde(default)]
    pub file_configs: Vec<NewFileConfig>,
    #[serde(default)]
    pub aggregation_tasks: Vec<NewAggregationTask>,
}

/// What `AppConfig::seed` added to the database
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub file_configs: usize,
    pub aggregation_tasks: usize,
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tally").join("pipeline.toml"))
}

impl AppConfig {
    /// The configuration compiled into the binary
    pub fn embedded() -> Result<Self> {
        Self::parse(DEFAULT_CONFIG)
    }

    /// Load configuration (explicit path, then user override, then embedded default)
    pub fn load(override_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = override_path {
            let content = fs::read_to_string(path).map_err(|e| {
                Error::Config(format!("Failed to read config {}: {}", path.display(), e))
            })?;
            info!("Using pipeline config {}", path.display());
            return Self::parse(&content);
        }

        if let Some(path) = default_config_path().filter(|p| p.exists()) {
            let content = fs::read_to_string(&path).map_err(|e| {
                Error::Config(format!("Failed to read config {}: {}", path.display(), e))
            })?;
            info!("Using pipeline config {}", path.display());
            return Self::parse(&content);
        }

        debug!("Using embedded pipeline config");
        Self::embedded()
    }

    /// Parse and check a TOML document
    pub fn parse(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        let labels = [
            &self.labels.expenses,
            &self.labels.earnings,
            &self.labels.savings,
            &self.labels.uncategorized,
        ];
        if labels.iter().any(|l| l.trim().is_empty()) {
            return Err(Error::Config("Summary labels must not be empty".into()));
        }

        for (idx, task) in self.aggregation_tasks.iter().enumerate() {
            if let Some(dep) = &task.depends_on {
                let earlier = self.aggregation_tasks[..idx]
                    .iter()
                    .any(|t| &t.target_table == dep);
                if !earlier {
                    return Err(Error::Config(format!(
                        "Task '{}' depends on '{}', which must be listed before it",
                        task.target_table, dep
                    )));
                }
            }
        }
        Ok(())
    }

    /// Store file configs and aggregation tasks in the database
    ///
    /// File configs are only seeded into an empty table so user edits
    /// survive re-running `init`; tasks are added by target table if missing.
    pub fn seed(&self, db: &Database) -> Result<SeedReport> {
        let mut report = SeedReport::default();

        if db.list_file_configs()?.is_empty() {
            for config in &self.file_configs {
                db.insert_file_config(config)?;
                report.file_configs += 1;
            }
        }

        for task in &self.aggregation_tasks {
            if db.get_task_by_target(&task.target_table)?.is_none() {
                db.insert_aggregation_task(task)?;
                report.aggregation_tasks += 1;
            }
        }

        info!(
            file_configs = report.file_configs,
            aggregation_tasks = report.aggregation_tasks,
            "Seeded configuration"
        );
        Ok(report)
    }
}
