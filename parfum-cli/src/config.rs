use anyhow::{Context, Result};
use parfum_core::{FunnelConfig, FunnelError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_BOT_TOKEN: &str = "PARFUM_BOT_TOKEN";
pub const ENV_DATA_DIR: &str = "PARFUM_DATA_DIR";
pub const ENV_UNIT_COST: &str = "PARFUM_UNIT_COST";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    /// Lost on restart
    Memory,
    /// Kept in the bot database
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Program that prints the receipt text; the PDF path is appended as
    /// the last argument.
    pub program: String,
    pub args: Vec<String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["scripts/read_receipt.py".to_string()],
        }
    }
}

impl ExtractorConfig {
    /// Fail at startup rather than on every receipt: the program must be set
    /// and every argument naming a script file must exist.
    pub fn validate(&self) -> parfum_core::Result<()> {
        if self.program.trim().is_empty() {
            return Err(FunnelError::config("extractor.program is empty"));
        }
        for arg in &self.args {
            let path = Path::new(arg);
            if !arg.starts_with('-') && path.extension().is_some() && !path.is_file() {
                return Err(FunnelError::config(format!(
                    "extractor script {} not found (run from the repository root or set extractor.args)",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bot_token: String,
    pub api_base: String,
    pub data_dir: PathBuf,
    pub poll_timeout_secs: u64,
    pub state_backend: StateBackend,
    pub extractor: ExtractorConfig,
    pub funnel: FunnelConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base: parfum_core::telegram::DEFAULT_API_BASE.to_string(),
            data_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("parfum"),
            poll_timeout_secs: 30,
            state_backend: StateBackend::Sqlite,
            extractor: ExtractorConfig::default(),
            funnel: FunnelConfig::default(),
        }
    }
}

impl AppConfig {
    /// Read `path` if given, otherwise start from defaults. Environment
    /// overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("Invalid config file {}", path.display()))?
            }
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.funnel.validate()?;
        Ok(config)
    }

    fn apply_overrides<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) -> Result<()> {
        if let Some(token) = lookup(ENV_BOT_TOKEN) {
            self.bot_token = token;
        }
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(cost) = lookup(ENV_UNIT_COST) {
            self.funnel.unit_cost = cost
                .trim()
                .parse()
                .with_context(|| format!("{} must be a positive integer, got {:?}", ENV_UNIT_COST, cost))?;
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("parfum.db")
    }

    pub fn receipts_dir(&self) -> PathBuf {
        self.data_dir.join("receipts")
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }
}
