use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::policy::PolicyRuleset;
use crate::scan::ScanOptions;

/// Default minimum confidence for trusting a question match.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.6;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml decode error: {0}")]
    TomlDecode(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tunables for a [`crate::Validator`].
///
/// Every field has a default, so an empty TOML document is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub policy: PolicyRuleset,
    pub scan: ScanOptions,
    /// Question matches below this confidence are ignored.
    pub min_confidence: f64,
    /// Reject statements naming tables absent from the catalog before the
    /// dry run instead of leaving them to the database.
    pub strict_tables: bool,
    pub dry_run_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            policy: PolicyRuleset::default(),
            scan: ScanOptions::default(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            strict_tables: false,
            dry_run_timeout_ms: crate::dry_run::DEFAULT_DRY_RUN_TIMEOUT.as_millis() as u64,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validated()
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn dry_run_timeout(&self) -> Duration {
        Duration::from_millis(self.dry_run_timeout_ms)
    }

    fn validated(mut self) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigError::Invalid(format!(
                "min_confidence must be within [0, 1], got {}",
                self.min_confidence
            )));
        }
        if self.dry_run_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "dry_run_timeout_ms must be positive".to_string(),
            ));
        }
        self.policy = self.policy.normalized();
        if self.policy.allowed_leaders.is_empty() {
            return Err(ConfigError::Invalid(
                "policy.allowed_leaders must not be empty".to_string(),
            ));
        }
        Ok(self)
    }
}
