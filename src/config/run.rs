//! Archive run configuration.
//!
//! # Example
//!
//! ```toml
//! [run]
//! page_size = 100000
//! reconcile_schema = true
//! engine = "MyISAM"
//! ```

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Settings for a single archive run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Maximum number of rows selected per page.
    /// A page shorter than this ends the pass over a table.
    /// Default: 100000
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Bring archive tables in line with the live schema before the first
    /// row of each table is written.
    /// Default: true
    #[serde(default = "default_reconcile_schema")]
    pub reconcile_schema: bool,

    /// Storage engine for archive tables created on MySQL.
    /// When unset, the server default engine is used.
    #[serde(default)]
    pub engine: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            reconcile_schema: default_reconcile_schema(),
            engine: None,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Validation(
                "run.page_size must be at least 1".into(),
            ));
        }
        if let Some(engine) = &self.engine
            && (engine.is_empty() || !engine.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
        {
            return Err(ConfigError::Validation(format!(
                "run.engine '{engine}' is not a valid storage engine name"
            )));
        }
        Ok(())
    }
}

fn default_page_size() -> u32 {
    100_000
}

fn default_reconcile_schema() -> bool {
    true
}
