// Configuration for command histories

use crate::command::history::DEFAULT_MAX_HISTORY;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings applied to every history a `CommandManager` creates
///
/// Stored as RON, e.g. `(max_history_size: 100, merge_consecutive: false)`.
/// Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    /// Maximum number of undoable commands per scope
    pub max_history_size: usize,
    /// Collapse runs of mergeable commands (e.g. a drag) into one undo step
    pub merge_consecutive: bool,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            max_history_size: DEFAULT_MAX_HISTORY,
            merge_consecutive: true,
        }
    }
}

impl CommandConfig {
    /// Parse and validate a RON document
    pub fn from_ron_str(source: &str) -> Result<Self, ConfigError> {
        let config: CommandConfig = ron::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a RON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_ron_str(&source)?;
        log::debug!(
            "Loaded command config from {} ({:?})",
            path.as_ref().display(),
            config
        );
        Ok(config)
    }

    /// Serialize to pretty RON
    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_history_size == 0 {
            return Err(ConfigError::Invalid(
                "max_history_size must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
