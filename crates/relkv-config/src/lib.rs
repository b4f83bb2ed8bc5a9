//! Module: relkv-config
//! Responsibility: engine configuration loaded from TOML.
//! Does not own: how the engine reacts to each switch.
//! Boundary: `DbConfig` is the only type the core crate consumes.

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use thiserror::Error as ThisError;

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

///
/// RebuildStrategy
///
/// Which path rebuilds stale secondary indexes from primary rows.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RebuildStrategy {
    /// Splice secondary-key bytes straight out of stored row bytes.
    #[default]
    Splice,

    /// Decode every row into the live shape and re-encode its keys.
    Materialize,
}

impl RebuildStrategy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Splice => "splice",
            Self::Materialize => "materialize",
        }
    }
}

///
/// DbConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DbConfig {
    /// Downgrade an incompatible primary-key change into a destructive reset
    /// of the relation instead of failing the open.
    pub self_healing: bool,

    /// Compare secondary-index row counts against the primary row count when
    /// the persisted schema version is reused.
    pub verify_index_counts: bool,

    pub rebuild_strategy: RebuildStrategy,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            self_healing: false,
            verify_index_counts: true,
            rebuild_strategy: RebuildStrategy::Splice,
        }
    }
}

impl DbConfig {
    /// Parse one TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Read and parse a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_toml_str(&source)
    }

    #[must_use]
    pub const fn with_self_healing(mut self, enabled: bool) -> Self {
        self.self_healing = enabled;
        self
    }

    #[must_use]
    pub const fn with_rebuild_strategy(mut self, strategy: RebuildStrategy) -> Self {
        self.rebuild_strategy = strategy;
        self
    }

    #[must_use]
    pub const fn with_verify_index_counts(mut self, enabled: bool) -> Self {
        self.verify_index_counts = enabled;
        self
    }
}

///
/// TESTS
///
