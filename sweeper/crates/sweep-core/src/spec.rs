//! Sweep definitions loaded from YAML.
//!
//! ```yaml
//! parameters:
//!   - { name: length, min: 5, max: 50, step: 5 }
//!   - { name: mult, min: 1.0, max: 3.0, step: 0.5 }
//! criteria:
//!   min_trades: 20
//! apply_best: true
//! settings:
//!   settle_ms: 1500
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::criteria::AcceptanceCriteria;
use crate::optimizer::SweepSettings;
use crate::params::ParameterSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepSpec {
    pub parameters: ParameterSet,
    #[serde(default)]
    pub criteria: AcceptanceCriteria,
    /// Replay the winning inputs once the sweep completes.
    #[serde(default = "default_apply_best")]
    pub apply_best: bool,
    #[serde(default)]
    pub settings: SweepSettings,
}

fn default_apply_best() -> bool {
    true
}

#[derive(Debug, Error)]
pub enum SpecError {
    #[error("failed to read sweep spec {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse sweep spec {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Load a [`SweepSpec`] from a YAML file.
///
/// Only parses; range and criteria checks happen when the sweep starts.
pub fn load_sweep_spec(path: impl AsRef<Path>) -> Result<SweepSpec, SpecError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| SpecError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&raw).map_err(|source| SpecError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}
