//! Reading plans from TOML, whether shipped with the binary or written by hand.

use crate::config::schema::{PatchPlan, ValidationError};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Where a plan's TOML came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOrigin {
    Builtin(String),
    File(PathBuf),
    Inline,
}

impl fmt::Display for PlanOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanOrigin::Builtin(name) => write!(f, "built-in plan '{name}'"),
            PlanOrigin::File(path) => write!(f, "plan file {}", path.display()),
            PlanOrigin::Inline => write!(f, "inline plan"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("'{name}' is neither a built-in plan ({known}) nor an existing plan file")]
    UnknownPlan {
        name: String,
        known: String,
        source: io::Error,
    },

    #[error("cannot read plan file {path}: {source}")]
    Unreadable { path: PathBuf, source: io::Error },

    #[error("{origin} is not valid TOML: {source}")]
    Syntax {
        origin: PlanOrigin,
        source: toml_edit::de::Error,
    },

    #[error("{origin} is invalid:\n{source}")]
    Invalid {
        origin: PlanOrigin,
        source: ValidationError,
    },
}

impl ConfigError {
    pub fn origin(&self) -> Option<&PlanOrigin> {
        match self {
            ConfigError::Syntax { origin, .. } | ConfigError::Invalid { origin, .. } => {
                Some(origin)
            }
            ConfigError::UnknownPlan { .. } | ConfigError::Unreadable { .. } => None,
        }
    }
}

pub fn load_from_str(input: &str) -> Result<PatchPlan, ConfigError> {
    parse(input, PlanOrigin::Inline)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<PatchPlan, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&contents, PlanOrigin::File(path.to_path_buf()))
}

/// Deserialize and validate a plan, naming `origin` in any error.
pub(crate) fn parse(input: &str, origin: PlanOrigin) -> Result<PatchPlan, ConfigError> {
    let plan: PatchPlan = match toml_edit::de::from_str(input) {
        Ok(plan) => plan,
        Err(source) => return Err(ConfigError::Syntax { origin, source }),
    };
    if let Err(source) = plan.validate() {
        return Err(ConfigError::Invalid { origin, source });
    }
    tracing::debug!(%origin, operations = plan.operations.len(), "plan loaded");
    Ok(plan)
}
