//! Decoder configuration: resource limits and an optional allow-list
//! narrowing, loadable from YAML.
//!
//! ```yaml
//! limits:
//!   max_input_bytes: 1048576
//!   max_depth: 64
//! allowed_types:
//!   - NSArray
//!   - NSDictionary
//! ```
//!
//! Every field is optional; omitted fields take their defaults.

use std::path::Path;

use sarc_core::ParseLimits;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::TypeRegistry;

/// Errors raised while loading or applying configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("limit \"{0}\" must be greater than zero")]
    ZeroLimit(&'static str),

    #[error("allowed type \"{0}\" is not a known archivable type")]
    UnknownType(String),
}

/// Resource bounds applied to every decode and encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveLimits {
    /// Largest accepted input document, in bytes.
    pub max_input_bytes: usize,
    /// Largest object table accepted on decode or produced on encode.
    pub max_objects: usize,
    /// Deepest reference chain followed on decode or encode.
    pub max_depth: usize,
    /// Budget of values the property-list parser may materialize.
    pub max_plist_nodes: usize,
    /// Budget of string and data bytes the property-list parser may copy.
    pub max_plist_bytes: usize,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_input_bytes: 64 * 1024 * 1024,
            max_objects: 1_000_000,
            max_depth: 128,
            max_plist_nodes: 4 * 1024 * 1024,
            max_plist_bytes: 128 * 1024 * 1024,
        }
    }
}

impl ArchiveLimits {
    /// Parser limits derived from these bounds.
    pub fn parse_limits(&self) -> ParseLimits {
        ParseLimits {
            max_depth: self.max_depth,
            max_nodes: self.max_plist_nodes,
            max_bytes: self.max_plist_bytes,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("max_input_bytes", self.max_input_bytes),
            ("max_objects", self.max_objects),
            ("max_depth", self.max_depth),
            ("max_plist_nodes", self.max_plist_nodes),
            ("max_plist_bytes", self.max_plist_bytes),
        ];
        match checks.iter().find(|(_, value)| *value == 0) {
            Some((name, _)) => Err(ConfigError::ZeroLimit(*name)),
            None => Ok(()),
        }
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub limits: ArchiveLimits,
    /// When set, only these names from the standard registry are admitted.
    pub allowed_types: Option<Vec<String>>,
}

impl ArchiveConfig {
    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(source)?;
        config.limits.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&source)?;
        tracing::debug!(path = %path.display(), "loaded archive config");
        Ok(config)
    }

    /// The standard registry narrowed by `allowed_types`.
    pub fn registry(&self) -> Result<TypeRegistry, ConfigError> {
        let standard = TypeRegistry::standard();
        let Some(allowed) = &self.allowed_types else {
            return Ok(standard);
        };
        if let Some(unknown) = allowed.iter().find(|name| !standard.contains(name)) {
            return Err(ConfigError::UnknownType(unknown.clone()));
        }
        Ok(standard.restricted_to(allowed))
    }
}
