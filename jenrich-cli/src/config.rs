//! Job configuration files for `jenrich enrich`

use jenrich_format::Limits;
use serde::Deserialize;
use std::error::Error;
use std::path::{Path, PathBuf};

/// Target path used when neither the job file nor the command line names one
pub const DEFAULT_TARGET: &str = "$.Clients[*].variableName";

/// Search expression used when neither the job file nor the command line names one
pub const DEFAULT_SEARCH: &str = r#"concat($.Clients[*].ClientID,"-",$.Clients[*].ClaimID)"#;

/// Settings read from a TOML job file
///
/// ```toml
/// search = 'concat($.Clients[*].ClientID,"-",$.Clients[*].ClaimID)'
/// target = "$.Clients[*].variableName"
/// lookup = "table.json"
/// pretty = true
///
/// [limits]
/// max_path_segments = 32
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobConfig {
    pub search: String,
    pub target: String,
    /// Relative paths are resolved against the job file's directory
    pub lookup: Option<PathBuf>,
    pub pretty: bool,
    pub strict: bool,
    pub limits: LimitsConfig,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            search: DEFAULT_SEARCH.to_string(),
            target: DEFAULT_TARGET.to_string(),
            lookup: None,
            pretty: false,
            strict: false,
            limits: LimitsConfig::default(),
        }
    }
}

/// Optional overrides of the expression limits
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    pub max_expression_length: Option<usize>,
    pub max_path_segments: Option<usize>,
    pub max_concat_paths: Option<usize>,
}

impl LimitsConfig {
    /// Apply the overrides to the defaults and check them against the hard maximums
    pub fn to_limits(&self) -> Result<Limits, Box<dyn Error>> {
        let defaults = Limits::default();
        let limits = Limits {
            max_expression_length: self
                .max_expression_length
                .unwrap_or(defaults.max_expression_length),
            max_path_segments: self
                .max_path_segments
                .unwrap_or(defaults.max_path_segments),
            max_concat_paths: self.max_concat_paths.unwrap_or(defaults.max_concat_paths),
            ..defaults
        };
        limits.validate()?;
        Ok(limits)
    }
}

impl JobConfig {
    /// Parse a job file from TOML text
    pub fn from_toml(text: &str) -> Result<Self, Box<dyn Error>> {
        Ok(toml::from_str(text)?)
    }

    /// Read a job file
    pub fn load(path: &Path) -> Result<Self, Box<dyn Error>> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read job file {}: {}", path.display(), e))?;
        let mut config = Self::from_toml(&text)
            .map_err(|e| format!("invalid job file {}: {}", path.display(), e))?;
        if let (Some(lookup), Some(dir)) = (config.lookup.as_mut(), path.parent()) {
            if lookup.is_relative() {
                *lookup = dir.join(&*lookup);
            }
        }
        Ok(config)
    }
}
