use crate::core::io::columns::ColumnMapping;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportOptions {
    /// Overrides the column layout detected from the file header.
    pub column_mapping: Option<ColumnMapping>,
    pub sort_particles: bool,
    pub detect_reduced_coordinates: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            column_mapping: None,
            sort_particles: false,
            detect_reduced_coordinates: true,
        }
    }
}

#[derive(Default)]
pub struct ImportOptionsBuilder {
    column_mapping: Option<ColumnMapping>,
    sort_particles: Option<bool>,
    detect_reduced_coordinates: Option<bool>,
}

impl ImportOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column_mapping(mut self, mapping: ColumnMapping) -> Self {
        self.column_mapping = Some(mapping);
        self
    }
    pub fn sort_particles(mut self, sort: bool) -> Self {
        self.sort_particles = Some(sort);
        self
    }
    pub fn detect_reduced_coordinates(mut self, detect: bool) -> Self {
        self.detect_reduced_coordinates = Some(detect);
        self
    }

    pub fn build(self) -> Result<ImportOptions, ConfigError> {
        if let Some(mapping) = &self.column_mapping {
            mapping
                .validate()
                .map_err(|e| ConfigError::InvalidParameter {
                    name: "column_mapping",
                    reason: e.to_string(),
                })?;
        }
        let defaults = ImportOptions::default();
        Ok(ImportOptions {
            column_mapping: self.column_mapping,
            sort_particles: self.sort_particles.unwrap_or(defaults.sort_particles),
            detect_reduced_coordinates: self
                .detect_reduced_coordinates
                .unwrap_or(defaults.detect_reduced_coordinates),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CnaMode {
    /// One global cutoff radius for all particles.
    Fixed,
    /// Per-particle cutoff derived from the nearest-neighbor distances.
    Adaptive,
    /// Adjacency taken from the existing bond network.
    Bonds,
}

impl fmt::Display for CnaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CnaMode::Fixed => "fixed",
            CnaMode::Adaptive => "adaptive",
            CnaMode::Bonds => "bonds",
        };
        f.write_str(name)
    }
}

impl FromStr for CnaMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" | "fixed-cutoff" => Ok(CnaMode::Fixed),
            "adaptive" | "adaptive-cutoff" => Ok(CnaMode::Adaptive),
            "bonds" | "bond" | "bond-based" => Ok(CnaMode::Bonds),
            other => Err(ConfigError::InvalidParameter {
                name: "mode",
                reason: format!("unknown CNA mode '{other}'"),
            }),
        }
    }
}

pub const DEFAULT_CNA_CUTOFF: f64 = 3.2;

#[derive(Debug, Clone, PartialEq)]
pub struct CnaConfig {
    pub mode: CnaMode,
    /// Neighbor cutoff; only used by [`CnaMode::Fixed`].
    pub cutoff: f64,
    pub only_selected: bool,
    /// Structure types that may be assigned, indexed by structure type id.
    pub identify: [bool; 5],
}

impl Default for CnaConfig {
    fn default() -> Self {
        Self {
            mode: CnaMode::Adaptive,
            cutoff: DEFAULT_CNA_CUTOFF,
            only_selected: false,
            identify: [true; 5],
        }
    }
}

#[derive(Default)]
pub struct CnaConfigBuilder {
    mode: Option<CnaMode>,
    cutoff: Option<f64>,
    only_selected: Option<bool>,
    identify: Option<[bool; 5]>,
}

impl CnaConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(mut self, mode: CnaMode) -> Self {
        self.mode = Some(mode);
        self
    }
    pub fn cutoff(mut self, cutoff: f64) -> Self {
        self.cutoff = Some(cutoff);
        self
    }
    pub fn only_selected(mut self, only_selected: bool) -> Self {
        self.only_selected = Some(only_selected);
        self
    }
    pub fn identify(mut self, identify: [bool; 5]) -> Self {
        self.identify = Some(identify);
        self
    }

    pub fn build(self) -> Result<CnaConfig, ConfigError> {
        let defaults = CnaConfig::default();
        let mode = self.mode.unwrap_or(defaults.mode);
        let cutoff = self.cutoff.unwrap_or(defaults.cutoff);
        if mode == CnaMode::Fixed && !(cutoff.is_finite() && cutoff > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "cutoff",
                reason: format!("must be a positive number, got {cutoff}"),
            });
        }
        Ok(CnaConfig {
            mode,
            cutoff,
            only_selected: self.only_selected.unwrap_or(defaults.only_selected),
            identify: self.identify.unwrap_or(defaults.identify),
        })
    }
}
