use crate::cli::{AnalyzeArgs, InputArgs};
use crate::error::{CliError, Result};
use latticeflow::core::io::columns::ColumnMapping;
use latticeflow::core::io::traits::FileFormat;
use latticeflow::engine::cna::StructureType;
use latticeflow::engine::config::{
    CnaConfig, CnaConfigBuilder, CnaMode, ConfigError, ImportOptions, ImportOptionsBuilder,
};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialImportConfig {
    format: Option<FileFormat>,
    sort_particles: Option<bool>,
    detect_reduced_coordinates: Option<bool>,
    columns: Option<ColumnMapping>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialAnalysisConfig {
    mode: Option<CnaMode>,
    cutoff: Option<f64>,
    bond_cutoff: Option<f64>,
    only_selected: Option<bool>,
    identify: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    import: Option<PartialImportConfig>,
    analysis: Option<PartialAnalysisConfig>,
}

/// Fully resolved settings for reading a trajectory.
#[derive(Debug, Clone)]
pub struct ImportSettings {
    pub format: Option<FileFormat>,
    pub options: ImportOptions,
}

/// Fully resolved settings for the `analyze` command.
#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    pub import: ImportSettings,
    pub cna: CnaConfig,
    pub bond_cutoff: Option<f64>,
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str, kind: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid {} value for {}: {}", kind, key, value)))
}

impl PartialConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let file_error = |source: anyhow::Error| CliError::ConfigFile {
            path: path.to_path_buf(),
            source,
        };
        let content = std::fs::read_to_string(path).map_err(|e| file_error(e.into()))?;
        toml::from_str(&content).map_err(|e| file_error(e.into()))
    }

    /// Loads the file named by `--config`, or an empty configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn import_settings(&mut self, input: &InputArgs, sort_override: bool) -> Result<ImportSettings> {
        let import = self.import.take().unwrap_or_default();

        let mut builder = ImportOptionsBuilder::new();
        if let Some(columns) = import.columns {
            builder = builder.column_mapping(columns);
        }
        if sort_override {
            builder = builder.sort_particles(true);
        } else if let Some(sort) = import.sort_particles {
            builder = builder.sort_particles(sort);
        }
        if let Some(detect) = import.detect_reduced_coordinates {
            builder = builder.detect_reduced_coordinates(detect);
        }
        let options = builder
            .build()
            .map_err(|e| CliError::Config(e.to_string()))?;

        Ok(ImportSettings {
            format: input.format.map(Into::into).or(import.format),
            options,
        })
    }

    pub fn merge_with_cli(mut self, args: &AnalyzeArgs) -> Result<AnalysisSettings> {
        self.apply_set_values(&args.set_values)?;

        let import = self.import_settings(&args.input, false)?;
        let analysis = self.analysis.take().unwrap_or_default();

        let mut builder = CnaConfigBuilder::new();
        if let Some(mode) = args.mode.map(Into::into).or(analysis.mode) {
            builder = builder.mode(mode);
        }
        if let Some(cutoff) = args.cutoff.or(analysis.cutoff) {
            builder = builder.cutoff(cutoff);
        }
        builder = builder.only_selected(args.only_selected || analysis.only_selected.unwrap_or(false));
        if let Some(names) = &analysis.identify {
            builder = builder.identify(Self::parse_identify(names)?);
        }
        let cna = builder.build().map_err(|e| CliError::Config(e.to_string()))?;

        let bond_cutoff = args.bond_cutoff.or(analysis.bond_cutoff);
        if let Some(cutoff) = bond_cutoff {
            if !(cutoff.is_finite() && cutoff > 0.0) {
                return Err(CliError::Config(format!(
                    "bond-cutoff must be a positive number, got {}",
                    cutoff
                )));
            }
        }

        Ok(AnalysisSettings {
            import,
            cna,
            bond_cutoff,
        })
    }

    fn parse_identify(names: &[String]) -> Result<[bool; StructureType::COUNT]> {
        let mut identify = [false; StructureType::COUNT];
        identify[StructureType::Other.id() as usize] = true;
        for name in names {
            let structure: StructureType = name.parse().map_err(CliError::Config)?;
            identify[structure.id() as usize] = true;
        }
        Ok(identify)
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let Some((key, value_str)) = kv_pair.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                )));
            };
            let key = key.trim();

            match key {
                "import.sort-particles" => {
                    self.import.get_or_insert_with(Default::default).sort_particles =
                        Some(parse_value(key, value_str, "boolean")?);
                }
                "import.detect-reduced-coordinates" => {
                    self.import
                        .get_or_insert_with(Default::default)
                        .detect_reduced_coordinates = Some(parse_value(key, value_str, "boolean")?);
                }
                "analysis.mode" => {
                    let mode: CnaMode = value_str
                        .parse()
                        .map_err(|e: ConfigError| CliError::Config(e.to_string()))?;
                    self.analysis.get_or_insert_with(Default::default).mode = Some(mode);
                }
                "analysis.cutoff" => {
                    self.analysis.get_or_insert_with(Default::default).cutoff =
                        Some(parse_value(key, value_str, "float")?);
                }
                "analysis.bond-cutoff" => {
                    self.analysis.get_or_insert_with(Default::default).bond_cutoff =
                        Some(parse_value(key, value_str, "float")?);
                }
                "analysis.only-selected" => {
                    self.analysis.get_or_insert_with(Default::default).only_selected =
                        Some(parse_value(key, value_str, "boolean")?);
                }
                "analysis.identify" => {
                    self.analysis.get_or_insert_with(Default::default).identify = Some(
                        value_str
                            .split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(str::to_string)
                            .collect(),
                    );
                }
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }
}
