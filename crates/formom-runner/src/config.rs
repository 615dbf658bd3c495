//! Runner configuration, loaded from an optional TOML file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use formom_solver::{SolverKind, SolverOptions};
use serde::Deserialize;
use thiserror::Error;

use crate::export::{ExportFormat, Exporter, TabularExport, TextExport};
use crate::logging::LoggingConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub solver: SolverConfig,
    pub export: ExportConfig,
    pub logging: LoggingConfig,
}

impl RunnerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&source)
    }

    pub fn parse(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub kind: SolverKind,
    /// Path or name of the `glpsol` executable
    pub glpsol_path: PathBuf,
    /// Hard limit on one solver process
    pub timeout_secs: u64,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub track_duals: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        let options = SolverOptions::default();
        Self {
            kind: options.kind,
            glpsol_path: options.glpsol_path,
            timeout_secs: options.timeout.as_secs(),
            max_iterations: options.max_iterations,
            tolerance: options.tolerance,
            track_duals: options.track_duals,
        }
    }
}

impl SolverConfig {
    pub fn options(&self) -> SolverOptions {
        SolverOptions {
            kind: self.kind,
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
            glpsol_path: self.glpsol_path.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            track_duals: self.track_duals,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub format: ExportFormat,
    /// Split decision variable names into tag columns (tabular only)
    pub split_tags: bool,
    pub separator: String,
    /// Prefix for per-run file names
    pub prefix: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: ExportFormat::Text,
            split_tags: false,
            separator: "_".to_string(),
            prefix: "out_".to_string(),
        }
    }
}

impl ExportConfig {
    pub fn exporter(&self) -> Exporter {
        let exporter = match self.format {
            ExportFormat::Text => Exporter::with_strategy(TextExport),
            ExportFormat::Tabular => Exporter::with_strategy(TabularExport {
                split_tags: self.split_tags,
                separator: self.separator.clone(),
            }),
        };
        exporter.with_prefix(self.prefix.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = RunnerConfig::parse("").unwrap();

        assert_eq!(config.solver.kind, SolverKind::Simplex);
        assert_eq!(config.solver.timeout_secs, 300);
        assert!(config.solver.track_duals);
        assert_eq!(config.export.format, ExportFormat::Text);
        assert_eq!(config.export.separator, "_");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_full_config() {
        let config = RunnerConfig::parse(
            r#"
            [solver]
            kind = "glpk"
            glpsol_path = "/opt/glpk/bin/glpsol"
            timeout_secs = 30

            [export]
            format = "tabular"
            split_tags = true
            separator = "-"
            prefix = ""

            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.solver.kind, SolverKind::Glpk);
        let options = config.solver.options();
        assert_eq!(options.timeout, Duration::from_secs(30));
        assert_eq!(options.glpsol_path, PathBuf::from("/opt/glpk/bin/glpsol"));
        assert_eq!(options.max_iterations, 10000);
        assert_eq!(config.export.format, ExportFormat::Tabular);
        assert!(config.export.split_tags);
        assert_eq!(config.export.separator, "-");
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_unknown_solver_rejected() {
        assert!(matches!(
            RunnerConfig::parse("[solver]\nkind = \"cplex\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            RunnerConfig::load("/nonexistent/formom.toml"),
            Err(ConfigError::Read { .. })
        ));
    }
}
