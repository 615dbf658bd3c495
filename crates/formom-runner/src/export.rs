use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use formom_solver::{SolverStatus, TerminationCondition};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::batch::{RunManifest, RunRecord};
use crate::report;

/// Returned by [`Exporter::export_count`] when nothing could be exported
pub const EXPORT_FAILED: i64 = -1;

pub const SUMMARY_FILE: &str = "SUMMARY.csv";
pub const OUTPUT_DIR_PREFIX: &str = "RunOutput-";

/// Highest `-<n>` suffix tried when the timestamped name is taken
const MAX_DIR_SUFFIX: usize = 99;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Output target is not a directory: {0}")]
    InvalidOutputTarget(PathBuf),
    #[error("Output directory already exists: {0}")]
    DirectoryCollision(PathBuf),
    #[error("Cannot create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Variable {variable} has {found} tags, expected {expected}")]
    TagArityMismatch {
        variable: String,
        expected: usize,
        found: usize,
    },
}

/// Per-run file layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// One `.txt` block per run
    #[default]
    Text,
    /// Four CSV files per optimal run
    Tabular,
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(ExportFormat::Text),
            "tabular" | "csv" => Ok(ExportFormat::Tabular),
            other => Err(format!("unknown export format: {}", other)),
        }
    }
}

/// Writes the detail unit of one run
pub trait ExportStrategy {
    /// Write files for `record` as `<dir>/<stem>...`; returns how many were written
    fn write_run(&self, dir: &Path, stem: &str, record: &RunRecord) -> Result<usize, ExportError>;
}

/// A single text file per run, whatever its outcome
#[derive(Debug, Clone, Copy, Default)]
pub struct TextExport;

impl ExportStrategy for TextExport {
    fn write_run(&self, dir: &Path, stem: &str, record: &RunRecord) -> Result<usize, ExportError> {
        fs::write(dir.join(format!("{}.txt", stem)), report::render_run_text(record))?;
        Ok(1)
    }
}

/// CSV files for optimal runs; a diagnostic text file for the rest
#[derive(Debug, Clone)]
pub struct TabularExport {
    /// Split decision variable names into `tag_1..tag_k` columns
    pub split_tags: bool,
    pub separator: String,
}

impl Default for TabularExport {
    fn default() -> Self {
        Self {
            split_tags: false,
            separator: "_".to_string(),
        }
    }
}

impl TabularExport {
    fn decision_rows(&self, variables: &IndexMap<String, f64>) -> Result<(Vec<String>, Vec<Vec<String>>), ExportError> {
        if !self.split_tags || variables.is_empty() {
            let header = vec!["decision_variable".to_string(), "value".to_string()];
            let rows = variables
                .iter()
                .map(|(name, value)| vec![name.clone(), value.to_string()])
                .collect();
            return Ok((header, rows));
        }

        // Tag count comes from the first variable; every other one must match
        let mut expected = None;
        let mut rows = Vec::with_capacity(variables.len());
        for (name, value) in variables {
            let mut row: Vec<String> = name.split(self.separator.as_str()).map(str::to_string).collect();
            let k = *expected.get_or_insert(row.len());
            if row.len() != k {
                return Err(ExportError::TagArityMismatch {
                    variable: name.clone(),
                    expected: k,
                    found: row.len(),
                });
            }
            row.push(value.to_string());
            rows.push(row);
        }

        let k = expected.unwrap_or(1);
        let mut header: Vec<String> = (1..=k).map(|n| format!("tag_{}", n)).collect();
        header.push("value".to_string());
        Ok((header, rows))
    }
}

impl ExportStrategy for TabularExport {
    fn write_run(&self, dir: &Path, stem: &str, record: &RunRecord) -> Result<usize, ExportError> {
        let Some(result) = &record.result else {
            return TextExport.write_run(dir, stem, record);
        };

        // Validate before touching the disk so a bad run leaves no files
        let (header, rows) = self.decision_rows(&result.variables)?;

        write_csv(&dir.join(format!("{}_decision_vars.csv", stem)), &header, rows)?;
        write_map(
            &dir.join(format!("{}_shadow_price.csv", stem)),
            ["constraint", "shadow_price"],
            &result.shadow_prices,
        )?;
        write_map(
            &dir.join(format!("{}_slack_ge.csv", stem)),
            ["constraint", "slack_ge"],
            &result.slack_ge,
        )?;
        write_map(
            &dir.join(format!("{}_slack_le.csv", stem)),
            ["constraint", "slack_le"],
            &result.slack_le,
        )?;
        Ok(4)
    }
}

fn write_csv(path: &Path, header: &[String], rows: Vec<Vec<String>>) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_map(path: &Path, header: [&str; 2], values: &IndexMap<String, f64>) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(header)?;
    for (name, value) in values {
        writer.write_record([name.as_str(), value.to_string().as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Create `RunOutput-<stamp>`, or `RunOutput-<stamp>-<n>` when earlier names
/// are taken. Each attempt is a single `create_dir`.
fn create_output_dir(root: &Path, stamp: &str) -> Result<PathBuf, ExportError> {
    let base = format!("{}{}", OUTPUT_DIR_PREFIX, stamp);
    let mut last = root.join(&base);
    for n in 0..=MAX_DIR_SUFFIX {
        let directory = if n == 0 {
            root.join(&base)
        } else {
            root.join(format!("{}-{}", base, n))
        };
        match fs::create_dir(&directory) {
            Ok(()) => return Ok(directory),
            Err(source) if source.kind() == io::ErrorKind::AlreadyExists => last = directory,
            Err(source) => {
                return Err(ExportError::CreateDir {
                    path: directory,
                    source,
                });
            }
        }
    }
    Err(ExportError::DirectoryCollision(last))
}

/// Runs whose names share a stem (`a.json`, `a.csv`) get `-2`, `-3`, ...
fn unique_stem(taken: &mut HashSet<String>, stem: String) -> String {
    if taken.insert(stem.clone()) {
        return stem;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}", stem, n);
        if taken.insert(candidate.clone()) {
            warn!(stem = %stem, renamed = %candidate, "Duplicate run stem");
            return candidate;
        }
        n += 1;
    }
}

/// One line of the aggregate summary file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub run: String,
    pub status: SolverStatus,
    pub termination: TerminationCondition,
    pub objective_value: Option<f64>,
}

impl From<&RunRecord> for SummaryRow {
    fn from(record: &RunRecord) -> Self {
        Self {
            run: record.name.clone(),
            status: record.outcome.status,
            termination: record.outcome.termination,
            objective_value: record.objective_value(),
        }
    }
}

pub fn write_summary(path: &Path, manifest: &RunManifest) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in manifest {
        writer.serialize(SummaryRow::from(record))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_summary(path: impl AsRef<Path>) -> Result<Vec<SummaryRow>, ExportError> {
    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader.deserialize().collect::<Result<Vec<SummaryRow>, _>>()?;
    Ok(rows)
}

/// Where an export landed and how many runs got a detail unit
#[derive(Debug, Clone, PartialEq)]
pub struct ExportReport {
    pub directory: PathBuf,
    pub written: usize,
}

/// Writes a manifest into a fresh timestamped directory
pub struct Exporter {
    strategy: Box<dyn ExportStrategy>,
    prefix: String,
}

impl Exporter {
    pub fn new(format: ExportFormat) -> Self {
        let strategy: Box<dyn ExportStrategy> = match format {
            ExportFormat::Text => Box::new(TextExport),
            ExportFormat::Tabular => Box::new(TabularExport::default()),
        };
        Self {
            strategy,
            prefix: String::new(),
        }
    }

    pub fn with_strategy(strategy: impl ExportStrategy + 'static) -> Self {
        Self {
            strategy: Box::new(strategy),
            prefix: String::new(),
        }
    }

    /// Prefix for every per-run file name
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Export every run. Fails as a whole only when the target is invalid, the
    /// output directory cannot be created, or the summary cannot be written;
    /// a failing run is logged and left out of the count.
    pub fn export(&self, manifest: &RunManifest, root: impl AsRef<Path>) -> Result<ExportReport, ExportError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(ExportError::InvalidOutputTarget(root.to_path_buf()));
        }

        let directory = create_output_dir(root, &report::timestamp())?;

        write_summary(&directory.join(SUMMARY_FILE), manifest)?;

        let mut stems = HashSet::new();
        let mut written = 0;
        for record in manifest {
            let stem = unique_stem(&mut stems, format!("{}{}", self.prefix, record.base_name()));
            match self.strategy.write_run(&directory, &stem, record) {
                Ok(0) => {}
                Ok(_) => written += 1,
                Err(e) => warn!(run = %record.name, error = %e, "Could not export run"),
            }
        }

        info!(directory = %directory.display(), written, runs = manifest.len(), "Export finished");
        Ok(ExportReport { directory, written })
    }

    /// [`Exporter::export`] as a count, with [`EXPORT_FAILED`] for a failed export
    pub fn export_count(&self, manifest: &RunManifest, root: impl AsRef<Path>) -> i64 {
        match self.export(manifest, root) {
            Ok(report) => report.written as i64,
            Err(e) => {
                warn!(error = %e, "Export failed");
                EXPORT_FAILED
            }
        }
    }
}
