pub mod batch;
pub mod config;
pub mod export;
pub mod input;
pub mod logging;
pub mod report;
pub mod session;

pub use batch::{BatchRunner, BatchSummary, RunManifest, RunRecord, RunRequest, RunSource, RunState};
pub use config::{ConfigError, ExportConfig, RunnerConfig, SolverConfig};
pub use export::{
    ExportError, ExportFormat, ExportReport, ExportStrategy, Exporter, SummaryRow, TabularExport, TextExport,
    EXPORT_FAILED,
};
pub use input::{ConstraintSpec, InputError, ModelInput};
pub use logging::LoggingConfig;
pub use session::{RunMode, Session, SessionError};
