//! Human-readable text: run detail blocks and status messages.

use std::fmt::Write;
use std::path::Path;

use chrono::Local;

use crate::batch::{RunManifest, RunRecord, RunRequest, RunSource, RunState};

/// Used for output directory names and status messages
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

pub fn timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Detail text for one run. Optimal runs list every reporting view;
/// anything else gets the solver diagnostic.
pub fn render_run_text(record: &RunRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Run: {}", record.name);
    let _ = writeln!(out, "Written: {}", timestamp());
    let _ = writeln!(out, "Status: {}", record.outcome.status);
    let _ = writeln!(out, "Termination: {}", record.outcome.termination);
    match record.objective_value() {
        Some(value) => {
            let _ = writeln!(out, "Objective value: {}", value);
        }
        None => {
            let _ = writeln!(out, "Objective value: n/a");
        }
    }

    let Some(result) = &record.result else {
        let _ = writeln!(out);
        let _ = writeln!(out, "Diagnostic:");
        let _ = writeln!(out, "  State: {:?}", record.state);
        if let Some(message) = &record.outcome.message {
            let _ = writeln!(out, "  {}", message);
        }
        if let Some(instance) = &record.instance {
            let model = instance.model();
            let _ = writeln!(
                out,
                "  Model: {} variables, {} constraints",
                model.num_variables(),
                model.num_constraints()
            );
        }
        return out;
    };

    let sections = [
        ("Decision variables", &result.variables),
        ("Shadow prices", &result.shadow_prices),
        ("Slack (GE constraints)", &result.slack_ge),
        ("Slack (LE constraints)", &result.slack_le),
    ];
    for (title, values) in sections {
        let _ = writeln!(out);
        let _ = writeln!(out, "{} ({}):", title, values.len());
        let width = values.keys().map(|k| k.len()).max().unwrap_or(0);
        for (name, value) in values {
            let _ = writeln!(out, "  {:width$}  {}", name, value, width = width);
        }
    }
    out
}

/// Status after loading inputs
pub fn status_load(requests: &[RunRequest]) -> String {
    let mut out = String::new();
    let ready = requests
        .iter()
        .filter(|r| matches!(r.source, RunSource::Ready(_)))
        .count();
    let _ = writeln!(out, "[{}] Loaded {} of {} inputs", timestamp(), ready, requests.len());
    for request in requests {
        if let RunSource::Rejected(reason) = &request.source {
            let _ = writeln!(out, "  rejected {}: {}", request.name, reason);
        }
    }
    out
}

/// Status after solving a single run
pub fn status_run_single(record: &RunRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[{}] Ran {}", timestamp(), record.name);
    let _ = writeln!(out, "  status: {}", record.outcome.status);
    let _ = writeln!(out, "  termination: {}", record.outcome.termination);
    if let Some(value) = record.objective_value() {
        let _ = writeln!(out, "  objective value: {}", value);
    }
    if record.state != RunState::SolvedOptimal {
        if let Some(message) = &record.outcome.message {
            let _ = writeln!(out, "  {}", message);
        }
    }
    out
}

/// Status after solving a batch
pub fn status_run_many(manifest: &RunManifest) -> String {
    let summary = manifest.summary();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "[{}] Ran {} models: {} successful, {} failed",
        timestamp(),
        manifest.len(),
        summary.successful.len(),
        summary.failed.len()
    );
    for (name, termination) in &summary.failed {
        let _ = writeln!(out, "  failed {} ({})", name, termination);
    }
    out
}

/// Status after an export; `written` is the exporter's count or -1
pub fn status_save(root: &Path, written: i64) -> String {
    if written < 0 {
        format!("[{}] Could not save output to {}", timestamp(), root.display())
    } else {
        format!("[{}] Saved {} runs to {}", timestamp(), written, root.display())
    }
}
