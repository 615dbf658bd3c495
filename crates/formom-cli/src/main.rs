use clap::{Parser, Subcommand};
use formom_runner::input::{objective_files, read_constraints, shared_runs};
use formom_runner::{BatchRunner, ExportFormat, RunMode, RunRequest, RunSource, RunState, RunnerConfig, Session};
use formom_solver::{RunResult, SolverAdapter, SolverKind};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Parser)]
#[command(name = "formom")]
#[command(about = "Solve objective variants of a linear model against a shared constraint set", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,
    /// Solver backend (simplex, glpk)
    #[arg(long, global = true)]
    solver: Option<SolverKind>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve one objective and print the results
    Solve {
        /// Shared constraint set (JSON)
        #[arg(long)]
        constraints: PathBuf,
        /// Objective file (JSON)
        objective: PathBuf,
        /// Output format (json, pretty)
        #[arg(short, long, default_value = "pretty")]
        format: String,
    },
    /// Run one objective or a folder of them and save the output
    Run {
        /// Shared constraint set (JSON)
        #[arg(long)]
        constraints: PathBuf,
        /// A single objective file
        #[arg(long, conflicts_with = "objectives_dir", required_unless_present = "objectives_dir")]
        objective: Option<PathBuf>,
        /// A folder of objective files
        #[arg(long)]
        objectives_dir: Option<PathBuf>,
        /// Existing directory to save output under
        #[arg(short, long)]
        out: PathBuf,
        /// Per-run output (text, tabular)
        #[arg(long)]
        format: Option<ExportFormat>,
        /// Split decision variable names into tag columns
        #[arg(long)]
        split_tags: bool,
        /// Tag separator for --split-tags
        #[arg(long)]
        separator: Option<String>,
        /// Prefix for per-run file names
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Build every model without solving and report problems
    Check {
        /// Shared constraint set (JSON)
        #[arg(long)]
        constraints: PathBuf,
        /// Objective files
        objectives: Vec<PathBuf>,
    },
}

fn load_config(cli: &Cli) -> RunnerConfig {
    let mut config = match &cli.config {
        Some(path) => match RunnerConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Config error: {}", e);
                std::process::exit(1);
            }
        },
        None => RunnerConfig::default(),
    };
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(kind) = cli.solver {
        config.solver.kind = kind;
    }
    config
}

fn load_runs(constraints: &Path, objectives: &[PathBuf]) -> Vec<RunRequest> {
    let constraints = match read_constraints(constraints) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error reading constraints: {}", e);
            std::process::exit(1);
        }
    };
    shared_runs(&constraints, objectives)
}

fn print_section<'a>(title: &str, values: impl ExactSizeIterator<Item = (&'a String, &'a f64)>) {
    println!("{} ({}):", title, values.len());
    for (name, value) in values {
        println!("  {:30} {:12.4}", name, value);
    }
    println!();
}

fn print_result(result: &RunResult) {
    match result.objective_value {
        Some(value) => println!("Objective value: {:.4}", value),
        None => println!("Objective value: n/a"),
    }
    println!();
    print_section("Decision variables", result.variables.iter());
    print_section("Shadow prices", result.shadow_prices.iter());
    print_section("Slack (GE constraints)", result.slack_ge.iter());
    print_section("Slack (LE constraints)", result.slack_le.iter());
}

fn main() {
    let cli = Cli::parse();
    let config = load_config(&cli);
    config.logging.init();
    debug!(?config, "Loaded configuration");

    let runner = BatchRunner::new(SolverAdapter::from_options(&config.solver.options()));

    match cli.command {
        Commands::Solve {
            constraints,
            objective,
            format,
        } => {
            let manifest = runner.run(load_runs(&constraints, std::slice::from_ref(&objective)));
            let Some(record) = manifest.iter().next() else {
                eprintln!("Nothing was run");
                std::process::exit(1);
            };

            if format == "json" {
                match &record.result {
                    Some(result) => match serde_json::to_string_pretty(result) {
                        Ok(json) => println!("{}", json),
                        Err(e) => {
                            eprintln!("Error serializing result: {}", e);
                            std::process::exit(1);
                        }
                    },
                    None => println!("null"),
                }
            } else {
                println!("Run: {}", record.name);
                println!("Solver: {}", runner.adapter().backend_name());
                println!("Status: {}", record.outcome.status);
                println!("Termination: {}", record.outcome.termination);
                if let Some(result) = &record.result {
                    print_result(result);
                } else if let Some(message) = &record.outcome.message {
                    println!("{}", message);
                }
            }

            if record.state != RunState::SolvedOptimal {
                std::process::exit(2);
            }
        }
        Commands::Run {
            constraints,
            objective,
            objectives_dir,
            out,
            format,
            split_tags,
            separator,
            prefix,
        } => {
            let mut export = config.export.clone();
            if let Some(format) = format {
                export.format = format;
            }
            if split_tags {
                export.split_tags = true;
            }
            if let Some(separator) = separator {
                export.separator = separator;
            }
            if let Some(prefix) = prefix {
                export.prefix = prefix;
            }

            let (mode, objectives) = match (objective, objectives_dir) {
                (Some(file), _) => (RunMode::Single, vec![file]),
                (None, Some(dir)) => match objective_files(&dir) {
                    Ok(files) => (RunMode::Many, files),
                    Err(e) => {
                        eprintln!("Error reading objectives: {}", e);
                        std::process::exit(1);
                    }
                },
                (None, None) => {
                    eprintln!("Give --objective or --objectives-dir");
                    std::process::exit(1);
                }
            };

            println!("{}: {}", mode.objective_label(), objectives.len());
            let session = Session::new(mode)
                .load(load_runs(&constraints, &objectives))
                .and_then(|s| {
                    print!("{}", s.status());
                    println!("{}...", mode.run_label());
                    s.run(&runner)
                });
            let session = match session {
                Ok(s) => s,
                Err((_, e)) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            };
            print!("{}", session.status());

            println!("{}...", mode.save_label());
            match session.export(&export.exporter(), &out) {
                Ok((written, status)) => {
                    println!("{}", status);
                    if written < 0 {
                        std::process::exit(1);
                    }
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Check {
            constraints,
            objectives,
        } => {
            let mut errors = 0;
            for request in load_runs(&constraints, &objectives) {
                let result = match &request.source {
                    RunSource::Ready(input) => input.build().map_err(|e| e.to_string()),
                    RunSource::Rejected(reason) => Err(reason.clone()),
                };
                match result {
                    Ok(model) => println!(
                        "{}: OK ({} variables, {} constraints)",
                        request.name,
                        model.num_variables(),
                        model.num_constraints()
                    ),
                    Err(e) => {
                        eprintln!("{}: {}", request.name, e);
                        errors += 1;
                    }
                }
            }
            if errors > 0 {
                std::process::exit(1);
            }
        }
    }
}
