//! Architecture issue propagation CLI.
//!
//! Provides the `archprop` binary with three subcommands:
//! - `propagate` runs the propagation engine over a graph and prints the
//!   resulting issues and propagating relations,
//! - `characteristics` lists the characteristics a rule configuration uses,
//! - `score` evaluates a configuration against a labeled validation set.
//!
//! Inputs and outputs are JSON. Results go to stdout, logs to stderr.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;

use archprop_core::{IssuePropagationConfig, PropagatedIssue, PropagationContext};
use archprop_engine::{PropagationOptions, ValidationIssue, WorklistOrder};

/// Architecture issue propagation tools.
#[derive(Parser)]
#[command(name = "archprop", about = "Architecture issue propagation tools")]
struct Cli {
    /// Log every propagation decision to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Propagate issues through an architecture graph.
    Propagate {
        /// Graph file: `{components, relations, issues?}`.
        #[arg(short, long)]
        graph: PathBuf,

        /// Rule configuration (default: built-in debug configuration).
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Additional seed issues, appended to the graph's own.
        #[arg(short, long)]
        issues: Option<PathBuf>,

        /// Worklist order: lifo or fifo.
        #[arg(long, default_value = "lifo")]
        order: String,
    },

    /// List the characteristics a configuration reads or writes.
    Characteristics {
        /// Rule configuration.
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Score a configuration against a validation set.
    Score {
        /// Graph file; any issues in it are ignored.
        #[arg(short, long)]
        graph: PathBuf,

        /// Rule configuration (default: built-in debug configuration).
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Validation set: a list of labeled scenarios.
        #[arg(long)]
        validation: PathBuf,

        /// Worklist order: lifo or fifo.
        #[arg(long, default_value = "lifo")]
        order: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    let exit_code = match cli.command {
        Commands::Propagate {
            graph,
            config,
            issues,
            order,
        } => run_propagate(&graph, config.as_deref(), issues.as_deref(), &order),
        Commands::Characteristics { config } => run_characteristics(&config),
        Commands::Score {
            graph,
            config,
            validation,
            order,
        } => run_score(&graph, config.as_deref(), &validation, &order),
    };
    process::exit(exit_code);
}

/// Execute the propagate subcommand.
///
/// Returns exit code: 0 = success, 1 = propagation error, 3 = I/O or
/// parse error.
fn run_propagate(
    graph_path: &Path,
    config_path: Option<&Path>,
    issues_path: Option<&Path>,
    order: &str,
) -> i32 {
    let options = match parse_order(order) {
        Ok(order) => PropagationOptions { order },
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return 1;
        }
    };

    let mut context: PropagationContext = match read_json(graph_path) {
        Ok(context) => context,
        Err(code) => return code,
    };
    if let Some(path) = issues_path {
        match read_json::<Vec<PropagatedIssue>>(path) {
            Ok(issues) => context.issues.extend(issues),
            Err(code) => return code,
        }
    }
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };

    match archprop_engine::propagate_with(&context, &config, options) {
        Ok(result) => print_json(&result),
        Err(e) => {
            eprintln!("Propagation error: {}", e);
            1
        }
    }
}

/// Execute the characteristics subcommand.
fn run_characteristics(config_path: &Path) -> i32 {
    match read_json::<IssuePropagationConfig>(config_path) {
        Ok(config) => print_json(&archprop_engine::extract_characteristics(&config)),
        Err(code) => code,
    }
}

/// Execute the score subcommand.
///
/// Returns exit code: 0 = success, 1 = rejected scenario or propagation
/// error, 3 = I/O or parse error.
fn run_score(
    graph_path: &Path,
    config_path: Option<&Path>,
    validation_path: &Path,
    order: &str,
) -> i32 {
    let options = match parse_order(order) {
        Ok(order) => PropagationOptions { order },
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return 1;
        }
    };

    let base: PropagationContext = match read_json(graph_path) {
        Ok(context) => context,
        Err(code) => return code,
    };
    let validation_set: Vec<ValidationIssue> = match read_json(validation_path) {
        Ok(set) => set,
        Err(code) => return code,
    };
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };

    match archprop_engine::score_with(&config, &base, &validation_set, options) {
        Ok(report) => print_json(&report),
        Err(e) => {
            eprintln!("Scoring error: {}", e);
            1
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<IssuePropagationConfig, i32> {
    match path {
        Some(path) => read_json(path),
        None => {
            tracing::info!("no configuration given, using the debug configuration");
            Ok(IssuePropagationConfig::debug())
        }
    }
}

/// Read and decode a JSON file, reporting failures on stderr.
///
/// The error is the exit code (3).
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, i32> {
    let text = fs::read_to_string(path).map_err(|e| {
        eprintln!("Error: failed to read '{}': {}", path.display(), e);
        3
    })?;
    serde_json::from_str(&text).map_err(|e| {
        eprintln!("Error: failed to parse '{}': {}", path.display(), e);
        3
    })
}

/// Print a value as pretty JSON to stdout for machine-readable output.
fn print_json<T: Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(e) => {
            eprintln!("Error: failed to serialize result: {}", e);
            3
        }
    }
}

/// Parse a worklist order string.
fn parse_order(s: &str) -> Result<WorklistOrder, String> {
    match s {
        "lifo" | "LIFO" => Ok(WorklistOrder::Lifo),
        "fifo" | "FIFO" => Ok(WorklistOrder::Fifo),
        _ => Err(format!("invalid worklist order '{}', expected lifo/fifo", s)),
    }
}
