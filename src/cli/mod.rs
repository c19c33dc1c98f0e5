//! Horizon Funding CLI Module
//!
//! Command-line interface for running the registered pipelines and
//! inspecting input tables.

use clap::{Parser, Subcommand};
use colored::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

use crate::pipeline::{
    find_pipeline, register_pipelines, Artifact, DataCatalog, Parameters, SequentialRunner,
};
use crate::tracking::{ExperimentConfig, ExperimentTracker, TrackingHooks, ALL_METRICS, BEST_MODEL};
use crate::training::ModelKind;
use crate::utils::DataLoader;

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString    { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn kv(key: &str, val: &str) {
    println!("  {:<14} {}", muted(key), val.white());
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_fail(msg: &str) {
    println!("  {} {}", "✗".red(), msg);
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

const DEFAULT_PARAMS: &str = "conf/parameters.yml";

#[derive(Parser)]
#[command(name = "horizon-funding")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Funding-class workflow over Horizon project records")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a registered pipeline
    Run {
        /// Pipeline name (see `list`)
        #[arg(short, long, default_value = "__default__")]
        pipeline: String,

        /// Parameters file; defaults to conf/parameters.yml when present
        #[arg(long)]
        params: Option<PathBuf>,

        /// Directory intermediate datasets are written to and read from
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Root of the experiment store
        #[arg(long, default_value = "mlruns")]
        tracking_dir: PathBuf,

        /// Experiment name
        #[arg(long, default_value = "horizon-funding")]
        experiment: String,

        /// Disable experiment tracking
        #[arg(long)]
        no_tracking: bool,
    },

    /// List registered pipelines and their nodes
    List,

    /// Show information about a data file
    Info {
        /// Input data file (CSV, JSON, or Parquet)
        #[arg(short, long)]
        data: PathBuf,

        /// CSV field separator
        #[arg(long, default_value = ";")]
        separator: char,
    },
}

/// Run options collected from the command line
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub pipeline: String,
    pub params: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub tracking_dir: PathBuf,
    pub experiment: String,
    pub no_tracking: bool,
}

fn load_parameters(path: Option<&Path>) -> anyhow::Result<Parameters> {
    match path {
        Some(path) => Ok(Parameters::from_file(path)?),
        None if Path::new(DEFAULT_PARAMS).is_file() => Ok(Parameters::from_file(DEFAULT_PARAMS)?),
        None => {
            warn!(path = DEFAULT_PARAMS, "Parameters file not found, using defaults");
            Ok(Parameters::default())
        }
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

/// Run a pipeline and return the final catalog
pub fn cmd_run(opts: &RunOptions) -> anyhow::Result<DataCatalog> {
    section(&format!("Run {}", opts.pipeline));

    let params = load_parameters(opts.params.as_deref())?;
    let pipeline = find_pipeline(&opts.pipeline)?;

    let mut catalog = DataCatalog::new().with_data_dir(&opts.data_dir);
    params.register(&mut catalog);

    let mut runner = SequentialRunner::new();
    let tracker = if opts.no_tracking {
        None
    } else {
        let config = ExperimentConfig::default()
            .with_output_dir(&opts.tracking_dir)
            .with_experiment_name(&opts.experiment);
        let tracker = Arc::new(ExperimentTracker::new(config)?);
        runner = runner.with_hook(Box::new(TrackingHooks::new(Arc::clone(&tracker), &opts.data_dir)));
        Some(tracker)
    };

    kv("Nodes", &pipeline.len().to_string());
    kv("Data dir", &opts.data_dir.display().to_string());

    let start = Instant::now();
    if let Err(e) = runner.run(&opts.pipeline, &pipeline, &mut catalog) {
        step_fail(&e.to_string());
        return Err(e.into());
    }
    step_ok(&format!("{} nodes in {:.2?}", pipeline.len(), start.elapsed()));

    if let Some(Artifact::Metrics(metrics)) = catalog.get(ALL_METRICS) {
        print_metrics(metrics);
    }
    if let Some(Artifact::Model(model)) = catalog.get(BEST_MODEL) {
        println!();
        println!("  {} {}", ok("best"), model.kind.to_string().white().bold());
    }

    if let Some(tracker) = tracker {
        if let Some(run) = tracker.list_runs()?.last() {
            kv("Run", &run.run_id);
            kv("Run dir", &tracker.run_dir(&run.run_id).display().to_string());
        }
    }

    println!();
    Ok(catalog)
}

fn print_metrics(metrics: &BTreeMap<String, f64>) {
    section("Test metrics");
    println!(
        "  {:<28} {:>9} {:>9} {:>9} {:>9}",
        muted("Model"),
        muted("accuracy"),
        muted("f1"),
        muted("precision"),
        muted("recall")
    );
    for kind in ModelKind::ALL {
        let value = |m: &str| {
            metrics
                .get(&format!("{}_{}", kind.key(), m))
                .map_or_else(|| "-".to_string(), |v| format!("{:.4}", v))
        };
        println!(
            "  {:<28} {:>9} {:>9} {:>9} {:>9}",
            kind.to_string(),
            value("accuracy"),
            value("f1"),
            value("precision"),
            value("recall")
        );
    }
}

pub fn cmd_list() -> anyhow::Result<()> {
    section("Pipelines");
    for (name, pipeline) in register_pipelines() {
        println!("  {} {}", accent(name), dim(&format!("({} nodes)", pipeline.len())));
        for node in pipeline.nodes() {
            println!(
                "    {:<26} {} {}",
                node.name(),
                dim("→"),
                muted(&node.outputs().join(", "))
            );
        }
    }
    println!();
    Ok(())
}

pub fn cmd_info(data_path: &Path, separator: char) -> anyhow::Result<()> {
    section("Data Info");

    if !separator.is_ascii() {
        anyhow::bail!("separator must be a single ASCII character, got '{}'", separator);
    }
    let df = DataLoader::new().with_separator(separator as u8).load_auto(data_path)?;

    kv("File", &data_path.display().to_string());
    kv("Rows", &df.height().to_string());
    kv("Columns", &df.width().to_string());
    kv("Memory", &format!("{:.2} MB", df.estimated_size() as f64 / 1024.0 / 1024.0));
    println!();

    println!("  {:<24} {:<12} {:>6} {:>8}", muted("Column"), muted("Type"), muted("Nulls"), muted("Unique"));
    println!("  {}", dim(&"─".repeat(54)));

    for col in df.get_columns() {
        println!(
            "  {:<24} {:<12} {:>6} {:>8}",
            col.name(),
            format!("{:?}", col.dtype()).truecolor(140, 140, 140),
            col.null_count(),
            col.n_unique().unwrap_or(0)
        );
    }

    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_defaults() {
        let cli = Cli::try_parse_from(["horizon-funding", "run"]).unwrap();
        match cli.command {
            Commands::Run { pipeline, params, data_dir, no_tracking, .. } => {
                assert_eq!(pipeline, "__default__");
                assert!(params.is_none());
                assert_eq!(data_dir, PathBuf::from("data"));
                assert!(!no_tracking);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_unknown_pipeline_fails() {
        let opts = RunOptions {
            pipeline: "missing".to_string(),
            params: None,
            data_dir: PathBuf::from("data"),
            tracking_dir: PathBuf::from("mlruns"),
            experiment: "test".to_string(),
            no_tracking: true,
        };
        assert!(cmd_run(&opts).is_err());
    }
}
