//! Command-line interface
//!
//! Subcommands for the full comparison, feature selection, ensemble-size
//! tuning, a single model's ROC curve, and dataset inspection.

use clap::{Args, Parser, Subcommand};
use colored::*;
use std::path::PathBuf;

use crate::comparison::{Comparison, ComparisonConfig};
use crate::report::{ComparisonReport, ModelResult};
use crate::training::ModelKind;
use crate::utils::{ColumnKind, DataLoader, Dataset, LoadOptions, Timer, WorkerPool};

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "marketing-classifiers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Holdout comparison of binary classifiers on tabular marketing data")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train every enabled model on one holdout split and compare them
    Compare(CompareArgs),

    /// Sequential forward feature selection for one model
    Select(SelectArgs),

    /// Out-of-bag error curve and suggested size of the tree ensemble
    TuneEnsemble(TuneArgs),

    /// ROC curve and AUC of one model on the holdout split
    Roc(RocArgs),

    /// Show the column schema of a dataset
    Info(DataArgs),
}

#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// Input data file (delimited text with a header row)
    #[arg(short, long)]
    pub data: PathBuf,

    /// Field delimiter (sniffed from the header when omitted)
    #[arg(long)]
    pub delimiter: Option<char>,

    /// Label token of the positive class
    #[arg(long, default_value = "yes")]
    pub positive: String,

    /// Require the 17-column bank marketing header
    #[arg(long)]
    pub strict_schema: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Seed for the partition and every seeded model
    #[arg(long)]
    pub seed: Option<u64>,

    /// Fraction of rows held out for testing
    #[arg(long)]
    pub holdout: Option<f64>,

    /// Worker threads (defaults to all cores)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Draw the holdout per class
    #[arg(long)]
    pub stratify: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CompareArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub run: RunArgs,

    /// Models to run, comma separated (default: all)
    #[arg(long, value_delimiter = ',')]
    pub models: Option<Vec<String>>,

    /// Write the report as JSON
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Also run feature selection and add the retrained model to the report
    #[arg(long)]
    pub select_features: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SelectArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub run: RunArgs,

    /// Model used to score feature subsets
    #[arg(short, long)]
    pub model: Option<String>,

    /// Features forced in from the ensemble importance ranking
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Cross-validation folds per subset
    #[arg(long)]
    pub folds: Option<usize>,

    /// Minimum criterion improvement to add a feature
    #[arg(long)]
    pub tolerance: Option<f64>,

    /// Maximum number of selection rounds
    #[arg(long)]
    pub max_steps: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct TuneArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub run: RunArgs,

    /// Number of trees to grow
    #[arg(long)]
    pub trees: Option<usize>,

    /// Accepted distance from the best out-of-bag error
    #[arg(long, default_value = "0.001")]
    pub tolerance: f64,
}

#[derive(Args, Debug, Clone)]
pub struct RocArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub run: RunArgs,

    /// Model to evaluate
    #[arg(short, long)]
    pub model: String,
}

// ─── Shared steps ──────────────────────────────────────────────────────────────

pub fn load_dataset(args: &DataArgs) -> anyhow::Result<Dataset> {
    let mut options = if args.strict_schema {
        LoadOptions::bank_marketing()
    } else {
        LoadOptions::default()
    };
    options = options.with_positive_label(args.positive.clone());
    if let Some(c) = args.delimiter {
        if !c.is_ascii() {
            anyhow::bail!("Delimiter must be a single ASCII character, got '{}'", c);
        }
        options = options.with_delimiter(c as u8);
    }

    step_run(&format!("Loading {}", args.data.display()));
    let start = Timer::start();
    let dataset = DataLoader::new(options).load(&args.data)?;
    let (neg, pos) = dataset.class_counts();
    step_done(&format!(
        "{} rows × {} features, {} / {} in {:?}",
        dataset.n_rows(),
        dataset.n_features(),
        neg,
        pos,
        start.elapsed()
    ));
    Ok(dataset)
}

/// Config file first, then command-line overrides
pub fn build_config(run: &RunArgs) -> anyhow::Result<ComparisonConfig> {
    let mut config = match &run.config {
        Some(path) => ComparisonConfig::from_file(path)?,
        None => ComparisonConfig::default(),
    };
    if let Some(seed) = run.seed {
        config = config.with_seed(seed);
    }
    if let Some(holdout) = run.holdout {
        config = config.with_holdout(holdout);
    }
    if let Some(threads) = run.threads {
        config = config.with_threads(threads);
    }
    if run.stratify {
        config = config.with_stratify(true);
    }
    config.validate()?;
    Ok(config)
}

fn parse_model(name: &str) -> anyhow::Result<ModelKind> {
    Ok(name.parse::<ModelKind>()?)
}

fn print_run_box(config: &ComparisonConfig, pool: &WorkerPool) {
    println!();
    line_box_top();
    line_box(&kv("Holdout ", &format!("{:.0}%", config.holdout_fraction * 100.0)));
    line_box(&kv("Seed    ", &config.seed.to_string()));
    line_box(&kv("Stratify", &config.stratify.to_string()));
    line_box(&kv("Threads ", &pool.n_threads().to_string()));
    line_box(&kv(
        "Models  ",
        &config.models.iter().map(|m| m.id()).collect::<Vec<_>>().join(", "),
    ));
    line_box_bottom();
}

fn print_report(report: &ComparisonReport) {
    section("Holdout comparison");
    for line in report.render_table().lines() {
        println!("  {}", line);
    }

    let failures: Vec<_> = report.failures().collect();
    if !failures.is_empty() {
        println!();
        for f in failures {
            println!("  {} {}", "✗".red(), f.to_string().red());
        }
    }

    if let Some(best) = report.best_by_accuracy() {
        println!();
        println!(
            "  {} {} {} {:.2}%",
            ok("best"),
            best.label.white().bold(),
            muted("accuracy:"),
            best.confusion.accuracy() * 100.0
        );
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_compare(args: &CompareArgs) -> anyhow::Result<()> {
    section("Compare");

    let mut config = build_config(&args.run)?;
    if let Some(models) = &args.models {
        config = config.with_models(models.iter().map(|m| parse_model(m)).collect::<anyhow::Result<_>>()?);
        config.validate()?;
    }
    let dataset = load_dataset(&args.data)?;
    let pool = WorkerPool::new(&config.parallel_config())?;
    print_run_box(&config, &pool);

    let comparison = Comparison::new(config);
    step_run("Training models");
    let start = Timer::start();
    let mut report = comparison.run(&dataset, &pool)?;
    step_done(&format!("{:?}", start.elapsed()));

    if args.select_features {
        step_run("Selecting features");
        let start = Timer::start();
        let selection = comparison.run_feature_selection(&dataset, &pool, &mut report)?;
        step_done(&format!("{:?}", start.elapsed()));
        let names = dataset.feature_names();
        step_ok(&format!(
            "selected {}",
            selection
                .selected_indices()
                .iter()
                .map(|&i| names[i].as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }

    print_report(&report);

    if let Some(path) = &args.json {
        report.write_json(path)?;
        println!();
        step_ok(&format!("report written to {}", path.display()));
    }
    println!();
    Ok(())
}

pub fn cmd_select(args: &SelectArgs) -> anyhow::Result<()> {
    section("Feature selection");

    let mut config = build_config(&args.run)?;
    let mut selection = config.selection.clone();
    if let Some(model) = &args.model {
        selection = selection.with_model(parse_model(model)?);
    }
    if let Some(k) = args.top_k {
        selection = selection.with_top_k(k);
    }
    if let Some(folds) = args.folds {
        selection = selection.with_folds(folds);
    }
    if let Some(tolerance) = args.tolerance {
        selection = selection.with_tolerance(tolerance);
    }
    if let Some(steps) = args.max_steps {
        selection = selection.with_max_steps(steps);
    }
    config = config.with_selection(selection);
    config.validate()?;

    let dataset = load_dataset(&args.data)?;
    let pool = WorkerPool::new(&config.parallel_config())?;
    let comparison = Comparison::new(config);

    let mut report = ComparisonReport::new(comparison.config().seed, 0, 0);
    step_run("Searching");
    let start = Timer::start();
    let result = comparison.run_feature_selection(&dataset, &pool, &mut report)?;
    step_done(&format!("{:?}", start.elapsed()));

    let names = dataset.feature_names();
    println!();
    println!("  {:<6} {:<16} {:>12}", muted("Step"), muted("Added"), muted("Criterion"));
    println!("  {}", dim(&"─".repeat(36)));
    println!("  {:<6} {:<16} {:>12.6}", 0, dim("(forced)"), result.initial_criterion);
    for (i, step) in result.history.iter().enumerate() {
        println!("  {:<6} {:<16} {:>12.6}", i + 1, names[step.added], step.criterion);
    }
    println!();

    for (i, name) in names.iter().enumerate() {
        let mark = if result.included[i] { ok("✓") } else { dim("·") };
        println!("  {} {}", mark, name);
    }

    if let Some(ModelResult::Success(outcome)) = report.results().last() {
        println!();
        println!(
            "  {} {:.2}%",
            muted(&format!("{} holdout accuracy:", outcome.label)),
            outcome.confusion.accuracy() * 100.0
        );
    } else if let Some(ModelResult::Failure(f)) = report.results().last() {
        println!();
        println!("  {} {}", "✗".red(), f.to_string().red());
    }
    println!();
    Ok(())
}

pub fn cmd_tune_ensemble(args: &TuneArgs) -> anyhow::Result<()> {
    section("Ensemble size");

    let mut config = build_config(&args.run)?;
    if let Some(trees) = args.trees {
        config.adapters.tree_ensemble.n_trees = trees;
    }
    let dataset = load_dataset(&args.data)?;
    let pool = WorkerPool::new(&config.parallel_config())?;
    let comparison = Comparison::new(config);

    step_run("Growing ensemble");
    let start = Timer::start();
    let tuning = comparison.tune_ensemble(&dataset, &pool, args.tolerance)?;
    step_done(&format!("{:?}", start.elapsed()));

    println!();
    println!("  {:<8} {:>12}", muted("Trees"), muted("OOB error"));
    println!("  {}", dim(&"─".repeat(22)));
    let stride = (tuning.oob_error.len() / 20).max(1);
    for (i, err) in tuning.oob_error.iter().enumerate() {
        if (i + 1) % stride == 0 || i + 1 == tuning.oob_error.len() {
            println!("  {:<8} {:>12.4}", i + 1, err);
        }
    }

    match tuning.suggested_size {
        Some(size) => println!(
            "\n  {} {} {}",
            ok("suggested"),
            size.to_string().white().bold(),
            muted(&format!("trees (tolerance {})", tuning.tolerance))
        ),
        None => println!("\n  {}", "no out-of-bag estimate available".yellow()),
    }

    let ranked = tuning.ranked_importance();
    if !ranked.is_empty() {
        section("Permutation importance");
        for (name, value) in ranked {
            println!("  {:<16} {:>10.4}", name, value);
        }
    }
    println!();
    Ok(())
}

pub fn cmd_roc(args: &RocArgs) -> anyhow::Result<()> {
    section("ROC");

    let kind = parse_model(&args.model)?;
    let config = build_config(&args.run)?.with_models(vec![kind]);
    let dataset = load_dataset(&args.data)?;
    let pool = WorkerPool::new(&config.parallel_config())?;

    let report = Comparison::new(config).run(&dataset, &pool)?;
    let outcome = match report.results().first() {
        Some(ModelResult::Success(o)) => o,
        Some(ModelResult::Failure(f)) => anyhow::bail!("{}", f),
        None => anyhow::bail!("No model was run"),
    };
    let Some(roc) = &outcome.roc else {
        anyhow::bail!("{} produced no ROC curve (no scores or a single-class test set)", kind);
    };

    println!();
    println!("  {:>12} {:>8} {:>8}", muted("Threshold"), muted("FPR"), muted("TPR"));
    println!("  {}", dim(&"─".repeat(30)));
    for (fpr, tpr, threshold) in roc.points() {
        println!("  {:>12.4} {:>8.4} {:>8.4}", threshold, fpr, tpr);
    }
    println!();
    println!("  {} {}", muted("AUC"), format!("{:.4}", roc.auc).white().bold());
    println!();
    Ok(())
}

pub fn cmd_info(args: &DataArgs) -> anyhow::Result<()> {
    section("Data Info");

    let dataset = load_dataset(args)?;
    let (neg, pos) = dataset.class_counts();
    let labels = dataset.label_set();

    println!();
    println!("  {:<12} {}", muted("File"), args.data.display());
    println!("  {:<12} {}", muted("Rows"), dataset.n_rows());
    println!("  {:<12} {}", muted("Features"), dataset.n_features());
    println!(
        "  {:<12} {} = {}, {} = {}",
        muted("Label"),
        labels.negative,
        neg,
        labels.positive,
        pos
    );
    println!();

    println!("  {:<16} {:<12} {:>24}", muted("Column"), muted("Type"), muted("Categories / range"));
    println!("  {}", dim(&"─".repeat(54)));
    for summary in dataset.summary() {
        let detail = match (summary.kind, summary.n_categories, summary.range) {
            (ColumnKind::Categorical, Some(k), _) => format!("{} categories", k),
            (ColumnKind::Numeric, _, Some((lo, hi))) => format!("{} .. {}", lo, hi),
            _ => "-".to_string(),
        };
        println!(
            "  {:<16} {:<12} {:>24}",
            summary.name,
            summary.kind.to_string().truecolor(140, 140, 140),
            detail
        );
    }

    println!();
    Ok(())
}
