//! Keystats CLI
//!
//! Builds synthetic tables and reports the statistics the estimators
//! produce for them:
//! - Analyze a table with the configured estimator
//! - Compare both estimators against an exact scan
//! - Print a default configuration file

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use keystats::config::{generate_default_config, Config, StatsMethod};
use keystats::stats::{IndexStatsEstimator, LevelScanner, StatsWorker, TransientEstimator};
use keystats::workload::{build_table, WorkloadSpec};
use keystats::{IndexStats, Table};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "keystats")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Index cardinality statistics for B-tree indexes")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the usual locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a synthetic table and analyze it
    Analyze {
        #[command(flatten)]
        workload: WorkloadArgs,
        /// Estimator to use (persistent, transient)
        #[arg(short, long)]
        method: Option<StatsMethod>,
        /// Leaf pages sampled per key prefix
        #[arg(long)]
        sample_pages: Option<u64>,
    },

    /// Compare both estimators with an exact scan
    Compare {
        #[command(flatten)]
        workload: WorkloadArgs,
        /// Leaf pages sampled per key prefix
        #[arg(long)]
        sample_pages: Option<u64>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
pub struct WorkloadArgs {
    /// Rows in the table
    #[arg(short, long, default_value = "100000")]
    pub rows: u64,
    /// Columns in the secondary index
    #[arg(long, default_value = "2")]
    pub columns: usize,
    /// Value range per column, comma-separated; the last one repeats
    #[arg(short, long, value_delimiter = ',', default_value = "100,1000")]
    pub distinct: Vec<u64>,
    /// Store a field off-page on every n-th row
    #[arg(long)]
    pub overflow_every: Option<u64>,
    /// Delete-mark every n-th row
    #[arg(long)]
    pub delete_every: Option<u64>,
    /// Seed for the data and the sample selection
    #[arg(short, long)]
    pub seed: Option<u64>,
}

impl WorkloadArgs {
    fn spec(&self) -> WorkloadSpec {
        WorkloadSpec {
            rows: self.rows,
            columns: self.columns,
            distinct: self.distinct.clone(),
            overflow_every: self.overflow_every,
            delete_every: self.delete_every,
            seed: self.seed.unwrap_or(42),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("loading config from {:?}", path))?,
        None => Config::load_default(),
    };

    init_logging(&config);

    match cli.command {
        Commands::Analyze {
            workload,
            method,
            sample_pages,
        } => {
            if let Some(method) = method {
                config.stats.method = method;
            }
            if let Some(pages) = sample_pages {
                config.stats.sample_pages = pages;
            }
            if workload.seed.is_some() {
                config.stats.seed = workload.seed;
            }
            config.validate()?;

            let table = build_table("synthetic", &workload.spec(), &config.tree)?;
            let table = Arc::new(table);

            let worker = StatsWorker::new(config.stats.clone());
            worker.register(Arc::clone(&table));
            let analysis = worker.analyze_table(table.name()).await?;

            let report = AnalyzeReport {
                method: config.stats.method,
                indexes: index_reports(&table),
                analysis,
            };

            match cli.format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&report)?),
                _ => print_analyze(&report),
            }
        }

        Commands::Compare {
            workload,
            sample_pages,
        } => {
            if let Some(pages) = sample_pages {
                config.stats.sample_pages = pages;
            }
            if workload.seed.is_some() {
                config.stats.seed = workload.seed;
            }
            config.validate()?;

            let table = build_table("synthetic", &workload.spec(), &config.tree)?;
            let stats_config = config.stats.clone();
            let rows = tokio::task::spawn_blocking(move || compare(&table, &stats_config))
                .await
                .context("comparison task failed")?;

            match cli.format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&rows)?),
                _ => print_compare(&rows),
            }
        }

        Commands::Config { output } => {
            let config = generate_default_config();

            match output {
                Some(path) => {
                    // Create parent directory if needed
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("keystats={}", config.logging.level)));

    let (json, pretty) = if config.logging.format == "json" {
        (Some(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .init();
}

#[derive(Serialize)]
struct IndexReport {
    name: String,
    kind: String,
    stats: IndexStats,
}

#[derive(Serialize)]
struct AnalyzeReport {
    method: StatsMethod,
    analysis: keystats::TableAnalysis,
    indexes: Vec<IndexReport>,
}

fn index_reports(table: &Table) -> Vec<IndexReport> {
    table
        .indexes()
        .iter()
        .map(|index| IndexReport {
            name: index.name().to_string(),
            kind: index.kind().to_string(),
            stats: (*index.stats()).clone(),
        })
        .collect()
}

fn print_analyze(report: &AnalyzeReport) {
    let stats = &report.analysis.stats;
    println!("Table {} ({} statistics)", report.analysis.table, report.method);
    println!("  Rows (estimated):        {}", stats.n_rows);
    println!("  Clustered index size:    {} pages", stats.clustered_index_size);
    println!("  Other index sizes:       {} pages", stats.sum_of_other_index_sizes);
    if !report.analysis.interrupted.is_empty() {
        println!("  Interrupted:             {}", report.analysis.interrupted.join(", "));
    }
    println!();
    println!(
        "{:<16} {:<10} {:>6} {:>14} {:>12} {:>12}",
        "Index", "Kind", "Prefix", "Distinct", "Sampled", "Rows/key"
    );
    for index in &report.indexes {
        for (i, (n_diff, sampled)) in index
            .stats
            .n_diff_key_vals
            .iter()
            .zip(&index.stats.n_sample_sizes)
            .enumerate()
        {
            let (name, kind) = if i == 0 {
                (index.name.as_str(), index.kind.as_str())
            } else {
                ("", "")
            };
            let rows_per_key = index
                .stats
                .rows_per_key(i + 1, stats.n_rows)
                .map(|r| format!("{:.1}", r))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{:<16} {:<10} {:>6} {:>14} {:>12} {:>12}",
                name, kind, i + 1, n_diff, sampled, rows_per_key
            );
        }
    }
}

#[derive(Serialize)]
struct CompareRow {
    index: String,
    prefix: usize,
    exact: u64,
    persistent: Option<u64>,
    transient: u64,
}

fn compare(table: &Table, config: &keystats::StatsConfig) -> Vec<CompareRow> {
    let persistent = IndexStatsEstimator::new(config.clone());
    let transient = TransientEstimator::new(config);
    let mut rows = Vec::new();

    for index in table.indexes() {
        let n_uniq = index.n_uniq();
        let exact = LevelScanner::new(n_uniq, config.include_delete_marked).scan_level(index.tree(), 0, false);
        let sampled = persistent.analyze(index.tree(), n_uniq).into_stats();
        let coarse = transient.estimate(index.tree(), n_uniq);

        for prefix in 0..n_uniq {
            rows.push(CompareRow {
                index: index.name().to_string(),
                prefix: prefix + 1,
                exact: exact.n_diff[prefix],
                persistent: sampled.as_ref().map(|s| s.n_diff_key_vals[prefix]),
                transient: coarse.n_diff_key_vals[prefix],
            });
        }
    }
    rows
}

fn print_compare(rows: &[CompareRow]) {
    println!(
        "{:<16} {:>6} {:>14} {:>14} {:>8} {:>14} {:>8}",
        "Index", "Prefix", "Exact", "Persistent", "Err", "Transient", "Err"
    );
    for row in rows {
        let persistent = row
            .persistent
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string());
        let persistent_err = row
            .persistent
            .map(|v| format_error(v, row.exact))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<16} {:>6} {:>14} {:>14} {:>8} {:>14} {:>8}",
            row.index,
            row.prefix,
            row.exact,
            persistent,
            persistent_err,
            row.transient,
            format_error(row.transient, row.exact)
        );
    }
}

fn format_error(estimate: u64, exact: u64) -> String {
    if exact == 0 {
        return "-".to_string();
    }
    let err = (estimate as f64 - exact as f64) / exact as f64 * 100.0;
    format!("{:+.1}%", err)
}
