//! Command-line interface for the candidate sifter.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::core::loaders::{discover_candidate_files, parse_trial_name};
use crate::processors::sift::{RunStats, Sifter};
use crate::SiftConfig;

#[derive(Parser)]
#[command(name = "pulsar-sift")]
#[command(about = "Periodicity candidate sifting for pulsar searches", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for individual configuration values.
#[derive(Args, Debug, Default)]
struct SiftOverrides {
    /// zmax suffix of the search files (`*_ACCEL_<accel>`)
    #[arg(long)]
    accel: Option<u32>,
    /// wmax suffix of jerk search files (`*_ACCEL_<accel>_JERK_<jerk>`)
    #[arg(long)]
    jerk: Option<u32>,
    /// Decimal digits of the period (ms) used to group candidates
    #[arg(long)]
    precision: Option<usize>,
    /// Shortest period to keep (ms)
    #[arg(long)]
    min_period: Option<f64>,
    /// Longest period to keep (ms)
    #[arg(long)]
    max_period: Option<f64>,
    /// Minimum number of DM trials a candidate must appear in
    #[arg(long)]
    min_detections: Option<usize>,
    /// Largest DM spread of one candidate's detections
    #[arg(long)]
    dm_range: Option<f64>,
    /// Weakest accepted sigma
    #[arg(long)]
    min_sigma: Option<f64>,
    /// Strongest accepted sigma
    #[arg(long)]
    max_sigma: Option<f64>,
    /// Lowest DM considered a real pulsar
    #[arg(long)]
    min_dm: Option<f64>,
    /// Keep only the first detection per period within each file
    #[arg(long)]
    collapse_within_file: bool,
    /// Number of worker threads
    #[arg(short, long)]
    workers: Option<usize>,
    /// Disable progress bars
    #[arg(long)]
    no_progress: bool,
}

impl SiftOverrides {
    fn apply(&self, config: &mut SiftConfig) {
        if let Some(accel) = self.accel {
            config.search.accel = accel;
        }
        if self.jerk.is_some() {
            config.search.jerk = self.jerk;
        }
        if let Some(precision) = self.precision {
            config.clustering.period_precision = precision;
        }
        if self.collapse_within_file {
            config.clustering.collapse_within_file = true;
        }

        let selection = &mut config.selection;
        if let Some(v) = self.min_period {
            selection.min_period_ms = v;
        }
        if let Some(v) = self.max_period {
            selection.max_period_ms = v;
        }
        if let Some(v) = self.min_detections {
            selection.min_detections = v;
        }
        if let Some(v) = self.dm_range {
            selection.max_dm_range = v;
        }
        if let Some(v) = self.min_sigma {
            selection.min_sigma = v;
        }
        if let Some(v) = self.max_sigma {
            selection.max_sigma = v;
        }
        if self.min_dm.is_some() {
            selection.low_dm_cutoff = self.min_dm;
        }

        if let Some(workers) = self.workers {
            config.execution.workers = workers;
        }
        if self.no_progress {
            config.execution.show_progress = false;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster, filter and select candidates from per-DM search files
    Sift {
        /// Directory containing the search output files
        #[arg(default_value = ".")]
        input_dir: PathBuf,
        /// Output directory for candidate tables, replaced on every run
        #[arg(short, long, default_value = "PCSSP")]
        output_dir: PathBuf,
        #[command(flatten)]
        overrides: SiftOverrides,
    },

    /// List the DM trials found in a directory
    Scan {
        /// Directory containing the search output files
        #[arg(default_value = ".")]
        input_dir: PathBuf,
        #[command(flatten)]
        overrides: SiftOverrides,
    },

    /// Write the default configuration as YAML
    InitConfig {
        /// Destination YAML file
        #[arg(default_value = "sift.yaml")]
        path: PathBuf,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<60} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 37 {
            let head: String = value.chars().take(34).collect();
            format!("{}...", head)
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<37} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

fn stats_items(stats: &RunStats) -> Vec<(&'static str, String)> {
    vec![
        ("Files found", stats.files_discovered.to_string()),
        ("Files read", stats.files_read.to_string()),
        ("Rows skipped", stats.skipped_lines.to_string()),
        ("Candidates", stats.records.to_string()),
        ("Clusters", stats.clusters.to_string()),
        ("Accepted", stats.accepted.to_string()),
        ("Rejected", stats.rejected.to_string()),
    ]
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // A broken config file is fatal: thresholds must never silently fall back
    let config = match &cli.config {
        Some(path) => match SiftConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                error!("Failed to load config from {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => SiftConfig::default(),
    };

    let result = match cli.command {
        Commands::Sift {
            input_dir,
            output_dir,
            overrides,
        } => cmd_sift(&input_dir, &output_dir, &overrides, config),
        Commands::Scan {
            input_dir,
            overrides,
        } => cmd_scan(&input_dir, &overrides, config),
        Commands::InitConfig { path } => cmd_init_config(&path, &config),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn cmd_sift(
    input_dir: &Path,
    output_dir: &Path,
    overrides: &SiftOverrides,
    mut config: SiftConfig,
) -> Result<()> {
    let start = Instant::now();
    overrides.apply(&mut config);

    println!("Sifting candidates...");
    println!("Input directory: {}", input_dir.display());
    println!("Output directory: {}", output_dir.display());
    println!("Files: *{}", config.search.file_suffix());
    println!("Parameters:");
    println!("  period precision: {}", config.clustering.period_precision);
    println!(
        "  period window: {} - {} ms",
        config.selection.min_period_ms, config.selection.max_period_ms
    );
    println!("  min detections: {}", config.selection.min_detections);
    println!("  DM range: {}", config.selection.max_dm_range);
    println!(
        "  sigma window: {} - {}",
        config.selection.min_sigma, config.selection.max_sigma
    );

    let show_progress = config.execution.show_progress;
    let mut sifter = match Sifter::new(config) {
        Ok(sifter) => sifter,
        Err(e) => {
            print_aborted(&RunStats::default(), start);
            return Err(e).context("Invalid sifting configuration");
        }
    };
    println!("  workers: {}", sifter.workers());

    let outcome = sifter
        .discover(input_dir)
        .and_then(|files| sifter.run(&files));

    let output = match outcome {
        Ok(output) => output,
        Err(e) => {
            print_aborted(sifter.stats(), start);
            return Err(e).context("Sifting failed");
        }
    };

    let spinner = create_spinner("Writing candidate tables...", show_progress);
    let written = sifter.write_outputs(&output, output_dir);
    spinner.finish_and_clear();
    let written = match written {
        Ok(written) => written,
        Err(e) => {
            print_aborted(sifter.stats(), start);
            return Err(e).context("Failed to write outputs");
        }
    };

    let mut items = stats_items(sifter.stats());
    items.push(("Best candidates", written.best_candidates.display().to_string()));
    items.push(("Folding DMs", written.folding.dms.display().to_string()));
    items.push(("Series files", written.series.len().to_string()));
    items.push(("Duration", format!("{:.2?}", start.elapsed())));
    print_summary("Sift Complete", &items);

    Ok(())
}

fn print_aborted(stats: &RunStats, start: Instant) {
    let mut items = stats_items(stats);
    items.push(("Duration", format!("{:.2?}", start.elapsed())));
    print_summary("Sift Aborted", &items);
}

fn cmd_scan(input_dir: &Path, overrides: &SiftOverrides, mut config: SiftConfig) -> Result<()> {
    overrides.apply(&mut config);
    let suffix = config.search.file_suffix();

    let files = discover_candidate_files(input_dir, &suffix)
        .with_context(|| format!("Failed to scan {}", input_dir.display()))?;

    let mut trials = Vec::with_capacity(files.len());
    for path in &files {
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        match parse_trial_name(&name) {
            Some(trial) => trials.push((name, trial)),
            None => warn!("No DM value in file name: {}", name),
        }
    }

    if trials.is_empty() {
        bail!("No DM trials found among {} files", files.len());
    }

    trials.sort_by(|a, b| a.1.dm.total_cmp(&b.1.dm));

    println!("{:<12} {:>6} {:>6}  file", "DM", "zmax", "wmax");
    for (name, trial) in &trials {
        let fmt_opt = |v: Option<u32>| v.map(|x| x.to_string()).unwrap_or_else(|| "-".to_string());
        println!(
            "{:<12} {:>6} {:>6}  {}",
            trial.dm_label,
            fmt_opt(trial.zmax),
            fmt_opt(trial.wmax),
            name
        );
    }

    let (lo, hi) = (trials[0].1.dm, trials[trials.len() - 1].1.dm);
    print_summary(
        "Scan Complete",
        &[
            ("Directory", input_dir.display().to_string()),
            ("Pattern", format!("*{}", suffix)),
            ("DM trials", trials.len().to_string()),
            ("DM range", format!("{} - {}", lo, hi)),
        ],
    );

    Ok(())
}

fn cmd_init_config(path: &Path, config: &SiftConfig) -> Result<()> {
    if path.exists() {
        bail!("Refusing to overwrite existing file {}", path.display());
    }
    config
        .to_yaml(path)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}
