//! End-to-end candidate sifting: parse, cluster, filter, select, export.
//!
//! ```no_run
//! use pulsar_sift::{Sifter, SiftConfig};
//! use std::path::Path;
//!
//! let mut sifter = Sifter::new(SiftConfig::default()).unwrap();
//! let files = sifter.discover(Path::new("search_output")).unwrap();
//! let output = sifter.run(&files).unwrap();
//! sifter.write_outputs(&output, Path::new("PCSSP")).unwrap();
//! ```

use std::path::{Path, PathBuf};

use log::{info, warn};
use thiserror::Error;

use crate::config::{ConfigError, SiftConfig};
use crate::core::loaders::{
    discover_candidate_files, parse_candidate_file, CandidateRecord, LoaderError, ParseOptions,
    TableLayout,
};
use crate::core::transforms::collapse_duplicate_keys;
use crate::core::writers::{self, FoldingLists, WriteError};
use crate::processors::clustering::ClusterIndex;
use crate::processors::executor::{Executor, ExecutorError, StageError};
use crate::processors::filtering::{ClusterFilter, FilteringError};
use crate::processors::selection::{self, AcceptedCluster, RejectedCluster};
use crate::visualization::{build_series, DmSigmaSeries};

/// Subdirectory holding the per-cluster DM/sigma series.
const SERIES_DIR: &str = "dm_sigma";

/// Errors that abort a sifting run.
#[derive(Debug, Error)]
pub enum SiftError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Filter(#[from] FilteringError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Load(#[from] LoaderError),

    #[error(transparent)]
    Worker(#[from] StageError<LoaderError>),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    ExportWorker(#[from] StageError<WriteError>),
}

/// Counters reported at the end of a run, successful or not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub files_discovered: usize,
    pub files_read: usize,
    pub skipped_lines: usize,
    pub records: usize,
    pub clusters: usize,
    pub accepted: usize,
    pub rejected: usize,
}

/// Everything a run produces.
#[derive(Debug, Clone, Default)]
pub struct SiftOutput {
    /// All parsed records in file order, then row order
    pub records: Vec<CandidateRecord>,
    /// First record of every cluster, in discovery order
    pub cluster_heads: Vec<CandidateRecord>,
    pub accepted: Vec<AcceptedCluster>,
    pub rejected: Vec<RejectedCluster>,
    /// DM/sigma series of accepted clusters, same order as `accepted`
    pub series: Vec<DmSigmaSeries>,
}

/// Files written by [`Sifter::write_outputs`].
#[derive(Debug, Clone)]
pub struct WrittenOutputs {
    pub all_candidates: PathBuf,
    pub one_candidate: PathBuf,
    pub best_candidates: PathBuf,
    pub rejected_candidates: PathBuf,
    pub folding: FoldingLists,
    pub series_index: PathBuf,
    pub series: Vec<PathBuf>,
}

/// One configured sifting engine.
pub struct Sifter {
    config: SiftConfig,
    filter: ClusterFilter,
    executor: Executor,
    stats: RunStats,
}

impl Sifter {
    /// Validate the configuration and start the worker pool.
    pub fn new(config: SiftConfig) -> Result<Self, SiftError> {
        config.validate()?;
        let filter = ClusterFilter::new(config.selection.clone())?;
        let executor = Executor::new(config.execution.workers, config.execution.show_progress)?;

        Ok(Self {
            config,
            filter,
            executor,
            stats: RunStats::default(),
        })
    }

    /// Size of the worker pool.
    pub fn workers(&self) -> usize {
        self.executor.workers()
    }

    /// Counters of the last (or current) run.
    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Find this search's trial files in `dir`.
    pub fn discover(&mut self, dir: &Path) -> Result<Vec<PathBuf>, SiftError> {
        let files = discover_candidate_files(dir, &self.config.search.file_suffix())?;
        self.stats.files_discovered = files.len();
        Ok(files)
    }

    fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            layout: TableLayout::for_jerk(self.config.search.jerk),
            precision: self.config.clustering.period_precision,
        }
    }

    /// Run the whole engine over `files`, in the given order.
    ///
    /// # Errors
    ///
    /// Any unreadable file aborts the run; `stats()` still reflects how far
    /// it got.
    pub fn run(&mut self, files: &[PathBuf]) -> Result<SiftOutput, SiftError> {
        self.stats = RunStats {
            files_discovered: self.stats.files_discovered.max(files.len()),
            ..RunStats::default()
        };

        info!(
            "Reading candidates from {} files on {} workers",
            files.len(),
            self.executor.workers()
        );
        let options = self.parse_options();
        let parsed = match self
            .executor
            .try_map("parse", files, |path| parse_candidate_file(path, &options))
        {
            Ok(parsed) => parsed,
            Err(e) => {
                self.stats.files_read = e.completed;
                return Err(e.into());
            }
        };
        self.stats.files_read = parsed.len();
        self.stats.skipped_lines = parsed.iter().map(|p| p.skipped_lines).sum();

        let mut records: Vec<CandidateRecord> = parsed.into_iter().flat_map(|p| p.records).collect();
        if self.config.clustering.collapse_within_file {
            records = collapse_duplicate_keys(records);
        }
        for (order, record) in records.iter_mut().enumerate() {
            record.parse_order = order;
        }
        self.stats.records = records.len();
        info!(
            "Parsed {} candidates ({} malformed rows skipped)",
            records.len(),
            self.stats.skipped_lines
        );

        let (cluster_heads, accepted, rejected, series) = {
            let index = ClusterIndex::build(&records);
            self.stats.clusters = index.len();
            info!(
                "Formed {} clusters from {} candidates",
                index.len(),
                index.record_count()
            );

            let verdicts = self
                .executor
                .map("filter", index.clusters(), |cluster| self.filter.evaluate(cluster));

            let mut accepted = Vec::new();
            let mut accepted_clusters = Vec::new();
            let mut rejected = Vec::new();
            for (cluster, verdict) in index.clusters().iter().zip(verdicts) {
                if verdict.is_accepted() {
                    if let Some(row) = selection::accept(cluster) {
                        accepted.push(row);
                        accepted_clusters.push(cluster.clone());
                    }
                } else {
                    rejected.push(selection::reject(cluster, verdict.reasons));
                }
            }

            let series: Vec<DmSigmaSeries> = self
                .executor
                .map("series", &accepted_clusters, build_series)
                .into_iter()
                .flatten()
                .collect();

            let heads: Vec<CandidateRecord> = index
                .clusters()
                .iter()
                .filter_map(|c| c.first().cloned())
                .collect();

            (heads, accepted, rejected, series)
        };

        self.stats.accepted = accepted.len();
        self.stats.rejected = rejected.len();
        info!(
            "Accepted {} clusters, rejected {}",
            accepted.len(),
            rejected.len()
        );

        Ok(SiftOutput {
            records,
            cluster_heads,
            accepted,
            rejected,
            series,
        })
    }

    /// Write every output table of a completed run into `dir`.
    ///
    /// Files are written into a staging directory beside `dir`, which then
    /// replaces `dir` as a whole: leftovers of an earlier run never mix with
    /// the new tables, and a failed write leaves `dir` untouched. Series files
    /// are written in parallel; their names are unique per cluster so no two
    /// tasks touch the same path.
    pub fn write_outputs(&self, output: &SiftOutput, dir: &Path) -> Result<WrittenOutputs, SiftError> {
        let staging = writers::staging_dir(dir)?;
        writers::remove_dir_if_exists(&staging)?;

        if let Err(e) = self.write_tables(output, &staging) {
            if let Err(cleanup) = writers::remove_dir_if_exists(&staging) {
                warn!("Could not remove staging directory: {}", cleanup);
            }
            return Err(e);
        }
        writers::publish_dir(&staging, dir)?;

        info!("Wrote outputs to {}", dir.display());

        let folding = writers::folding_list_paths(dir, output.accepted.len());
        let series_dir = dir.join(SERIES_DIR);
        Ok(WrittenOutputs {
            all_candidates: dir.join("all_candidates.csv"),
            one_candidate: dir.join("one_candidate.csv"),
            best_candidates: dir.join("best_candidates.csv"),
            rejected_candidates: dir.join("rejected_candidates.csv"),
            folding,
            series_index: series_dir.join("index.csv"),
            series: output
                .series
                .iter()
                .map(|s| series_dir.join(format!("{}.csv", s.name)))
                .collect(),
        })
    }

    fn write_tables(&self, output: &SiftOutput, dir: &Path) -> Result<(), SiftError> {
        writers::write_records_csv(&dir.join("all_candidates.csv"), &output.records)?;
        writers::write_records_csv(&dir.join("one_candidate.csv"), &output.cluster_heads)?;
        writers::write_best_candidates(&dir.join("best_candidates.csv"), &output.accepted)?;
        writers::write_rejected(&dir.join("rejected_candidates.csv"), &output.rejected)?;
        writers::write_folding_lists(dir, &output.accepted)?;

        let series_dir = dir.join(SERIES_DIR);
        writers::write_series_index(&series_dir.join("index.csv"), &output.series)?;
        self.executor.try_map("export", &output.series, |s| {
            writers::write_series_csv(&series_dir.join(format!("{}.csv", s.name)), s)
        })?;

        Ok(())
    }
}
