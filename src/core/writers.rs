//! Output tables of a sifting run.
//!
//! - CSV tables of all parsed candidates, first record per cluster, best
//!   candidate per accepted cluster and rejected clusters
//! - single-row whitespace lists of DMs, candidate numbers and periods for
//!   the folding tool
//! - one DM/sigma series CSV per accepted cluster for the plotting tool,
//!   plus an index of the series with their plot labels
//!
//! A run writes into a staging directory next to the destination and only
//! replaces the destination once every file is written.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::loaders::CandidateRecord;
use crate::processors::selection::{AcceptedCluster, RejectedCluster};
use crate::visualization::DmSigmaSeries;

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// Failed to move a finished output directory into place.
    #[error("failed to replace output directory '{path}': {source}")]
    ReplaceDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Creates a buffered writer for the given path.
fn create_buffered_writer(path: &Path) -> Result<BufWriter<File>> {
    ensure_parent_dirs(path)?;
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(BufWriter::new(file))
}

/// CSV writer with the path kept for error reporting.
struct Table {
    path: String,
    writer: csv::Writer<BufWriter<File>>,
}

impl Table {
    fn create(path: &Path, header: &[&str]) -> Result<Self> {
        let writer = csv::Writer::from_writer(create_buffered_writer(path)?);
        let mut table = Self {
            path: path.display().to_string(),
            writer,
        };
        table.row(header)?;
        Ok(table)
    }

    fn row<I, S>(&mut self, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        self.writer
            .write_record(fields)
            .map_err(|e| WriteError::CsvError {
                path: self.path.clone(),
                source: e,
            })
    }

    fn finish(mut self) -> Result<()> {
        self.writer.flush().map_err(|e| WriteError::WriteFile {
            path: self.path,
            source: e,
        })
    }
}

const RECORD_HEADER: [&str; 18] = [
    "file",
    "DM",
    "Cand",
    "Sigma",
    "SummedPower",
    "CoherentPower",
    "NumHarm",
    "Period(ms)",
    "Period_norm",
    "Period_key",
    "Frequency(Hz)",
    "FFTr(bin)",
    "FreqDeriv(Hz/s)",
    "FFTz(bins)",
    "FFTw(bins)",
    "Accel(m/s^2)",
    "Notes",
    "zmax",
];

fn record_row(r: &CandidateRecord) -> [String; 18] {
    [
        r.source_file.clone(),
        r.dm_label.clone(),
        r.candidate_index.to_string(),
        r.significance.to_string(),
        r.summed_power.clone(),
        r.coherent_power.clone(),
        r.num_harmonics.to_string(),
        r.period_raw.clone(),
        r.period_ms.to_string(),
        r.period_key.to_string(),
        r.frequency_hz.clone(),
        r.fft_r.clone(),
        r.freq_deriv.clone(),
        r.fft_z.clone(),
        r.fft_w.clone().unwrap_or_default(),
        r.accel.clone(),
        r.notes.clone(),
        r.zmax.map(|z| z.to_string()).unwrap_or_default(),
    ]
}

/// Write candidate records, one row each, with all reported columns.
pub fn write_records_csv<'a, I>(path: &Path, records: I) -> Result<usize>
where
    I: IntoIterator<Item = &'a CandidateRecord>,
{
    let mut table = Table::create(path, &RECORD_HEADER)?;
    let mut rows = 0usize;
    for record in records {
        table.row(&record_row(record))?;
        rows += 1;
    }
    table.finish()?;
    Ok(rows)
}

/// Write the best-candidate table, one row per accepted cluster.
///
/// Columns: `cluster,CAND,DM,p,Sigma,NumHarm,Accel,detections,dm_spread`,
/// where `DM` is `DM<label>` as it appears in the trial file names.
pub fn write_best_candidates(path: &Path, accepted: &[AcceptedCluster]) -> Result<()> {
    let mut table = Table::create(
        path,
        &[
            "cluster",
            "CAND",
            "DM",
            "p",
            "Sigma",
            "NumHarm",
            "Accel",
            "detections",
            "dm_spread",
        ],
    )?;

    for cluster in accepted {
        let best = &cluster.representative;
        table.row(&[
            cluster.cluster_id.to_string(),
            best.candidate_index.to_string(),
            format!("DM{}", best.dm_label),
            cluster.key.to_string(),
            best.significance.to_string(),
            best.num_harmonics.to_string(),
            best.accel.clone(),
            cluster.stats.size.to_string(),
            cluster.stats.dm_spread.to_string(),
        ])?;
    }

    table.finish()
}

/// Write the rejected-cluster table with every failed predicate.
pub fn write_rejected(path: &Path, rejected: &[RejectedCluster]) -> Result<()> {
    let mut table = Table::create(
        path,
        &[
            "cluster",
            "p",
            "detections",
            "dm_spread",
            "max_sigma",
            "reasons",
        ],
    )?;

    for cluster in rejected {
        let reasons: Vec<&str> = cluster.reasons.iter().map(|r| r.tag()).collect();
        table.row(&[
            cluster.cluster_id.to_string(),
            cluster.key.to_string(),
            cluster.stats.size.to_string(),
            cluster.stats.dm_spread.to_string(),
            cluster.stats.max_significance.to_string(),
            reasons.join(";"),
        ])?;
    }

    table.finish()
}

fn write_single_row<S: AsRef<str>>(path: &Path, values: &[S]) -> Result<()> {
    let mut writer = create_buffered_writer(path)?;
    let line = values
        .iter()
        .map(|v| v.as_ref())
        .collect::<Vec<_>>()
        .join(" ");

    writeln!(writer, "{}", line)
        .and_then(|_| writer.flush())
        .map_err(|e| WriteError::WriteFile {
            path: path.display().to_string(),
            source: e,
        })
}

/// Paths of the folding-tool lists.
#[derive(Debug, Clone)]
pub struct FoldingLists {
    pub dms: PathBuf,
    pub candidates: PathBuf,
    pub periods: PathBuf,
}

/// Paths of the folding lists for `n` accepted candidates in `dir`.
pub fn folding_list_paths(dir: &Path, n: usize) -> FoldingLists {
    FoldingLists {
        dms: dir.join(format!("{}-ACCEL-DM.txt", n)),
        candidates: dir.join(format!("{}-ACCEL-accelcand.txt", n)),
        periods: dir.join(format!("{}-ACCEL-Pms.txt", n)),
    }
}

/// Write `<n>-ACCEL-DM.txt`, `<n>-ACCEL-accelcand.txt` and `<n>-ACCEL-Pms.txt`.
///
/// Each file is a single space-separated row in best-candidate order, so the
/// i-th entries of the three files describe the same candidate.
pub fn write_folding_lists(dir: &Path, accepted: &[AcceptedCluster]) -> Result<FoldingLists> {
    let lists = folding_list_paths(dir, accepted.len());

    let dms: Vec<String> = accepted
        .iter()
        .map(|c| format!("DM{}", c.representative.dm_label))
        .collect();
    let cands: Vec<String> = accepted
        .iter()
        .map(|c| c.representative.candidate_index.to_string())
        .collect();
    let periods: Vec<String> = accepted.iter().map(|c| c.key.to_string()).collect();

    write_single_row(&lists.dms, &dms)?;
    write_single_row(&lists.candidates, &cands)?;
    write_single_row(&lists.periods, &periods)?;

    Ok(lists)
}

/// Write one cluster's DM/sigma series as `dm,sigma,period_ms,is_best`.
pub fn write_series_csv(path: &Path, series: &DmSigmaSeries) -> Result<()> {
    let mut table = Table::create(path, &["dm", "sigma", "period_ms", "is_best"])?;
    for point in &series.points {
        table.row(&[
            point.dm.to_string(),
            point.sigma.to_string(),
            point.period_ms.to_string(),
            u8::from(point.representative).to_string(),
        ])?;
    }
    table.finish()
}

/// Write the plot labels of every series, one row per series file.
pub fn write_series_index(path: &Path, series: &[DmSigmaSeries]) -> Result<usize> {
    let mut table = Table::create(
        path,
        &[
            "file",
            "cluster",
            "best_dm",
            "best_sigma",
            "zmax",
            "wmax",
            "period_min",
            "period_max",
        ],
    )?;
    let opt = |v: Option<u32>| v.map(|x| x.to_string()).unwrap_or_default();

    for s in series {
        let (lo, hi) = s
            .period_range()
            .map(|(lo, hi)| (lo.to_string(), hi.to_string()))
            .unwrap_or_default();
        table.row(&[
            format!("{}.csv", s.name),
            s.cluster_id.to_string(),
            s.representative_dm.to_string(),
            s.representative_sigma.to_string(),
            opt(s.zmax),
            opt(s.wmax),
            lo,
            hi,
        ])?;
    }
    table.finish()?;
    Ok(series.len())
}

/// Staging directory used while writing the outputs destined for `dest`.
///
/// It is a hidden sibling of `dest`, so the final rename stays on one
/// filesystem. Fails if `dest` has no final component (`.`, `/`).
pub fn staging_dir(dest: &Path) -> Result<PathBuf> {
    let name = dest.file_name().ok_or_else(|| WriteError::CreateDirectory {
        path: dest.display().to_string(),
        source: std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "output path must name a directory",
        ),
    })?;
    Ok(dest.with_file_name(format!(".{}.partial", name.to_string_lossy())))
}

/// Remove whatever is at `path`, if anything.
pub fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(WriteError::ReplaceDirectory {
            path: path.display().to_string(),
            source: e,
        }),
    }
}

/// Replace `dest` (and everything in it) with the finished `staging` tree.
pub fn publish_dir(staging: &Path, dest: &Path) -> Result<()> {
    remove_dir_if_exists(dest)?;
    fs::rename(staging, dest).map_err(|e| WriteError::ReplaceDirectory {
        path: dest.display().to_string(),
        source: e,
    })
}
