//! Readers for per-DM-trial acceleration search candidate files.
//!
//! Each trial file is named after its trial, e.g.
//! `J1910_DM142.50_ACCEL_20` or `J1910_DM142.50_ACCEL_20_JERK_40`, and holds
//! a whitespace-delimited candidate table. Data rows start with a digit (the
//! candidate number); everything else is header or commentary.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use log::{debug, info};
use regex::Regex;
use thiserror::Error;

use super::transforms::{quantize, PeriodKey};

/// Errors that abort loading of a trial file or directory.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("No candidate files matching '*{suffix}' in {dir}")]
    NoCandidateFiles { dir: PathBuf, suffix: String },

    #[error("No DM<value> token in file name: {0}")]
    InvalidFileName(PathBuf),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Reasons a single candidate row is skipped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LineError {
    #[error("not a candidate row")]
    NotCandidateRow,

    #[error("expected at least {expected} columns, found {found}")]
    TooFewFields { expected: usize, found: usize },

    #[error("column '{column}' is not a valid number: {value}")]
    InvalidNumber { column: &'static str, value: String },
}

/// Identity of one DM trial, parsed from its file name.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialInfo {
    /// Trial dispersion measure
    pub dm: f64,
    /// DM exactly as written in the file name, e.g. `142.50`
    pub dm_label: String,
    /// Acceleration search zmax from the `_ACCEL_<zmax>` suffix
    pub zmax: Option<u32>,
    /// Jerk search wmax from the `_JERK_<wmax>` suffix
    pub wmax: Option<u32>,
}

/// One periodicity detection from one trial file.
///
/// Only the trial DM, period, significance, harmonic count and candidate
/// number drive clustering. The remaining columns are carried as reported.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRecord {
    /// File name of the originating trial
    pub source_file: String,
    /// Trial DM
    pub dm_trial: f64,
    /// Trial DM as written in the file name
    pub dm_label: String,
    pub zmax: Option<u32>,
    pub wmax: Option<u32>,
    /// Candidate number within its file
    pub candidate_index: u32,
    /// Detection significance ("sigma")
    pub significance: f64,
    pub num_harmonics: u32,
    /// Normalized period in ms
    pub period_ms: f64,
    /// Period column as reported, including any uncertainty
    pub period_raw: String,
    /// Cluster key, always `quantize(period_ms, precision)`
    pub period_key: PeriodKey,
    /// Position in the concatenated record set
    pub parse_order: usize,
    pub summed_power: String,
    pub coherent_power: String,
    pub frequency_hz: String,
    pub fft_r: String,
    pub freq_deriv: String,
    pub fft_z: String,
    pub fft_w: Option<String>,
    pub accel: String,
    pub notes: String,
}

/// Column layout of a candidate table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableLayout {
    /// `Cand Sigma Summed Coherent NumHarm Period Freq r fdot z Accel Notes`
    Accel,
    /// Same as `Accel` with an extra `w` column after `z`
    Jerk,
}

impl TableLayout {
    pub fn for_jerk(jerk: Option<u32>) -> Self {
        if jerk.is_some() {
            TableLayout::Jerk
        } else {
            TableLayout::Accel
        }
    }

    fn accel_column(self) -> usize {
        match self {
            TableLayout::Accel => 10,
            TableLayout::Jerk => 11,
        }
    }
}

/// Options needed to turn rows into records.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    pub layout: TableLayout,
    pub precision: usize,
}

/// Everything read from one trial file.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub path: PathBuf,
    pub trial: TrialInfo,
    pub records: Vec<CandidateRecord>,
    /// Lines that looked like rows but could not be parsed
    pub skipped_lines: usize,
}

fn dm_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"DM([-+]?\d*\.?\d+)").expect("DM pattern is valid"))
}

fn suffix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"_ACCEL_(\d+)(?:_JERK_(\d+))?$").expect("suffix pattern is valid")
    })
}

fn uncertainty_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\(.*\)").expect("uncertainty pattern is valid"))
}

/// Parse the trial identity out of a candidate file name.
///
/// The DM is taken from the last `DM<value>` token; zmax and wmax come from
/// the `_ACCEL_<zmax>[_JERK_<wmax>]` suffix when present.
pub fn parse_trial_name(file_name: &str) -> Option<TrialInfo> {
    let dm_match = dm_pattern().captures_iter(file_name).last()?;
    let dm_label = dm_match.get(1)?.as_str().to_string();
    let dm = dm_label.parse::<f64>().ok()?;

    let (zmax, wmax) = match suffix_pattern().captures(file_name) {
        Some(caps) => (
            caps.get(1).and_then(|m| m.as_str().parse().ok()),
            caps.get(2).and_then(|m| m.as_str().parse().ok()),
        ),
        None => (None, None),
    };

    Some(TrialInfo {
        dm,
        dm_label,
        zmax,
        wmax,
    })
}

/// Convert a reported period to plain ms.
///
/// Strips a parenthesised uncertainty (`12.3456(7)`) and expands the
/// `d.dddx10^n` notation used for long periods. Returns `None` for anything
/// that is not a finite number afterwards.
pub fn normalize_period(raw: &str) -> Option<f64> {
    let stripped = uncertainty_pattern().replace_all(raw.trim(), "");
    parse_reported_number(&stripped)
}

fn parse_reported_number(text: &str) -> Option<f64> {
    let value = if text.contains("x10^") {
        text.replacen("x10^", "e", 1).parse::<f64>().ok()?
    } else {
        text.parse::<f64>().ok()?
    };
    value.is_finite().then_some(value)
}

/// Parse one line of a candidate table.
///
/// Returns `LineError::NotCandidateRow` for header and comment lines, which
/// never start with a digit.
pub fn parse_candidate_line(
    line: &str,
    trial: &TrialInfo,
    source_file: &str,
    options: &ParseOptions,
) -> std::result::Result<CandidateRecord, LineError> {
    if !line.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(LineError::NotCandidateRow);
    }

    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 6 {
        return Err(LineError::TooFewFields {
            expected: 6,
            found: fields.len(),
        });
    }

    let candidate_index: u32 = fields[0].parse().map_err(|_| LineError::InvalidNumber {
        column: "Cand",
        value: fields[0].to_string(),
    })?;

    let significance = parse_reported_number(&uncertainty_pattern().replace_all(fields[1], ""))
        .ok_or_else(|| LineError::InvalidNumber {
            column: "Sigma",
            value: fields[1].to_string(),
        })?;

    let num_harmonics: u32 = fields[4].parse().map_err(|_| LineError::InvalidNumber {
        column: "NumHarm",
        value: fields[4].to_string(),
    })?;

    let period_ms = normalize_period(fields[5]).ok_or_else(|| LineError::InvalidNumber {
        column: "Period(ms)",
        value: fields[5].to_string(),
    })?;

    let column = |idx: usize| fields.get(idx).map(|s| s.to_string()).unwrap_or_default();
    let accel_idx = options.layout.accel_column();
    let fft_w = match options.layout {
        TableLayout::Jerk => Some(column(10)),
        TableLayout::Accel => None,
    };
    let notes = fields
        .get(accel_idx + 1..)
        .map(|rest| rest.join(" "))
        .unwrap_or_default();

    Ok(CandidateRecord {
        source_file: source_file.to_string(),
        dm_trial: trial.dm,
        dm_label: trial.dm_label.clone(),
        zmax: trial.zmax,
        wmax: trial.wmax,
        candidate_index,
        significance,
        num_harmonics,
        period_ms,
        period_raw: fields[5].to_string(),
        period_key: quantize(period_ms, options.precision),
        parse_order: 0,
        summed_power: column(2),
        coherent_power: column(3),
        frequency_hz: column(6),
        fft_r: column(7),
        freq_deriv: column(8),
        fft_z: column(9),
        fft_w,
        accel: column(accel_idx),
        notes,
    })
}

/// Load all candidate rows from one trial file.
///
/// Malformed rows are skipped and counted. A file that cannot be opened or
/// read fails as a whole.
///
/// # Errors
///
/// Returns `InvalidFileName` if the name carries no DM value and `Io` if the
/// file cannot be read.
pub fn parse_candidate_file(path: &Path, options: &ParseOptions) -> Result<ParsedFile> {
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| LoaderError::InvalidFileName(path.to_path_buf()))?;
    let trial =
        parse_trial_name(file_name).ok_or_else(|| LoaderError::InvalidFileName(path.to_path_buf()))?;

    let file = File::open(path).map_err(|source| LoaderError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);

    let mut records = Vec::with_capacity(256);
    let mut skipped_lines = 0usize;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| LoaderError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        match parse_candidate_line(&line, &trial, file_name, options) {
            Ok(record) => records.push(record),
            Err(LineError::NotCandidateRow) => {}
            Err(e) => {
                debug!("{}:{}: skipping row ({})", file_name, line_no + 1, e);
                skipped_lines += 1;
            }
        }
    }

    if skipped_lines > 0 {
        info!("{}: skipped {} malformed rows", file_name, skipped_lines);
    }

    Ok(ParsedFile {
        path: path.to_path_buf(),
        trial,
        records,
        skipped_lines,
    })
}

/// Find the trial files of one search in a directory.
///
/// Matches regular files whose name ends with `suffix` (e.g. `_ACCEL_20`),
/// sorted by name so the input order is reproducible.
pub fn discover_candidate_files(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(LoaderError::DirectoryNotFound(dir.to_path_buf()));
    }

    let entries = fs::read_dir(dir).map_err(|source| LoaderError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|s| s.to_str())
                .map(|name| name.ends_with(suffix))
                .unwrap_or(false)
        })
        .collect();

    if files.is_empty() {
        return Err(LoaderError::NoCandidateFiles {
            dir: dir.to_path_buf(),
            suffix: suffix.to_string(),
        });
    }

    files.sort();
    Ok(files)
}

/// Build a record directly, for tests in sibling modules.
#[cfg(test)]
pub(crate) fn test_record(
    source_file: &str,
    dm: f64,
    candidate_index: u32,
    period_ms: f64,
    significance: f64,
) -> CandidateRecord {
    CandidateRecord {
        source_file: source_file.to_string(),
        dm_trial: dm,
        dm_label: format!("{:.2}", dm),
        zmax: Some(20),
        wmax: None,
        candidate_index,
        significance,
        num_harmonics: 4,
        period_ms,
        period_raw: period_ms.to_string(),
        period_key: quantize(period_ms, 4),
        parse_order: 0,
        summed_power: "30.1".to_string(),
        coherent_power: "41.7".to_string(),
        frequency_hz: (1000.0 / period_ms).to_string(),
        fft_r: "1234.5".to_string(),
        freq_deriv: "0.0".to_string(),
        fft_z: "0.0".to_string(),
        fft_w: None,
        accel: "0.0".to_string(),
        notes: String::new(),
    }
}
