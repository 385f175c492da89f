//! Periodicity candidate sifting for pulsar search campaigns.
//!
//! This crate provides tools for:
//! - Parsing per-DM-trial acceleration/jerk search candidate files
//! - Clustering detections across DM trials by quantized period
//! - Rejecting implausible clusters and picking one representative each
//! - Exporting candidate tables, folding lists and DM-sigma plot series
//!
//! # Example
//!
//! ```no_run
//! use pulsar_sift::{SiftConfig, Sifter};
//! use std::path::Path;
//!
//! let mut sifter = Sifter::new(SiftConfig::default()).unwrap();
//! let files = sifter.discover(Path::new(".")).unwrap();
//! let output = sifter.run(&files).unwrap();
//! println!("{} candidates survive", output.accepted.len());
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;
pub mod visualization;

pub use crate::config::{ClusteringConfig, ExecutionConfig, SearchConfig, SelectionConfig, SiftConfig};
pub use crate::core::loaders::{CandidateRecord, TrialInfo};
pub use crate::processors::sift::{RunStats, SiftError, SiftOutput, Sifter};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
