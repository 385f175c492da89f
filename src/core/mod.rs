//! Core data types and I/O operations.

pub mod loaders;
pub mod transforms;
pub mod writers;

pub use loaders::{CandidateRecord, LoaderError, TrialInfo};
pub use transforms::{quantize, PeriodKey};
pub use writers::{write_best_candidates, write_folding_lists, write_rejected, WriteError};
