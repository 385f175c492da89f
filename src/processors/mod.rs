//! Data processing modules.

pub mod clustering;
pub mod executor;
pub mod filtering;
pub mod selection;
pub mod sift;

// Re-export key types for convenience
pub use clustering::{Cluster, ClusterIndex, ClusterStats};
pub use executor::{Executor, ExecutorError, StageError};
pub use filtering::{ClusterFilter, FilteringError, RejectReason, Verdict};
pub use selection::{select_representative, AcceptedCluster, RejectedCluster};
pub use sift::{RunStats, SiftError, SiftOutput, Sifter};
