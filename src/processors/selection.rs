//! Best-candidate selection for accepted clusters.

use crate::core::loaders::CandidateRecord;
use crate::core::transforms::PeriodKey;
use crate::processors::clustering::{Cluster, ClusterStats};
use crate::processors::filtering::RejectReason;

/// One row of the best-candidate table.
#[derive(Debug, Clone)]
pub struct AcceptedCluster {
    pub cluster_id: usize,
    pub key: PeriodKey,
    pub stats: ClusterStats,
    /// Highest-significance member
    pub representative: CandidateRecord,
}

/// A cluster that failed selection, kept for diagnostics.
#[derive(Debug, Clone)]
pub struct RejectedCluster {
    pub cluster_id: usize,
    pub key: PeriodKey,
    pub stats: ClusterStats,
    pub reasons: Vec<RejectReason>,
}

/// Pick the member with the highest significance.
///
/// Ties go to the earliest member in parse order. Returns `None` only for an
/// empty cluster.
pub fn select_representative<'a>(cluster: &Cluster<'a>) -> Option<&'a CandidateRecord> {
    let mut best: Option<&'a CandidateRecord> = None;
    for &record in cluster.members() {
        match best {
            Some(current) if record.significance <= current.significance => {}
            _ => best = Some(record),
        }
    }
    best
}

/// Build the output row for an accepted cluster.
pub fn accept(cluster: &Cluster<'_>) -> Option<AcceptedCluster> {
    let representative = select_representative(cluster)?;
    Some(AcceptedCluster {
        cluster_id: cluster.id(),
        key: cluster.key().clone(),
        stats: cluster.stats(),
        representative: representative.clone(),
    })
}

/// Build the diagnostic row for a rejected cluster.
pub fn reject(cluster: &Cluster<'_>, reasons: Vec<RejectReason>) -> RejectedCluster {
    RejectedCluster {
        cluster_id: cluster.id(),
        key: cluster.key().clone(),
        stats: cluster.stats(),
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loaders::test_record;
    use crate::processors::clustering::ClusterIndex;

    fn cluster_records(sigmas: &[f64]) -> Vec<CandidateRecord> {
        sigmas
            .iter()
            .enumerate()
            .map(|(i, &sigma)| {
                let dm = 10.0 * (i + 1) as f64;
                let mut r = test_record(&format!("J_DM{}_ACCEL_20", dm), dm, i as u32 + 1, 4.2, sigma);
                r.parse_order = i;
                r
            })
            .collect()
    }

    #[test]
    fn test_selects_max_significance() {
        let recs = cluster_records(&[3.0, 9.5, 7.0]);
        let index = ClusterIndex::build(&recs);

        let best = select_representative(&index.clusters()[0]).unwrap();
        assert_eq!(best.significance, 9.5);
        assert_eq!(best.dm_trial, 20.0);
    }

    #[test]
    fn test_tie_goes_to_first_parsed() {
        let recs = cluster_records(&[3.0, 8.0, 8.0, 8.0]);
        let index = ClusterIndex::build(&recs);

        let best = select_representative(&index.clusters()[0]).unwrap();
        assert_eq!(best.parse_order, 1);
    }

    #[test]
    fn test_representative_matches_cluster_max() {
        let recs = cluster_records(&[5.5, 2.0, 5.4, 1.0]);
        let index = ClusterIndex::build(&recs);
        let cluster = &index.clusters()[0];

        let accepted = accept(cluster).unwrap();
        assert_eq!(accepted.representative.significance, accepted.stats.max_significance);
        assert_eq!(accepted.stats.size, 4);
        assert_eq!(accepted.cluster_id, 0);
        assert_eq!(accepted.key.as_str(), "4.2");
    }

    #[test]
    fn test_reject_keeps_reasons() {
        let recs = cluster_records(&[5.0]);
        let index = ClusterIndex::build(&recs);
        let reasons = vec![RejectReason::TooFewDetections { size: 1, required: 2 }];

        let rejected = reject(&index.clusters()[0], reasons.clone());
        assert_eq!(rejected.reasons, reasons);
        assert_eq!(rejected.stats.size, 1);
    }
}
