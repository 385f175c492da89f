//! Grouping of candidate records by quantized period.
//!
//! Every record lands in exactly one cluster; nothing is dropped or merged
//! here. Clusters are numbered in order of first appearance, and members keep
//! their parse order, so everything downstream is deterministic.
//!
//! # Example
//!
//! ```no_run
//! use pulsar_sift::core::loaders::{parse_candidate_file, ParseOptions, TableLayout};
//! use pulsar_sift::processors::clustering::ClusterIndex;
//! use std::path::Path;
//!
//! let options = ParseOptions { layout: TableLayout::Accel, precision: 4 };
//! let parsed = parse_candidate_file(Path::new("J1910_DM10.00_ACCEL_20"), &options).unwrap();
//! let index = ClusterIndex::build(&parsed.records);
//! println!("{} clusters", index.len());
//! ```

use std::collections::HashMap;

use crate::core::loaders::CandidateRecord;
use crate::core::transforms::PeriodKey;

/// Derived attributes of a cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterStats {
    /// Number of member detections
    pub size: usize,
    /// `max(dm) - min(dm)` over members
    pub dm_spread: f64,
    /// Highest member significance
    pub max_significance: f64,
}

/// All records sharing one period key.
#[derive(Debug, Clone)]
pub struct Cluster<'a> {
    id: usize,
    key: PeriodKey,
    members: Vec<&'a CandidateRecord>,
}

impl<'a> Cluster<'a> {
    /// Sequential id in order of first appearance.
    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    #[inline]
    pub fn key(&self) -> &PeriodKey {
        &self.key
    }

    /// Members in parse order.
    #[inline]
    pub fn members(&self) -> &[&'a CandidateRecord] {
        &self.members
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// Period used for the period window check: the truncated key value.
    #[inline]
    pub fn representative_period(&self) -> f64 {
        self.key.value()
    }

    pub fn dm_spread(&self) -> f64 {
        let mut min_dm = f64::INFINITY;
        let mut max_dm = f64::NEG_INFINITY;
        for record in &self.members {
            min_dm = min_dm.min(record.dm_trial);
            max_dm = max_dm.max(record.dm_trial);
        }
        if self.members.is_empty() {
            0.0
        } else {
            max_dm - min_dm
        }
    }

    pub fn max_significance(&self) -> f64 {
        self.members
            .iter()
            .map(|r| r.significance)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn stats(&self) -> ClusterStats {
        ClusterStats {
            size: self.size(),
            dm_spread: self.dm_spread(),
            max_significance: self.max_significance(),
        }
    }

    /// First record seen with this key.
    pub fn first(&self) -> Option<&'a CandidateRecord> {
        self.members.first().copied()
    }
}

/// Period-key index over a complete record set.
#[derive(Debug, Clone, Default)]
pub struct ClusterIndex<'a> {
    clusters: Vec<Cluster<'a>>,
}

impl<'a> ClusterIndex<'a> {
    /// Group `records` by period key.
    ///
    /// `records` must be in parse order; cluster ids follow the first
    /// occurrence of each key.
    pub fn build(records: &'a [CandidateRecord]) -> Self {
        let mut slots: HashMap<&'a PeriodKey, usize> = HashMap::with_capacity(records.len() / 2);
        let mut clusters: Vec<Cluster<'a>> = Vec::new();

        for record in records {
            let slot = *slots.entry(&record.period_key).or_insert_with(|| {
                clusters.push(Cluster {
                    id: clusters.len(),
                    key: record.period_key.clone(),
                    members: Vec::new(),
                });
                clusters.len() - 1
            });
            clusters[slot].members.push(record);
        }

        Self { clusters }
    }

    #[inline]
    pub fn clusters(&self) -> &[Cluster<'a>] {
        &self.clusters
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Total number of records across all clusters.
    pub fn record_count(&self) -> usize {
        self.clusters.iter().map(|c| c.size()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loaders::test_record;

    fn ordered(mut records: Vec<CandidateRecord>) -> Vec<CandidateRecord> {
        for (i, r) in records.iter_mut().enumerate() {
            r.parse_order = i;
        }
        records
    }

    #[test]
    fn test_cluster_index_groups_by_key() {
        let records = ordered(vec![
            test_record("a_DM10_ACCEL_20", 10.0, 1, 12.34560, 5.0),
            test_record("a_DM10_ACCEL_20", 10.0, 2, 33.3, 8.0),
            test_record("b_DM60_ACCEL_20", 60.0, 1, 12.34569, 9.0),
        ]);

        let index = ClusterIndex::build(&records);

        assert_eq!(index.len(), 2);
        assert_eq!(index.record_count(), 3);

        let first = &index.clusters()[0];
        assert_eq!(first.id(), 0);
        assert_eq!(first.key().as_str(), "12.3456");
        assert_eq!(first.size(), 2);
        assert_eq!(first.dm_spread(), 50.0);
        assert_eq!(first.max_significance(), 9.0);
        assert_eq!(first.first().unwrap().candidate_index, 1);

        let second = &index.clusters()[1];
        assert_eq!(second.id(), 1);
        assert_eq!(second.size(), 1);
        assert_eq!(second.dm_spread(), 0.0);
    }

    #[test]
    fn test_members_keep_parse_order() {
        let records = ordered(vec![
            test_record("a_DM1_ACCEL_20", 1.0, 1, 5.0, 1.0),
            test_record("b_DM2_ACCEL_20", 2.0, 1, 9.0, 1.0),
            test_record("c_DM3_ACCEL_20", 3.0, 1, 5.0, 1.0),
            test_record("d_DM4_ACCEL_20", 4.0, 1, 5.0, 1.0),
        ]);

        let index = ClusterIndex::build(&records);
        let orders: Vec<usize> = index.clusters()[0]
            .members()
            .iter()
            .map(|r| r.parse_order)
            .collect();

        assert_eq!(orders, vec![0, 2, 3]);
    }

    #[test]
    fn test_same_file_peaks_share_cluster() {
        // Separate peaks from one file at the same quantized period are not deduplicated
        let records = ordered(vec![
            test_record("a_DM10_ACCEL_20", 10.0, 1, 7.77771, 4.0),
            test_record("a_DM10_ACCEL_20", 10.0, 5, 7.77779, 6.0),
        ]);

        let index = ClusterIndex::build(&records);
        assert_eq!(index.len(), 1);
        assert_eq!(index.clusters()[0].size(), 2);
    }

    #[test]
    fn test_boundary_periods_land_in_separate_clusters() {
        let records = ordered(vec![
            test_record("a_DM10_ACCEL_20", 10.0, 1, 12.34499, 5.0),
            test_record("b_DM20_ACCEL_20", 20.0, 1, 12.34501, 5.0),
        ]);

        let index = ClusterIndex::build(&records);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_empty_index() {
        let index = ClusterIndex::build(&[]);
        assert!(index.is_empty());
        assert_eq!(index.record_count(), 0);
    }
}
