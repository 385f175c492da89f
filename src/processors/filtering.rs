//! Cluster acceptance predicates.
//!
//! A cluster is accepted iff it has enough cross-trial support, its members
//! sit within a narrow DM window, its period is plausible and its peak
//! significance lies inside `[min_sigma, max_sigma]`. The upper sigma bound is
//! deliberate: implausibly strong clusters are treated as RFI.

use std::fmt;

use thiserror::Error;

use crate::config::{ConfigError, SelectionConfig};
use crate::processors::clustering::Cluster;

/// Why a cluster failed selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RejectReason {
    TooFewDetections { size: usize, required: usize },
    DmSpreadTooWide { spread: f64, limit: f64 },
    PeriodOutOfRange { period: f64 },
    SignificanceTooLow { sigma: f64, limit: f64 },
    SignificanceTooHigh { sigma: f64, limit: f64 },
    BelowDmCutoff { dm: f64, cutoff: f64 },
}

impl RejectReason {
    /// Short machine-readable tag used in the rejected table.
    pub fn tag(&self) -> &'static str {
        match self {
            RejectReason::TooFewDetections { .. } => "too_few_detections",
            RejectReason::DmSpreadTooWide { .. } => "dm_spread",
            RejectReason::PeriodOutOfRange { .. } => "period_range",
            RejectReason::SignificanceTooLow { .. } => "sigma_low",
            RejectReason::SignificanceTooHigh { .. } => "sigma_high",
            RejectReason::BelowDmCutoff { .. } => "low_dm",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::TooFewDetections { size, required } => {
                write!(f, "{} detections, need {}", size, required)
            }
            RejectReason::DmSpreadTooWide { spread, limit } => {
                write!(f, "DM spread {} exceeds {}", spread, limit)
            }
            RejectReason::PeriodOutOfRange { period } => {
                write!(f, "period {} ms outside window", period)
            }
            RejectReason::SignificanceTooLow { sigma, limit } => {
                write!(f, "sigma {} below {}", sigma, limit)
            }
            RejectReason::SignificanceTooHigh { sigma, limit } => {
                write!(f, "sigma {} above {}", sigma, limit)
            }
            RejectReason::BelowDmCutoff { dm, cutoff } => {
                write!(f, "DM {} below cutoff {}", dm, cutoff)
            }
        }
    }
}

/// Outcome of evaluating one cluster.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Verdict {
    /// Every failed predicate; empty when accepted
    pub reasons: Vec<RejectReason>,
}

impl Verdict {
    #[inline]
    pub fn is_accepted(&self) -> bool {
        self.reasons.is_empty()
    }
}

/// Errors building a filter.
#[derive(Debug, Error)]
pub enum FilteringError {
    #[error("invalid selection thresholds: {0}")]
    InvalidThresholds(#[from] ConfigError),
}

/// Validated selection thresholds.
#[derive(Debug, Clone)]
pub struct ClusterFilter {
    criteria: SelectionConfig,
}

impl ClusterFilter {
    /// Build a filter, rejecting inconsistent thresholds up front.
    pub fn new(criteria: SelectionConfig) -> Result<Self, FilteringError> {
        criteria.validate()?;
        Ok(Self { criteria })
    }

    /// Evaluate every predicate against one cluster.
    ///
    /// Pure: the same cluster and thresholds always give the same verdict.
    pub fn evaluate(&self, cluster: &Cluster<'_>) -> Verdict {
        let c = &self.criteria;
        let stats = cluster.stats();
        let period = cluster.representative_period();
        let mut reasons = Vec::new();

        if stats.size < c.min_detections {
            reasons.push(RejectReason::TooFewDetections {
                size: stats.size,
                required: c.min_detections,
            });
        }

        if stats.dm_spread > c.max_dm_range {
            reasons.push(RejectReason::DmSpreadTooWide {
                spread: stats.dm_spread,
                limit: c.max_dm_range,
            });
        }

        if !(c.min_period_ms..=c.max_period_ms).contains(&period) {
            reasons.push(RejectReason::PeriodOutOfRange { period });
        }

        if stats.max_significance < c.min_sigma {
            reasons.push(RejectReason::SignificanceTooLow {
                sigma: stats.max_significance,
                limit: c.min_sigma,
            });
        }

        if stats.max_significance > c.max_sigma {
            reasons.push(RejectReason::SignificanceTooHigh {
                sigma: stats.max_significance,
                limit: c.max_sigma,
            });
        }

        if let Some(cutoff) = c.low_dm_cutoff {
            if let Some(best) = super::selection::select_representative(cluster) {
                if best.dm_trial < cutoff {
                    reasons.push(RejectReason::BelowDmCutoff {
                        dm: best.dm_trial,
                        cutoff,
                    });
                }
            }
        }

        Verdict { reasons }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loaders::{test_record, CandidateRecord};
    use crate::processors::clustering::ClusterIndex;

    fn records(rows: &[(f64, f64, f64)]) -> Vec<CandidateRecord> {
        rows.iter()
            .enumerate()
            .map(|(i, &(dm, period, sigma))| {
                let mut r = test_record(&format!("J_DM{}_ACCEL_20", dm), dm, 1, period, sigma);
                r.parse_order = i;
                r
            })
            .collect()
    }

    fn filter_with(f: impl FnOnce(&mut SelectionConfig)) -> ClusterFilter {
        let mut criteria = SelectionConfig::default();
        f(&mut criteria);
        ClusterFilter::new(criteria).unwrap()
    }

    #[test]
    fn test_accepts_supported_cluster() {
        let recs = records(&[(10.0, 12.3456, 6.0), (60.0, 12.3456, 8.0)]);
        let index = ClusterIndex::build(&recs);
        let filter = filter_with(|c| c.min_detections = 2);

        let verdict = filter.evaluate(&index.clusters()[0]);
        assert!(verdict.is_accepted(), "{:?}", verdict);
    }

    #[test]
    fn test_rejects_insufficient_support() {
        let recs = records(&[(10.0, 12.3456, 6.0), (60.0, 12.3456, 8.0)]);
        let index = ClusterIndex::build(&recs);
        let filter = filter_with(|c| c.min_detections = 3);

        let verdict = filter.evaluate(&index.clusters()[0]);
        assert_eq!(
            verdict.reasons,
            vec![RejectReason::TooFewDetections { size: 2, required: 3 }]
        );
    }

    #[test]
    fn test_rejects_wide_dm_spread() {
        let recs = records(&[(10.0, 12.3456, 6.0), (150.0, 12.3456, 8.0)]);
        let index = ClusterIndex::build(&recs);
        let filter = filter_with(|c| c.max_dm_range = 100.0);

        let verdict = filter.evaluate(&index.clusters()[0]);
        assert_eq!(verdict.reasons.len(), 1);
        assert_eq!(verdict.reasons[0].tag(), "dm_spread");
    }

    #[test]
    fn test_dm_spread_at_limit_is_accepted() {
        let recs = records(&[(0.0, 12.3456, 6.0), (100.0, 12.3456, 8.0)]);
        let index = ClusterIndex::build(&recs);
        let filter = filter_with(|c| c.max_dm_range = 100.0);

        assert!(filter.evaluate(&index.clusters()[0]).is_accepted());
    }

    #[test]
    fn test_limits_are_inclusive() {
        // (period, best sigma) pairs sitting exactly on one limit each
        let cases = [
            (0.5, 6.0, "min period"),
            (15000.0, 6.0, "max period"),
            (12.3456, 2.0, "min sigma"),
            (12.3456, 100.0, "max sigma"),
        ];

        for (period, sigma, limit) in cases {
            let recs = records(&[(10.0, period, sigma), (20.0, period, sigma)]);
            let index = ClusterIndex::build(&recs);
            let filter = filter_with(|c| {
                c.min_period_ms = 0.5;
                c.max_period_ms = 15000.0;
                c.min_sigma = 2.0;
                c.max_sigma = 100.0;
                c.min_detections = 2;
            });

            let verdict = filter.evaluate(&index.clusters()[0]);
            assert!(verdict.is_accepted(), "{}: {:?}", limit, verdict);
        }
    }

    #[test]
    fn test_just_outside_limits_is_rejected() {
        let cases = [
            (0.4999, 6.0, "period_range"),
            (15000.5, 6.0, "period_range"),
            (12.3456, 1.99, "sigma_low"),
            (12.3456, 100.01, "sigma_high"),
        ];

        for (period, sigma, tag) in cases {
            let recs = records(&[(10.0, period, sigma), (20.0, period, sigma)]);
            let index = ClusterIndex::build(&recs);
            let filter = filter_with(|_| {});

            let tags: Vec<&str> = filter
                .evaluate(&index.clusters()[0])
                .reasons
                .iter()
                .map(|r| r.tag())
                .collect();
            assert_eq!(tags, vec![tag], "period {} sigma {}", period, sigma);
        }
    }

    #[test]
    fn test_low_dm_cutoff_is_inclusive() {
        let recs = records(&[(2.0, 12.3456, 9.0), (5.0, 12.3456, 4.0)]);
        let index = ClusterIndex::build(&recs);
        let filter = filter_with(|c| c.low_dm_cutoff = Some(2.0));

        assert!(filter.evaluate(&index.clusters()[0]).is_accepted());
    }

    #[test]
    fn test_rejects_short_period_regardless_of_support() {
        let recs = records(&[
            (10.0, 0.00012, 9.0),
            (20.0, 0.00012, 9.0),
            (30.0, 0.00012, 9.0),
        ]);
        let index = ClusterIndex::build(&recs);
        let filter = filter_with(|c| c.min_period_ms = 0.5);

        let verdict = filter.evaluate(&index.clusters()[0]);
        assert_eq!(verdict.reasons.len(), 1);
        assert!(matches!(verdict.reasons[0], RejectReason::PeriodOutOfRange { .. }));
    }

    #[test]
    fn test_rejects_too_strong_signal() {
        let recs = records(&[(10.0, 12.3456, 6.0), (20.0, 12.3456, 250.0)]);
        let index = ClusterIndex::build(&recs);
        let filter = filter_with(|c| c.max_sigma = 100.0);

        let verdict = filter.evaluate(&index.clusters()[0]);
        assert_eq!(
            verdict.reasons,
            vec![RejectReason::SignificanceTooHigh {
                sigma: 250.0,
                limit: 100.0
            }]
        );
    }

    #[test]
    fn test_rejects_too_weak_signal() {
        let recs = records(&[(10.0, 12.3456, 1.0), (20.0, 12.3456, 1.5)]);
        let index = ClusterIndex::build(&recs);
        let filter = filter_with(|c| c.min_sigma = 2.0);

        let verdict = filter.evaluate(&index.clusters()[0]);
        assert_eq!(verdict.reasons[0].tag(), "sigma_low");
    }

    #[test]
    fn test_collects_all_failed_predicates() {
        let recs = records(&[(10.0, 0.1, 500.0)]);
        let index = ClusterIndex::build(&recs);
        let filter = filter_with(|_| {});

        let tags: Vec<&str> = filter
            .evaluate(&index.clusters()[0])
            .reasons
            .iter()
            .map(|r| r.tag())
            .collect();
        assert_eq!(tags, vec!["too_few_detections", "period_range", "sigma_high"]);
    }

    #[test]
    fn test_low_dm_cutoff_uses_representative() {
        let recs = records(&[(1.0, 12.3456, 9.0), (5.0, 12.3456, 4.0)]);
        let index = ClusterIndex::build(&recs);

        let filter = filter_with(|c| c.low_dm_cutoff = Some(2.0));
        let verdict = filter.evaluate(&index.clusters()[0]);
        assert_eq!(
            verdict.reasons,
            vec![RejectReason::BelowDmCutoff { dm: 1.0, cutoff: 2.0 }]
        );

        let filter = filter_with(|c| c.low_dm_cutoff = None);
        assert!(filter.evaluate(&index.clusters()[0]).is_accepted());
    }

    #[test]
    fn test_inverted_thresholds_fail_at_construction() {
        let mut criteria = SelectionConfig::default();
        criteria.min_sigma = 10.0;
        criteria.max_sigma = 5.0;
        assert!(ClusterFilter::new(criteria).is_err());
    }
}
