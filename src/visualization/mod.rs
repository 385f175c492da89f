//! Plot data for the DM-vs-significance diagnostic of accepted clusters.
//!
//! This module only prepares the numbers; rendering is done by an external
//! plotting tool that reads the exported series.

use crate::processors::clustering::Cluster;
use crate::processors::selection::select_representative;

/// One member detection of a cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub dm: f64,
    pub sigma: f64,
    pub period_ms: f64,
    /// Whether this detection is the cluster's representative
    pub representative: bool,
}

/// DM-vs-significance curve of one accepted cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct DmSigmaSeries {
    pub cluster_id: usize,
    /// Base file name, unique per cluster
    pub name: String,
    pub representative_dm: f64,
    pub representative_sigma: f64,
    pub zmax: Option<u32>,
    pub wmax: Option<u32>,
    /// Member detections sorted by DM
    pub points: Vec<SeriesPoint>,
}

impl DmSigmaSeries {
    /// Period range covered by the members, for colour scaling.
    pub fn period_range(&self) -> Option<(f64, f64)> {
        if self.points.is_empty() {
            return None;
        }
        let min = self.points.iter().map(|p| p.period_ms).fold(f64::INFINITY, f64::min);
        let max = self
            .points
            .iter()
            .map(|p| p.period_ms)
            .fold(f64::NEG_INFINITY, f64::max);
        Some((min, max))
    }
}

/// Collect the series of one cluster.
///
/// Points are sorted by DM (stable, so equal DMs keep parse order). Returns
/// `None` for an empty cluster.
pub fn build_series(cluster: &Cluster<'_>) -> Option<DmSigmaSeries> {
    let best = select_representative(cluster)?;

    let mut points: Vec<SeriesPoint> = cluster
        .members()
        .iter()
        .map(|r| SeriesPoint {
            dm: r.dm_trial,
            sigma: r.significance,
            period_ms: r.period_ms,
            representative: std::ptr::eq(*r, best),
        })
        .collect();
    points.sort_by(|a, b| a.dm.total_cmp(&b.dm));

    Some(DmSigmaSeries {
        cluster_id: cluster.id(),
        name: format!(
            "cluster_{}_DM{}_Cand_{}",
            cluster.id(),
            best.dm_label,
            best.candidate_index
        ),
        representative_dm: best.dm_trial,
        representative_sigma: best.significance,
        zmax: best.zmax,
        wmax: best.wmax,
        points,
    })
}
