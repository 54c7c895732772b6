//! K-Means segmentation and cluster naming

use std::collections::{BTreeMap, HashSet};

use linfa::prelude::*;
use linfa::DatasetBase;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{SegmentationConfig, MAX_CLUSTERS};
use crate::error::{Result, SegmentationError};
use crate::rfm::{feature_matrix, RfmRecord};
use crate::scale::StandardScaler;

pub const VIP: &str = "VIP Customers";
pub const LOYAL: &str = "Loyal Customers";
pub const PROMISING: &str = "Promising Customers";
pub const AT_RISK: &str = "At-Risk Customers";
pub const SLEEPING: &str = "Sleeping Customers";

/// Segment names from best to worst rank for `populated` non-empty clusters.
pub fn segment_names(populated: usize) -> &'static [&'static str] {
    match populated {
        0 => &[],
        1 => &[VIP],
        2 => &[VIP, SLEEPING],
        3 => &[VIP, LOYAL, SLEEPING],
        4 => &[VIP, LOYAL, AT_RISK, SLEEPING],
        _ => &[VIP, LOYAL, PROMISING, AT_RISK, SLEEPING],
    }
}

/// Fitted K-Means partition of the scaled feature matrix
#[derive(Debug, Clone)]
pub struct KMeansModel {
    /// Number of clusters requested
    pub n_clusters: usize,
    /// Cluster index for every row of the training matrix
    pub labels: Array1<usize>,
    /// Cluster centroids in scaled space
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares
    pub inertia: f64,
}

impl KMeansModel {
    /// Get cluster sizes
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in self.labels.iter() {
            if label < self.n_clusters {
                sizes[label] += 1;
            }
        }
        sizes
    }
}

/// Partition the scaled features into `config.n_clusters` clusters.
///
/// Seeded from `config.seed`, so the same matrix and config always give the
/// same labels. Fails with `InsufficientData` when there are fewer rows than
/// clusters and `TooFewDistinctProfiles` when enough rows exist but fewer
/// distinct ones.
pub fn segment(features: &Array2<f64>, config: &SegmentationConfig) -> Result<KMeansModel> {
    config.validate()?;
    fit_kmeans(features, config.n_clusters, config)
}

fn fit_kmeans(
    features: &Array2<f64>,
    n_clusters: usize,
    config: &SegmentationConfig,
) -> Result<KMeansModel> {
    let n_samples = features.nrows();
    if n_samples < n_clusters {
        return Err(SegmentationError::InsufficientData {
            customers: n_samples,
            clusters: n_clusters,
        });
    }

    let profiles = count_distinct_rows(features);
    if profiles < n_clusters {
        return Err(SegmentationError::TooFewDistinctProfiles {
            profiles,
            clusters: n_clusters,
        });
    }

    let dataset = DatasetBase::from(features.clone());
    let rng = StdRng::seed_from_u64(config.seed);

    let model = KMeans::params_with(n_clusters, rng, L2Dist)
        .n_runs(config.n_runs)
        .max_n_iterations(config.max_iterations)
        .tolerance(config.tolerance)
        .fit(&dataset)?;

    let labels: Array1<usize> = model.predict(features);
    let centroids = model.centroids().clone();
    let inertia = compute_inertia(features, &labels, &centroids);

    debug!(n_clusters, inertia, "fitted k-means");

    Ok(KMeansModel {
        n_clusters,
        labels,
        centroids,
        inertia,
    })
}

/// Inertia for every `k` from 1 up to `max_k` (capped at the number of
/// distinct feature rows), using the seed and fit parameters of `config`.
pub fn elbow_curve(
    features: &Array2<f64>,
    max_k: usize,
    config: &SegmentationConfig,
) -> Result<Vec<(usize, f64)>> {
    config.validate_fit_params()?;
    let limit = max_k.min(count_distinct_rows(features));

    (1..=limit)
        .map(|k| fit_kmeans(features, k, config).map(|model| (k, model.inertia)))
        .collect()
}

/// Summary statistics and assigned name of one populated cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterProfile {
    /// Raw cluster index from K-Means
    pub cluster: usize,
    pub name: &'static str,
    /// 0 is the best segment
    pub rank: usize,
    pub customers: usize,
    pub mean_recency: f64,
    pub mean_frequency: f64,
    pub mean_monetary: f64,
    /// Standardised mean monetary minus standardised mean recency
    pub score: f64,
}

/// Rank the populated clusters and give each one a segment name.
///
/// Clusters are ordered by `score` (descending), then by mean frequency
/// (descending), then by the smallest customer id they contain. The raw
/// cluster index plays no part in the ordering.
pub fn profile_clusters(records: &[RfmRecord], labels: &[usize]) -> Result<Vec<ClusterProfile>> {
    if records.len() != labels.len() {
        return Err(SegmentationError::LabelMismatch {
            records: records.len(),
            labels: labels.len(),
        });
    }

    let mut groups: BTreeMap<usize, Vec<&RfmRecord>> = BTreeMap::new();
    for (record, &label) in records.iter().zip(labels) {
        groups.entry(label).or_default().push(record);
    }
    if groups.len() > MAX_CLUSTERS {
        return Err(SegmentationError::InvalidConfig(format!(
            "{} clusters exceed the {MAX_CLUSTERS} available segment names",
            groups.len()
        )));
    }

    let scaler = StandardScaler::fit(&feature_matrix(records))?;

    let mut ranked: Vec<(ClusterProfile, u64)> = groups
        .into_iter()
        .map(|(cluster, members)| {
            let count = members.len() as f64;
            let mean_recency = members.iter().map(|r| r.recency as f64).sum::<f64>() / count;
            let mean_frequency = members.iter().map(|r| r.frequency as f64).sum::<f64>() / count;
            let mean_monetary = members.iter().map(|r| r.monetary).sum::<f64>() / count;
            let z = scaler.transform_row(&[mean_recency, mean_frequency, mean_monetary]);
            let lead_customer = members.iter().map(|r| r.customer_id).min().unwrap_or(u64::MAX);

            let profile = ClusterProfile {
                cluster,
                name: VIP,
                rank: 0,
                customers: members.len(),
                mean_recency,
                mean_frequency,
                mean_monetary,
                score: z[2] - z[0],
            };
            (profile, lead_customer)
        })
        .collect();

    ranked.sort_by(|(a, a_lead), (b, b_lead)| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.mean_frequency.total_cmp(&a.mean_frequency))
            .then_with(|| a_lead.cmp(b_lead))
    });

    let names = segment_names(ranked.len());
    let profiles: Vec<ClusterProfile> = ranked
        .into_iter()
        .zip(names)
        .enumerate()
        .map(|(rank, ((mut profile, _), &name))| {
            profile.rank = rank;
            profile.name = name;
            profile
        })
        .collect();

    for profile in &profiles {
        info!(
            cluster = profile.cluster,
            segment = profile.name,
            customers = profile.customers,
            score = profile.score,
            "named cluster"
        );
    }

    Ok(profiles)
}

/// Segment name for every record, in record order.
pub fn name_clusters(records: &[RfmRecord], labels: &[usize]) -> Result<Vec<&'static str>> {
    let profiles = profile_clusters(records, labels)?;
    let by_cluster: BTreeMap<usize, &'static str> =
        profiles.iter().map(|p| (p.cluster, p.name)).collect();

    Ok(labels.iter().map(|label| by_cluster[label]).collect())
}

/// Warn about clusters K-Means left without members.
pub(crate) fn report_empty_clusters(model: &KMeansModel) {
    for (cluster, size) in model.cluster_sizes().into_iter().enumerate() {
        if size == 0 {
            warn!(cluster, "k-means produced an empty cluster");
        }
    }
}

/// Compute within-cluster sum of squares (inertia)
fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    let mut inertia = 0.0;

    for (i, &cluster) in labels.iter().enumerate() {
        if cluster < centroids.nrows() {
            let point = features.row(i);
            let centroid = centroids.row(cluster);
            let distance_sq = point
                .iter()
                .zip(centroid.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>();
            inertia += distance_sq;
        }
    }

    inertia
}

fn count_distinct_rows(features: &Array2<f64>) -> usize {
    features
        .outer_iter()
        .map(|row| row.iter().map(|v| (v + 0.0).to_bits()).collect::<Vec<u64>>())
        .collect::<HashSet<_>>()
        .len()
}
