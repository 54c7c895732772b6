//! Run configuration for the segmentation pipeline

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, SegmentationError};

/// Largest cluster count the segment vocabulary can name.
pub const MAX_CLUSTERS: usize = 5;

/// Parameters for one pipeline run.
///
/// Every field has a default, so a config file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Number of clusters for K-Means
    pub n_clusters: usize,
    /// Seed for the K-Means initialisation RNG
    pub seed: u64,
    /// Maximum Lloyd iterations per run
    pub max_iterations: u64,
    /// Convergence tolerance on centroid movement
    pub tolerance: f64,
    /// Number of restarts; the lowest-inertia run wins
    pub n_runs: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            n_clusters: 3,
            seed: 42,
            max_iterations: 300,
            tolerance: 1e-4,
            n_runs: 10,
        }
    }
}

impl SegmentationConfig {
    /// Config with the default parameters and the given cluster count.
    pub fn with_clusters(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            ..Self::default()
        }
    }

    /// Read a JSON config file; missing keys fall back to defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject parameter combinations K-Means cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_CLUSTERS).contains(&self.n_clusters) {
            return Err(SegmentationError::InvalidConfig(format!(
                "n_clusters must be between 1 and {MAX_CLUSTERS}, got {}",
                self.n_clusters
            )));
        }
        self.validate_fit_params()
    }

    /// Check everything except the cluster count.
    pub fn validate_fit_params(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(SegmentationError::InvalidConfig(
                "max_iterations must be positive".to_string(),
            ));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(SegmentationError::InvalidConfig(format!(
                "tolerance must be a positive number, got {}",
                self.tolerance
            )));
        }
        if self.n_runs == 0 {
            return Err(SegmentationError::InvalidConfig(
                "n_runs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
