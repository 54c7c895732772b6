//! Error taxonomy for the segmentation pipeline

use linfa_clustering::KMeansError;
use polars::prelude::PolarsError;
use thiserror::Error;

/// Dataset-level failures surfaced to the caller.
///
/// Per-row problems (bad dates, missing prices, negative quantities) never
/// show up here; the normalizer filters those rows out.
#[derive(Debug, Error)]
pub enum SegmentationError {
    #[error("no transactions left after cleaning")]
    NoData,
    #[error("{customers} customer(s) cannot be split into {clusters} clusters")]
    InsufficientData { customers: usize, clusters: usize },
    #[error("only {profiles} distinct RFM profile(s) to split into {clusters} clusters")]
    TooFewDistinctProfiles { profiles: usize, clusters: usize },
    #[error("input table is missing required column(s): {}", missing.join(", "))]
    MalformedInput { missing: Vec<String> },
    #[error("got {labels} cluster labels for {records} customers")]
    LabelMismatch { records: usize, labels: usize },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Frame(#[from] PolarsError),
    #[error("k-means fit failed: {0}")]
    Clustering(#[from] KMeansError),
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, SegmentationError>;
