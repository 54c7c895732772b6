//! rfm-segmenter: customer segmentation from retail transactions
//!
//! Cleans raw transaction rows, reduces them to Recency, Frequency and
//! Monetary features per customer, clusters the standardised features with
//! K-Means and names each cluster by ranking its statistics.

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod rfm;
pub mod scale;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use config::SegmentationConfig;
pub use data::{
    load_transactions_csv, normalize, CanonicalTransaction, RawInvoiceDate, RawTransaction,
};
pub use error::{Result, SegmentationError};
pub use model::{elbow_curve, name_clusters, profile_clusters, segment, ClusterProfile, KMeansModel};
pub use pipeline::{
    run, run_frame, ClusterSummary, CustomerSegment, EnrichedTransaction, SegmentationOutcome,
};
pub use rfm::{aggregate, RfmRecord};
pub use scale::{fit_scale, StandardScaler};
