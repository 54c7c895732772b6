//! Command-line interface definitions and argument parsing

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

use crate::config::SegmentationConfig;

/// Customer segmentation CLI using K-Means clustering on RFM data
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input CSV file
    #[arg(short, long, default_value = "data.csv")]
    pub input: String,

    /// JSON file with segmentation settings; flags below override it
    #[arg(short, long, env = "RFM_SEGMENTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of clusters for K-Means
    #[arg(short = 'k', long)]
    pub clusters: Option<usize>,

    /// Seed for the K-Means initialisation
    #[arg(long)]
    pub seed: Option<u64>,

    /// Maximum iterations for K-Means algorithm
    #[arg(long)]
    pub max_iters: Option<u64>,

    /// Tolerance for K-Means convergence
    #[arg(long)]
    pub tolerance: Option<f64>,

    /// Number of K-Means restarts
    #[arg(long)]
    pub n_runs: Option<usize>,

    /// Directory to write rfm.csv, transactions.csv and cluster_summary.csv
    #[arg(short, long)]
    pub export_dir: Option<PathBuf>,

    /// Output path for the segment scatter plot (PNG)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Also compute the elbow curve for k = 1..=N
    #[arg(long, value_name = "N")]
    pub elbow_max_k: Option<usize>,

    /// Show RFM values and transactions for one customer
    #[arg(long, value_name = "CUSTOMER_ID")]
    pub customer: Option<u64>,

    /// Print the cluster summary as JSON instead of a table
    #[arg(long)]
    pub json: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Build the run configuration: defaults, then the config file, then flags.
    pub fn segmentation_config(&self) -> anyhow::Result<SegmentationConfig> {
        let mut config = match &self.config {
            Some(path) => SegmentationConfig::from_json_file(path)?,
            None => SegmentationConfig::default(),
        };

        if let Some(clusters) = self.clusters {
            config.n_clusters = clusters;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(max_iters) = self.max_iters {
            config.max_iterations = max_iters;
        }
        if let Some(tolerance) = self.tolerance {
            config.tolerance = tolerance;
        }
        if let Some(n_runs) = self.n_runs {
            config.n_runs = n_runs;
        }

        config.validate()?;
        Ok(config)
    }

    /// Log filter for the verbosity flags; `RUST_LOG` wins when set.
    pub fn log_filter(&self) -> EnvFilter {
        let level = match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        };
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    }
}
