//! End-to-end segmentation: raw table in, segmented tables out

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use chrono::NaiveDateTime;
use polars::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::config::SegmentationConfig;
use crate::data::{normalize, CanonicalTransaction, RawTransaction};
use crate::error::{Result, SegmentationError};
use crate::model::{
    elbow_curve, profile_clusters, report_empty_clusters, segment, ClusterProfile,
};
use crate::rfm::{aggregate, RfmRecord};
use crate::scale::fit_scale;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One row of the RFM table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerSegment {
    pub customer_id: u64,
    pub recency: i64,
    pub frequency: usize,
    pub monetary: f64,
    pub cluster: usize,
    pub cluster_name: &'static str,
}

/// A canonical transaction with its customer's RFM values and segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedTransaction {
    #[serde(flatten)]
    pub transaction: CanonicalTransaction,
    pub recency: i64,
    pub frequency: usize,
    pub monetary: f64,
    pub cluster: usize,
    pub cluster_name: &'static str,
}

/// Per-segment averages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub cluster_name: &'static str,
    pub mean_recency: f64,
    pub mean_frequency: f64,
    pub mean_monetary: f64,
    pub customer_count: usize,
}

impl From<&CustomerSegment> for RfmRecord {
    fn from(row: &CustomerSegment) -> Self {
        RfmRecord {
            customer_id: row.customer_id,
            recency: row.recency,
            frequency: row.frequency,
            monetary: row.monetary,
        }
    }
}

impl From<&ClusterProfile> for ClusterSummary {
    fn from(profile: &ClusterProfile) -> Self {
        ClusterSummary {
            cluster_name: profile.name,
            mean_recency: profile.mean_recency,
            mean_frequency: profile.mean_frequency,
            mean_monetary: profile.mean_monetary,
            customer_count: profile.customers,
        }
    }
}

/// Everything one pipeline run produces.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentationOutcome {
    /// One row per customer, sorted by customer id
    pub rfm_table: Vec<CustomerSegment>,
    /// Canonical transactions in input order
    pub transactions: Vec<EnrichedTransaction>,
    /// Sorted by descending customer count
    pub summary: Vec<ClusterSummary>,
    pub reference_date: NaiveDateTime,
    /// Within-cluster sum of squares of the final partition
    pub inertia: f64,
}

/// Run the pipeline on a table, checking its columns first.
pub fn run_frame(df: &DataFrame, config: &SegmentationConfig) -> Result<SegmentationOutcome> {
    let raw = RawTransaction::from_frame(df)?;
    run(&raw, config)
}

/// Clean, aggregate, scale, cluster and name.
///
/// Fails with `NoData` when cleaning leaves nothing, `InsufficientData`
/// when there are fewer customers than clusters, `TooFewDistinctProfiles`
/// when too many customers share the same RFM values.
pub fn run(raw: &[RawTransaction], config: &SegmentationConfig) -> Result<SegmentationOutcome> {
    config.validate()?;

    let canonical = normalize(raw);
    if canonical.is_empty() {
        return Err(SegmentationError::NoData);
    }
    info!(
        input = raw.len(),
        canonical = canonical.len(),
        "cleaned transactions"
    );

    let (records, reference_date) = aggregate(&canonical)?;
    info!(customers = records.len(), %reference_date, "computed rfm features");

    let (scaled, _) = fit_scale(&records)?;
    let model = segment(&scaled, config)?;
    report_empty_clusters(&model);

    let labels = model.labels.to_vec();
    let profiles = profile_clusters(&records, &labels)?;
    let names: HashMap<usize, &'static str> =
        profiles.iter().map(|p| (p.cluster, p.name)).collect();

    // every label has a profile and every canonical row has a record
    let rfm_table: Vec<CustomerSegment> = records
        .iter()
        .zip(&labels)
        .map(|(record, &cluster)| CustomerSegment {
            customer_id: record.customer_id,
            recency: record.recency,
            frequency: record.frequency,
            monetary: record.monetary,
            cluster,
            cluster_name: names[&cluster],
        })
        .collect();

    let by_customer: HashMap<u64, &CustomerSegment> =
        rfm_table.iter().map(|row| (row.customer_id, row)).collect();
    let transactions: Vec<EnrichedTransaction> = canonical
        .into_iter()
        .map(|transaction| {
            let customer = by_customer[&transaction.customer_id];
            EnrichedTransaction {
                recency: customer.recency,
                frequency: customer.frequency,
                monetary: customer.monetary,
                cluster: customer.cluster,
                cluster_name: customer.cluster_name,
                transaction,
            }
        })
        .collect();

    let mut ordered: Vec<&ClusterProfile> = profiles.iter().collect();
    ordered.sort_by(|a, b| b.customers.cmp(&a.customers).then(a.rank.cmp(&b.rank)));
    let summary: Vec<ClusterSummary> = ordered.into_iter().map(ClusterSummary::from).collect();

    info!(
        segments = summary.len(),
        inertia = model.inertia,
        "segmentation complete"
    );

    Ok(SegmentationOutcome {
        rfm_table,
        transactions,
        summary,
        reference_date,
        inertia: model.inertia,
    })
}

impl SegmentationOutcome {
    /// Segment of one customer, if present.
    pub fn customer(&self, customer_id: u64) -> Option<&CustomerSegment> {
        self.rfm_table
            .binary_search_by_key(&customer_id, |row| row.customer_id)
            .ok()
            .map(|i| &self.rfm_table[i])
    }

    /// Transactions of one customer, in input order.
    pub fn customer_transactions(&self, customer_id: u64) -> Vec<&EnrichedTransaction> {
        self.transactions
            .iter()
            .filter(|tx| tx.transaction.customer_id == customer_id)
            .collect()
    }

    /// Elbow diagnostic over this run's customers.
    pub fn elbow_curve(
        &self,
        max_k: usize,
        config: &SegmentationConfig,
    ) -> Result<Vec<(usize, f64)>> {
        let records: Vec<RfmRecord> = self.rfm_table.iter().map(RfmRecord::from).collect();
        let (scaled, _) = fit_scale(&records)?;
        elbow_curve(&scaled, max_k, config)
    }

    /// RFM table as a `DataFrame`.
    pub fn rfm_frame(&self) -> Result<DataFrame> {
        let rows = &self.rfm_table;
        let df = DataFrame::new(vec![
            Series::new("CustomerID", rows.iter().map(|r| r.customer_id).collect::<Vec<u64>>()),
            Series::new("Recency", rows.iter().map(|r| r.recency).collect::<Vec<i64>>()),
            Series::new("Frequency", rows.iter().map(|r| r.frequency as u64).collect::<Vec<u64>>()),
            Series::new("Monetary", rows.iter().map(|r| r.monetary).collect::<Vec<f64>>()),
            Series::new("Cluster", rows.iter().map(|r| r.cluster as u64).collect::<Vec<u64>>()),
            Series::new("ClusterName", rows.iter().map(|r| r.cluster_name).collect::<Vec<&str>>()),
        ])?;
        Ok(df)
    }

    /// Enriched transactions as a `DataFrame`.
    pub fn transactions_frame(&self) -> Result<DataFrame> {
        let rows = &self.transactions;
        let tx = |f: fn(&CanonicalTransaction) -> String| -> Vec<String> {
            rows.iter().map(|r| f(&r.transaction)).collect()
        };

        let df = DataFrame::new(vec![
            Series::new("InvoiceNo", tx(|t| t.invoice_no.clone())),
            Series::new("StockCode", tx(|t| t.stock_code.clone())),
            Series::new("Description", tx(|t| t.description.clone())),
            Series::new("Quantity", rows.iter().map(|r| r.transaction.quantity).collect::<Vec<i64>>()),
            Series::new("InvoiceDate", tx(|t| t.invoice_date.format(DATE_FORMAT).to_string())),
            Series::new("UnitPrice", rows.iter().map(|r| r.transaction.unit_price).collect::<Vec<f64>>()),
            Series::new("CustomerID", rows.iter().map(|r| r.transaction.customer_id).collect::<Vec<u64>>()),
            Series::new(
                "Country",
                rows.iter()
                    .map(|r| r.transaction.country.as_deref())
                    .collect::<Vec<Option<&str>>>(),
            ),
            Series::new("TotalPrice", rows.iter().map(|r| r.transaction.line_total).collect::<Vec<f64>>()),
            Series::new("Recency", rows.iter().map(|r| r.recency).collect::<Vec<i64>>()),
            Series::new("Frequency", rows.iter().map(|r| r.frequency as u64).collect::<Vec<u64>>()),
            Series::new("Monetary", rows.iter().map(|r| r.monetary).collect::<Vec<f64>>()),
            Series::new("Cluster", rows.iter().map(|r| r.cluster as u64).collect::<Vec<u64>>()),
            Series::new("ClusterName", rows.iter().map(|r| r.cluster_name).collect::<Vec<&str>>()),
        ])?;
        Ok(df)
    }

    /// Cluster summary as a `DataFrame`.
    pub fn summary_frame(&self) -> Result<DataFrame> {
        let rows = &self.summary;
        let df = DataFrame::new(vec![
            Series::new("ClusterName", rows.iter().map(|r| r.cluster_name).collect::<Vec<&str>>()),
            Series::new("RecencyMean", rows.iter().map(|r| r.mean_recency).collect::<Vec<f64>>()),
            Series::new("FrequencyMean", rows.iter().map(|r| r.mean_frequency).collect::<Vec<f64>>()),
            Series::new("MonetaryMean", rows.iter().map(|r| r.mean_monetary).collect::<Vec<f64>>()),
            Series::new(
                "CustomerCount",
                rows.iter().map(|r| r.customer_count as u64).collect::<Vec<u64>>(),
            ),
        ])?;
        Ok(df)
    }

    /// Write `rfm.csv`, `transactions.csv` and `cluster_summary.csv` into `dir`.
    pub fn export_csv(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        write_csv(&mut self.rfm_frame()?, &dir.join("rfm.csv"))?;
        write_csv(&mut self.transactions_frame()?, &dir.join("transactions.csv"))?;
        write_csv(&mut self.summary_frame()?, &dir.join("cluster_summary.csv"))?;

        info!(dir = %dir.display(), "exported segmentation tables");
        Ok(())
    }
}

fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}
