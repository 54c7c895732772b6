//! Per-customer Recency, Frequency, Monetary aggregation

use std::collections::{BTreeMap, HashSet};

use chrono::{Duration, NaiveDateTime};
use ndarray::Array2;
use serde::Serialize;
use tracing::debug;

use crate::data::CanonicalTransaction;
use crate::error::{Result, SegmentationError};

/// RFM features of one customer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RfmRecord {
    pub customer_id: u64,
    /// Whole days from the last purchase to the reference date (always >= 1)
    pub recency: i64,
    /// Distinct invoices
    pub frequency: usize,
    /// Sum of line totals
    pub monetary: f64,
}

impl RfmRecord {
    /// Features as `[recency, frequency, monetary]`.
    pub fn features(&self) -> [f64; 3] {
        [self.recency as f64, self.frequency as f64, self.monetary]
    }
}

#[derive(Default)]
struct CustomerAccumulator<'a> {
    last_purchase: Option<NaiveDateTime>,
    invoices: HashSet<&'a str>,
    monetary: f64,
}

/// Reduce canonical transactions to one RFM record per customer.
///
/// The reference date is one day after the latest invoice in the whole set.
/// Records come back sorted by customer id.
pub fn aggregate(
    transactions: &[CanonicalTransaction],
) -> Result<(Vec<RfmRecord>, NaiveDateTime)> {
    let latest = transactions
        .iter()
        .map(|tx| tx.invoice_date)
        .max()
        .ok_or(SegmentationError::NoData)?;
    let reference_date = latest + Duration::days(1);

    let mut customers: BTreeMap<u64, CustomerAccumulator<'_>> = BTreeMap::new();
    for tx in transactions {
        let acc = customers.entry(tx.customer_id).or_default();
        acc.last_purchase = acc.last_purchase.max(Some(tx.invoice_date));
        acc.invoices.insert(tx.invoice_no.as_str());
        acc.monetary += tx.line_total;
    }

    let records: Vec<RfmRecord> = customers
        .into_iter()
        .filter_map(|(customer_id, acc)| {
            let last_purchase = acc.last_purchase?;
            Some(RfmRecord {
                customer_id,
                recency: (reference_date - last_purchase).num_days(),
                frequency: acc.invoices.len(),
                monetary: acc.monetary,
            })
        })
        .collect();

    debug!(
        customers = records.len(),
        %reference_date,
        "aggregated rfm records"
    );

    Ok((records, reference_date))
}

/// Stack records into an `(n, 3)` matrix of raw features.
pub fn feature_matrix(records: &[RfmRecord]) -> Array2<f64> {
    Array2::from_shape_fn((records.len(), 3), |(i, j)| records[i].features()[j])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn tx(invoice: &str, customer: u64, date: (i32, u32, u32, u32), total: f64) -> CanonicalTransaction {
        let (y, m, d, h) = date;
        CanonicalTransaction {
            invoice_no: invoice.to_string(),
            stock_code: "22633".to_string(),
            description: "HAND WARMER UNION JACK".to_string(),
            quantity: 1,
            invoice_date: NaiveDate::from_ymd_opt(y, m, d)
                .unwrap()
                .and_hms_opt(h, 0, 0)
                .unwrap(),
            unit_price: total,
            customer_id: customer,
            country: None,
            line_total: total,
        }
    }

    #[test]
    fn test_aggregate_rfm() {
        let transactions = vec![
            tx("536365", 17850, (2010, 12, 1, 8), 15.30),
            tx("536365", 17850, (2010, 12, 1, 8), 20.34),
            tx("536366", 17850, (2010, 12, 3, 9), 11.10),
            tx("536367", 13047, (2010, 12, 10, 12), 22.00),
        ];

        let (records, reference_date) = aggregate(&transactions).unwrap();

        assert_eq!(
            reference_date,
            NaiveDate::from_ymd_opt(2010, 12, 11)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap()
        );
        assert_eq!(records.len(), 2);

        // sorted by customer id
        assert_eq!(records[0].customer_id, 13047);
        assert_eq!(records[0].recency, 1);
        assert_eq!(records[0].frequency, 1);

        assert_eq!(records[1].customer_id, 17850);
        // 2010-12-03 09:00 -> 2010-12-11 12:00 is 8 days and 3 hours
        assert_eq!(records[1].recency, 8);
        assert_eq!(records[1].frequency, 2);
        assert!((records[1].monetary - 46.74).abs() < 1e-9);
    }

    #[test]
    fn test_recency_truncates_partial_days() {
        let transactions = vec![
            tx("1", 1, (2011, 1, 1, 0), 1.0),
            tx("2", 2, (2011, 1, 1, 23), 1.0),
        ];

        let (records, _) = aggregate(&transactions).unwrap();
        // 47 hours before the reference date
        assert_eq!(records[0].recency, 1);
        assert_eq!(records[1].recency, 1);
    }

    #[test]
    fn test_aggregate_empty_is_no_data() {
        assert!(matches!(aggregate(&[]), Err(SegmentationError::NoData)));
    }

    #[test]
    fn test_feature_matrix_layout() {
        let records = vec![
            RfmRecord { customer_id: 1, recency: 5, frequency: 2, monetary: 100.0 },
            RfmRecord { customer_id: 2, recency: 40, frequency: 1, monetary: 12.5 },
        ];

        let matrix = feature_matrix(&records);
        assert_eq!(matrix.shape(), &[2, 3]);
        assert_eq!(matrix[[1, 0]], 40.0);
        assert_eq!(matrix[[0, 1]], 2.0);
        assert_eq!(matrix[[1, 2]], 12.5);
    }
}
