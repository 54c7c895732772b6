//! Property tests for the cleaning and aggregation invariants

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use rfm_segmenter::{
    aggregate, fit_scale, name_clusters, normalize, run, segment, RawInvoiceDate, RawTransaction,
    SegmentationConfig, SegmentationError,
};

fn raw_transaction() -> impl Strategy<Value = RawTransaction> {
    (
        0u32..30,
        0usize..4,
        -3i64..20,
        0i64..(400 * 24),
        prop::option::of(0u32..12),
        -5.0f64..200.0,
        prop::bool::weighted(0.05),
    )
        .prop_map(|(invoice, stock, quantity, hours, customer, price, bad_date)| {
            let base = NaiveDate::from_ymd_opt(2011, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap();
            let date = if bad_date {
                "not a date".to_string()
            } else {
                (base + Duration::hours(hours))
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            };

            RawTransaction {
                invoice_no: format!("{}", 536000 + invoice),
                stock_code: ["85123A", "71053", "22633", "84406B"][stock].to_string(),
                description: "ITEM".to_string(),
                quantity: Some(quantity),
                invoice_date: Some(RawInvoiceDate::Text(date)),
                unit_price: Some((price * 100.0).round() / 100.0),
                customer_id: customer.map(f64::from),
                country: None,
            }
        })
}

fn transactions() -> impl Strategy<Value = Vec<RawTransaction>> {
    prop::collection::vec(raw_transaction(), 0..80)
}

proptest! {
    #[test]
    fn canonical_rows_hold_invariants(rows in transactions()) {
        for tx in normalize(&rows) {
            prop_assert!(tx.quantity > 0);
            prop_assert!(tx.unit_price > 0.0);
            prop_assert!(tx.line_total > 0.0);
        }
    }

    #[test]
    fn rfm_records_hold_invariants(rows in transactions()) {
        let canonical = normalize(&rows);
        prop_assume!(!canonical.is_empty());

        let (records, reference_date) = aggregate(&canonical).unwrap();
        for record in &records {
            prop_assert!(record.recency >= 1);
            prop_assert!(record.frequency >= 1);
            prop_assert!(record.monetary > 0.0);
        }
        prop_assert!(canonical.iter().all(|tx| tx.invoice_date < reference_date));
    }

    #[test]
    fn normalize_is_idempotent(rows in transactions()) {
        let once = normalize(&rows);
        let again: Vec<RawTransaction> = once.iter().map(RawTransaction::from).collect();
        prop_assert_eq!(normalize(&again), once);
    }

    #[test]
    fn scaled_features_are_finite(rows in transactions()) {
        let canonical = normalize(&rows);
        prop_assume!(!canonical.is_empty());

        let (records, _) = aggregate(&canonical).unwrap();
        let (scaled, _) = fit_scale(&records).unwrap();
        prop_assert!(scaled.iter().all(|v| v.is_finite()));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn pipeline_tables_are_consistent(rows in transactions()) {
        match run(&rows, &SegmentationConfig::default()) {
            Ok(outcome) => {
                let total: usize = outcome.summary.iter().map(|s| s.customer_count).sum();
                prop_assert_eq!(total, outcome.rfm_table.len());
                prop_assert_eq!(outcome.transactions.len(), normalize(&rows).len());
                prop_assert!(outcome.transactions.iter().all(|tx| !tx.cluster_name.is_empty()));
                for pair in outcome.summary.windows(2) {
                    prop_assert!(pair[0].customer_count >= pair[1].customer_count);
                }
            }
            Err(SegmentationError::NoData)
            | Err(SegmentationError::InsufficientData { .. })
            | Err(SegmentationError::TooFewDistinctProfiles { .. }) => {}
            Err(other) => prop_assert!(false, "unexpected error: {other}"),
        }
    }

    #[test]
    fn segmentation_is_deterministic(rows in transactions()) {
        let canonical = normalize(&rows);
        prop_assume!(!canonical.is_empty());
        let (records, _) = aggregate(&canonical).unwrap();
        let (scaled, _) = fit_scale(&records).unwrap();
        let config = SegmentationConfig::default();

        if let Ok(first) = segment(&scaled, &config) {
            let second = segment(&scaled, &config).unwrap();
            prop_assert_eq!(&first.labels, &second.labels);

            let labels = first.labels.to_vec();
            let names_first = name_clusters(&records, &labels).unwrap();
            let names_second = name_clusters(&records, &second.labels.to_vec()).unwrap();
            prop_assert_eq!(&names_first, &names_second);

            // relabelling the clusters must not change the names
            let shifted: Vec<usize> = labels.iter().map(|l| (l + 1) % config.n_clusters).collect();
            prop_assert_eq!(name_clusters(&records, &shifted).unwrap(), names_first);
        }
    }
}
