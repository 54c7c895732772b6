//! Integration tests for rfm-segmenter

use rfm_segmenter::{
    load_transactions_csv, run_frame, SegmentationConfig, SegmentationError,
};
use std::collections::HashSet;
use std::io::Write;
use tempfile::NamedTempFile;

const HEADER: &str = "InvoiceNo,StockCode,Description,Quantity,InvoiceDate,UnitPrice,CustomerID,Country";

/// Create a test CSV file with sample data
fn create_test_csv() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{HEADER}").unwrap();

    // Customer 17850 - frequent, recent, big spender
    writeln!(file, "536365,85123A,WHITE HANGING HEART T-LIGHT HOLDER,60,2011-11-20 08:26:00,2.55,17850,United Kingdom").unwrap();
    writeln!(file, "536366,71053,WHITE METAL LANTERN,60,2011-12-01 08:26:00,3.39,17850,United Kingdom").unwrap();
    writeln!(file, "536367,22633,HAND WARMER UNION JACK,60,2011-12-08 08:28:00,1.85,17850,United Kingdom").unwrap();
    // exact duplicate line, dropped
    writeln!(file, "536367,22633,HAND WARMER UNION JACK,60,2011-12-08 08:28:00,1.85,17850,United Kingdom").unwrap();

    // Customer 12345 - recent, medium value
    writeln!(file, "536368,22752,SET 7 BABUSHKA NESTING BOXES,2,2011-11-05 10:15:00,7.65,12345,France").unwrap();
    writeln!(file, "536369,21730,GLASS STAR FROSTED T-LIGHT HOLDER,12,2011-11-25 10:15:00,1.25,12345,France").unwrap();

    // Customer 13047 - single purchase long ago
    writeln!(file, "536370,84406B,CREAM CUPID HEARTS COAT HANGER,1,2010-12-01 08:34:00,2.75,13047,United Kingdom").unwrap();

    // Customer 98765 - old low value
    writeln!(file, "536371,22457,NATURAL SLATE HEART CHALKBOARD,1,2010-01-15 09:00:00,3.25,98765,United Kingdom").unwrap();

    // Rows the cleaner must drop
    writeln!(file, "C536372,D,Discount,-1,2011-12-09 09:41:00,27.50,14527,United Kingdom").unwrap();
    writeln!(file, "536373,22139,RETROSPOT TEA SET,3,2011-12-09 10:00:00,4.95,,United Kingdom").unwrap();
    writeln!(file, "536374,POST,POSTAGE,1,2011-12-09 11:00:00,0.0,12583,France").unwrap();
    writeln!(file, "536375,22423,REGENCY CAKESTAND,1,yesterday,12.75,12583,France").unwrap();

    file
}

#[test]
fn test_end_to_end_pipeline() {
    let test_file = create_test_csv();
    let df = load_transactions_csv(test_file.path()).unwrap();

    let outcome = run_frame(&df, &SegmentationConfig::default()).unwrap();

    // 4 unique customers survive cleaning
    assert_eq!(outcome.rfm_table.len(), 4);
    // 7 canonical lines (duplicate and invalid rows removed)
    assert_eq!(outcome.transactions.len(), 7);

    // the reference date is one day after the last surviving invoice
    assert_eq!(
        outcome.reference_date.to_string(),
        "2011-12-09 08:28:00"
    );

    for row in &outcome.rfm_table {
        assert!(row.recency >= 1);
        assert!(row.frequency >= 1);
        assert!(row.monetary > 0.0);
        assert!(row.cluster < 3);
    }

    let big = outcome.customer(17850).unwrap();
    assert_eq!(big.recency, 1);
    assert_eq!(big.frequency, 3);

    let total: usize = outcome.summary.iter().map(|s| s.customer_count).sum();
    assert_eq!(total, 4);

    let names: HashSet<&str> = outcome.rfm_table.iter().map(|r| r.cluster_name).collect();
    assert_eq!(names.len(), 3);
    assert_eq!(big.cluster_name, "VIP Customers");
    assert_eq!(outcome.customer(98765).unwrap().cluster_name, "Sleeping Customers");
}

#[test]
fn test_repeated_runs_are_identical() {
    let test_file = create_test_csv();
    let df = load_transactions_csv(test_file.path()).unwrap();
    let config = SegmentationConfig::default();

    let first = run_frame(&df, &config).unwrap();
    let second = run_frame(&df, &config).unwrap();

    assert_eq!(first.rfm_table, second.rfm_table);
    assert_eq!(first.summary, second.summary);
}

#[test]
fn test_every_transaction_has_a_segment() {
    let test_file = create_test_csv();
    let df = load_transactions_csv(test_file.path()).unwrap();

    let outcome = run_frame(&df, &SegmentationConfig::default()).unwrap();
    let frame = outcome.transactions_frame().unwrap();

    assert_eq!(frame.height(), outcome.transactions.len());
    assert_eq!(frame.column("ClusterName").unwrap().null_count(), 0);
    assert!(outcome
        .transactions
        .iter()
        .all(|tx| !tx.cluster_name.is_empty()));
}

#[test]
fn test_missing_customer_column_is_malformed() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "InvoiceNo,StockCode,Description,Quantity,InvoiceDate,UnitPrice").unwrap();
    writeln!(file, "536365,85123A,WHITE HANGING HEART T-LIGHT HOLDER,6,2010-12-01 08:26:00,2.55").unwrap();

    let df = load_transactions_csv(file.path()).unwrap();
    match run_frame(&df, &SegmentationConfig::default()) {
        Err(SegmentationError::MalformedInput { missing }) => {
            assert_eq!(missing, vec!["CustomerID".to_string()]);
        }
        other => panic!("expected MalformedInput, got {other:?}"),
    }
}

#[test]
fn test_all_returns_is_no_data() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{HEADER}").unwrap();
    writeln!(file, "C536379,D,Discount,-1,2010-12-01 09:41:00,27.5,14527,United Kingdom").unwrap();
    writeln!(file, "C536380,22556,PLASTERS IN TIN CIRCUS PARADE,-12,2010-12-01 09:49:00,1.65,17548,United Kingdom").unwrap();

    let df = load_transactions_csv(file.path()).unwrap();
    assert!(matches!(
        run_frame(&df, &SegmentationConfig::default()),
        Err(SegmentationError::NoData)
    ));
}

#[test]
fn test_two_customers_is_insufficient() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{HEADER}").unwrap();
    writeln!(file, "536365,85123A,WHITE HANGING HEART T-LIGHT HOLDER,6,2010-12-01 08:26:00,2.55,17850,United Kingdom").unwrap();
    writeln!(file, "536367,84406B,CREAM CUPID HEARTS COAT HANGER,8,2010-12-01 08:34:00,2.75,13047,United Kingdom").unwrap();

    let df = load_transactions_csv(file.path()).unwrap();
    assert!(matches!(
        run_frame(&df, &SegmentationConfig::default()),
        Err(SegmentationError::InsufficientData { customers: 2, clusters: 3 })
    ));
}

#[test]
fn test_two_clusters() {
    let test_file = create_test_csv();
    let df = load_transactions_csv(test_file.path()).unwrap();

    let outcome = run_frame(&df, &SegmentationConfig::with_clusters(2)).unwrap();
    let names: HashSet<&str> = outcome.summary.iter().map(|s| s.cluster_name).collect();

    assert_eq!(names, HashSet::from(["VIP Customers", "Sleeping Customers"]));
}
