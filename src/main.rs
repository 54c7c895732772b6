//! rfm-segmenter: customer segmentation from a transactions CSV
//!
//! Loads the CSV, runs the RFM segmentation pipeline and reports the result
//! as a console table or JSON, with optional CSV export and charts.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use rfm_segmenter::{load_transactions_csv, run_frame, viz, Args, SegmentationOutcome};
use tracing::info;

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(args.log_filter())
        .with_target(false)
        .init();

    let config = args.segmentation_config()?;
    let start_time = Instant::now();

    let df = load_transactions_csv(&args.input)
        .with_context(|| format!("failed to read transactions from {}", args.input))?;
    info!(rows = df.height(), input = %args.input, "loaded input");

    let outcome = run_frame(&df, &config).context("segmentation failed")?;

    let elbow = args
        .elbow_max_k
        .map(|max_k| outcome.elbow_curve(max_k, &config))
        .transpose()
        .context("elbow curve failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome.summary)?);
    } else {
        viz::print_cluster_summary(&outcome);
        if let Some(curve) = &elbow {
            viz::print_elbow_curve(curve);
        }
    }

    if let Some(customer_id) = args.customer {
        print_customer(&outcome, customer_id);
    }

    if let Some(dir) = &args.export_dir {
        outcome
            .export_csv(dir)
            .with_context(|| format!("failed to export tables to {}", dir.display()))?;
        println!("\nTables written to: {}", dir.display());
    }

    if let Some(output) = &args.output {
        let output = Path::new(output);
        viz::generate_visualization_report(&outcome, elbow.as_deref(), output)?;
        println!("Segment plot saved to: {}", output.display());
        if elbow.is_some() {
            println!(
                "Elbow chart saved to: {}",
                viz::elbow_chart_path(output).display()
            );
        }
    }

    info!(
        elapsed_secs = start_time.elapsed().as_secs_f64(),
        "pipeline complete"
    );

    Ok(())
}

/// Print one customer's segment, RFM values and transactions
fn print_customer(outcome: &SegmentationOutcome, customer_id: u64) {
    let Some(customer) = outcome.customer(customer_id) else {
        println!("\nCustomer {} not found after cleaning", customer_id);
        return;
    };

    println!("\n=== Customer {} ===", customer_id);
    println!("Cluster: {}", customer.cluster_name);
    println!("- Recency (days since last purchase): {}", customer.recency);
    println!("- Frequency (purchase count): {}", customer.frequency);
    println!("- Monetary (total spend): ${:.2}", customer.monetary);

    println!("\nTransactions:");
    for tx in outcome.customer_transactions(customer_id) {
        let t = &tx.transaction;
        println!(
            "  {:<10} {:<10} {:<36} {:>5} {} {:>8.2} {:>10.2}",
            t.invoice_no, t.stock_code, t.description, t.quantity, t.invoice_date, t.unit_price, t.line_total
        );
    }
}
