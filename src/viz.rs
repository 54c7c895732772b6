//! Charts and console output for segmentation results using Plotters

use std::ops::Range;
use std::path::{Path, PathBuf};

use plotters::prelude::*;

use crate::model::{segment_names, AT_RISK, LOYAL, PROMISING, SLEEPING, VIP};
use crate::pipeline::SegmentationOutcome;

/// Color for a segment name
pub fn segment_color(name: &str) -> RGBColor {
    match name {
        VIP => RGBColor(27, 158, 119),
        LOYAL => RGBColor(117, 112, 179),
        PROMISING => RGBColor(102, 166, 30),
        AT_RISK => RGBColor(217, 95, 2),
        SLEEPING => RGBColor(231, 41, 138),
        _ => BLACK,
    }
}

/// Value range padded by 5% on each side (never empty).
pub fn padded_range(values: impl IntoIterator<Item = f64>) -> Range<f64> {
    let (min, max) = values
        .into_iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !min.is_finite() || !max.is_finite() {
        return 0.0..1.0;
    }
    let pad = ((max - min) * 0.05).max(0.5);
    (min - pad)..(max + pad)
}

/// Scatter plot of recency against monetary value, colored by segment
///
/// # Arguments
/// * `outcome` - Pipeline result to plot
/// * `output_path` - Path to save the PNG plot
/// * `plot_title` - Title for the plot
pub fn create_segment_scatter(
    outcome: &SegmentationOutcome,
    output_path: &Path,
    plot_title: Option<&str>,
) -> anyhow::Result<()> {
    let title = plot_title.unwrap_or("Customer Segments: Recency vs Monetary");
    let rows = &outcome.rfm_table;

    let x_range = padded_range(rows.iter().map(|r| r.recency as f64));
    let y_range = padded_range(rows.iter().map(|r| r.monetary));

    let root = BitMapBackend::new(output_path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(x_range, y_range)?;

    chart
        .configure_mesh()
        .x_desc("Recency (days since last purchase)")
        .y_desc("Monetary (total spend)")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for &name in segment_names(outcome.summary.len()) {
        let color = segment_color(name);
        let points: Vec<(f64, f64)> = rows
            .iter()
            .filter(|r| r.cluster_name == name)
            .map(|r| (r.recency as f64, r.monetary))
            .collect();

        chart
            .draw_series(points.into_iter().map(|p| Circle::new(p, 4, color.filled())))?
            .label(name)
            .legend(move |(x, y)| Circle::new((x, y), 4, color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    tracing::info!(path = %output_path.display(), "segment scatter saved");

    Ok(())
}

/// Line chart of inertia against cluster count
pub fn create_elbow_chart(curve: &[(usize, f64)], output_path: &Path) -> anyhow::Result<()> {
    let max_k = curve.last().map(|&(k, _)| k).unwrap_or(1) as f64;
    let max_inertia = curve.iter().map(|&(_, w)| w).fold(0.0, f64::max);

    let root = BitMapBackend::new(output_path, (600, 400)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Elbow Method", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0.5f64..(max_k + 0.5), 0f64..(max_inertia * 1.1).max(1.0))?;

    chart
        .configure_mesh()
        .x_desc("Number of Clusters")
        .y_desc("WCSS")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart.draw_series(LineSeries::new(
        curve.iter().map(|&(k, w)| (k as f64, w)),
        &BLUE,
    ))?;
    chart.draw_series(
        curve
            .iter()
            .map(|&(k, w)| Circle::new((k as f64, w), 4, BLUE.filled())),
    )?;

    root.present()?;
    tracing::info!(path = %output_path.display(), "elbow chart saved");

    Ok(())
}

/// Print the cluster summary table to the console
pub fn print_cluster_summary(outcome: &SegmentationOutcome) {
    let total = outcome.rfm_table.len();

    println!("\n=== Cluster Summary ===");
    println!("Reference date: {}", outcome.reference_date);
    println!("Total customers: {}", total);
    println!("Within-cluster sum of squares (Inertia): {:.2}", outcome.inertia);
    println!();
    println!(
        "  {:<20} | {:>12} | {:>14} | {:>13} | {:>14}",
        "Segment", "Recency Mean", "Frequency Mean", "Monetary Mean", "Customer Count"
    );
    println!("  {}", "-".repeat(87));
    for row in &outcome.summary {
        let percentage = (row.customer_count as f64 / total as f64) * 100.0;
        println!(
            "  {:<20} | {:>12.2} | {:>14.2} | {:>13.2} | {:>7} ({:>4.1}%)",
            row.cluster_name,
            row.mean_recency,
            row.mean_frequency,
            row.mean_monetary,
            row.customer_count,
            percentage
        );
    }
}

/// Print the elbow curve to the console
pub fn print_elbow_curve(curve: &[(usize, f64)]) {
    println!("\n=== Elbow Method ===");
    for &(k, inertia) in curve {
        println!("  k = {:2}: WCSS = {:.2}", k, inertia);
    }
}

/// Path of the elbow chart written next to a scatter plot:
/// `dir/segments.png` becomes `dir/segments_elbow.png`.
pub fn elbow_chart_path(scatter_path: &Path) -> PathBuf {
    let stem = scatter_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "segments".to_string());
    scatter_path.with_file_name(format!("{stem}_elbow.png"))
}

/// Generate the scatter plot plus, when a curve is given, the elbow chart
/// next to it (see [`elbow_chart_path`]).
pub fn generate_visualization_report(
    outcome: &SegmentationOutcome,
    elbow: Option<&[(usize, f64)]>,
    base_output_path: &Path,
) -> anyhow::Result<()> {
    create_segment_scatter(outcome, base_output_path, None)?;

    if let Some(curve) = elbow {
        create_elbow_chart(curve, &elbow_chart_path(base_output_path))?;
    }

    Ok(())
}
