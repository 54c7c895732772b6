//! Standardisation of RFM features

use ndarray::{Array1, Array2, Axis};

use crate::error::{Result, SegmentationError};
use crate::rfm::{feature_matrix, RfmRecord};

/// Column-wise z-score scaler fitted on one record set.
///
/// Uses population statistics. A column with zero spread maps every value
/// to 0 instead of dividing by zero.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    pub mean: Array1<f64>,
    pub std: Array1<f64>,
}

impl StandardScaler {
    /// Fit column means and standard deviations.
    pub fn fit(features: &Array2<f64>) -> Result<Self> {
        let mean = features.mean_axis(Axis(0)).ok_or(SegmentationError::NoData)?;
        let std = features.std_axis(Axis(0), 0.0);
        Ok(StandardScaler { mean, std })
    }

    /// Scale a matrix with the fitted statistics.
    pub fn transform(&self, features: &Array2<f64>) -> Array2<f64> {
        let mut scaled = features.clone();
        for mut row in scaled.outer_iter_mut() {
            for (j, value) in row.iter_mut().enumerate() {
                *value = self.scale_value(j, *value);
            }
        }
        scaled
    }

    /// Scale a single `[recency, frequency, monetary]` triple.
    pub fn transform_row(&self, rfm: &[f64; 3]) -> [f64; 3] {
        let mut scaled = [0.0; 3];
        for (j, value) in rfm.iter().enumerate() {
            scaled[j] = self.scale_value(j, *value);
        }
        scaled
    }

    fn scale_value(&self, column: usize, value: f64) -> f64 {
        let std = self.std[column];
        if std.is_finite() && std > 0.0 {
            (value - self.mean[column]) / std
        } else {
            0.0
        }
    }
}

/// Standardise the RFM features of `records`.
///
/// Returns the `(n, 3)` scaled matrix alongside the fitted scaler.
pub fn fit_scale(records: &[RfmRecord]) -> Result<(Array2<f64>, StandardScaler)> {
    if records.is_empty() {
        return Err(SegmentationError::NoData);
    }
    let raw = feature_matrix(records);
    let scaler = StandardScaler::fit(&raw)?;
    let scaled = scaler.transform(&raw);
    Ok((scaled, scaler))
}
