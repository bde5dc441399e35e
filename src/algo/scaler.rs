use super::stats::mean_std;

/// Per-column standardization to zero mean and unit variance.
///
/// Columns with zero variance are centred but not rescaled (scale = 1),
/// so a constant column becomes all zeros instead of NaN.
#[derive(Clone, Debug, Default)]
pub struct StandardScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    /// Fit on a row-major matrix. Every row must have the same width.
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let width = rows.first().map_or(0, Vec::len);
        let mut means = Vec::with_capacity(width);
        let mut scales = Vec::with_capacity(width);

        for col in 0..width {
            let column: Vec<f64> = rows.iter().map(|r| r[col]).collect();
            let (mean, std) = mean_std(&column);
            means.push(mean);
            scales.push(if std > f64::EPSILON { std } else { 1.0 });
        }

        Self { means, scales }
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter()
            .map(|row| {
                row.iter()
                    .zip(self.means.iter().zip(&self.scales))
                    .map(|(v, (mean, scale))| (v - mean) / scale)
                    .collect()
            })
            .collect()
    }

    pub fn fit_transform(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        Self::fit(rows).transform(rows)
    }
}
