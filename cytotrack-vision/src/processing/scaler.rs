//! Percentile intensity normalization

use crate::error::VisionError;
use crate::frame::Frame;
use ndarray::ArrayView2;

/// Default lower percentile
pub const LOW_PERCENTILE: f64 = 1.0;
/// Default upper percentile
pub const HIGH_PERCENTILE: f64 = 99.9;

/// Maps the [low, high] percentile band of a frame linearly onto [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scaler {
    low_percentile: f64,
    high_percentile: f64,
}

impl Default for Scaler {
    fn default() -> Self {
        Self {
            low_percentile: LOW_PERCENTILE,
            high_percentile: HIGH_PERCENTILE,
        }
    }
}

impl Scaler {
    /// Create a scaler for a custom percentile band, `0 <= low < high <= 100`
    pub fn new(low_percentile: f64, high_percentile: f64) -> Result<Self, VisionError> {
        if !(0.0..=100.0).contains(&low_percentile)
            || !(0.0..=100.0).contains(&high_percentile)
            || low_percentile >= high_percentile
        {
            return Err(VisionError::Core(cytotrack_core::Error::InvalidConfiguration(
                format!(
                    "percentile band must satisfy 0 <= low < high <= 100, got {}..{}",
                    low_percentile, high_percentile
                ),
            )));
        }
        Ok(Self { low_percentile, high_percentile })
    }

    /// Normalize a frame; values outside the band are clamped to [0, 1].
    ///
    /// Fails with `DegenerateRange` when both percentiles coincide.
    pub fn scale(&self, frame: ArrayView2<'_, f64>) -> Result<Frame, VisionError> {
        let mut values: Vec<f64> = frame.iter().copied().filter(|v| v.is_finite()).collect();
        if values.is_empty() {
            return Err(VisionError::DegenerateRange { low: f64::NAN, high: f64::NAN });
        }
        values.sort_unstable_by(|a, b| a.total_cmp(b));

        let low = percentile(&values, self.low_percentile);
        let high = percentile(&values, self.high_percentile);
        let span = high - low;
        if span <= 0.0 || !span.is_finite() {
            return Err(VisionError::DegenerateRange { low, high });
        }

        Ok(frame.mapv(|v| {
            if v.is_nan() {
                0.0
            } else {
                ((v - low) / span).clamp(0.0, 1.0)
            }
        }))
    }
}

/// Normalize with the default 1st / 99.9th percentile band
pub fn scale(frame: ArrayView2<'_, f64>) -> Result<Frame, VisionError> {
    Scaler::default().scale(frame)
}

/// Linear-interpolated percentile of ascending `sorted` values
pub(crate) fn percentile(sorted: &[f64], p: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let last = sorted.len() - 1;
    let pos = (p / 100.0).clamp(0.0, 1.0) * last as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}
