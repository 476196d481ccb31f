use crate::core::stats::nanmean_axis;
use crate::types::{DarkFrame, HawkError, HawkResult, SpectralCube};
use ndarray::{s, Axis};

/// Dark-current estimator over the trailing shuttered lines of a measurement
pub struct DarkCurrentEstimator {
    dark_start_line: usize,
}

impl DarkCurrentEstimator {
    /// Create an estimator for a dark region starting at `dark_start_line`
    pub fn new(dark_start_line: usize) -> Self {
        Self { dark_start_line }
    }

    /// Per (pixel, band) mean over lines `dark_start_line..`, ignoring missing values
    ///
    /// An empty dark region has no defined mean and is reported as an error
    /// instead of producing a NaN frame.
    pub fn estimate(&self, raw: &SpectralCube) -> HawkResult<DarkFrame> {
        let (lines, pixels, bands) = raw.dim();

        if self.dark_start_line >= lines {
            log::warn!(
                "Dark region is empty: start line {} with {} lines",
                self.dark_start_line,
                lines
            );
            return Err(HawkError::DarkRegion(format!(
                "dark start line {} is not before the last line ({} lines)",
                self.dark_start_line, lines
            )));
        }

        let dark_lines = lines - self.dark_start_line;
        log::info!(
            "Averaging dark current over {} lines ({}..{}) for {} x {} pixels/bands",
            dark_lines,
            self.dark_start_line,
            lines,
            pixels,
            bands
        );

        let dark_region = raw.slice(s![self.dark_start_line.., .., ..]);
        let dark = nanmean_axis(dark_region, Axis(0));

        let undefined = dark.iter().filter(|v| v.is_nan()).count();
        if undefined > 0 {
            log::warn!(
                "{} pixel/band cells have no valid dark samples; their radiance will be NaN",
                undefined
            );
        }

        Ok(dark)
    }
}
