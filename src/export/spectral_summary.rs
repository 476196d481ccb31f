use crate::core::stats::nanmean_axis;
use crate::export::npz::{NpyArray, NpyData, NpzWriter};
use crate::types::{HawkError, HawkResult, RadianceProduct};
use chrono::{DateTime, Utc};
use ndarray::{s, Array2, Axis};
use std::ops::Range;
use std::path::Path;

/// Across-track pixels `center - half_width .. center + half_width`, clamped to the swath
pub fn center_band(pixels: usize, half_width: usize) -> HawkResult<Range<usize>> {
    let center = pixels / 2;
    let start = center.saturating_sub(half_width);
    let end = (center + half_width).min(pixels);
    if start >= end {
        return Err(HawkError::Export(format!(
            "Empty centre band for {} pixels with half width {}",
            pixels, half_width
        )));
    }
    if end - start != 2 * half_width {
        log::warn!(
            "Centre band clamped to pixels {}..{} for a {} pixel swath",
            start,
            end,
            pixels
        );
    }
    Ok(start..end)
}

/// Mean spectrum of the swath centre for every line
#[derive(Debug, Clone)]
pub struct SpectralSummary {
    /// line x band
    pub spectra: Array2<f64>,
    pub wavelengths: Vec<f64>,
    pub timestamps: Vec<DateTime<Utc>>,
    pub pixel_range: Range<usize>,
}

impl SpectralSummary {
    /// Average the centre band of across-track pixels, ignoring missing values
    pub fn from_product(product: &RadianceProduct, half_width: usize) -> HawkResult<Self> {
        product.validate()?;
        let pixel_range = center_band(product.pixels(), half_width)?;

        let centre = product
            .cube
            .slice(s![.., pixel_range.start..pixel_range.end, ..]);
        let spectra = nanmean_axis(centre, Axis(1));

        log::debug!(
            "Summarised pixels {}..{} into {:?} spectra",
            pixel_range.start,
            pixel_range.end,
            spectra.dim()
        );

        Ok(Self {
            spectra,
            wavelengths: product.wavelengths.clone(),
            timestamps: product.timestamps.clone(),
            pixel_range,
        })
    }

    /// Arrays in archive order: `array`, `wvl`, `time`
    pub fn to_arrays(&self) -> HawkResult<Vec<(&'static str, NpyArray)>> {
        let (lines, bands) = self.spectra.dim();
        let values = self.spectra.as_standard_layout().iter().copied().collect();
        let times = self
            .timestamps
            .iter()
            .map(|t| t.timestamp_micros())
            .collect();

        Ok(vec![
            ("array", NpyArray::new(vec![lines, bands], NpyData::F64(values))?),
            (
                "wvl",
                NpyArray::new(vec![bands], NpyData::F64(self.wavelengths.clone()))?,
            ),
            ("time", NpyArray::new(vec![lines], NpyData::DateTimeUs(times))?),
        ])
    }
}

/// Writer for the centre-of-swath spectral summary archive
pub struct SpectralSummaryWriter {
    half_width: usize,
    compress: bool,
}

impl SpectralSummaryWriter {
    pub fn new(half_width: usize, compress: bool) -> Self {
        Self {
            half_width,
            compress,
        }
    }

    pub fn write<P: AsRef<Path>>(&self, product: &RadianceProduct, path: P) -> HawkResult<SpectralSummary> {
        log::info!("Writing spectral summary to {}", path.as_ref().display());
        let summary = SpectralSummary::from_product(product, self.half_width)?;

        let mut writer = NpzWriter::create(path.as_ref(), self.compress)?;
        for (name, array) in summary.to_arrays()? {
            writer.add_array(name, &array)?;
        }
        writer.finish()?;

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::npz::read_npz;
    use approx::assert_relative_eq;
    use chrono::TimeZone;
    use ndarray::Array3;
    use tempfile::TempDir;

    fn product(lines: usize, pixels: usize) -> RadianceProduct {
        let start = Utc.with_ymd_and_hms(2019, 6, 19, 10, 0, 0).unwrap();
        RadianceProduct {
            cube: Array3::from_shape_fn((lines, pixels, 2), |(l, p, b)| (l + p + b) as f64),
            wavelengths: vec![1000.0, 2000.0],
            timestamps: (0..lines as i64)
                .map(|i| start + chrono::Duration::microseconds(i * 50_000))
                .collect(),
        }
    }

    #[test]
    fn test_center_band_for_hawk_swath() {
        let range = center_band(384, 5).unwrap();
        assert_eq!(range, 187..197);
        assert_eq!(range.len(), 10);
    }

    #[test]
    fn test_center_band_is_clamped() {
        assert_eq!(center_band(4, 5).unwrap(), 0..4);
        assert!(center_band(0, 5).is_err());
        assert!(center_band(10, 0).is_err());
    }

    #[test]
    fn test_summary_means() {
        let mut product = product(3, 20);
        product.cube[[0, 5, 0]] = f64::NAN;

        let summary = SpectralSummary::from_product(&product, 5).unwrap();
        assert_eq!(summary.spectra.dim(), (3, 2));
        assert_eq!(summary.pixel_range, 5..15);
        // mean of pixels 5..15 is 9.5
        assert_relative_eq!(summary.spectra[[1, 0]], 10.5, epsilon = 1e-12);
        assert_relative_eq!(summary.spectra[[2, 1]], 12.5, epsilon = 1e-12);
        // NaN at pixel 5 leaves pixels 6..15, mean 10
        assert_relative_eq!(summary.spectra[[0, 0]], 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_archive_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scene_spectra.npz");
        let product = product(4, 12);

        SpectralSummaryWriter::new(5, false).write(&product, &path).unwrap();
        let arrays = read_npz(&path).unwrap();

        assert_eq!(arrays.len(), 3);
        assert_eq!(arrays["array"].shape, vec![4, 2]);
        assert_eq!(arrays["wvl"].data, NpyData::F64(vec![1000.0, 2000.0]));
        match &arrays["time"].data {
            NpyData::DateTimeUs(times) => {
                assert_eq!(times.len(), 4);
                assert!(times.windows(2).all(|w| w[1] - w[0] == 50_000));
                assert_eq!(times[0], product.timestamps[0].timestamp_micros());
            }
            other => panic!("unexpected time dtype {:?}", other),
        }
    }
}
