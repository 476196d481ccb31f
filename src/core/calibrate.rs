use crate::core::stats::{count_non_finite, finite_range};
use crate::types::{CalibrationData, DarkFrame, HawkError, HawkResult, SpectralCube};
use ndarray::{Axis, Zip};

/// Largest band-centre difference (nm) tolerated before warning
const WAVELENGTH_TOLERANCE_NM: f64 = 0.5;

/// Radiometric corrector: dark subtraction, calibration gain, integration time
pub struct RadiometricCorrector {
    integration_time: f64,
}

impl RadiometricCorrector {
    /// Create a corrector for a measurement with the given integration time
    pub fn new(integration_time: f64) -> Self {
        Self { integration_time }
    }

    /// Check that the calibration cube can be applied to a raw cube of `raw_dim`
    ///
    /// Pixel and band dimensions must match. The calibration holds either a
    /// single line, applied to every raw line, or one line per raw line.
    pub fn check_alignment(
        raw_dim: (usize, usize, usize),
        calibration: &CalibrationData,
    ) -> HawkResult<()> {
        let (raw_lines, raw_pixels, raw_bands) = raw_dim;
        let (cal_lines, cal_pixels, cal_bands) = calibration.gain.dim();

        if cal_pixels != raw_pixels || cal_bands != raw_bands {
            return Err(HawkError::Alignment(format!(
                "calibration is {} pixels x {} bands, measurement is {} pixels x {} bands",
                cal_pixels, cal_bands, raw_pixels, raw_bands
            )));
        }
        if cal_lines != 1 && cal_lines != raw_lines {
            return Err(HawkError::Alignment(format!(
                "calibration has {} lines, expected 1 or {}",
                cal_lines, raw_lines
            )));
        }
        Ok(())
    }

    /// Warn when the two wavelength axes disagree
    pub fn check_wavelengths(raw_wavelengths: &[f64], calibration_wavelengths: &[f64]) {
        if raw_wavelengths.len() != calibration_wavelengths.len() {
            log::warn!(
                "Calibration lists {} wavelengths, measurement {}",
                calibration_wavelengths.len(),
                raw_wavelengths.len()
            );
            return;
        }

        let max_offset = raw_wavelengths
            .iter()
            .zip(calibration_wavelengths)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f64, f64::max);
        if max_offset > WAVELENGTH_TOLERANCE_NM {
            log::warn!(
                "Calibration and measurement band centres differ by up to {:.3} nm",
                max_offset
            );
        }
    }

    /// Compute radiance = (raw - dark) * gain / integration_time
    ///
    /// The raw cube is consumed and its buffer reused for the radiance, so no
    /// dark-subtracted intermediate outlives this call. Negative and NaN
    /// radiances are kept as they are.
    pub fn correct(
        &self,
        raw: SpectralCube,
        dark: &DarkFrame,
        calibration: &CalibrationData,
    ) -> HawkResult<SpectralCube> {
        let tint = self.integration_time;
        if !(tint.is_finite() && tint > 0.0) {
            return Err(HawkError::Processing(format!(
                "Integration time must be positive, got {}",
                tint
            )));
        }

        let (lines, pixels, bands) = raw.dim();
        if dark.dim() != (pixels, bands) {
            return Err(HawkError::Alignment(format!(
                "dark frame is {:?}, measurement lines are {:?}",
                dark.dim(),
                (pixels, bands)
            )));
        }
        Self::check_alignment(raw.dim(), calibration)?;

        log::info!(
            "Applying radiometric correction to {} x {} x {} cube (tint {})",
            lines,
            pixels,
            bands,
            tint
        );

        let gain = &calibration.gain;
        let per_line_gain = gain.dim().0 != 1;
        let mut radiance = raw;

        for (l, line) in radiance.axis_iter_mut(Axis(0)).enumerate() {
            let gain_line = gain.index_axis(Axis(0), if per_line_gain { l } else { 0 });
            Zip::from(line)
                .and(dark)
                .and(&gain_line)
                .for_each(|value, &offset, &g| *value = (*value - offset) * g / tint);
        }

        let non_finite = count_non_finite(radiance.iter());
        if non_finite > 0 {
            log::warn!(
                "{} of {} radiance values are NaN or infinite",
                non_finite,
                radiance.len()
            );
        }
        if let Some((lo, hi)) = finite_range(radiance.iter()) {
            log::info!("Radiometric correction completed. Output range: {:.3e} to {:.3e}", lo, hi);
        }

        Ok(radiance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{Array2, Array3};

    fn calibration(gain: Array3<f64>) -> CalibrationData {
        let bands = gain.dim().2;
        CalibrationData {
            gain,
            wavelengths: (0..bands).map(|b| 1000.0 + b as f64).collect(),
            integration_time: 0.04,
        }
    }

    #[test]
    fn test_radiance_formula() {
        let raw = Array3::from_elem((3, 2, 2), 10.0);
        let dark = Array2::from_elem((2, 2), 2.0);
        let cal = calibration(Array3::from_elem((1, 2, 2), 0.5));

        let radiance = RadiometricCorrector::new(0.04).correct(raw, &dark, &cal).unwrap();
        assert_eq!(radiance.dim(), (3, 2, 2));
        for &value in radiance.iter() {
            assert_relative_eq!(value, 100.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_per_line_gain_and_negative_values() {
        let raw = Array3::from_shape_fn((2, 1, 1), |(l, _, _)| l as f64);
        let dark = Array2::from_elem((1, 1), 1.0);
        let gain = Array3::from_shape_fn((2, 1, 1), |(l, _, _)| (l + 1) as f64);

        let radiance = RadiometricCorrector::new(1.0)
            .correct(raw, &dark, &calibration(gain))
            .unwrap();
        assert_eq!(radiance[[0, 0, 0]], -1.0);
        assert_eq!(radiance[[1, 0, 0]], 0.0);
    }

    #[test]
    fn test_nan_propagates() {
        let mut raw = Array3::from_elem((1, 2, 1), 3.0);
        raw[[0, 1, 0]] = f64::NAN;
        let dark = Array2::zeros((2, 1));
        let cal = calibration(Array3::ones((1, 2, 1)));

        let radiance = RadiometricCorrector::new(1.0).correct(raw, &dark, &cal).unwrap();
        assert_eq!(radiance[[0, 0, 0]], 3.0);
        assert!(radiance[[0, 1, 0]].is_nan());
    }

    #[test]
    fn test_alignment_errors() {
        let raw = Array3::<f64>::ones((4, 3, 2));
        let dark = Array2::zeros((3, 2));

        let wrong_bands = calibration(Array3::ones((1, 3, 5)));
        let err = RadiometricCorrector::new(1.0)
            .correct(raw.clone(), &dark, &wrong_bands)
            .unwrap_err();
        assert!(matches!(err, HawkError::Alignment(_)));

        let wrong_lines = calibration(Array3::ones((2, 3, 2)));
        assert!(RadiometricCorrector::check_alignment(raw.dim(), &wrong_lines).is_err());

        let wrong_dark = Array2::zeros((2, 2));
        let cal = calibration(Array3::ones((1, 3, 2)));
        assert!(RadiometricCorrector::new(1.0).correct(raw.clone(), &wrong_dark, &cal).is_err());

        assert!(RadiometricCorrector::new(0.0).correct(raw, &dark, &cal).is_err());
    }
}
