use crate::types::{HawkError, HawkResult};

/// Index of the band whose centre is closest to `target` (nm)
///
/// Ties resolve to the first index; NaN centres never match.
pub fn find_nearest(wavelengths: &[f64], target: f64) -> HawkResult<usize> {
    let mut best: Option<(usize, f64)> = None;

    for (i, &wavelength) in wavelengths.iter().enumerate() {
        let distance = (wavelength - target).abs();
        if distance.is_nan() {
            continue;
        }
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((i, distance)),
        }
    }

    best.map(|(i, _)| i).ok_or_else(|| {
        HawkError::Processing(format!(
            "No band available for wavelength {} nm ({} candidates)",
            target,
            wavelengths.len()
        ))
    })
}

/// A requested wavelength resolved to a band of the cube
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandSelection {
    /// Requested wavelength (nm)
    pub requested: f64,
    pub band: usize,
    /// Centre of the selected band (nm)
    pub center: f64,
}

/// Resolve each requested wavelength to its nearest band, keeping order
pub fn select_bands(wavelengths: &[f64], requested: &[f64]) -> HawkResult<Vec<BandSelection>> {
    requested
        .iter()
        .map(|&target| {
            let band = find_nearest(wavelengths, target)?;
            let center = wavelengths[band];
            if (center - target).abs() > 10.0 {
                log::warn!(
                    "Nearest band to {} nm is {:.2} nm ({:.2} nm away)",
                    target,
                    center,
                    (center - target).abs()
                );
            }
            Ok(BandSelection {
                requested: target,
                band,
                center,
            })
        })
        .collect()
}

/// Label used for legends and variable names: `1200` for 1200.0, `1200.5` otherwise
pub fn wavelength_label(wavelength: f64) -> String {
    if wavelength.fract() == 0.0 {
        format!("{}", wavelength as i64)
    } else {
        format!("{}", wavelength)
    }
}
