use crate::types::{HawkError, HawkResult};
use serde::Serialize;

/// Processing options for one Hawk quick-look run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineConfig {
    /// Wavelength in nm of the band rendered as the greyscale image
    pub image_wavelength: f64,
    /// Wavelengths in nm for the radiance plot and the gridded export, in legend order
    pub selected_wavelengths: Vec<f64>,
    pub create_images: bool,
    pub create_radiance_plots: bool,
    pub create_netcdf: bool,
    pub create_spectral_summary: bool,
    /// Sensor line period in seconds
    pub line_period_s: f64,
    /// Across-track pixel for the time series; `None` uses the swath centre
    pub across_track_pixel: Option<usize>,
    /// Half width of the centre band averaged into the spectral summary
    pub center_band_half_width: usize,
    /// Number of grey levels in the rendered image
    pub contour_levels: usize,
    /// Output raster size (width, height) in pixels
    pub image_size: (u32, u32),
    /// Deflate the NPZ entries instead of storing them
    pub compress_spectral_summary: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            image_wavelength: 2100.0,
            selected_wavelengths: vec![1200.0, 1600.0, 2200.0],
            create_images: true,
            create_radiance_plots: true,
            create_netcdf: true,
            create_spectral_summary: true,
            line_period_s: 0.05,
            across_track_pixel: None,
            center_band_half_width: 5,
            contour_levels: 25,
            image_size: (3600, 1200),
            compress_spectral_summary: false,
        }
    }
}

impl PipelineConfig {
    /// Options as a JSON object, for logs
    pub fn to_json(&self) -> HawkResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Reject option combinations the pipeline cannot honour
    pub fn validate(&self) -> HawkResult<()> {
        if !(self.line_period_s.is_finite() && self.line_period_s > 0.0) {
            return Err(HawkError::Processing(format!(
                "Line period must be positive, got {}",
                self.line_period_s
            )));
        }
        if self.create_images && self.contour_levels == 0 {
            return Err(HawkError::Processing(
                "Image rendering needs at least one contour level".to_string(),
            ));
        }
        if self.create_images && (self.image_size.0 == 0 || self.image_size.1 == 0) {
            return Err(HawkError::Processing(format!(
                "Invalid image size {}x{}",
                self.image_size.0, self.image_size.1
            )));
        }
        if (self.create_radiance_plots || self.create_netcdf)
            && self.selected_wavelengths.is_empty()
        {
            return Err(HawkError::Processing(
                "No wavelengths selected for the radiance time series".to_string(),
            ));
        }
        Ok(())
    }

    /// True when at least one exporter is enabled
    pub fn any_export_enabled(&self) -> bool {
        self.create_images
            || self.create_radiance_plots
            || self.create_netcdf
            || self.create_spectral_summary
    }
}
