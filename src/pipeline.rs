//! End-to-end quick-look processing of one Hawk measurement

use crate::config::PipelineConfig;
use crate::core::{DarkCurrentEstimator, RadiometricCorrector};
use crate::export::{
    ExportKind, ExportOutcome, ExportReport, GriddedWriter, ImageRenderer, OutputPaths,
    RadiancePlotter, SpectralSummaryWriter,
};
use crate::io::{CalibrationReader, CalibrationSource, HawkReader};
use crate::types::{HawkResult, RadianceProduct};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Files consumed and produced by one run
#[derive(Debug, Clone)]
pub struct PipelineInputs {
    pub raw: PathBuf,
    pub calibration: CalibrationSource,
    pub output_dir: PathBuf,
}

impl PipelineInputs {
    /// Calibration payload and header are paired automatically unless a header is given
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>, R: AsRef<Path>>(
        raw: P,
        calibration: Q,
        output_dir: R,
        calibration_header: Option<PathBuf>,
    ) -> HawkResult<Self> {
        let calibration = match calibration_header {
            Some(header) => CalibrationSource::new(header, calibration.as_ref()),
            None => CalibrationSource::infer(calibration.as_ref())?,
        };
        Ok(Self {
            raw: raw.as_ref().to_path_buf(),
            calibration,
            output_dir: output_dir.as_ref().to_path_buf(),
        })
    }
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> HawkResult<Self> {
        config.validate()?;
        log::debug!("Pipeline options: {}", config.to_json()?);
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Read both inputs and produce calibrated radiance
    ///
    /// The raw cube is moved into the corrector, so only the radiance cube
    /// survives this call.
    pub fn calibrate(&self, inputs: &PipelineInputs) -> HawkResult<RadianceProduct> {
        let calibration = CalibrationReader::read(&inputs.calibration)?;

        let reader = HawkReader::new(&inputs.raw)?.with_line_period(self.config.line_period_s);
        let raw = reader.read_measurement()?;

        RadiometricCorrector::check_wavelengths(&raw.wavelengths, &calibration.wavelengths);
        if (raw.integration_time - calibration.integration_time).abs() > f64::EPSILON {
            log::debug!(
                "Measurement tint {} differs from calibration tint {}",
                raw.integration_time,
                calibration.integration_time
            );
        }

        let dark = DarkCurrentEstimator::new(raw.dark_start_line).estimate(&raw.cube)?;
        let corrector = RadiometricCorrector::new(raw.integration_time);
        let cube = corrector.correct(raw.cube, &dark, &calibration)?;

        let product = RadianceProduct {
            cube,
            wavelengths: raw.wavelengths,
            timestamps: raw.timestamps,
        };
        product.validate()?;
        Ok(product)
    }

    /// Run every enabled exporter; one failing exporter does not stop the others
    pub fn export(&self, product: &RadianceProduct, paths: &OutputPaths) -> HawkResult<ExportReport> {
        std::fs::create_dir_all(paths.output_dir())?;

        let mut report = ExportReport::default();
        for kind in ExportKind::ALL {
            if !self.is_enabled(kind) {
                log::debug!("Skipping {} (disabled)", kind);
                continue;
            }
            let path = paths.path_for(kind);
            let result = self.run_exporter(kind, product, &path);
            if let Err(e) = &result {
                log::error!("Failed to write {}: {}", kind, e);
            }
            report.push(ExportOutcome { kind, path, result });
        }
        Ok(report)
    }

    fn is_enabled(&self, kind: ExportKind) -> bool {
        match kind {
            ExportKind::Image => self.config.create_images,
            ExportKind::RadiancePlot => self.config.create_radiance_plots,
            ExportKind::Gridded => self.config.create_netcdf,
            ExportKind::SpectralSummary => self.config.create_spectral_summary,
        }
    }

    fn run_exporter(&self, kind: ExportKind, product: &RadianceProduct, path: &Path) -> HawkResult<()> {
        let config = &self.config;
        match kind {
            ExportKind::Image => {
                ImageRenderer::new(config.image_wavelength, config.contour_levels, config.image_size)
                    .render(product, path)
            }
            ExportKind::RadiancePlot => RadiancePlotter::new(
                config.selected_wavelengths.clone(),
                config.across_track_pixel,
                config.image_size,
            )
            .render(product, path),
            ExportKind::Gridded => GriddedWriter::new(
                config.selected_wavelengths.clone(),
                config.across_track_pixel,
            )
            .write(product, path),
            ExportKind::SpectralSummary => SpectralSummaryWriter::new(
                config.center_band_half_width,
                config.compress_spectral_summary,
            )
            .write(product, path)
            .map(|_| ()),
        }
    }

    /// Calibrate one measurement and write its quick-look products
    pub fn run(&self, inputs: &PipelineInputs) -> HawkResult<ExportReport> {
        let started = Instant::now();
        let paths = OutputPaths::new(&inputs.output_dir, &inputs.raw)?;

        let product = self.calibrate(inputs)?;
        log::info!("Calibration finished in {:.2?}", started.elapsed());

        if !self.config.any_export_enabled() {
            log::warn!("All exports are disabled; nothing written");
        }
        let report = self.export(&product, &paths)?;
        log::info!("Processing of {} finished in {:.2?}", paths.stem(), started.elapsed());
        Ok(report)
    }
}
