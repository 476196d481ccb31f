use chrono::{DateTime, Utc};
use ndarray::{Array2, Array3};
use serde::Serialize;

/// Radiometric sample type used for every cube in the pipeline
pub type Sample = f64;

/// 3D hyperspectral cube (line x across-track pixel x band)
pub type SpectralCube = Array3<Sample>;

/// 2D per-pixel, per-band frame (across-track pixel x band)
pub type DarkFrame = Array2<Sample>;

/// Acquisition metadata carried in a Hawk raw header
#[derive(Debug, Clone, Serialize)]
pub struct HawkMetadata {
    pub acquisition_date: String,
    pub gps_start_time: String,
    pub start_time: DateTime<Utc>,
    pub dark_start_line: usize,
    pub integration_time: f64,
    pub lines: usize,
    pub samples: usize,
    pub bands: usize,
}

/// Raw sensor measurement with its axes
#[derive(Debug, Clone)]
pub struct RawMeasurement {
    pub cube: SpectralCube,
    pub wavelengths: Vec<f64>,
    pub timestamps: Vec<DateTime<Utc>>,
    pub dark_start_line: usize,
    pub integration_time: f64,
    pub metadata: HawkMetadata,
}

/// Calibration gain cube (physical units, already divided by 100)
#[derive(Debug, Clone)]
pub struct CalibrationData {
    pub gain: SpectralCube,
    pub wavelengths: Vec<f64>,
    pub integration_time: f64,
}

/// Calibrated radiance with the axes every exporter needs
#[derive(Debug, Clone)]
pub struct RadianceProduct {
    pub cube: SpectralCube,
    pub wavelengths: Vec<f64>,
    pub timestamps: Vec<DateTime<Utc>>,
}

impl RadianceProduct {
    pub fn lines(&self) -> usize {
        self.cube.dim().0
    }

    pub fn pixels(&self) -> usize {
        self.cube.dim().1
    }

    pub fn bands(&self) -> usize {
        self.cube.dim().2
    }

    /// Across-track centre of the swath (192 for the 384 pixel Hawk swath)
    pub fn center_pixel(&self) -> usize {
        self.pixels() / 2
    }

    /// Check that the axes agree with the cube dimensions
    pub fn validate(&self) -> HawkResult<()> {
        let (lines, _, bands) = self.cube.dim();
        if self.wavelengths.len() != bands {
            return Err(HawkError::Alignment(format!(
                "{} wavelengths for {} bands",
                self.wavelengths.len(),
                bands
            )));
        }
        if self.timestamps.len() != lines {
            return Err(HawkError::Alignment(format!(
                "{} timestamps for {} lines",
                self.timestamps.len(),
                lines
            )));
        }
        Ok(())
    }
}

/// Error types for Hawk processing
#[derive(Debug, thiserror::Error)]
pub enum HawkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Dark region error: {0}")]
    DarkRegion(String),

    #[error("Calibration alignment error: {0}")]
    Alignment(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for Hawk operations
pub type HawkResult<T> = Result<T, HawkError>;
