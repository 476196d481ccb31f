//! hawkql: quick-look radiometric calibration for Hawk hyperspectral imagery
//!
//! Reads a raw push-broom measurement and its calibration (both ENVI files),
//! removes the dark current measured in the trailing shuttered lines, applies
//! the calibration gain and integration time, and writes a greyscale image,
//! a radiance time-series plot, a NetCDF time series and an NPZ summary of
//! the swath centre.

pub mod types;
pub mod config;
pub mod io;
pub mod core;
pub mod export;
pub mod pipeline;

// Re-export main types and functions for easier access
pub use types::{
    CalibrationData, DarkFrame, HawkError, HawkMetadata, HawkResult, RadianceProduct,
    RawMeasurement, SpectralCube,
};

pub use config::PipelineConfig;
pub use io::{CalibrationReader, CalibrationSource, EnviReader, HawkReader};
pub use crate::core::{find_nearest, DarkCurrentEstimator, RadiometricCorrector};
pub use export::{ExportKind, ExportReport, OutputPaths};
pub use pipeline::{Pipeline, PipelineInputs};
