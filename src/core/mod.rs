//! Core radiometric processing modules

pub mod stats;
pub mod wavelength;
pub mod dark_current;
pub mod calibrate;

// Re-export main types
pub use dark_current::DarkCurrentEstimator;
pub use calibrate::RadiometricCorrector;
pub use wavelength::{find_nearest, select_bands, BandSelection};
