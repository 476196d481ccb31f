//! I/O modules for reading Hawk measurements and calibration files

pub mod envi;
pub mod hawk_reader;
pub mod calibration_reader;

pub use envi::{EnviHeader, EnviReader};
pub use hawk_reader::HawkReader;
pub use calibration_reader::{CalibrationReader, CalibrationSource};
