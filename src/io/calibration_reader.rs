use crate::io::envi::{find_header_file, EnviReader};
use crate::types::{CalibrationData, HawkError, HawkResult};
use std::path::{Path, PathBuf};

/// Raw calibration values are stored scaled by this factor
pub const CALIBRATION_SCALE: f64 = 100.0;

/// Extension of the calibration payload
pub const CALIBRATION_EXTENSION: &str = "cal";

/// Header and payload paths of a calibration file pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationSource {
    pub header: PathBuf,
    pub data: PathBuf,
}

impl CalibrationSource {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(header: P, data: Q) -> Self {
        Self {
            header: header.as_ref().to_path_buf(),
            data: data.as_ref().to_path_buf(),
        }
    }

    /// Derive the sibling from one half of the pair
    ///
    /// A `.cal` path is the payload and its header sits next to it; any other
    /// path is taken as the header and the payload is `<stem>.cal`.
    pub fn infer<P: AsRef<Path>>(path: P) -> HawkResult<Self> {
        let path = path.as_ref();
        let is_payload = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case(CALIBRATION_EXTENSION))
            .unwrap_or(false);

        if is_payload {
            let header = find_header_file(path).ok_or_else(|| {
                HawkError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("No calibration header found for {}", path.display()),
                ))
            })?;
            Ok(Self::new(header, path))
        } else {
            Ok(Self::new(path, path.with_extension(CALIBRATION_EXTENSION)))
        }
    }
}

/// Reader for Hawk radiometric calibration files
pub struct CalibrationReader;

impl CalibrationReader {
    /// Read calibration gains (divided by 100), band centres and integration time
    pub fn read(source: &CalibrationSource) -> HawkResult<CalibrationData> {
        log::info!(
            "Reading calibration: {} (header {})",
            source.data.display(),
            source.header.display()
        );

        let envi = EnviReader::with_paths(&source.header, &source.data)?;
        let header = envi.header();
        let integration_time = header.parse_field::<f64>("tint")?;
        let wavelengths = header.wavelengths()?;

        let mut gain = envi.read_cube()?;
        gain.mapv_inplace(|v| v / CALIBRATION_SCALE);

        let (lines, pixels, bands) = gain.dim();
        log::info!(
            "Calibration cube {} x {} x {}, tint {}",
            lines,
            pixels,
            bands,
            integration_time
        );

        Ok(CalibrationData {
            gain,
            wavelengths,
            integration_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_from_header() {
        let source = CalibrationSource::infer("/data/hawk_cal.hdr").unwrap();
        assert_eq!(source.header, PathBuf::from("/data/hawk_cal.hdr"));
        assert_eq!(source.data, PathBuf::from("/data/hawk_cal.cal"));
    }

    #[test]
    fn test_infer_from_missing_payload_header() {
        let err = CalibrationSource::infer("/nonexistent/hawk_cal.cal").unwrap_err();
        assert!(matches!(err, HawkError::Io(_)));
    }

    #[test]
    fn test_read_missing_files() {
        let source = CalibrationSource::new("/nonexistent/cal.hdr", "/nonexistent/cal.cal");
        assert!(CalibrationReader::read(&source).is_err());
    }
}
