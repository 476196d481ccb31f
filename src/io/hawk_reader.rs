use crate::io::envi::EnviReader;
use crate::types::{HawkError, HawkMetadata, HawkResult, RawMeasurement};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use regex::Regex;
use std::path::Path;

/// Default Hawk line period in seconds
pub const DEFAULT_LINE_PERIOD_S: f64 = 0.05;

/// Reader for raw Hawk measurements (ENVI cube with acquisition metadata)
pub struct HawkReader {
    envi: EnviReader,
    line_period_s: f64,
}

impl HawkReader {
    /// Open a raw measurement from its header or data path
    pub fn new<P: AsRef<Path>>(path: P) -> HawkResult<Self> {
        log::info!("Opening Hawk measurement: {}", path.as_ref().display());
        Ok(Self {
            envi: EnviReader::open(path)?,
            line_period_s: DEFAULT_LINE_PERIOD_S,
        })
    }

    /// Override the line period used to build timestamps
    pub fn with_line_period(mut self, line_period_s: f64) -> Self {
        self.line_period_s = line_period_s;
        self
    }

    pub fn envi(&self) -> &EnviReader {
        &self.envi
    }

    /// Parse the acquisition metadata without touching the payload
    pub fn read_metadata(&self) -> HawkResult<HawkMetadata> {
        let header = self.envi.header();

        let acquisition_date = header.require("acquisition date")?.to_string();
        let gps_start_time = header.require("gps start time")?.to_string();
        let date = parse_acquisition_date(&acquisition_date)?;
        let time = parse_gps_start_time(&gps_start_time)?;
        let start_time = NaiveDateTime::new(date, time).and_utc();

        let dark_start_line = header.parse_field::<usize>("autodarkstartline")?;
        let integration_time = header.parse_field::<f64>("tint")?;

        log::debug!(
            "Acquisition start {}, dark start line {}, tint {}",
            start_time,
            dark_start_line,
            integration_time
        );

        Ok(HawkMetadata {
            acquisition_date,
            gps_start_time,
            start_time,
            dark_start_line,
            integration_time,
            lines: header.lines,
            samples: header.samples,
            bands: header.bands,
        })
    }

    /// Read the raw cube together with its wavelength and time axes
    pub fn read_measurement(&self) -> HawkResult<RawMeasurement> {
        let metadata = self.read_metadata()?;
        let wavelengths = self.envi.header().wavelengths()?;
        let cube = self.envi.read_cube()?;
        let timestamps = line_timestamps(metadata.start_time, cube.dim().0, self.line_period_s)?;

        if log::log_enabled!(log::Level::Debug) {
            log::debug!("Measurement metadata: {}", serde_json::to_string(&metadata)?);
        }
        log::info!(
            "Read raw cube {} x {} x {} ({} to {})",
            metadata.lines,
            metadata.samples,
            metadata.bands,
            timestamps.first().map(|t| t.to_rfc3339()).unwrap_or_default(),
            timestamps.last().map(|t| t.to_rfc3339()).unwrap_or_default()
        );

        Ok(RawMeasurement {
            cube,
            wavelengths,
            timestamps,
            dark_start_line: metadata.dark_start_line,
            integration_time: metadata.integration_time,
            metadata,
        })
    }
}

/// Parse the `acquisition date` field, whose last ten characters are `dd-mm-yyyy`
pub fn parse_acquisition_date(field: &str) -> HawkResult<NaiveDate> {
    let trimmed = field.trim();
    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() < 10 {
        return Err(HawkError::Metadata(format!(
            "Acquisition date too short: '{}'",
            field
        )));
    }
    let tail: String = chars[chars.len() - 10..].iter().collect();

    let pattern = Regex::new(r"^(\d{2})\D(\d{2})\D(\d{4})$")
        .map_err(|e| HawkError::Processing(format!("Regex error: {}", e)))?;
    let caps = pattern.captures(&tail).ok_or_else(|| {
        HawkError::Metadata(format!("Acquisition date not in dd-mm-yyyy form: '{}'", field))
    })?;

    let day: u32 = caps[1].parse().unwrap_or(0);
    let month: u32 = caps[2].parse().unwrap_or(0);
    let year: i32 = caps[3].parse().unwrap_or(0);

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        HawkError::Metadata(format!(
            "Invalid acquisition date {:04}-{:02}-{:02}",
            year, month, day
        ))
    })
}

/// Parse the `HH:MM:SS[.fraction]` clock out of the `gps start time` field
pub fn parse_gps_start_time(field: &str) -> HawkResult<NaiveTime> {
    let pattern = Regex::new(r"(\d{1,2}):(\d{2}):(\d{2})(?:\.(\d+))?")
        .map_err(|e| HawkError::Processing(format!("Regex error: {}", e)))?;
    let caps = pattern.captures(field).ok_or_else(|| {
        HawkError::Metadata(format!("No HH:MM:SS clock in GPS start time '{}'", field))
    })?;

    let hour: u32 = caps[1].parse().unwrap_or(99);
    let minute: u32 = caps[2].parse().unwrap_or(99);
    let second: u32 = caps[3].parse().unwrap_or(99);
    // Fraction truncated to microseconds
    let micro = caps
        .get(4)
        .map(|m| {
            let digits: String = m.as_str().chars().chain("000000".chars()).take(6).collect();
            digits.parse::<u32>().unwrap_or(0)
        })
        .unwrap_or(0);

    NaiveTime::from_hms_micro_opt(hour, minute, second, micro).ok_or_else(|| {
        HawkError::Metadata(format!("Invalid GPS start time '{}'", field))
    })
}

/// One timestamp per line at a fixed cadence from `start`
///
/// Offsets are accumulated in whole microseconds so consecutive timestamps are
/// exactly one line period apart.
pub fn line_timestamps(
    start: DateTime<Utc>,
    lines: usize,
    line_period_s: f64,
) -> HawkResult<Vec<DateTime<Utc>>> {
    if !(line_period_s.is_finite() && line_period_s > 0.0) {
        return Err(HawkError::Processing(format!(
            "Line period must be positive, got {}",
            line_period_s
        )));
    }
    let period_us = (line_period_s * 1e6).round() as i64;

    Ok((0..lines as i64)
        .map(|i| start + Duration::microseconds(i * period_us))
        .collect())
}
