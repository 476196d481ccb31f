//! Synthetic Hawk measurement and calibration files for integration tests
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

pub const WAVELENGTHS: [f64; 5] = [1000.0, 1200.0, 1600.0, 2100.0, 2200.0];
pub const ACQUISITION_DATE: &str = "DATE(dd-mm-yyyy): 19-06-2019";
pub const GPS_START_TIME: &str = "UTC TIME: 10:15:30.25";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Shape and metadata of a synthetic raw measurement
#[derive(Debug, Clone)]
pub struct RawSpec {
    pub lines: usize,
    pub pixels: usize,
    pub wavelengths: Vec<f64>,
    pub dark_start_line: usize,
    pub tint: f64,
}

impl Default for RawSpec {
    fn default() -> Self {
        Self {
            lines: 100,
            pixels: 384,
            wavelengths: WAVELENGTHS.to_vec(),
            dark_start_line: 80,
            tint: 0.05,
        }
    }
}

fn wavelength_list(wavelengths: &[f64]) -> String {
    wavelengths
        .iter()
        .map(|w| format!("{:.2}", w))
        .collect::<Vec<_>>()
        .join(",\n ")
}

/// Write `<dir>/<name>.hdr` and a little-endian u16 BIL payload `<dir>/<name>.raw`
///
/// Returns the header path.
pub fn write_raw(dir: &Path, name: &str, spec: &RawSpec, value: impl Fn(usize, usize, usize) -> u16) -> PathBuf {
    let bands = spec.wavelengths.len();
    let header = format!(
        "ENVI\n\
         description = {{\n  Synthetic Hawk measurement}}\n\
         samples = {}\n\
         lines = {}\n\
         bands = {}\n\
         header offset = 0\n\
         file type = ENVI Standard\n\
         data type = 12\n\
         interleave = bil\n\
         byte order = 0\n\
         acquisition date = {}\n\
         GPS Start Time = {}\n\
         autodarkstartline = {}\n\
         tint = {}\n\
         wavelength = {{ {} }}\n",
        spec.pixels,
        spec.lines,
        bands,
        ACQUISITION_DATE,
        GPS_START_TIME,
        spec.dark_start_line,
        spec.tint,
        wavelength_list(&spec.wavelengths)
    );
    let header_path = dir.join(format!("{}.hdr", name));
    fs::write(&header_path, header).unwrap();

    let mut payload = Vec::with_capacity(spec.lines * spec.pixels * bands * 2);
    for l in 0..spec.lines {
        for b in 0..bands {
            for p in 0..spec.pixels {
                payload.extend_from_slice(&value(l, p, b).to_le_bytes());
            }
        }
    }
    fs::write(dir.join(format!("{}.raw", name)), payload).unwrap();

    header_path
}

/// Write a single-line f32 BSQ calibration pair `<name>.hdr` + `<name>.cal`
///
/// `value` returns the stored (scaled by 100) gain. Returns the payload path.
pub fn write_calibration(
    dir: &Path,
    name: &str,
    pixels: usize,
    wavelengths: &[f64],
    tint: f64,
    value: impl Fn(usize, usize) -> f32,
) -> PathBuf {
    let bands = wavelengths.len();
    let header = format!(
        "ENVI\n\
         samples = {}\n\
         lines = 1\n\
         bands = {}\n\
         header offset = 0\n\
         data type = 4\n\
         interleave = bsq\n\
         byte order = 0\n\
         tint = {}\n\
         wavelength = {{ {} }}\n",
        pixels,
        bands,
        tint,
        wavelength_list(wavelengths)
    );
    fs::write(dir.join(format!("{}.hdr", name)), header).unwrap();

    let mut payload = Vec::with_capacity(pixels * bands * 4);
    for b in 0..bands {
        for p in 0..pixels {
            payload.extend_from_slice(&value(p, b).to_le_bytes());
        }
    }
    let data_path = dir.join(format!("{}.cal", name));
    fs::write(&data_path, payload).unwrap();
    data_path
}

/// Bright scene above a constant dark level of 100 counts
pub fn scene_value(dark_start_line: usize) -> impl Fn(usize, usize, usize) -> u16 {
    move |l, p, b| {
        if l >= dark_start_line {
            100
        } else {
            (1000 + 10 * b + (p % 7) + l) as u16
        }
    }
}
