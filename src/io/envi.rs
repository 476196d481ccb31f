//! ENVI header parsing and flat binary cube decoding
//!
//! Hawk raw and calibration files are both ENVI rasters: a text header with
//! `key = value` entries next to a headerless binary payload. Cubes are always
//! returned as (line, sample, band) regardless of the on-disk interleave.

use crate::types::{HawkError, HawkResult, SpectralCube};
use flate2::read::GzDecoder;
use ndarray::Array3;
use regex::Regex;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Extensions probed, in order, when looking for the payload next to a header
const DATA_EXTENSIONS: [&str; 6] = ["img", "dat", "raw", "bil", "bsq", "bip"];

/// ENVI `data type` codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnviDataType {
    U8,
    I16,
    I32,
    F32,
    F64,
    U16,
    U32,
    I64,
    U64,
}

impl EnviDataType {
    pub fn from_code(code: u32) -> HawkResult<Self> {
        match code {
            1 => Ok(EnviDataType::U8),
            2 => Ok(EnviDataType::I16),
            3 => Ok(EnviDataType::I32),
            4 => Ok(EnviDataType::F32),
            5 => Ok(EnviDataType::F64),
            12 => Ok(EnviDataType::U16),
            13 => Ok(EnviDataType::U32),
            14 => Ok(EnviDataType::I64),
            15 => Ok(EnviDataType::U64),
            other => Err(HawkError::InvalidFormat(format!(
                "Unsupported ENVI data type: {}",
                other
            ))),
        }
    }

    /// Size of one sample in bytes
    pub fn size(&self) -> usize {
        match self {
            EnviDataType::U8 => 1,
            EnviDataType::I16 | EnviDataType::U16 => 2,
            EnviDataType::I32 | EnviDataType::U32 | EnviDataType::F32 => 4,
            EnviDataType::F64 | EnviDataType::I64 | EnviDataType::U64 => 8,
        }
    }
}

/// Band interleave of the binary payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interleave {
    /// band sequential: [band][line][sample]
    Bsq,
    /// band interleaved by line: [line][band][sample]
    Bil,
    /// band interleaved by pixel: [line][sample][band]
    Bip,
}

impl FromStr for Interleave {
    type Err = HawkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bsq" => Ok(Interleave::Bsq),
            "bil" => Ok(Interleave::Bil),
            "bip" => Ok(Interleave::Bip),
            other => Err(HawkError::InvalidFormat(format!(
                "Unknown ENVI interleave: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

/// Parsed ENVI header
#[derive(Debug, Clone)]
pub struct EnviHeader {
    entries: HashMap<String, String>,
    pub samples: usize,
    pub lines: usize,
    pub bands: usize,
    pub header_offset: usize,
    pub data_type: EnviDataType,
    pub interleave: Interleave,
    pub byte_order: ByteOrder,
    /// Payload is gzip compressed (`file compression = 1`)
    pub compressed: bool,
    /// Samples equal to this value are treated as missing
    pub ignore_value: Option<f64>,
}

impl EnviHeader {
    /// Read and parse a header file
    pub fn read<P: AsRef<Path>>(path: P) -> HawkResult<Self> {
        let path = path.as_ref();
        log::debug!("Reading ENVI header: {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|e| {
            HawkError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read header {}: {}", path.display(), e),
            ))
        })?;
        Self::parse(&text)
    }

    /// Parse header text
    pub fn parse(text: &str) -> HawkResult<Self> {
        let entries = parse_entries(text)?;
        log::debug!("Parsed {} ENVI header entries", entries.len());

        let mut header = EnviHeader {
            entries,
            samples: 0,
            lines: 0,
            bands: 0,
            header_offset: 0,
            data_type: EnviDataType::U8,
            interleave: Interleave::Bsq,
            byte_order: ByteOrder::Little,
            compressed: false,
            ignore_value: None,
        };

        header.samples = header.parse_field("samples")?;
        header.lines = header.parse_field("lines")?;
        header.bands = header.parse_field("bands")?;
        header.data_type = EnviDataType::from_code(header.parse_field("data type")?)?;
        header.interleave = header.require("interleave")?.parse()?;

        if header.contains("header offset") {
            header.header_offset = header.parse_field("header offset")?;
        }
        if header.contains("byte order") {
            header.byte_order = match header.parse_field::<u8>("byte order")? {
                0 => ByteOrder::Little,
                1 => ByteOrder::Big,
                other => {
                    return Err(HawkError::InvalidFormat(format!(
                        "Invalid ENVI byte order: {}",
                        other
                    )))
                }
            };
        }
        if header.contains("file compression") {
            header.compressed = header.parse_field::<u8>("file compression")? == 1;
        }
        if header.contains("data ignore value") {
            header.ignore_value = Some(header.parse_field("data ignore value")?);
        }
        header.data_end()?;

        Ok(header)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(&normalize_key(key))
    }

    /// Raw text of a header entry
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(&normalize_key(key)).map(|s| s.as_str())
    }

    /// Raw text of a header entry that must be present
    pub fn require(&self, key: &str) -> HawkResult<&str> {
        self.get(key)
            .ok_or_else(|| HawkError::Metadata(format!("Missing header field '{}'", key)))
    }

    /// Parse a scalar header entry
    pub fn parse_field<T>(&self, key: &str) -> HawkResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let value = self.require(key)?;
        value.trim().parse::<T>().map_err(|e| {
            HawkError::Metadata(format!("Invalid value '{}' for '{}': {}", value, key, e))
        })
    }

    /// Comma separated list entry (the text between braces)
    pub fn list(&self, key: &str) -> Option<Vec<String>> {
        self.get(key).map(|value| {
            value
                .split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect()
        })
    }

    /// Band centre wavelengths, one per band
    pub fn wavelengths(&self) -> HawkResult<Vec<f64>> {
        let items = self
            .list("wavelength")
            .ok_or_else(|| HawkError::Metadata("Missing header field 'wavelength'".to_string()))?;
        let wavelengths = items
            .iter()
            .map(|item| {
                item.parse::<f64>().map_err(|e| {
                    HawkError::Metadata(format!("Invalid wavelength '{}': {}", item, e))
                })
            })
            .collect::<HawkResult<Vec<f64>>>()?;

        if wavelengths.len() != self.bands {
            return Err(HawkError::Metadata(format!(
                "Header lists {} wavelengths for {} bands",
                wavelengths.len(),
                self.bands
            )));
        }
        Ok(wavelengths)
    }

    /// Number of samples in the cube
    pub fn sample_count(&self) -> HawkResult<usize> {
        self.lines
            .checked_mul(self.samples)
            .and_then(|n| n.checked_mul(self.bands))
            .ok_or_else(|| {
                HawkError::InvalidFormat(format!(
                    "ENVI dimensions {} x {} x {} overflow",
                    self.lines, self.samples, self.bands
                ))
            })
    }

    /// Bytes needed after the header offset
    pub fn payload_len(&self) -> HawkResult<usize> {
        self.sample_count()?
            .checked_mul(self.data_type.size())
            .ok_or_else(|| HawkError::InvalidFormat("ENVI payload size overflows".to_string()))
    }

    /// Offset one past the last payload byte
    pub fn data_end(&self) -> HawkResult<usize> {
        self.header_offset
            .checked_add(self.payload_len()?)
            .ok_or_else(|| HawkError::InvalidFormat("ENVI payload size overflows".to_string()))
    }
}

/// Split header text into normalised `key -> value` entries
fn parse_entries(text: &str) -> HawkResult<HashMap<String, String>> {
    let mut lines = text.lines();

    let magic = lines
        .by_ref()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();
    if magic != "ENVI" {
        return Err(HawkError::InvalidFormat(
            "Header does not start with 'ENVI'".to_string(),
        ));
    }

    let entry_pattern = Regex::new(r"^\s*([^=]+?)\s*=\s*(.*?)\s*$")
        .map_err(|e| HawkError::Processing(format!("Regex error: {}", e)))?;

    let mut entries = HashMap::new();
    while let Some(line) = lines.next() {
        if line.trim().is_empty() || line.trim_start().starts_with(';') {
            continue;
        }
        let captures = match entry_pattern.captures(line) {
            Some(captures) => captures,
            None => {
                log::debug!("Ignoring header line without '=': {}", line.trim());
                continue;
            }
        };

        let key = normalize_key(&captures[1]);
        let mut value = captures[2].to_string();

        if value.starts_with('{') {
            while !value.contains('}') {
                let next = lines.next().ok_or_else(|| {
                    HawkError::InvalidFormat(format!("Unterminated '{{' in header field '{}'", key))
                })?;
                value.push(' ');
                value.push_str(next.trim());
            }
            let end = value.rfind('}').unwrap_or(value.len());
            value = value[1..end].trim().to_string();
        }

        entries.insert(key, value);
    }

    Ok(entries)
}

fn normalize_key(key: &str) -> String {
    key.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

macro_rules! decode_as {
    ($bytes:expr, $t:ty, $order:expr) => {{
        const WIDTH: usize = std::mem::size_of::<$t>();
        $bytes
            .chunks_exact(WIDTH)
            .map(|chunk| {
                let mut raw = [0u8; WIDTH];
                raw.copy_from_slice(chunk);
                let value = match $order {
                    ByteOrder::Little => <$t>::from_le_bytes(raw),
                    ByteOrder::Big => <$t>::from_be_bytes(raw),
                };
                value as f64
            })
            .collect::<Vec<f64>>()
    }};
}

/// Decode a payload (header offset included) into a (line, sample, band) cube
pub fn decode_cube(header: &EnviHeader, bytes: &[u8]) -> HawkResult<SpectralCube> {
    let needed = header.data_end()?;
    if bytes.len() < needed {
        return Err(HawkError::InvalidFormat(format!(
            "ENVI payload has {} bytes, expected at least {}",
            bytes.len(),
            needed
        )));
    }
    if bytes.len() > needed {
        log::debug!("Ignoring {} trailing payload bytes", bytes.len() - needed);
    }

    let payload = &bytes[header.header_offset..needed];
    let order = header.byte_order;
    let values = match header.data_type {
        EnviDataType::U8 => payload.iter().map(|&v| v as f64).collect(),
        EnviDataType::I16 => decode_as!(payload, i16, order),
        EnviDataType::I32 => decode_as!(payload, i32, order),
        EnviDataType::F32 => decode_as!(payload, f32, order),
        EnviDataType::F64 => decode_as!(payload, f64, order),
        EnviDataType::U16 => decode_as!(payload, u16, order),
        EnviDataType::U32 => decode_as!(payload, u32, order),
        EnviDataType::I64 => decode_as!(payload, i64, order),
        EnviDataType::U64 => decode_as!(payload, u64, order),
    };

    let (lines, samples, bands) = (header.lines, header.samples, header.bands);
    let shape_error =
        |e: ndarray::ShapeError| HawkError::InvalidFormat(format!("Failed to reshape ENVI data: {}", e));

    let mut cube = match header.interleave {
        Interleave::Bip => Array3::from_shape_vec((lines, samples, bands), values).map_err(shape_error)?,
        Interleave::Bil => Array3::from_shape_vec((lines, bands, samples), values)
            .map_err(shape_error)?
            .permuted_axes([0, 2, 1])
            .as_standard_layout()
            .into_owned(),
        Interleave::Bsq => Array3::from_shape_vec((bands, lines, samples), values)
            .map_err(shape_error)?
            .permuted_axes([1, 2, 0])
            .as_standard_layout()
            .into_owned(),
    };

    if let Some(ignore) = header.ignore_value {
        cube.mapv_inplace(|v| if v == ignore { f64::NAN } else { v });
    }

    Ok(cube)
}

/// Payload file next to a header: bare stem first, then the usual extensions
pub fn find_data_file(header_path: &Path) -> Option<PathBuf> {
    let stem = header_path.with_extension("");
    if stem.as_path() != header_path && stem.is_file() {
        return Some(stem);
    }
    DATA_EXTENSIONS
        .iter()
        .flat_map(|ext| [ext.to_string(), ext.to_uppercase()])
        .map(|ext| header_path.with_extension(ext))
        .find(|candidate| candidate.is_file())
}

/// Header file next to a payload: `<name>.hdr`, then `<stem>.hdr`
pub fn find_header_file(data_path: &Path) -> Option<PathBuf> {
    let mut appended = data_path.as_os_str().to_owned();
    appended.push(".hdr");
    let appended = PathBuf::from(appended);
    if appended.is_file() {
        return Some(appended);
    }
    let replaced = data_path.with_extension("hdr");
    if replaced.is_file() {
        return Some(replaced);
    }
    None
}

fn is_header_path(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("hdr"))
        .unwrap_or(false)
}

/// ENVI raster bound to its header and payload paths
#[derive(Debug, Clone)]
pub struct EnviReader {
    header_path: PathBuf,
    data_path: PathBuf,
    header: EnviHeader,
}

impl EnviReader {
    /// Open a raster from either its header or its payload path
    pub fn open<P: AsRef<Path>>(path: P) -> HawkResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(HawkError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("File not found: {}", path.display()),
            )));
        }

        let (header_path, data_path) = if is_header_path(path) {
            let data = find_data_file(path).ok_or_else(|| {
                HawkError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("No data file found for header {}", path.display()),
                ))
            })?;
            (path.to_path_buf(), data)
        } else {
            let header = find_header_file(path).ok_or_else(|| {
                HawkError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("No header file found for {}", path.display()),
                ))
            })?;
            (header, path.to_path_buf())
        };

        Self::with_paths(header_path, data_path)
    }

    /// Open a raster from explicit header and payload paths
    pub fn with_paths<P: AsRef<Path>, Q: AsRef<Path>>(header_path: P, data_path: Q) -> HawkResult<Self> {
        let header_path = header_path.as_ref().to_path_buf();
        let data_path = data_path.as_ref().to_path_buf();

        for path in [&header_path, &data_path] {
            if !path.is_file() {
                return Err(HawkError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path.display()),
                )));
            }
        }

        let header = EnviHeader::read(&header_path)?;
        log::debug!(
            "ENVI raster {}: {} lines x {} samples x {} bands, {:?} {:?}",
            data_path.display(),
            header.lines,
            header.samples,
            header.bands,
            header.data_type,
            header.interleave
        );

        Ok(Self {
            header_path,
            data_path,
            header,
        })
    }

    pub fn header(&self) -> &EnviHeader {
        &self.header
    }

    pub fn header_path(&self) -> &Path {
        &self.header_path
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Read the payload into a (line, sample, band) cube
    pub fn read_cube(&self) -> HawkResult<SpectralCube> {
        let start = std::time::Instant::now();
        let needed = self.header.data_end()?;
        let file = File::open(&self.data_path)?;
        let mut bytes = Vec::new();

        if self.header.compressed {
            GzDecoder::new(file).take(needed as u64).read_to_end(&mut bytes)?;
        } else {
            let file_len = file.metadata()?.len();
            if file_len < needed as u64 {
                return Err(HawkError::InvalidFormat(format!(
                    "{} has {} bytes, header describes {}",
                    self.data_path.display(),
                    file_len,
                    needed
                )));
            }
            bytes.reserve_exact(needed);
            file.take(needed as u64).read_to_end(&mut bytes)?;
        }

        let cube = decode_cube(&self.header, &bytes)?;
        log::debug!("Decoded {} in {:?}", self.data_path.display(), start.elapsed());
        Ok(cube)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "ENVI
description = {
  Hawk test cube}
samples = 2
lines   = 3
bands   = 2
header offset = 0
file type = ENVI Standard
data type = 12
interleave = bil
byte order = 0
Wavelength = { 1000.5,
 1200.25 }
";

    #[test]
    fn test_header_parsing() {
        let header = EnviHeader::parse(HEADER).unwrap();
        assert_eq!(header.samples, 2);
        assert_eq!(header.lines, 3);
        assert_eq!(header.bands, 2);
        assert_eq!(header.data_type, EnviDataType::U16);
        assert_eq!(header.interleave, Interleave::Bil);
        assert_eq!(header.byte_order, ByteOrder::Little);
        assert_eq!(header.get("description"), Some("Hawk test cube"));
        assert_eq!(header.get("FILE  TYPE"), Some("ENVI Standard"));
        assert_eq!(header.wavelengths().unwrap(), vec![1000.5, 1200.25]);
        assert_eq!(header.payload_len().unwrap(), 24);
    }

    #[test]
    fn test_header_rejects_missing_magic() {
        assert!(EnviHeader::parse("samples = 2\n").is_err());
    }

    #[test]
    fn test_header_missing_required_field() {
        let text = HEADER.replace("lines   = 3\n", "");
        let err = EnviHeader::parse(&text).unwrap_err();
        assert!(matches!(err, HawkError::Metadata(_)));
    }

    #[test]
    fn test_unterminated_brace() {
        let text = "ENVI\nsamples = 1\nwavelength = { 1, 2,\n 3\n";
        assert!(EnviHeader::parse(text).is_err());
    }

    #[test]
    fn test_decode_interleaves_agree() {
        // value = 100*line + 10*sample + band
        let (lines, samples, bands) = (3usize, 2usize, 2usize);
        let value = |l: usize, s: usize, b: usize| (100 * l + 10 * s + b) as u16;

        let mut bsq = Vec::new();
        for b in 0..bands {
            for l in 0..lines {
                for s in 0..samples {
                    bsq.extend_from_slice(&value(l, s, b).to_le_bytes());
                }
            }
        }
        let mut bil = Vec::new();
        for l in 0..lines {
            for b in 0..bands {
                for s in 0..samples {
                    bil.extend_from_slice(&value(l, s, b).to_le_bytes());
                }
            }
        }
        let mut bip = Vec::new();
        for l in 0..lines {
            for s in 0..samples {
                for b in 0..bands {
                    bip.extend_from_slice(&value(l, s, b).to_le_bytes());
                }
            }
        }

        for (interleave, bytes) in [("bsq", bsq), ("bil", bil), ("bip", bip)] {
            let header = EnviHeader::parse(&HEADER.replace("interleave = bil", &format!("interleave = {}", interleave))).unwrap();
            let cube = decode_cube(&header, &bytes).unwrap();
            assert_eq!(cube.dim(), (lines, samples, bands));
            for l in 0..lines {
                for s in 0..samples {
                    for b in 0..bands {
                        assert_eq!(cube[[l, s, b]], value(l, s, b) as f64, "{} at {},{},{}", interleave, l, s, b);
                    }
                }
            }
        }
    }

    #[test]
    fn test_decode_big_endian_float_with_offset_and_ignore_value() {
        let text = "ENVI\nsamples = 2\nlines = 1\nbands = 1\ndata type = 4\ninterleave = bsq\nbyte order = 1\nheader offset = 3\ndata ignore value = -9999\n";
        let header = EnviHeader::parse(text).unwrap();
        let mut bytes = vec![0xAA, 0xBB, 0xCC];
        bytes.extend_from_slice(&1.5f32.to_be_bytes());
        bytes.extend_from_slice(&(-9999.0f32).to_be_bytes());

        let cube = decode_cube(&header, &bytes).unwrap();
        assert_eq!(cube[[0, 0, 0]], 1.5);
        assert!(cube[[0, 1, 0]].is_nan());
    }

    #[test]
    fn test_decode_short_payload() {
        let header = EnviHeader::parse(HEADER).unwrap();
        let err = decode_cube(&header, &[0u8; 10]).unwrap_err();
        assert!(matches!(err, HawkError::InvalidFormat(_)));
    }

    #[test]
    fn test_overflowing_dimensions_are_rejected() {
        let text = "ENVI\nsamples = 4294967296\nlines = 4294967296\nbands = 2\ndata type = 12\ninterleave = bsq\n";
        let err = EnviHeader::parse(text).unwrap_err();
        assert!(matches!(err, HawkError::InvalidFormat(_)));

        let text = "ENVI\nsamples = 2\nlines = 2\nbands = 1\ndata type = 12\ninterleave = bsq\nheader offset = 18446744073709551615\n";
        assert!(matches!(EnviHeader::parse(text), Err(HawkError::InvalidFormat(_))));
    }

    #[test]
    fn test_payload_shorter_than_header_claims() {
        let dir = tempfile::TempDir::new().unwrap();
        let header_path = dir.path().join("huge.hdr");
        std::fs::write(
            &header_path,
            "ENVI\nsamples = 100000\nlines = 100000\nbands = 1000\ndata type = 12\ninterleave = bsq\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("huge.img"), [0u8; 16]).unwrap();

        let err = EnviReader::open(&header_path).unwrap().read_cube().unwrap_err();
        assert!(matches!(err, HawkError::InvalidFormat(_)));
    }
}
