//! NumPy `.npy` arrays and `.npz` archives
//!
//! Only the little-endian, C-ordered layouts written by this crate are
//! supported: `<f8`, `<i8` and `<M8[us]` (datetime64 in microseconds).

use crate::types::{HawkError, HawkResult};
use regex::Regex;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const NPY_MAGIC: &[u8; 6] = b"\x93NUMPY";
/// Header blocks are padded so the data starts on this boundary
const NPY_ALIGNMENT: usize = 64;

/// Element storage of an `.npy` array
#[derive(Debug, Clone, PartialEq)]
pub enum NpyData {
    F64(Vec<f64>),
    I64(Vec<i64>),
    /// datetime64[us] as microseconds since the Unix epoch
    DateTimeUs(Vec<i64>),
}

impl NpyData {
    pub fn descr(&self) -> &'static str {
        match self {
            NpyData::F64(_) => "<f8",
            NpyData::I64(_) => "<i8",
            NpyData::DateTimeUs(_) => "<M8[us]",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            NpyData::F64(v) => v.len(),
            NpyData::I64(v) | NpyData::DateTimeUs(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One n-dimensional array in C order
#[derive(Debug, Clone, PartialEq)]
pub struct NpyArray {
    pub shape: Vec<usize>,
    pub data: NpyData,
}

impl NpyArray {
    pub fn new(shape: Vec<usize>, data: NpyData) -> HawkResult<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(HawkError::Export(format!(
                "Array of shape {:?} needs {} elements, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// The dictionary literal stored in the `.npy` header
    fn header_dict(&self) -> String {
        let shape = match self.shape.len() {
            0 => "()".to_string(),
            1 => format!("({},)", self.shape[0]),
            _ => format!(
                "({})",
                self.shape
                    .iter()
                    .map(|d| d.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        };
        format!(
            "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
            self.data.descr(),
            shape
        )
    }

    /// Serialize as a version 1.0 `.npy` file
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut header = self.header_dict();
        // magic + version + u16 length + header + '\n' must be aligned
        let unpadded = NPY_MAGIC.len() + 2 + 2 + header.len() + 1;
        let padding = (NPY_ALIGNMENT - unpadded % NPY_ALIGNMENT) % NPY_ALIGNMENT;
        header.extend(std::iter::repeat(' ').take(padding));
        header.push('\n');

        let mut bytes = Vec::with_capacity(unpadded + padding + self.data.len() * 8);
        bytes.extend_from_slice(NPY_MAGIC);
        bytes.extend_from_slice(&[1, 0]);
        bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());

        match &self.data {
            NpyData::F64(values) => values
                .iter()
                .for_each(|v| bytes.extend_from_slice(&v.to_le_bytes())),
            NpyData::I64(values) | NpyData::DateTimeUs(values) => values
                .iter()
                .for_each(|v| bytes.extend_from_slice(&v.to_le_bytes())),
        }
        bytes
    }

    /// Parse a `.npy` file (format versions 1.x and 2.x)
    pub fn from_bytes(bytes: &[u8]) -> HawkResult<Self> {
        if bytes.len() < 10 || &bytes[..6] != NPY_MAGIC {
            return Err(HawkError::InvalidFormat("Not an .npy array".to_string()));
        }

        let (header_len, data_start) = match bytes[6] {
            1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
            2 | 3 if bytes.len() >= 12 => (
                u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
                12,
            ),
            major => {
                return Err(HawkError::InvalidFormat(format!(
                    "Unsupported .npy version {}",
                    major
                )))
            }
        };
        let header_end = data_start + header_len;
        if bytes.len() < header_end {
            return Err(HawkError::InvalidFormat("Truncated .npy header".to_string()));
        }
        let header = std::str::from_utf8(&bytes[data_start..header_end])
            .map_err(|e| HawkError::InvalidFormat(format!("Invalid .npy header: {}", e)))?;

        let descr = capture(header, r"'descr'\s*:\s*'([^']+)'")?;
        let fortran = capture(header, r"'fortran_order'\s*:\s*(True|False)")?;
        let shape_text = capture(header, r"'shape'\s*:\s*\(([^)]*)\)")?;

        if fortran == "True" {
            return Err(HawkError::InvalidFormat(
                "Fortran-ordered arrays are not supported".to_string(),
            ));
        }

        let shape = shape_text
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(|d| {
                d.parse::<usize>()
                    .map_err(|e| HawkError::InvalidFormat(format!("Invalid shape '{}': {}", d, e)))
            })
            .collect::<HawkResult<Vec<usize>>>()?;

        let count: usize = shape.iter().product();
        let payload = &bytes[header_end..];
        if payload.len() < count * 8 {
            return Err(HawkError::InvalidFormat(format!(
                "Array data has {} bytes, expected {}",
                payload.len(),
                count * 8
            )));
        }

        let words = payload[..count * 8].chunks_exact(8).map(|chunk| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            raw
        });

        let data = match descr.as_str() {
            "<f8" => NpyData::F64(words.map(f64::from_le_bytes).collect()),
            "<i8" => NpyData::I64(words.map(i64::from_le_bytes).collect()),
            "<M8[us]" => NpyData::DateTimeUs(words.map(i64::from_le_bytes).collect()),
            other => {
                return Err(HawkError::InvalidFormat(format!(
                    "Unsupported .npy dtype '{}'",
                    other
                )))
            }
        };

        NpyArray::new(shape, data)
    }
}

fn capture(text: &str, pattern: &str) -> HawkResult<String> {
    let re = Regex::new(pattern).map_err(|e| HawkError::Processing(format!("Regex error: {}", e)))?;
    re.captures(text)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| HawkError::InvalidFormat(format!("Missing .npy header entry for {}", pattern)))
}

/// Writer for `.npz` archives (a zip of `.npy` entries)
pub struct NpzWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    options: FileOptions,
}

impl NpzWriter<File> {
    /// Create an archive on disk; `compress` deflates entries like `numpy.savez_compressed`
    pub fn create<P: AsRef<Path>>(path: P, compress: bool) -> HawkResult<Self> {
        let file = File::create(path.as_ref())?;
        Ok(Self::new(file, compress))
    }
}

impl<W: Write + Seek> NpzWriter<W> {
    pub fn new(writer: W, compress: bool) -> Self {
        let method = if compress {
            CompressionMethod::Deflated
        } else {
            CompressionMethod::Stored
        };
        // Fixed entry timestamps keep archives byte-reproducible
        let options = FileOptions::default()
            .compression_method(method)
            .last_modified_time(zip::DateTime::default());

        Self {
            zip: ZipWriter::new(writer),
            options,
        }
    }

    /// Add an array stored as `<name>.npy`
    pub fn add_array(&mut self, name: &str, array: &NpyArray) -> HawkResult<()> {
        log::debug!("Adding {}.npy with shape {:?}", name, array.shape);
        self.zip.start_file(format!("{}.npy", name), self.options)?;
        self.zip.write_all(&array.to_bytes())?;
        Ok(())
    }

    pub fn finish(mut self) -> HawkResult<W> {
        Ok(self.zip.finish()?)
    }
}

/// Read every array of an `.npz` archive, keyed by entry name without `.npy`
pub fn read_npz<P: AsRef<Path>>(path: P) -> HawkResult<BTreeMap<String, NpyArray>> {
    let file = File::open(path.as_ref())?;
    let mut archive = ZipArchive::new(file)?;
    let mut arrays = BTreeMap::new();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().trim_end_matches(".npy").to_string();
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        arrays.insert(name, NpyArray::from_bytes(&bytes)?);
    }

    Ok(arrays)
}
