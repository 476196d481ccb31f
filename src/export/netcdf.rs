//! NetCDF classic format (CDF-1 / CDF-2) encoder and decoder
//!
//! Covers fixed-size dimensions and variables, which is all the gridded
//! export needs. Record (unlimited) variables are rejected when reading.

use crate::types::{HawkError, HawkResult};
use std::path::Path;

const NC_DIMENSION: u32 = 0x0A;
const NC_VARIABLE: u32 = 0x0B;
const NC_ATTRIBUTE: u32 = 0x0C;

/// Attribute or variable values, tagged with their external type
#[derive(Debug, Clone, PartialEq)]
pub enum NcValues {
    Byte(Vec<i8>),
    Char(String),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Float(Vec<f32>),
    Double(Vec<f64>),
}

impl NcValues {
    fn type_code(&self) -> u32 {
        match self {
            NcValues::Byte(_) => 1,
            NcValues::Char(_) => 2,
            NcValues::Short(_) => 3,
            NcValues::Int(_) => 4,
            NcValues::Float(_) => 5,
            NcValues::Double(_) => 6,
        }
    }

    /// Number of elements (bytes for text)
    pub fn len(&self) -> usize {
        match self {
            NcValues::Byte(v) => v.len(),
            NcValues::Char(s) => s.len(),
            NcValues::Short(v) => v.len(),
            NcValues::Int(v) => v.len(),
            NcValues::Float(v) => v.len(),
            NcValues::Double(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn element_size(type_code: u32) -> HawkResult<usize> {
        match type_code {
            1 | 2 => Ok(1),
            3 => Ok(2),
            4 | 5 => Ok(4),
            6 => Ok(8),
            other => Err(HawkError::InvalidFormat(format!(
                "Unknown NetCDF type {}",
                other
            ))),
        }
    }

    /// Encoded size without padding
    fn byte_len(&self) -> usize {
        // type codes produced by `type_code` are always valid
        self.len() * Self::element_size(self.type_code()).unwrap_or(1)
    }

    /// Big-endian encoding without padding
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            NcValues::Byte(v) => out.extend(v.iter().map(|&b| b as u8)),
            NcValues::Char(s) => out.extend_from_slice(s.as_bytes()),
            NcValues::Short(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_be_bytes())),
            NcValues::Int(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_be_bytes())),
            NcValues::Float(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_be_bytes())),
            NcValues::Double(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_be_bytes())),
        }
    }

    fn decode(type_code: u32, bytes: &[u8]) -> HawkResult<Self> {
        macro_rules! be_values {
            ($t:ty) => {{
                const WIDTH: usize = std::mem::size_of::<$t>();
                bytes
                    .chunks_exact(WIDTH)
                    .map(|chunk| {
                        let mut raw = [0u8; WIDTH];
                        raw.copy_from_slice(chunk);
                        <$t>::from_be_bytes(raw)
                    })
                    .collect()
            }};
        }

        Ok(match type_code {
            1 => NcValues::Byte(bytes.iter().map(|&b| b as i8).collect()),
            2 => NcValues::Char(
                String::from_utf8_lossy(bytes)
                    .trim_end_matches('\0')
                    .to_string(),
            ),
            3 => NcValues::Short(be_values!(i16)),
            4 => NcValues::Int(be_values!(i32)),
            5 => NcValues::Float(be_values!(f32)),
            6 => NcValues::Double(be_values!(f64)),
            other => {
                return Err(HawkError::InvalidFormat(format!(
                    "Unknown NetCDF type {}",
                    other
                )))
            }
        })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            NcValues::Char(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric values widened to f64
    pub fn to_f64(&self) -> Option<Vec<f64>> {
        match self {
            NcValues::Byte(v) => Some(v.iter().map(|&x| x as f64).collect()),
            NcValues::Char(_) => None,
            NcValues::Short(v) => Some(v.iter().map(|&x| x as f64).collect()),
            NcValues::Int(v) => Some(v.iter().map(|&x| x as f64).collect()),
            NcValues::Float(v) => Some(v.iter().map(|&x| x as f64).collect()),
            NcValues::Double(v) => Some(v.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NcAttribute {
    pub name: String,
    pub value: NcValues,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NcDimension {
    pub name: String,
    pub len: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NcVariable {
    pub name: String,
    /// Indices into the dataset's dimension list
    pub dims: Vec<usize>,
    pub attributes: Vec<NcAttribute>,
    pub data: NcValues,
}

impl NcVariable {
    pub fn attribute(&self, name: &str) -> Option<&NcValues> {
        find_attribute(&self.attributes, name)
    }
}

fn find_attribute<'a>(attributes: &'a [NcAttribute], name: &str) -> Option<&'a NcValues> {
    attributes.iter().find(|a| a.name == name).map(|a| &a.value)
}

/// In-memory NetCDF classic dataset
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetcdfDataset {
    pub dimensions: Vec<NcDimension>,
    pub attributes: Vec<NcAttribute>,
    pub variables: Vec<NcVariable>,
}

impl NetcdfDataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fixed-size dimension and return its id
    pub fn add_dimension(&mut self, name: &str, len: usize) -> HawkResult<usize> {
        if len == 0 {
            return Err(HawkError::Export(format!(
                "Dimension '{}' must not be empty",
                name
            )));
        }
        if self.dimensions.iter().any(|d| d.name == name) {
            return Err(HawkError::Export(format!("Duplicate dimension '{}'", name)));
        }
        self.dimensions.push(NcDimension {
            name: name.to_string(),
            len,
        });
        Ok(self.dimensions.len() - 1)
    }

    pub fn add_attribute(&mut self, name: &str, value: NcValues) {
        self.attributes.push(NcAttribute {
            name: name.to_string(),
            value,
        });
    }

    /// Add a variable over `dims`; the data length must match their product
    pub fn add_variable(
        &mut self,
        name: &str,
        dims: &[usize],
        data: NcValues,
        attributes: Vec<NcAttribute>,
    ) -> HawkResult<()> {
        if self.variables.iter().any(|v| v.name == name) {
            return Err(HawkError::Export(format!("Duplicate variable '{}'", name)));
        }
        let mut expected = 1usize;
        for &dim in dims {
            let dimension = self.dimensions.get(dim).ok_or_else(|| {
                HawkError::Export(format!("Variable '{}' uses unknown dimension {}", name, dim))
            })?;
            expected *= dimension.len;
        }
        if expected != data.len() {
            return Err(HawkError::Export(format!(
                "Variable '{}' needs {} values, got {}",
                name,
                expected,
                data.len()
            )));
        }

        self.variables.push(NcVariable {
            name: name.to_string(),
            dims: dims.to_vec(),
            attributes,
            data,
        });
        Ok(())
    }

    pub fn attribute(&self, name: &str) -> Option<&NcValues> {
        find_attribute(&self.attributes, name)
    }

    pub fn variable(&self, name: &str) -> Option<&NcVariable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn dimension(&self, name: &str) -> Option<&NcDimension> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    /// Encode the dataset, switching to 64-bit offsets when needed
    pub fn to_bytes(&self) -> HawkResult<Vec<u8>> {
        let data_len: usize = self.variables.iter().map(|v| padded(v.data.byte_len())).sum();

        let mut version = 1u8;
        let mut header = self.encode_header(version, 0)?;
        if header.len() + data_len > i32::MAX as usize {
            version = 2;
            header = self.encode_header(version, 0)?;
        }
        let header_len = header.len();
        let bytes_header = self.encode_header(version, header_len)?;

        let mut bytes = Vec::with_capacity(header_len + data_len);
        bytes.extend_from_slice(&bytes_header);
        for variable in &self.variables {
            variable.data.encode(&mut bytes);
            pad_to_four(&mut bytes);
        }
        Ok(bytes)
    }

    fn encode_header(&self, version: u8, data_start: usize) -> HawkResult<Vec<u8>> {
        let mut out = Vec::new();
        out.extend_from_slice(b"CDF");
        out.push(version);
        put_u32(&mut out, 0)?; // numrecs

        if self.dimensions.is_empty() {
            put_u32(&mut out, 0)?;
            put_u32(&mut out, 0)?;
        } else {
            put_u32(&mut out, NC_DIMENSION)?;
            put_count(&mut out, self.dimensions.len())?;
            for dimension in &self.dimensions {
                put_name(&mut out, &dimension.name)?;
                put_count(&mut out, dimension.len)?;
            }
        }

        encode_attributes(&mut out, &self.attributes)?;

        if self.variables.is_empty() {
            put_u32(&mut out, 0)?;
            put_u32(&mut out, 0)?;
            return Ok(out);
        }

        put_u32(&mut out, NC_VARIABLE)?;
        put_count(&mut out, self.variables.len())?;
        let mut begin = data_start;
        for variable in &self.variables {
            put_name(&mut out, &variable.name)?;
            put_count(&mut out, variable.dims.len())?;
            for &dim in &variable.dims {
                put_count(&mut out, dim)?;
            }
            encode_attributes(&mut out, &variable.attributes)?;
            put_u32(&mut out, variable.data.type_code())?;

            let vsize = padded(variable.data.byte_len());
            // vsize saturates for oversized variables
            put_u32(&mut out, u32::try_from(vsize).unwrap_or(u32::MAX))?;
            if version == 1 {
                let begin32 = u32::try_from(begin).map_err(|_| {
                    HawkError::Export("NetCDF offset exceeds 32 bits".to_string())
                })?;
                put_u32(&mut out, begin32)?;
            } else {
                out.extend_from_slice(&(begin as u64).to_be_bytes());
            }
            begin += vsize;
        }

        Ok(out)
    }

    /// Decode a classic-format file
    pub fn from_bytes(bytes: &[u8]) -> HawkResult<Self> {
        let mut reader = ByteReader::new(bytes);

        let magic = reader.take(4)?;
        if &magic[..3] != b"CDF" || !(magic[3] == 1 || magic[3] == 2) {
            return Err(HawkError::InvalidFormat(
                "Not a NetCDF classic file".to_string(),
            ));
        }
        let version = magic[3];
        let _numrecs = reader.u32()?;

        let mut dataset = NetcdfDataset::new();

        let tag = reader.u32()?;
        let count = reader.u32()? as usize;
        if tag == NC_DIMENSION {
            for _ in 0..count {
                let name = reader.name()?;
                let len = reader.u32()? as usize;
                if len == 0 {
                    return Err(HawkError::InvalidFormat(format!(
                        "Record dimension '{}' is not supported",
                        name
                    )));
                }
                dataset.dimensions.push(NcDimension { name, len });
            }
        } else if tag != 0 || count != 0 {
            return Err(HawkError::InvalidFormat("Malformed dimension list".to_string()));
        }

        dataset.attributes = reader.attributes()?;

        let tag = reader.u32()?;
        let count = reader.u32()? as usize;
        if tag == NC_VARIABLE {
            for _ in 0..count {
                let name = reader.name()?;
                let ndims = reader.u32()? as usize;
                let mut dims = Vec::with_capacity(ndims);
                for _ in 0..ndims {
                    let dim = reader.u32()? as usize;
                    if dim >= dataset.dimensions.len() {
                        return Err(HawkError::InvalidFormat(format!(
                            "Variable '{}' references unknown dimension {}",
                            name, dim
                        )));
                    }
                    dims.push(dim);
                }
                let attributes = reader.attributes()?;
                let type_code = reader.u32()?;
                let _vsize = reader.u32()?;
                let begin = if version == 1 {
                    reader.u32()? as usize
                } else {
                    reader.u64()? as usize
                };

                let count: usize = dims.iter().map(|&d| dataset.dimensions[d].len).product();
                let size = count * NcValues::element_size(type_code)?;
                let raw = bytes.get(begin..begin + size).ok_or_else(|| {
                    HawkError::InvalidFormat(format!("Data of variable '{}' is truncated", name))
                })?;

                dataset.variables.push(NcVariable {
                    name,
                    dims,
                    attributes,
                    data: NcValues::decode(type_code, raw)?,
                });
            }
        } else if tag != 0 || count != 0 {
            return Err(HawkError::InvalidFormat("Malformed variable list".to_string()));
        }

        Ok(dataset)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> HawkResult<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path.as_ref(), &bytes)?;
        log::debug!("Wrote {} bytes of NetCDF to {}", bytes.len(), path.as_ref().display());
        Ok(())
    }

    pub fn read<P: AsRef<Path>>(path: P) -> HawkResult<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(&bytes)
    }
}

fn padded(len: usize) -> usize {
    (len + 3) / 4 * 4
}

fn pad_to_four(out: &mut Vec<u8>) {
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

fn put_u32(out: &mut Vec<u8>, value: u32) -> HawkResult<()> {
    out.extend_from_slice(&value.to_be_bytes());
    Ok(())
}

fn put_count(out: &mut Vec<u8>, value: usize) -> HawkResult<()> {
    let value = u32::try_from(value)
        .map_err(|_| HawkError::Export(format!("Count {} does not fit NetCDF header", value)))?;
    put_u32(out, value)
}

fn put_name(out: &mut Vec<u8>, name: &str) -> HawkResult<()> {
    if name.is_empty() {
        return Err(HawkError::Export("NetCDF names must not be empty".to_string()));
    }
    put_count(out, name.len())?;
    out.extend_from_slice(name.as_bytes());
    pad_to_four(out);
    Ok(())
}

fn encode_attributes(out: &mut Vec<u8>, attributes: &[NcAttribute]) -> HawkResult<()> {
    if attributes.is_empty() {
        put_u32(out, 0)?;
        return put_u32(out, 0);
    }
    put_u32(out, NC_ATTRIBUTE)?;
    put_count(out, attributes.len())?;
    for attribute in attributes {
        put_name(out, &attribute.name)?;
        put_u32(out, attribute.value.type_code())?;
        put_count(out, attribute.value.len())?;
        attribute.value.encode(out);
        pad_to_four(out);
    }
    Ok(())
}

/// Big-endian cursor over the header bytes
struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> HawkResult<&'a [u8]> {
        let slice = self
            .bytes
            .get(self.pos..self.pos + n)
            .ok_or_else(|| HawkError::InvalidFormat("Truncated NetCDF header".to_string()))?;
        self.pos += n;
        Ok(slice)
    }

    fn u32(&mut self) -> HawkResult<u32> {
        let raw = self.take(4)?;
        Ok(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn u64(&mut self) -> HawkResult<u64> {
        let raw = self.take(8)?;
        let mut word = [0u8; 8];
        word.copy_from_slice(raw);
        Ok(u64::from_be_bytes(word))
    }

    fn skip_padding(&mut self, len: usize) -> HawkResult<()> {
        self.take(padded(len) - len)?;
        Ok(())
    }

    fn name(&mut self) -> HawkResult<String> {
        let len = self.u32()? as usize;
        let raw = self.take(len)?;
        self.skip_padding(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|e| HawkError::InvalidFormat(format!("Invalid NetCDF name: {}", e)))
    }

    fn attributes(&mut self) -> HawkResult<Vec<NcAttribute>> {
        let tag = self.u32()?;
        let count = self.u32()? as usize;
        if tag != NC_ATTRIBUTE {
            if tag != 0 || count != 0 {
                return Err(HawkError::InvalidFormat("Malformed attribute list".to_string()));
            }
            return Ok(Vec::new());
        }

        let mut attributes = Vec::with_capacity(count);
        for _ in 0..count {
            let name = self.name()?;
            let type_code = self.u32()?;
            let nelems = self.u32()? as usize;
            let size = nelems * NcValues::element_size(type_code)?;
            let raw = self.take(size)?;
            self.skip_padding(size)?;
            attributes.push(NcAttribute {
                name,
                value: NcValues::decode(type_code, raw)?,
            });
        }
        Ok(attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_dataset() -> NetcdfDataset {
        let mut dataset = NetcdfDataset::new();
        let time = dataset.add_dimension("utc_time", 3).unwrap();
        dataset.add_attribute("title", NcValues::Char("Hawk radiances".to_string()));
        dataset
            .add_variable(
                "utc_time",
                &[time],
                NcValues::Double(vec![0.0, 0.05, 0.1]),
                vec![NcAttribute {
                    name: "units".to_string(),
                    value: NcValues::Char("seconds since 2019-06-19 10:00:00".to_string()),
                }],
            )
            .unwrap();
        dataset
            .add_variable("flag", &[time], NcValues::Short(vec![1, -2, 3]), Vec::new())
            .unwrap();
        dataset
    }

    #[test]
    fn test_classic_header_layout() {
        let bytes = sample_dataset().to_bytes().unwrap();
        assert_eq!(&bytes[..4], b"CDF\x01");
        assert_eq!(&bytes[4..8], &[0, 0, 0, 0]);
        assert_eq!(u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]), NC_DIMENSION);
        assert_eq!(bytes.len() % 4, 0);
    }

    #[test]
    fn test_decode_recovers_dataset() {
        let dataset = sample_dataset();
        let decoded = NetcdfDataset::from_bytes(&dataset.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, dataset);

        let time = decoded.variable("utc_time").unwrap();
        assert_eq!(
            time.attribute("units").and_then(|v| v.as_text()),
            Some("seconds since 2019-06-19 10:00:00")
        );
        assert_eq!(decoded.variable("flag").unwrap().data.to_f64(), Some(vec![1.0, -2.0, 3.0]));
        assert_eq!(decoded.dimension("utc_time").map(|d| d.len), Some(3));
    }

    #[test]
    fn test_variable_validation() {
        let mut dataset = NetcdfDataset::new();
        let dim = dataset.add_dimension("x", 2).unwrap();
        assert!(dataset.add_dimension("x", 4).is_err());
        assert!(dataset.add_dimension("empty", 0).is_err());
        assert!(dataset
            .add_variable("v", &[dim], NcValues::Double(vec![1.0]), Vec::new())
            .is_err());
        assert!(dataset
            .add_variable("v", &[7], NcValues::Double(vec![1.0]), Vec::new())
            .is_err());
        assert!(dataset
            .add_variable("v", &[dim], NcValues::Double(vec![1.0, 2.0]), Vec::new())
            .is_ok());
        assert!(dataset
            .add_variable("v", &[dim], NcValues::Double(vec![1.0, 2.0]), Vec::new())
            .is_err());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(NetcdfDataset::from_bytes(b"HDF5....").is_err());
        let bytes = sample_dataset().to_bytes().unwrap();
        assert!(NetcdfDataset::from_bytes(&bytes[..bytes.len() - 8]).is_err());
    }
}
