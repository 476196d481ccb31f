use crate::core::wavelength::{select_bands, wavelength_label};
use crate::export::netcdf::{NcAttribute, NcValues, NetcdfDataset};
use crate::export::seconds_since;
use crate::types::{HawkError, HawkResult, RadianceProduct};
use chrono::{DateTime, NaiveDateTime, Utc};
use ndarray::s;
use std::path::Path;

const TIME_NAME: &str = "utc_time";
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
const RADIANCE_UNITS: &str = "W m-2 sr-1";

/// Radiance time series at one across-track pixel, as stored in the gridded file
#[derive(Debug, Clone)]
pub struct GriddedSeries {
    pub timestamps: Vec<DateTime<Utc>>,
    /// (variable name, requested wavelength, series)
    pub variables: Vec<(String, f64, Vec<f64>)>,
    pub across_track_pixel: usize,
}

impl GriddedSeries {
    pub fn series(&self, name: &str) -> Option<&[f64]> {
        self.variables
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, _, values)| values.as_slice())
    }
}

/// Writer for the `utc_time`-indexed radiance table
pub struct GriddedWriter {
    selected_wavelengths: Vec<f64>,
    across_track_pixel: Option<usize>,
}

impl GriddedWriter {
    pub fn new(selected_wavelengths: Vec<f64>, across_track_pixel: Option<usize>) -> Self {
        Self {
            selected_wavelengths,
            across_track_pixel,
        }
    }

    /// Build the dataset in memory
    pub fn build(&self, product: &RadianceProduct) -> HawkResult<NetcdfDataset> {
        product.validate()?;
        let pixel = self.across_track_pixel.unwrap_or_else(|| product.center_pixel());
        if pixel >= product.pixels() {
            return Err(HawkError::Export(format!(
                "Across-track pixel {} outside swath of {} pixels",
                pixel,
                product.pixels()
            )));
        }
        let start = *product
            .timestamps
            .first()
            .ok_or_else(|| HawkError::Export("No lines to export".to_string()))?;

        let selections = select_bands(&product.wavelengths, &self.selected_wavelengths)?;

        let mut dataset = NetcdfDataset::new();
        let time_dim = dataset.add_dimension(TIME_NAME, product.lines())?;
        dataset.add_attribute(
            "title",
            NcValues::Char("Hawk radiance time series".to_string()),
        );
        dataset.add_attribute("source", NcValues::Char("Hawk hyperspectral camera".to_string()));
        dataset.add_attribute(
            "history",
            NcValues::Char(format!("Created by hawkql {}", env!("CARGO_PKG_VERSION"))),
        );

        let offsets: Vec<f64> = product
            .timestamps
            .iter()
            .map(|&t| seconds_since(start, t))
            .collect();
        dataset.add_variable(
            TIME_NAME,
            &[time_dim],
            NcValues::Double(offsets),
            vec![
                text_attribute(
                    "units",
                    &format!("seconds since {}", start.format(TIME_FORMAT)),
                ),
                text_attribute("calendar", "proleptic_gregorian"),
                text_attribute("standard_name", "time"),
            ],
        )?;

        for selection in &selections {
            let label = wavelength_label(selection.requested);
            let name = format!("rad_{}nm", label);
            let series: Vec<f64> = product
                .cube
                .slice(s![.., pixel, selection.band])
                .iter()
                .copied()
                .collect();

            log::debug!(
                "Gridded variable {} from band {} ({:.2} nm)",
                name,
                selection.band,
                selection.center
            );
            dataset.add_variable(
                &name,
                &[time_dim],
                NcValues::Double(series),
                vec![
                    text_attribute("units", RADIANCE_UNITS),
                    text_attribute("long_name", &format!("Radiance at {} nm", label)),
                    NcAttribute {
                        name: "wavelength_nm".to_string(),
                        value: NcValues::Double(vec![selection.requested]),
                    },
                    NcAttribute {
                        name: "band_wavelength_nm".to_string(),
                        value: NcValues::Double(vec![selection.center]),
                    },
                    NcAttribute {
                        name: "across_track_pixel".to_string(),
                        value: NcValues::Int(vec![pixel as i32]),
                    },
                ],
            )?;
        }

        Ok(dataset)
    }

    pub fn write<P: AsRef<Path>>(&self, product: &RadianceProduct, path: P) -> HawkResult<()> {
        log::info!("Writing gridded radiances to {}", path.as_ref().display());
        self.build(product)?.write(path)
    }
}

fn text_attribute(name: &str, value: &str) -> NcAttribute {
    NcAttribute {
        name: name.to_string(),
        value: NcValues::Char(value.to_string()),
    }
}

/// Re-open a gridded file, restoring absolute timestamps from the time units
pub fn read_gridded<P: AsRef<Path>>(path: P) -> HawkResult<GriddedSeries> {
    let dataset = NetcdfDataset::read(path)?;

    let time = dataset
        .variable(TIME_NAME)
        .ok_or_else(|| HawkError::InvalidFormat(format!("Missing '{}' variable", TIME_NAME)))?;
    let units = time
        .attribute("units")
        .and_then(NcValues::as_text)
        .ok_or_else(|| HawkError::InvalidFormat("Time variable has no units".to_string()))?;
    let origin = units
        .strip_prefix("seconds since ")
        .ok_or_else(|| HawkError::InvalidFormat(format!("Unsupported time units '{}'", units)))?;
    let start = NaiveDateTime::parse_from_str(origin, TIME_FORMAT)
        .map_err(|e| HawkError::InvalidFormat(format!("Invalid time origin '{}': {}", origin, e)))?
        .and_utc();

    let offsets = time
        .data
        .to_f64()
        .ok_or_else(|| HawkError::InvalidFormat("Time variable is not numeric".to_string()))?;
    let timestamps = offsets
        .iter()
        .map(|&s| start + chrono::Duration::microseconds((s * 1e6).round() as i64))
        .collect();

    let mut across_track_pixel = 0;
    let mut variables = Vec::new();
    for variable in dataset.variables.iter().filter(|v| v.name != TIME_NAME) {
        let values = match variable.data.to_f64() {
            Some(values) => values,
            None => continue,
        };
        let wavelength = variable
            .attribute("wavelength_nm")
            .and_then(NcValues::to_f64)
            .and_then(|v| v.first().copied())
            .unwrap_or(f64::NAN);
        if let Some(pixel) = variable
            .attribute("across_track_pixel")
            .and_then(NcValues::to_f64)
            .and_then(|v| v.first().copied())
        {
            across_track_pixel = pixel as usize;
        }
        variables.push((variable.name.clone(), wavelength, values));
    }

    Ok(GriddedSeries {
        timestamps,
        variables,
        across_track_pixel,
    })
}
