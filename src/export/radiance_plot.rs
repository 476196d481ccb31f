use crate::core::stats::finite_range;
use crate::core::wavelength::{select_bands, wavelength_label};
use crate::export::{clock_label, ensure_font, render_error, seconds_since, FONT_FAMILY};
use crate::types::{HawkError, HawkResult, RadianceProduct};
use chrono::{DateTime, Utc};
use plotters::prelude::*;
use std::path::Path;

/// Line plot of radiance against time at one across-track pixel
pub struct RadiancePlotter {
    wavelengths: Vec<f64>,
    pixel: Option<usize>,
    size: (u32, u32),
}

impl RadiancePlotter {
    /// `pixel` of `None` plots the swath centre
    pub fn new(wavelengths: Vec<f64>, pixel: Option<usize>, size: (u32, u32)) -> Self {
        Self {
            wavelengths,
            pixel,
            size,
        }
    }

    /// Finite (seconds since first line, radiance) points per selected wavelength
    pub fn series(&self, product: &RadianceProduct) -> HawkResult<Vec<(String, Vec<(f64, f64)>)>> {
        product.validate()?;
        let pixel = self.pixel.unwrap_or_else(|| product.center_pixel());
        if pixel >= product.pixels() {
            return Err(HawkError::Export(format!(
                "Across-track pixel {} outside swath of {} pixels",
                pixel,
                product.pixels()
            )));
        }
        let start = match product.timestamps.first() {
            Some(&t) => t,
            None => return Err(HawkError::Export("No lines to plot".to_string())),
        };

        let selections = select_bands(&product.wavelengths, &self.wavelengths)?;
        Ok(selections
            .iter()
            .map(|selection| {
                let points = product
                    .timestamps
                    .iter()
                    .enumerate()
                    .map(|(l, &t)| (seconds_since(start, t), product.cube[[l, pixel, selection.band]]))
                    .filter(|(_, v)| v.is_finite())
                    .collect();
                (format!("{} nm", wavelength_label(selection.requested)), points)
            })
            .collect())
    }

    pub fn render<P: AsRef<Path>>(&self, product: &RadianceProduct, path: P) -> HawkResult<()> {
        let figure = self.prepare(product)?;
        log::info!(
            "Plotting {} radiance series to {}",
            figure.series.len(),
            path.as_ref().display()
        );

        let root = BitMapBackend::new(path.as_ref(), self.size).into_drawing_area();
        draw(&root, figure)?;
        root.present().map_err(render_error)?;
        Ok(())
    }

    /// Render into an RGB buffer of `width * height * 3` bytes
    pub fn render_rgb(&self, product: &RadianceProduct) -> HawkResult<Vec<u8>> {
        let figure = self.prepare(product)?;
        let (width, height) = self.size;
        let mut buffer = vec![0u8; width as usize * height as usize * 3];
        {
            let root = BitMapBackend::with_buffer(&mut buffer, self.size).into_drawing_area();
            draw(&root, figure)?;
            root.present().map_err(render_error)?;
        }
        Ok(buffer)
    }

    fn prepare(&self, product: &RadianceProduct) -> HawkResult<Figure> {
        if self.size.0 == 0 || self.size.1 == 0 {
            return Err(HawkError::Export(format!(
                "Invalid plot size {}x{}",
                self.size.0, self.size.1
            )));
        }
        let series = self.series(product)?;
        ensure_font()?;
        let start = product
            .timestamps
            .first()
            .copied()
            .ok_or_else(|| HawkError::Export("No lines to plot".to_string()))?;

        let (y_min, y_max) = finite_range(series.iter().flat_map(|(_, pts)| pts.iter().map(|(_, v)| v)))
            .ok_or_else(|| HawkError::Export("No finite radiance at the selected pixel".to_string()))?;
        let margin = if y_max > y_min { (y_max - y_min) * 0.05 } else { 1.0 };
        let x_max = product
            .timestamps
            .last()
            .map(|&t| seconds_since(start, t))
            .unwrap_or(0.0)
            .max(1e-6);

        Ok(Figure {
            series,
            start,
            x_max,
            y_range: (y_min - margin, y_max + margin),
        })
    }
}

/// Axis ranges and series of one plot
struct Figure {
    series: Vec<(String, Vec<(f64, f64)>)>,
    start: DateTime<Utc>,
    x_max: f64,
    y_range: (f64, f64),
}

fn draw<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    figure: Figure,
) -> HawkResult<()> {
    area.fill(&WHITE).map_err(render_error)?;

    let start = figure.start;
    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(0.0..figure.x_max, figure.y_range.0..figure.y_range.1)
        .map_err(render_error)?;

    chart
        .configure_mesh()
        .label_style((FONT_FAMILY, 14))
        .axis_desc_style((FONT_FAMILY, 16))
        .x_desc("UTC time")
        .y_desc("Radiance (W m-2 sr-1)")
        .x_label_formatter(&|x| clock_label(start, *x))
        .y_label_formatter(&|y| format!("{:.3e}", y))
        .draw()
        .map_err(render_error)?;

    for (i, (label, points)) in figure.series.into_iter().enumerate() {
        let color = Palette99::pick(i).to_rgba();
        chart
            .draw_series(LineSeries::new(points, color.stroke_width(2)))
            .map_err(render_error)?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    chart
        .configure_series_labels()
        .label_font((FONT_FAMILY, 14))
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(render_error)?;

    Ok(())
}
