use crate::core::stats::finite_range;
use crate::core::wavelength::{find_nearest, wavelength_label};
use crate::export::{clock_label, ensure_font, render_error, seconds_since, FONT_FAMILY};
use crate::types::{HawkError, HawkResult, RadianceProduct};
use chrono::{DateTime, Utc};
use ndarray::{s, ArrayView2};
use plotters::prelude::*;
use std::path::Path;

/// Greyscale quick-look of one band: time along x, across-track pixel along y
pub struct ImageRenderer {
    wavelength: f64,
    levels: usize,
    size: (u32, u32),
}

/// Equal-width intensity levels between the finite extremes of a band
#[derive(Debug, Clone, Copy)]
struct GreyLevels {
    min: f64,
    max: f64,
    levels: usize,
}

impl GreyLevels {
    fn level(&self, value: f64) -> Option<usize> {
        if !value.is_finite() {
            return None;
        }
        if self.max <= self.min {
            return Some(0);
        }
        let fraction = (value - self.min) / (self.max - self.min);
        Some(((fraction * self.levels as f64) as usize).min(self.levels - 1))
    }

    /// Level 0 is black, the top level white
    fn shade(&self, level: usize) -> RGBColor {
        let grey = if self.levels > 1 {
            (level as f64 / (self.levels - 1) as f64 * 255.0).round() as u8
        } else {
            0
        };
        RGBColor(grey, grey, grey)
    }
}

impl ImageRenderer {
    pub fn new(wavelength: f64, levels: usize, size: (u32, u32)) -> Self {
        Self {
            wavelength,
            levels,
            size,
        }
    }

    /// Render the image to a PNG file
    pub fn render<P: AsRef<Path>>(&self, product: &RadianceProduct, path: P) -> HawkResult<()> {
        let frame = self.prepare(product)?;
        log::info!(
            "Rendering {} nm image (band {}, {:.2} nm) to {}",
            wavelength_label(self.wavelength),
            frame.band,
            product.wavelengths[frame.band],
            path.as_ref().display()
        );

        let root = BitMapBackend::new(path.as_ref(), self.size).into_drawing_area();
        self.draw(&root, &frame)?;
        root.present().map_err(render_error)?;
        Ok(())
    }

    /// Render into an RGB buffer of `width * height * 3` bytes
    pub fn render_rgb(&self, product: &RadianceProduct) -> HawkResult<Vec<u8>> {
        let frame = self.prepare(product)?;
        let (width, height) = self.size;
        let mut buffer = vec![0u8; width as usize * height as usize * 3];
        {
            let root = BitMapBackend::with_buffer(&mut buffer, self.size).into_drawing_area();
            self.draw(&root, &frame)?;
            root.present().map_err(render_error)?;
        }
        Ok(buffer)
    }

    fn prepare<'a>(&self, product: &'a RadianceProduct) -> HawkResult<Frame<'a>> {
        product.validate()?;
        if self.levels == 0 {
            return Err(HawkError::Export("Image needs at least one level".to_string()));
        }
        if self.size.0 == 0 || self.size.1 == 0 {
            return Err(HawkError::Export(format!(
                "Invalid image size {}x{}",
                self.size.0, self.size.1
            )));
        }
        ensure_font()?;
        let start = *product
            .timestamps
            .first()
            .ok_or_else(|| HawkError::Export("No lines to render".to_string()))?;

        let band = find_nearest(&product.wavelengths, self.wavelength)?;
        let plane = product.cube.slice(s![.., .., band]);
        let (min, max) = finite_range(plane.iter()).ok_or_else(|| {
            HawkError::Export(format!(
                "Band {} ({:.2} nm) has no finite radiance",
                band, product.wavelengths[band]
            ))
        })?;

        let offsets = product
            .timestamps
            .iter()
            .map(|&t| seconds_since(start, t))
            .collect();

        Ok(Frame {
            band,
            plane,
            offsets,
            start,
            grey: GreyLevels {
                min,
                max,
                levels: self.levels,
            },
        })
    }

    fn draw<DB: DrawingBackend>(
        &self,
        area: &DrawingArea<DB, plotters::coord::Shift>,
        frame: &Frame,
    ) -> HawkResult<()> {
        area.fill(&WHITE).map_err(render_error)?;

        let (lines, pixels) = frame.plane.dim();
        let offsets = &frame.offsets;
        let period = if lines > 1 {
            (offsets[lines - 1] - offsets[0]) / (lines - 1) as f64
        } else {
            1.0
        };
        let x_max = offsets[lines - 1] + period;
        let start = frame.start;

        let mut chart = ChartBuilder::on(area)
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(0.0..x_max, 0.0..pixels as f64)
            .map_err(render_error)?;

        chart
            .configure_mesh()
            .disable_mesh()
            .label_style((FONT_FAMILY, 14))
            .axis_desc_style((FONT_FAMILY, 16))
            .x_desc("UTC time")
            .y_desc("across-track-pixel")
            .x_label_formatter(&|x| clock_label(start, *x))
            .y_label_formatter(&|y| format!("{:.0}", y))
            .draw()
            .map_err(render_error)?;

        // One column per plot pixel at most
        let width = self.size.0.max(1) as usize;
        let step = ((lines + width - 1) / width).max(1);
        log::debug!("Image decimation: every {} line(s) of {}", step, lines);

        let plane = frame.plane;
        let grey = frame.grey;
        let cells = (0..lines).step_by(step).flat_map(|l| {
            let x0 = offsets[l];
            let x1 = offsets.get(l + step).copied().unwrap_or(x_max);
            (0..pixels).filter_map(move |p| {
                grey.level(plane[[l, p]]).map(|level| {
                    Rectangle::new(
                        [(x0, p as f64), (x1, (p + 1) as f64)],
                        grey.shade(level).filled(),
                    )
                })
            })
        });
        chart.draw_series(cells).map_err(render_error)?;

        Ok(())
    }
}

/// Everything the drawing step needs from one product
struct Frame<'a> {
    band: usize,
    plane: ArrayView2<'a, f64>,
    offsets: Vec<f64>,
    start: DateTime<Utc>,
    grey: GreyLevels,
}
