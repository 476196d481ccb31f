//! Quick-look exporters and their bookkeeping

pub mod npz;
pub mod netcdf;
pub mod gridded;
pub mod spectral_summary;
pub mod image;
pub mod radiance_plot;

use crate::types::{HawkError, HawkResult};
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub use gridded::{read_gridded, GriddedSeries, GriddedWriter};
pub use image::ImageRenderer;
pub use npz::{read_npz, NpyArray, NpyData, NpzWriter};
pub use radiance_plot::RadiancePlotter;
pub use spectral_summary::{SpectralSummary, SpectralSummaryWriter};

/// The four quick-look products
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportKind {
    Image,
    RadiancePlot,
    Gridded,
    SpectralSummary,
}

impl ExportKind {
    pub const ALL: [ExportKind; 4] = [
        ExportKind::Image,
        ExportKind::RadiancePlot,
        ExportKind::Gridded,
        ExportKind::SpectralSummary,
    ];

    /// File name suffix appended to the measurement stem
    pub fn suffix(&self) -> &'static str {
        match self {
            ExportKind::Image => ".png",
            ExportKind::RadiancePlot => "_radiances.png",
            ExportKind::Gridded => "_radiances.nc",
            ExportKind::SpectralSummary => "_spectra.npz",
        }
    }
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ExportKind::Image => "image",
            ExportKind::RadiancePlot => "radiance plot",
            ExportKind::Gridded => "gridded data",
            ExportKind::SpectralSummary => "spectral summary",
        };
        write!(f, "{}", name)
    }
}

/// Output locations derived from the raw measurement name
#[derive(Debug, Clone)]
pub struct OutputPaths {
    output_dir: PathBuf,
    stem: String,
}

impl OutputPaths {
    /// Use the raw file name without its extension as the product stem
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(output_dir: P, raw_path: Q) -> HawkResult<Self> {
        let stem = raw_path
            .as_ref()
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                HawkError::Export(format!(
                    "Cannot derive an output name from {}",
                    raw_path.as_ref().display()
                ))
            })?
            .to_string();

        Ok(Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            stem,
        })
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn path_for(&self, kind: ExportKind) -> PathBuf {
        self.output_dir
            .join(format!("{}{}", self.stem, kind.suffix()))
    }
}

/// Result of one exporter run
#[derive(Debug)]
pub struct ExportOutcome {
    pub kind: ExportKind,
    pub path: PathBuf,
    pub result: HawkResult<()>,
}

impl ExportOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Outcomes of every exporter that ran
#[derive(Debug, Default)]
pub struct ExportReport {
    pub outcomes: Vec<ExportOutcome>,
}

impl ExportReport {
    pub fn push(&mut self, outcome: ExportOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(ExportOutcome::succeeded)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ExportOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded())
    }

    pub fn outcome(&self, kind: ExportKind) -> Option<&ExportOutcome> {
        self.outcomes.iter().find(|o| o.kind == kind)
    }

    pub fn log_summary(&self) {
        for outcome in &self.outcomes {
            match &outcome.result {
                Ok(()) => log::info!("{}: wrote {}", outcome.kind, outcome.path.display()),
                Err(e) => log::error!("{}: failed ({})", outcome.kind, e),
            }
        }
        let failed = self.failures().count();
        if failed > 0 {
            log::warn!("{} of {} exports failed", failed, self.outcomes.len());
        }
    }
}

/// Seconds elapsed since `start`, with microsecond resolution
pub fn seconds_since(start: DateTime<Utc>, t: DateTime<Utc>) -> f64 {
    let elapsed = t - start;
    match elapsed.num_microseconds() {
        Some(us) => us as f64 * 1e-6,
        None => elapsed.num_milliseconds() as f64 * 1e-3,
    }
}

/// Axis label for an offset from the first line
pub(crate) fn clock_label(start: DateTime<Utc>, seconds: f64) -> String {
    let t = start + chrono::Duration::microseconds((seconds * 1e6).round() as i64);
    t.format("%H:%M:%S").to_string()
}

/// Family name every plot label is drawn with
pub(crate) const FONT_FAMILY: &str = "sans-serif";

static FONT_DATA: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");

/// Register the bundled font with plotters once per process
pub(crate) fn ensure_font() -> HawkResult<()> {
    static REGISTERED: OnceLock<bool> = OnceLock::new();
    let registered = *REGISTERED.get_or_init(|| {
        plotters::style::register_font(FONT_FAMILY, plotters::style::FontStyle::Normal, FONT_DATA)
            .is_ok()
    });
    if registered {
        Ok(())
    } else {
        Err(HawkError::Export("Bundled plot font could not be loaded".to_string()))
    }
}

pub(crate) fn render_error<E: fmt::Display>(e: E) -> HawkError {
    HawkError::Export(format!("Rendering failed: {}", e))
}
