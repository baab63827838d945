use std::fs;
use std::path::{Path, PathBuf};

use plotters::prelude::*;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PlotError {
    #[error("failed to prepare plot directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("column '{0}' has no values to plot")]
    EmptyColumn(String),
    #[error("failed to render plot for '{column}': {message}")]
    Render { column: String, message: String },
}

/// Handle over the static artifact directory, created once at startup
/// and injected into the handlers.
#[derive(Clone)]
pub struct PlotStore {
    root: PathBuf,
}

impl PlotStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, PlotError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocate a fresh subdirectory for one upload. Concurrent requests
    /// plotting identically-named columns land in different directories,
    /// so they cannot clobber each other's images.
    pub fn begin_request(&self) -> Result<RequestPlots, PlotError> {
        let id = Uuid::new_v4();
        let dir = self.root.join(id.to_string());
        fs::create_dir_all(&dir)?;
        Ok(RequestPlots { id, dir })
    }
}

/// Plot artifacts for a single upload.
pub struct RequestPlots {
    id: Uuid,
    dir: PathBuf,
}

impl RequestPlots {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Render the density/boxplot pair for one column and return the URL
    /// path the page should embed.
    pub fn render_column(&self, column: &str, values: &[f64]) -> Result<String, PlotError> {
        if values.is_empty() {
            return Err(PlotError::EmptyColumn(column.to_string()));
        }
        let file = self.dir.join(format!("{column}.png"));
        draw_density_and_box(values, &file).map_err(|message| PlotError::Render {
            column: column.to_string(),
            message,
        })?;
        Ok(format!("/static/{}/{}.png", self.id, column))
    }
}

/// One PNG per column: a Gaussian kernel-density curve on the left and
/// an outlier-suppressed boxplot on the right.
fn draw_density_and_box(values: &[f64], path: &Path) -> Result<(), String> {
    let root = BitMapBackend::new(path, (900, 420)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| e.to_string())?;
    let (left, right) = root.split_horizontally(560);

    let (grid, density) = gaussian_kde(values);
    let x_min = grid.first().copied().unwrap_or(0.0);
    let x_max = grid.last().copied().unwrap_or(1.0);
    let y_max = density.iter().copied().fold(f64::MIN, f64::max).max(1e-12) * 1.05;

    let mut density_chart = ChartBuilder::on(&left)
        .margin(16)
        .build_cartesian_2d(x_min..x_max, 0.0..y_max)
        .map_err(|e| e.to_string())?;
    density_chart
        .draw_series(LineSeries::new(
            grid.into_iter().zip(density),
            BLUE.stroke_width(2),
        ))
        .map_err(|e| e.to_string())?;

    let quartiles = Quartiles::new(values);
    let [low, _, _, _, high] = quartiles.values();
    let pad = (high - low).abs().max(1.0) * 0.2;
    let labels = [""];
    let mut box_chart = ChartBuilder::on(&right)
        .margin(16)
        .build_cartesian_2d(labels[..].into_segmented(), (low - pad)..(high + pad))
        .map_err(|e| e.to_string())?;
    box_chart
        .draw_series(std::iter::once(
            Boxplot::new_vertical(SegmentValue::CenterOf(&""), &quartiles).width(60),
        ))
        .map_err(|e| e.to_string())?;

    root.present().map_err(|e| e.to_string())
}

/// Gaussian KDE on an evenly spaced grid, Silverman's bandwidth.
/// Constant columns fall back to a unit bandwidth.
fn gaussian_kde(values: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    let bandwidth = if std_dev > 0.0 {
        1.06 * std_dev * n.powf(-0.2)
    } else {
        1.0
    };

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let lo = min - 3.0 * bandwidth;
    let hi = max + 3.0 * bandwidth;

    const STEPS: usize = 200;
    let norm = 1.0 / (n * bandwidth * (2.0 * std::f64::consts::PI).sqrt());

    let mut grid = Vec::with_capacity(STEPS + 1);
    let mut density = Vec::with_capacity(STEPS + 1);
    for i in 0..=STEPS {
        let x = lo + (hi - lo) * i as f64 / STEPS as f64;
        let d = values
            .iter()
            .map(|v| (-0.5 * ((x - v) / bandwidth).powi(2)).exp())
            .sum::<f64>()
            * norm;
        grid.push(x);
        density.push(d);
    }
    (grid, density)
}
