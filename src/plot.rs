use crate::{min_and_max, suitable_xfmt, Result, TimeSeries, VisualizerError};
use chrono::prelude::*;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use plotters::prelude::*;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

/// dots per inch of the figure, used to convert the pixel size to inches and back
pub const DPI: f64 = 100.;

pub const COLOR_PALETTE: [RGBColor; 4] = [
    RGBColor(0xf5, 0xae, 0x29),
    RGBColor(0x65, 0x75, 0x84),
    RGBColor(0xb1, 0xb9, 0xc3),
    RGBColor(0x22, 0x22, 0x22),
];

/// time of day labels for intraday data
pub const INTRADAY_XFMT: &str = "%H:%M";

pub const DEFAULT_SIZE: &str = "800,400";

/// largest accepted side of the image in pixels
pub const MAX_SIDE: u32 = 16384;

/// Image size in pixels, given on the command line as "800,400";
/// the first value is the horizontal one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlotSize {
    pub width: u32,
    pub height: u32,
}

impl Default for PlotSize {
    fn default() -> Self {
        PlotSize {
            width: 800,
            height: 400,
        }
    }
}

impl FromStr for PlotSize {
    type Err = VisualizerError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            VisualizerError::Render(format!(
                "invalid size {:?}, expected two integers between 1 and {} as in {}",
                s, MAX_SIDE, DEFAULT_SIZE
            ))
        };
        let mut split = s.split(',');
        let (a, b) = match (split.next(), split.next(), split.next()) {
            (Some(a), Some(b), None) => (a.trim(), b.trim()),
            _ => return Err(invalid()),
        };
        let width = a.parse::<u32>().map_err(|_| invalid())?;
        let height = b.parse::<u32>().map_err(|_| invalid())?;
        if width == 0 || height == 0 || width > MAX_SIDE || height > MAX_SIDE {
            return Err(invalid());
        }
        Ok(PlotSize { width, height })
    }
}

/// Figure size in inches at a given dpi
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FigureSize {
    pub width_in: f64,
    pub height_in: f64,
    pub dpi: f64,
}

impl FigureSize {
    pub fn from_pixels(size: PlotSize, dpi: f64) -> FigureSize {
        FigureSize {
            width_in: size.width as f64 / dpi,
            height_in: size.height as f64 / dpi,
            dpi,
        }
    }

    pub fn pixels(&self) -> (u32, u32) {
        (
            (self.width_in * self.dpi).round() as u32,
            (self.height_in * self.dpi).round() as u32,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlotSpec {
    pub size: PlotSize,
    /// the x labels show the time of day, not the date
    pub is_intraday: bool,
}

impl PlotSpec {
    pub fn new(size: PlotSize, is_intraday: bool) -> PlotSpec {
        PlotSpec { size, is_intraday }
    }
}

/// x label format: time of day for intraday data, else picked from the span
pub fn x_label_format(is_intraday: bool, span: chrono::Duration) -> &'static str {
    if is_intraday {
        INTRADAY_XFMT
    } else {
        suitable_xfmt(span)
    }
}

/// bytes of an rgb buffer of the given size, None when too large to allocate
fn rgb_buffer_len((w, h): (u32, u32)) -> Option<usize> {
    if w == 0 || h == 0 || w > MAX_SIDE || h > MAX_SIDE {
        return None;
    }
    (w as usize).checked_mul(h as usize)?.checked_mul(3)
}

fn render_error<E: std::fmt::Display>(e: E) -> VisualizerError {
    VisualizerError::Render(e.to_string())
}

/// Plots each column of the series as a line and writes a transparent png.
/// The image goes to a temporary file next to `fout` and is moved in place
/// only when complete.
pub fn render(series: &TimeSeries, fout: &Path, spec: &PlotSpec) -> Result<()> {
    if series.is_empty() || series.columns.is_empty() {
        return Err(VisualizerError::Render("nothing to plot".to_string()));
    }
    let figure = FigureSize::from_pixels(spec.size, DPI);
    let (w, h) = figure.pixels();
    debug!(?figure, width = w, height = h, "figure size");

    let on_black = draw_rgb(series, spec, (w, h), &BLACK)?;
    let on_white = draw_rgb(series, spec, (w, h), &WHITE)?;
    let rgba = unblend(&on_black, &on_white);

    let dir = match fout.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        VisualizerError::Render(format!("could not write into {}: {}", dir.display(), e))
    })?;
    PngEncoder::new(&mut tmp)
        .write_image(&rgba, w, h, ColorType::Rgba8)
        .map_err(render_error)?;
    tmp.persist(fout).map_err(|e| {
        VisualizerError::Render(format!("could not save {}: {}", fout.display(), e))
    })?;
    Ok(())
}

/// Recovers the alpha channel from the same image drawn on black and on white:
/// on black c = a * C, on white c = a * C + (1 - a) * 255
fn unblend(on_black: &[u8], on_white: &[u8]) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(on_black.len() / 3 * 4);
    for (b, w) in on_black.chunks_exact(3).zip(on_white.chunks_exact(3)) {
        let diff = (0..3)
            .map(|i| w[i].saturating_sub(b[i]))
            .max()
            .unwrap_or(255);
        let alpha = 255 - diff;
        for &c in b {
            let c = if alpha == 0 {
                0
            } else {
                (c as u32 * 255 / alpha as u32).min(255) as u8
            };
            rgba.push(c);
        }
        rgba.push(alpha);
    }
    rgba
}

/// draws the chart on an opaque background and returns the rgb pixels
fn draw_rgb(
    series: &TimeSeries,
    spec: &PlotSpec,
    (w, h): (u32, u32),
    background: &RGBColor,
) -> Result<Vec<u8>> {
    let (xmindt, xmaxdt) = min_and_max(&series.time[..])
        .ok_or_else(|| VisualizerError::Render("empty time index".to_string()))?;
    let xspan: chrono::Duration = xmaxdt - xmindt;
    let xmargin = if xspan > chrono::Duration::zero() {
        xspan / 20
    } else {
        chrono::Duration::minutes(1)
    };
    let xminlocal = TimeZone::from_utc_datetime(&Utc, &(xmindt - xmargin));
    let xmaxlocal = TimeZone::from_utc_datetime(&Utc, &(xmaxdt + xmargin));
    let xfmt = x_label_format(spec.is_intraday, xspan);

    let all_values: Vec<f64> = series
        .columns
        .iter()
        .flat_map(|c| c.values.iter().copied())
        .collect();
    let (ymin, ymax) = min_and_max(&all_values[..])
        .ok_or_else(|| VisualizerError::Render("all the values are NAN".to_string()))?;
    let ymargin = if ymax > ymin {
        (ymax - ymin) / 10f64
    } else {
        ymax.abs().max(1.) / 10f64
    };
    let ymin = ymin - ymargin;
    let ymax = ymax + ymargin;

    let len = rgb_buffer_len((w, h)).ok_or_else(|| {
        VisualizerError::Render(format!("image size {}x{} is out of range", w, h))
    })?;
    let mut buffer = vec![0u8; len];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (w, h)).into_drawing_area();
        root.fill(background).map_err(render_error)?;
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .x_label_area_size(30)
            .y_label_area_size(60)
            .build_cartesian_2d(xminlocal..xmaxlocal, ymin..ymax)
            .map_err(render_error)?;

        let labelled = chart
            .configure_mesh()
            .light_line_style(&TRANSPARENT)
            .bold_line_style(RGBColor(180, 180, 180).stroke_width(1))
            .label_style(("sans-serif", 12))
            .x_labels(8)
            .x_label_formatter(&|x: &DateTime<Utc>| x.format(xfmt).to_string())
            .y_label_formatter(&|y: &f64| format!("{:.2}", y))
            .draw();
        let labelled = match labelled {
            Ok(_) => true,
            Err(e) => {
                // no usable font on this system
                warn!(error = %e, "could not draw the axis labels, plotting without them");
                if let Err(e) = chart
                    .configure_mesh()
                    .light_line_style(&TRANSPARENT)
                    .bold_line_style(RGBColor(180, 180, 180).stroke_width(1))
                    .disable_x_axis()
                    .disable_y_axis()
                    .draw()
                {
                    warn!(error = %e, "could not draw the grid");
                }
                false
            }
        };

        for (i, column) in series.columns.iter().enumerate() {
            let color = COLOR_PALETTE[i % COLOR_PALETTE.len()];
            let line = LineSeries::new(
                series
                    .time
                    .iter()
                    .zip(column.values.iter())
                    .filter(|(_, v)| !v.is_nan())
                    .map(|(x, y)| (TimeZone::from_utc_datetime(&Utc, x), *y)),
                color.stroke_width(2),
            );
            chart
                .draw_series(line)
                .map_err(render_error)?
                .label(column.name.clone())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
        }

        if labelled {
            if let Err(e) = chart
                .configure_series_labels()
                .background_style(WHITE.mix(0.8))
                .border_style(RGBColor(180, 180, 180))
                .draw()
            {
                warn!(error = %e, "could not draw the legend");
            }
        }
        root.present().map_err(render_error)?;
    }
    Ok(buffer)
}
