//! Chart layout: tree on the left, bubbles or heat cells aligned with its
//! leaves, sample labels below and a legend on the right.
//!
//! [`build_scene`] produces device-independent shapes in pixel units;
//! `png` rasterizes them, `svg` serializes them and `pdf` converts the SVG.

pub mod pdf;
pub mod png;
pub mod svg;

use crate::engine::GroupedMatrix;
use crate::error::{BubbleError, Result};
use crate::palette::{self, Rgb, BLACK, GRID_GREY, GUIDE_GREY};
use crate::tree::TreeLayout;
use log::{debug, info, warn};
use std::fs::File;
use std::io::Write;
use std::path::Path;

const PADDING: f64 = 10.0;

/// Accepted range of `RenderOptions::cell_size`, in pixels.
pub const CELL_SIZE_RANGE: (u32, u32) = (4, 256);
/// Widest tree drawing, in pixels.
pub const MAX_TREE_WIDTH: u32 = 4096;
/// Largest figure that is rasterized, in pixels.
pub const MAX_RASTER_PIXELS: u64 = 1 << 28;

/// What the matrix cells are drawn as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Display {
    /// Circles whose area follows the value, colored by sample group.
    #[default]
    Bubblechart,
    /// Cells colored on a sequential scale.
    Heatmap,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub display: Display,
    /// Height of a row and width of a column, in pixels.
    pub cell_size: u32,
    /// Width of the tree drawing, in pixels.
    pub tree_width: u32,
    pub show_labels: bool,
    /// Labels longer than this are truncated.
    pub max_label_chars: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            display: Display::Bubblechart,
            cell_size: 16,
            tree_width: 200,
            show_labels: true,
            max_label_chars: 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Rect {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        fill: Rgb,
    },
    Line {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        color: Rgb,
        dotted: bool,
    },
    Circle {
        cx: f64,
        cy: f64,
        r: f64,
        fill: Rgb,
        stroke: Rgb,
    },
    /// `(x, y)` is the top-left corner of the text box. Vertical text reads
    /// top to bottom.
    Text {
        x: f64,
        y: f64,
        text: String,
        color: Rgb,
        vertical: bool,
    },
}

/// Everything needed to draw one figure.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub width: u32,
    pub height: u32,
    /// Glyph box size in pixels, a multiple of 8.
    pub char_size: u32,
    pub max_label_chars: usize,
    pub shapes: Vec<Shape>,
}

/// Lay out `grouped` next to the tree drawing.
///
/// Row `i` of the matrix is drawn level with leaf `i` of `tree`, so the
/// matrix must have exactly one row per leaf.
pub fn build_scene(
    grouped: &GroupedMatrix,
    tree: &TreeLayout,
    options: &RenderOptions,
) -> Result<Scene> {
    let matrix = grouped.matrix();
    let n_rows = matrix.n_features();
    let n_cols = matrix.n_samples();
    if tree.n_leaves() != n_rows {
        return Err(BubbleError::InvalidInput(format!(
            "tree has {} leaves but the matrix has {} rows",
            tree.n_leaves(),
            n_rows
        )));
    }

    let cell_size = options.cell_size.clamp(CELL_SIZE_RANGE.0, CELL_SIZE_RANGE.1);
    if cell_size != options.cell_size {
        warn!(
            "Cell size {} is outside [{}, {}], using {}",
            options.cell_size, CELL_SIZE_RANGE.0, CELL_SIZE_RANGE.1, cell_size
        );
    }
    let cell = cell_size as f64;
    let char_size = ((cell_size / 8) * 8).clamp(8, 64);
    let cs = char_size as f64;
    let max_chars = options.max_label_chars.max(1);

    let (feature_label_w, sample_label_h) = if options.show_labels {
        (
            longest_label(matrix.feature_ids(), max_chars) * cs + cs / 2.0,
            longest_label(matrix.sample_ids(), max_chars) * cs + cs / 2.0,
        )
    } else {
        (0.0, 0.0)
    };
    let is_heatmap = options.display == Display::Heatmap;
    let band_h = if is_heatmap { (cell / 2.0).max(4.0) } else { 0.0 };

    let tree_x0 = PADDING;
    let tree_w = options.tree_width.min(MAX_TREE_WIDTH) as f64;
    let chart_x0 = tree_x0 + tree_w + PADDING / 2.0 + feature_label_w;
    let chart_y0 = PADDING + if is_heatmap { band_h + 2.0 } else { 0.0 };
    let chart_w = n_cols as f64 * cell;
    let chart_h = n_rows as f64 * cell;
    let row_y = |r: f64| chart_y0 + (r + 0.5) * cell;
    let col_x = |c: usize| chart_x0 + (c as f64 + 0.5) * cell;

    debug!(
        "Chart: {} x {} cells of {}px at ({:.0}, {:.0}), glyphs {}px",
        n_rows, n_cols, cell, chart_x0, chart_y0, char_size
    );

    let mut shapes = Vec::new();

    // Tree
    let span = tree.max_x - tree.min_x;
    let tree_x = |x: f64| {
        if span > 0.0 {
            tree_x0 + (x - tree.min_x) / span * tree_w
        } else {
            tree_x0
        }
    };
    for b in &tree.branches {
        shapes.push(Shape::Line {
            x1: tree_x(b.x1),
            y1: row_y(b.y1),
            x2: tree_x(b.x2),
            y2: row_y(b.y2),
            color: BLACK,
            dotted: false,
        });
    }
    let tree_right = tree_x0 + tree_w;
    for (i, &tip) in tree.tips.iter().enumerate() {
        let x = tree_x(tip);
        if x < tree_right - 0.5 {
            shapes.push(Shape::Line {
                x1: x,
                y1: row_y(i as f64),
                x2: tree_right,
                y2: row_y(i as f64),
                color: GUIDE_GREY,
                dotted: true,
            });
        }
    }

    // Cells
    let column_colors: Vec<Rgb> = {
        let groups = grouped.groups().groups();
        grouped
            .column_groups()
            .into_iter()
            .map(|gi| palette::group_color(gi, &groups[gi].label))
            .collect()
    };
    let value_range = matrix.value_range();

    match options.display {
        Display::Bubblechart => {
            for r in 0..n_rows {
                shapes.push(dotted(chart_x0, row_y(r as f64), chart_x0 + chart_w, row_y(r as f64)));
            }
            for c in 0..n_cols {
                shapes.push(dotted(col_x(c), chart_y0, col_x(c), chart_y0 + chart_h));
            }
            let r_max = cell * 0.45;
            let mut drawn = 0usize;
            for r in 0..n_rows {
                for (c, value) in matrix.row(r).iter().enumerate() {
                    let Some(v) = *value else { continue };
                    let Some((lo, hi)) = value_range else { continue };
                    // Area proportional to the value's position in the range
                    let radius = r_max * bubble_fraction(v, lo, hi).sqrt();
                    if radius < 0.25 {
                        continue;
                    }
                    drawn += 1;
                    shapes.push(Shape::Circle {
                        cx: col_x(c),
                        cy: row_y(r as f64),
                        r: radius,
                        fill: column_colors[c],
                        stroke: BLACK,
                    });
                }
            }
            if drawn == 0 {
                warn!("No cell is large enough to draw a bubble");
            }
        }
        Display::Heatmap => {
            for (c, &color) in column_colors.iter().enumerate() {
                shapes.push(Shape::Rect {
                    x: chart_x0 + c as f64 * cell,
                    y: PADDING,
                    w: cell,
                    h: band_h,
                    fill: color,
                });
            }
            let (vmin, vmax) = value_range.unwrap_or((0.0, 1.0));
            for r in 0..n_rows {
                for (c, value) in matrix.row(r).iter().enumerate() {
                    let Some(v) = *value else { continue };
                    let t = if vmax > vmin { (v - vmin) / (vmax - vmin) } else { 0.5 };
                    shapes.push(Shape::Rect {
                        x: chart_x0 + c as f64 * cell,
                        y: chart_y0 + r as f64 * cell,
                        w: cell,
                        h: cell,
                        fill: palette::heat_color(t),
                    });
                }
            }
        }
    }
    shapes.extend(frame(chart_x0, chart_y0, chart_w, chart_h));

    // Labels
    if options.show_labels {
        for (i, id) in matrix.feature_ids().iter().enumerate() {
            shapes.push(Shape::Text {
                x: tree_right + PADDING / 2.0,
                y: row_y(i as f64) - cs / 2.0,
                text: id.clone(),
                color: BLACK,
                vertical: false,
            });
        }
        for (c, id) in matrix.sample_ids().iter().enumerate() {
            shapes.push(Shape::Text {
                x: col_x(c) - cs / 2.0,
                y: chart_y0 + chart_h + cs / 4.0,
                text: id.clone(),
                color: BLACK,
                vertical: true,
            });
        }
    }

    // Legend
    let legend_x0 = chart_x0 + chart_w + 2.0 * PADDING;
    let mut legend_y = chart_y0;
    let mut legend_chars = 0usize;
    for (gi, group) in grouped.groups().iter().enumerate() {
        shapes.push(Shape::Rect {
            x: legend_x0,
            y: legend_y,
            w: cs,
            h: cs,
            fill: palette::group_color(gi, &group.label),
        });
        shapes.push(Shape::Text {
            x: legend_x0 + cs * 1.5,
            y: legend_y,
            text: group.label.clone(),
            color: BLACK,
            vertical: false,
        });
        legend_chars = legend_chars.max(group.label.chars().count().min(max_chars));
        legend_y += cs + 4.0;
    }
    if is_heatmap {
        if let Some((vmin, vmax)) = value_range {
            legend_y += PADDING;
            let bar_h = (10.0 * cs).min(chart_h.max(4.0 * cs)).round();
            let steps = bar_h as usize;
            for k in 0..steps {
                let t = 1.0 - k as f64 / (steps - 1).max(1) as f64;
                shapes.push(Shape::Rect {
                    x: legend_x0,
                    y: legend_y + k as f64,
                    w: cs,
                    h: 1.0,
                    fill: palette::heat_color(t),
                });
            }
            shapes.extend(frame(legend_x0, legend_y, cs, bar_h));
            let top = format_value(vmax);
            let bottom = format_value(vmin);
            legend_chars = legend_chars.max(top.len()).max(bottom.len());
            shapes.push(Shape::Text {
                x: legend_x0 + cs * 1.5,
                y: legend_y,
                text: top,
                color: BLACK,
                vertical: false,
            });
            shapes.push(Shape::Text {
                x: legend_x0 + cs * 1.5,
                y: legend_y + bar_h - cs,
                text: bottom,
                color: BLACK,
                vertical: false,
            });
            legend_y += bar_h;
        }
    }

    let width = legend_x0 + cs * 1.5 + legend_chars as f64 * cs + PADDING;
    let height = (chart_y0 + chart_h + sample_label_h + PADDING).max(legend_y + PADDING);

    if width > u32::MAX as f64 || height > u32::MAX as f64 {
        return Err(BubbleError::InvalidInput(format!(
            "figure of {:.0} x {:.0} pixels is too large",
            width, height
        )));
    }

    Ok(Scene {
        width: width.ceil() as u32,
        height: height.ceil() as u32,
        char_size,
        max_label_chars: max_chars,
        shapes,
    })
}

/// Share of the largest bubble area given to `v`, in `[0, 1]`.
///
/// Non-negative data keeps zero as the baseline, so areas stay proportional
/// to the values. Data reaching below zero (log scale) is measured from its
/// minimum, which gets the smallest visible bubble.
fn bubble_fraction(v: f64, lo: f64, hi: f64) -> f64 {
    const MIN_SHIFTED: f64 = 0.02;
    if lo >= 0.0 {
        return if hi > 0.0 { (v / hi).clamp(0.0, 1.0) } else { 0.0 };
    }
    if hi > lo {
        let t = ((v - lo) / (hi - lo)).clamp(0.0, 1.0);
        MIN_SHIFTED + (1.0 - MIN_SHIFTED) * t
    } else {
        1.0
    }
}

/// Display length of the longest label, in characters.
fn longest_label(labels: &[String], max_chars: usize) -> f64 {
    labels
        .iter()
        .map(|s| s.chars().count().min(max_chars))
        .max()
        .unwrap_or(0) as f64
}

fn dotted(x1: f64, y1: f64, x2: f64, y2: f64) -> Shape {
    Shape::Line {
        x1,
        y1,
        x2,
        y2,
        color: GRID_GREY,
        dotted: true,
    }
}

fn frame(x: f64, y: f64, w: f64, h: f64) -> [Shape; 4] {
    let line = |x1: f64, y1: f64, x2: f64, y2: f64| Shape::Line {
        x1,
        y1,
        x2,
        y2,
        color: BLACK,
        dotted: false,
    };
    [
        line(x, y, x + w, y),
        line(x, y + h, x + w, y + h),
        line(x, y, x, y + h),
        line(x + w, y, x + w, y + h),
    ]
}

fn format_value(v: f64) -> String {
    format!("{:.2}", v)
}

/// File format chosen from an output path's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Pdf,
    Svg,
    /// Any other extension; the `image` crate picks the encoder.
    Raster,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("pdf") => OutputFormat::Pdf,
            Some(ext) if ext.eq_ignore_ascii_case("svg") => OutputFormat::Svg,
            _ => OutputFormat::Raster,
        }
    }
}

/// Write `scene` to `path` as PDF, SVG or a raster image, by extension.
pub fn write_scene(scene: &Scene, path: &Path) -> Result<()> {
    match OutputFormat::from_path(path) {
        OutputFormat::Pdf => {
            info!("Rendering PDF...");
            let bytes = pdf::render_pdf(scene)?;
            info!("Saving to {:?}...", path);
            File::create(path)?.write_all(&bytes)?;
        }
        OutputFormat::Svg => {
            info!("Rendering SVG...");
            let content = svg::render_svg(scene);
            info!("Saving to {:?}...", path);
            File::create(path)?.write_all(content.as_bytes())?;
        }
        OutputFormat::Raster => {
            let pixels = scene.width as u64 * scene.height as u64;
            if pixels > MAX_RASTER_PIXELS {
                return Err(BubbleError::InvalidInput(format!(
                    "figure of {} x {} pixels is too large to rasterize, write .svg or .pdf instead",
                    scene.width, scene.height
                )));
            }
            info!("Rendering image...");
            let img = png::rasterize(scene).into_image()?;
            info!("Saving to {:?}...", path);
            img.save(path)?;
        }
    }
    Ok(())
}
