//! Raster backend: draws a [`Scene`] into an RGB pixel buffer.

use super::{Scene, Shape};
use crate::error::{BubbleError, Result};
use crate::font;
use crate::palette::{Rgb, WHITE};
use log::debug;

/// An RGB pixel buffer, white on creation.
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![255u8; (width as usize) * (height as usize) * 3],
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Color at `(x, y)`, `None` outside the canvas.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y as usize) * (self.width as usize) + x as usize) * 3;
        Some((self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2]))
    }

    /// Set one pixel; coordinates outside the canvas are ignored.
    #[inline]
    fn put(&mut self, x: i64, y: i64, (r, g, b): Rgb) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let idx = ((y as usize) * (self.width as usize) + x as usize) * 3;
        self.pixels[idx] = r;
        self.pixels[idx + 1] = g;
        self.pixels[idx + 2] = b;
    }

    pub fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64, fill: Rgb) {
        let (x0, x1) = (x.round() as i64, (x + w).round() as i64);
        let (y0, y1) = (y.round() as i64, (y + h).round() as i64);
        for py in y0..y1.max(y0 + 1) {
            for px in x0..x1.max(x0 + 1) {
                self.put(px, py, fill);
            }
        }
    }

    /// One pixel wide line; dotted lines light every third pixel.
    pub fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, color: Rgb, dotted: bool) {
        let (dx, dy) = (x2 - x1, y2 - y1);
        let steps = dx.abs().max(dy.abs()).round() as i64;
        if steps == 0 {
            self.put(x1.floor() as i64, y1.floor() as i64, color);
            return;
        }
        for i in 0..=steps {
            if dotted && i % 3 != 0 {
                continue;
            }
            let t = i as f64 / steps as f64;
            let px = (x1 + dx * t).floor() as i64;
            let py = (y1 + dy * t).floor() as i64;
            self.put(px, py, color);
        }
    }

    /// Filled disc with a one pixel outline (no outline below 2px radius).
    pub fn circle(&mut self, cx: f64, cy: f64, r: f64, fill: Rgb, stroke: Rgb) {
        let edge = if r >= 2.0 { 1.0 } else { 0.0 };
        let (y0, y1) = ((cy - r).floor() as i64, (cy + r).ceil() as i64);
        let (x0, x1) = ((cx - r).floor() as i64, (cx + r).ceil() as i64);
        for py in y0..=y1 {
            for px in x0..=x1 {
                let d = ((px as f64 + 0.5 - cx).powi(2) + (py as f64 + 0.5 - cy).powi(2)).sqrt();
                if d <= r {
                    let color = if d > r - edge { stroke } else { fill };
                    self.put(px, py, color);
                }
            }
        }
    }

    /// Draw `text` with glyphs of `char_size` pixels (a multiple of 8).
    ///
    /// Vertical text is rotated clockwise and reads top to bottom.
    pub fn text(
        &mut self,
        x: f64,
        y: f64,
        text: &str,
        char_size: u32,
        max_chars: usize,
        color: Rgb,
        vertical: bool,
    ) {
        let ratio = (char_size / 8).max(1) as i64;
        let (base_x, base_y) = (x.round() as i64, y.round() as i64);
        for (i, char_data) in font::glyphs(text, max_chars).into_iter().enumerate() {
            let offset = i as i64 * char_size as i64;
            for j in 0..8i64 {
                let row = char_data[j as usize];
                for z in (0..8i64).rev() {
                    if (row >> z) & 1 == 0 {
                        continue;
                    }
                    let col = 7 - z;
                    let (gx, gy) = if vertical {
                        (base_x + (7 - j) * ratio, base_y + offset + col * ratio)
                    } else {
                        (base_x + offset + col * ratio, base_y + j * ratio)
                    };
                    for rx in 0..ratio {
                        for ry in 0..ratio {
                            self.put(gx + rx, gy + ry, color);
                        }
                    }
                }
            }
        }
    }

    pub fn into_image(self) -> Result<image::RgbImage> {
        image::RgbImage::from_raw(self.width, self.height, self.pixels).ok_or_else(|| {
            BubbleError::InvalidInput("pixel buffer does not match image size".to_string())
        })
    }
}

/// Draw every shape of `scene`, in order, onto a new canvas.
pub fn rasterize(scene: &Scene) -> Canvas {
    let mut canvas = Canvas::new(scene.width.max(1), scene.height.max(1));
    canvas.fill_rect(0.0, 0.0, scene.width as f64, scene.height as f64, WHITE);

    for shape in &scene.shapes {
        match shape {
            Shape::Rect { x, y, w, h, fill } => canvas.fill_rect(*x, *y, *w, *h, *fill),
            Shape::Line {
                x1,
                y1,
                x2,
                y2,
                color,
                dotted,
            } => canvas.line(*x1, *y1, *x2, *y2, *color, *dotted),
            Shape::Circle {
                cx,
                cy,
                r,
                fill,
                stroke,
            } => canvas.circle(*cx, *cy, *r, *fill, *stroke),
            Shape::Text {
                x,
                y,
                text,
                color,
                vertical,
            } => canvas.text(
                *x,
                *y,
                text,
                scene.char_size,
                scene.max_label_chars,
                *color,
                *vertical,
            ),
        }
    }

    debug!(
        "Rasterized {} shapes into {}x{} pixels",
        scene.shapes.len(),
        canvas.width(),
        canvas.height()
    );
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::BLACK;

    const RED: Rgb = (255, 0, 0);

    #[test]
    fn test_fill_rect_clips_to_canvas() {
        let mut canvas = Canvas::new(10, 10);
        canvas.fill_rect(8.0, 8.0, 5.0, 5.0, RED);
        assert_eq!(canvas.pixel(9, 9), Some(RED));
        assert_eq!(canvas.pixel(7, 7), Some(WHITE));
        assert_eq!(canvas.pixel(10, 10), None);
    }

    #[test]
    fn test_solid_and_dotted_lines() {
        let mut canvas = Canvas::new(20, 3);
        canvas.line(0.0, 0.0, 19.0, 0.0, BLACK, false);
        assert!((0..20).all(|x| canvas.pixel(x, 0) == Some(BLACK)));

        canvas.line(0.0, 2.0, 18.0, 2.0, BLACK, true);
        assert_eq!(canvas.pixel(0, 2), Some(BLACK));
        assert_eq!(canvas.pixel(1, 2), Some(WHITE));
        assert_eq!(canvas.pixel(3, 2), Some(BLACK));
    }

    #[test]
    fn test_circle_fill_and_outline() {
        let mut canvas = Canvas::new(20, 20);
        canvas.circle(10.0, 10.0, 6.0, RED, BLACK);
        assert_eq!(canvas.pixel(10, 10), Some(RED));
        assert_eq!(canvas.pixel(15, 10), Some(BLACK));
        assert_eq!(canvas.pixel(0, 0), Some(WHITE));
    }

    #[test]
    fn test_horizontal_and_vertical_text() {
        // 'I' has its top row at bits 0x70: columns 1..=3
        let mut canvas = Canvas::new(16, 16);
        canvas.text(0.0, 0.0, "I", 8, 10, BLACK, false);
        assert_eq!(canvas.pixel(1, 0), Some(BLACK));
        assert_eq!(canvas.pixel(0, 0), Some(WHITE));

        let mut canvas = Canvas::new(16, 16);
        canvas.text(0.0, 0.0, "I", 8, 10, BLACK, true);
        // top glyph row lands in the rightmost column
        assert_eq!(canvas.pixel(7, 1), Some(BLACK));
        assert_eq!(canvas.pixel(7, 0), Some(WHITE));
    }

    #[test]
    fn test_into_image_dimensions() {
        let img = Canvas::new(7, 3).into_image().unwrap();
        assert_eq!((img.width(), img.height()), (7, 3));
    }
}
