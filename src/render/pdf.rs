//! PDF backend: the SVG document converted with `svg2pdf`.

use super::{svg, Scene};
use crate::error::{BubbleError, Result};

/// Render `scene` as a single-page PDF.
pub fn render_pdf(scene: &Scene) -> Result<Vec<u8>> {
    let document = svg::render_svg(scene);

    let mut opt = svg2pdf::usvg::Options::default();
    opt.fontdb_mut().load_system_fonts();
    // Fallback when none of the label fonts is installed
    opt.font_family = "DejaVu Sans Mono".to_string();

    let tree = svg2pdf::usvg::Tree::from_str(&document, &opt)
        .map_err(|e| BubbleError::Pdf(format!("cannot parse figure: {}", e)))?;

    svg2pdf::to_pdf(
        &tree,
        svg2pdf::ConversionOptions::default(),
        svg2pdf::PageOptions::default(),
    )
    .map_err(|e| BubbleError::Pdf(format!("cannot convert figure: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::{BLACK, GRID_GREY};
    use crate::render::Shape;

    #[test]
    fn test_pdf_document() {
        let scene = Scene {
            width: 60,
            height: 40,
            char_size: 8,
            max_label_chars: 8,
            shapes: vec![
                Shape::Rect {
                    x: 2.0,
                    y: 2.0,
                    w: 10.0,
                    h: 10.0,
                    fill: GRID_GREY,
                },
                Shape::Circle {
                    cx: 30.0,
                    cy: 20.0,
                    r: 5.0,
                    fill: GRID_GREY,
                    stroke: BLACK,
                },
                Shape::Text {
                    x: 2.0,
                    y: 20.0,
                    text: "gut & skin".to_string(),
                    color: BLACK,
                    vertical: false,
                },
            ],
        };
        let bytes = render_pdf(&scene).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }
}
