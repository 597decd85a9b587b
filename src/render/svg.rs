//! Vector backend: serializes a [`Scene`] as SVG with real fonts.

use super::{Scene, Shape};
use crate::font;
use crate::palette::css;

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Render `scene` as a standalone SVG document.
pub fn render_svg(scene: &Scene) -> String {
    let cs = scene.char_size as f64;
    let mut svg = String::new();

    svg.push_str(&format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="0 0 {} {}">
<style>
  .label {{ font-family: 'DejaVu Sans Mono', 'Courier New', monospace; font-size: {}px; }}
</style>
<rect width="100%" height="100%" fill="white"/>
"#,
        scene.width, scene.height, scene.width, scene.height, cs
    ));

    for shape in &scene.shapes {
        match shape {
            Shape::Rect { x, y, w, h, fill } => {
                svg.push_str(&format!(
                    r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{}"/>"#,
                    x,
                    y,
                    w,
                    h,
                    css(*fill)
                ));
            }
            Shape::Line {
                x1,
                y1,
                x2,
                y2,
                color,
                dotted,
            } => {
                let dash = if *dotted {
                    r#" stroke-dasharray="1,2""#
                } else {
                    ""
                };
                svg.push_str(&format!(
                    r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="1"{}/>"#,
                    x1,
                    y1,
                    x2,
                    y2,
                    css(*color),
                    dash
                ));
            }
            Shape::Circle {
                cx,
                cy,
                r,
                fill,
                stroke,
            } => {
                svg.push_str(&format!(
                    r#"<circle cx="{}" cy="{}" r="{:.3}" fill="{}" stroke="{}" stroke-width="0.5"/>"#,
                    cx,
                    cy,
                    r,
                    css(*fill),
                    css(*stroke)
                ));
            }
            Shape::Text {
                x,
                y,
                text,
                color,
                vertical,
            } => {
                let label = escape_xml(&font::truncate_label(text, scene.max_label_chars));
                if *vertical {
                    // baseline sits left of the glyph box once rotated
                    svg.push_str(&format!(
                        r#"<text transform="translate({},{}) rotate(90)" class="label" fill="{}">{}</text>"#,
                        x + cs * 0.2,
                        y,
                        css(*color),
                        label
                    ));
                } else {
                    svg.push_str(&format!(
                        r#"<text x="{}" y="{}" class="label" fill="{}">{}</text>"#,
                        x,
                        y + cs * 0.8,
                        css(*color),
                        label
                    ));
                }
            }
        }
        svg.push('\n');
    }

    svg.push_str("</svg>\n");
    svg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::{BLACK, WHITE};

    fn scene(shapes: Vec<Shape>) -> Scene {
        Scene {
            width: 120,
            height: 80,
            char_size: 8,
            max_label_chars: 6,
            shapes,
        }
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("a<b & 'c'"), "a&lt;b &amp; &apos;c&apos;");
    }

    #[test]
    fn test_document_frame() {
        let out = render_svg(&scene(Vec::new()));
        assert!(out.starts_with("<?xml"));
        assert!(out.contains(r#"width="120" height="80" viewBox="0 0 120 80""#));
        assert!(out.ends_with("</svg>\n"));
    }

    #[test]
    fn test_shapes_serialized() {
        let out = render_svg(&scene(vec![
            Shape::Line {
                x1: 0.0,
                y1: 1.0,
                x2: 10.0,
                y2: 1.0,
                color: BLACK,
                dotted: true,
            },
            Shape::Circle {
                cx: 5.0,
                cy: 5.0,
                r: 2.0,
                fill: WHITE,
                stroke: BLACK,
            },
            Shape::Text {
                x: 0.0,
                y: 0.0,
                text: "Bacteroides<1>".to_string(),
                color: BLACK,
                vertical: true,
            },
        ]));
        assert!(out.contains(r#"stroke-dasharray="1,2""#));
        assert!(out.contains(r#"<circle cx="5" cy="5" r="2.000""#));
        assert!(out.contains("rotate(90)"));
        // truncated to six characters before escaping
        assert!(out.contains(">Bacte...</text>"));
    }
}
