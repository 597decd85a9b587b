//! Colors for groups (qualitative) and heat values (sequential).

use sha2::{Digest, Sha256};

pub type Rgb = (u8, u8, u8);

pub const WHITE: Rgb = (255, 255, 255);
pub const BLACK: Rgb = (0, 0, 0);
pub const GRID_GREY: Rgb = (200, 200, 200);
pub const GUIDE_GREY: Rgb = (170, 170, 170);

/// Set2 (8) + Paired (12) + Dark (10): 30 distinguishable group colors.
const GROUP_COLORS: [Rgb; 30] = [
    // Set2
    (102, 194, 165),
    (252, 141, 98),
    (141, 160, 203),
    (231, 138, 195),
    (166, 216, 84),
    (255, 217, 47),
    (229, 196, 148),
    (179, 179, 179),
    // Paired
    (166, 206, 227),
    (31, 120, 180),
    (178, 223, 138),
    (51, 160, 44),
    (251, 154, 153),
    (227, 26, 28),
    (253, 191, 111),
    (255, 127, 0),
    (202, 178, 214),
    (106, 61, 154),
    (255, 255, 153),
    (177, 89, 40),
    // Dark
    (0, 28, 127),
    (177, 64, 13),
    (18, 113, 28),
    (140, 8, 0),
    (89, 30, 113),
    (89, 47, 13),
    (162, 53, 130),
    (60, 60, 60),
    (184, 133, 10),
    (0, 99, 116),
];

/// ColorBrewer YlGnBu 9-class sequential palette, light to dark.
const YLGNBU_9: [Rgb; 9] = [
    (255, 255, 217),
    (237, 248, 177),
    (199, 233, 180),
    (127, 205, 187),
    (65, 182, 196),
    (29, 145, 192),
    (34, 94, 168),
    (37, 52, 148),
    (8, 29, 88),
];

/// Color of the group at position `index`.
///
/// The first 30 groups use the fixed palette; later groups get a color
/// derived from their label.
pub fn group_color(index: usize, label: &str) -> Rgb {
    GROUP_COLORS
        .get(index)
        .copied()
        .unwrap_or_else(|| hashed_color(label))
}

/// SHA256-based color for a label.
fn hashed_color(label: &str) -> Rgb {
    let mut hasher = Sha256::new();
    hasher.update(label.as_bytes());
    let result = hasher.finalize();

    let mut r = result[24] as f32 / 255.0;
    let mut g = result[8] as f32 / 255.0;
    let mut b = result[16] as f32 / 255.0;

    // Normalize by sum, then brighten
    let sum = r + g + b;
    if sum > 0.0 {
        r /= sum;
        g /= sum;
        b /= sum;
    }
    let max_component = r.max(g).max(b);
    let f = if max_component > 0.0 {
        1.5f32.min(1.0 / max_component)
    } else {
        1.0
    };

    (
        (255.0 * (r * f).min(1.0)).round() as u8,
        (255.0 * (g * f).min(1.0)).round() as u8,
        (255.0 * (b * f).min(1.0)).round() as u8,
    )
}

/// YlGnBu color for `t` in `[0, 1]`, linearly interpolated.
pub fn heat_color(t: f64) -> Rgb {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let scaled = t * (YLGNBU_9.len() - 1) as f64;
    let lo = (scaled.floor() as usize).min(YLGNBU_9.len() - 2);
    let frac = scaled - lo as f64;
    let (a, b) = (YLGNBU_9[lo], YLGNBU_9[lo + 1]);
    let mix = |x: u8, y: u8| (x as f64 + (y as f64 - x as f64) * frac).round() as u8;
    (mix(a.0, b.0), mix(a.1, b.1), mix(a.2, b.2))
}

/// CSS `rgb()` notation.
pub fn css(rgb: Rgb) -> String {
    format!("rgb({},{},{})", rgb.0, rgb.1, rgb.2)
}
