//! Algorithmic theme palette derivation from a single primary color.
//!
//! Faster than asking the LLM for six colors, and the complementary-hue
//! secondary gives better harmony than whatever the model picks.

use crate::modes::types::ModeTheme;

/// Parse a hex color string ("#1E88E5" or "#ABC") into an RGB triple.
///
/// Falls back to mid-gray on malformed input.
pub fn hex_to_rgb(hex_color: &str) -> (u8, u8, u8) {
    let hex = hex_color.trim_start_matches('#');

    // Expand short form (#RGB -> #RRGGBB).
    let expanded: String = if hex.len() == 3 {
        hex.chars().flat_map(|c| [c, c]).collect()
    } else {
        hex.to_string()
    };

    if expanded.len() != 6 {
        return (128, 128, 128);
    }

    let r = u8::from_str_radix(&expanded[0..2], 16).unwrap_or(128);
    let g = u8::from_str_radix(&expanded[2..4], 16).unwrap_or(128);
    let b = u8::from_str_radix(&expanded[4..6], 16).unwrap_or(128);
    (r, g, b)
}

/// Format an RGB triple as a lowercase hex string with '#' prefix.
pub fn rgb_to_hex(r: u8, g: u8, b: u8) -> String {
    format!("#{:02x}{:02x}{:02x}", r, g, b)
}

/// Convert RGB (0-1 range) to HSL (hue, saturation, lightness, all 0-1).
fn rgb_to_hsl(r: f64, g: f64, b: f64) -> (f64, f64, f64) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;

    if (max - min).abs() < f64::EPSILON {
        return (0.0, 0.0, l);
    }

    let d = max - min;
    let s = if l > 0.5 {
        d / (2.0 - max - min)
    } else {
        d / (max + min)
    };

    let h = if (max - r).abs() < f64::EPSILON {
        ((g - b) / d + if g < b { 6.0 } else { 0.0 }) / 6.0
    } else if (max - g).abs() < f64::EPSILON {
        ((b - r) / d + 2.0) / 6.0
    } else {
        ((r - g) / d + 4.0) / 6.0
    };

    (h, s, l)
}

/// Convert HSL (all 0-1) back to RGB (0-1 range).
fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (f64, f64, f64) {
    if s.abs() < f64::EPSILON {
        return (l, l, l);
    }

    fn hue_to_rgb(p: f64, q: f64, mut t: f64) -> f64 {
        if t < 0.0 {
            t += 1.0;
        }
        if t > 1.0 {
            t -= 1.0;
        }
        if t < 1.0 / 6.0 {
            return p + (q - p) * 6.0 * t;
        }
        if t < 1.0 / 2.0 {
            return q;
        }
        if t < 2.0 / 3.0 {
            return p + (q - p) * (2.0 / 3.0 - t) * 6.0;
        }
        p
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;

    (
        hue_to_rgb(p, q, h + 1.0 / 3.0),
        hue_to_rgb(p, q, h),
        hue_to_rgb(p, q, h - 1.0 / 3.0),
    )
}

/// Derive a complete [`ModeTheme`] from a single primary color.
///
/// The secondary is the complement (hue +180°, saturation ×0.8); the
/// background/surface/text trio flips between a light and a dark slate
/// scheme based on the primary's lightness.
pub fn derive_theme_palette(primary_hex: &str) -> ModeTheme {
    let (r, g, b) = hex_to_rgb(primary_hex);
    let (h, s, l) = rgb_to_hsl(r as f64 / 255.0, g as f64 / 255.0, b as f64 / 255.0);

    let comp_h = (h + 0.5) % 1.0;
    let comp_s = s * 0.8;
    let (cr, cg, cb) = hsl_to_rgb(comp_h, comp_s, l);
    let secondary = rgb_to_hex(
        (cr * 255.0).round() as u8,
        (cg * 255.0).round() as u8,
        (cb * 255.0).round() as u8,
    );

    let use_light_scheme = l > 0.5;
    let (background, surface, text) = if use_light_scheme {
        ("#f8fafc", "#ffffff", "#0f172a")
    } else {
        ("#1e293b", "#334155", "#f8fafc")
    };

    let primary = if primary_hex.starts_with('#') {
        primary_hex.to_lowercase()
    } else {
        format!("#{}", primary_hex.to_lowercase())
    };

    ModeTheme {
        primary,
        secondary,
        background: background.to_string(),
        surface: surface.to_string(),
        text: text.to_string(),
        text_muted: "#64748b".to_string(),
    }
}
