use serde::{Deserialize, Serialize};

/// Zero-based caret location inside a document
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorPosition {
    pub line: u32,
    pub column: u32,
}

/// One participant visible on a document
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PresenceEntry {
    pub user_id: String,
    /// Display color as a `#rrggbb` hex string, stable per user id
    pub color: String,
    pub cursor: Option<CursorPosition>,
}

impl PresenceEntry {
    pub fn new(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        let color = color_for_user(&user_id);
        Self {
            user_id,
            color,
            cursor: None,
        }
    }
}

/// Derive a stable display color from a user id.
///
/// Equal ids always map to equal colors, across sessions and peers, so
/// every participant renders a given user the same way without any
/// color negotiation.
pub fn color_for_user(user_id: &str) -> String {
    // Spread the hash over the hue circle with the golden ratio so
    // neighbouring ids land on visually distant hues
    let hash = user_id
        .bytes()
        .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
    let hue = (hash.wrapping_mul(0x9E37_79B9_7F4A_7C15) % 360) as f32 / 360.0;
    let (r, g, b) = hsl_to_rgb(hue, 0.65, 0.55);
    format!("#{:02x}{:02x}{:02x}", r, g, b)
}

fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (u8, u8, u8) {
    let (r, g, b) = if s == 0.0 {
        (l, l, l)
    } else {
        let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
        let p = 2.0 * l - q;
        (
            hue_to_rgb(p, q, h + 1.0 / 3.0),
            hue_to_rgb(p, q, h),
            hue_to_rgb(p, q, h - 1.0 / 3.0),
        )
    };
    ((r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8)
}

fn hue_to_rgb(p: f32, q: f32, mut t: f32) -> f32 {
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
