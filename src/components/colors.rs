// ============================================================================
// COLOR VALUES — hex parsing/formatting for the color picker and settings
// ============================================================================

/// Unpremultiplied RGBA8 color as used by the brush and text tools.
pub type Color = [u8; 4];

pub const BRUSH_RED: Color = [255, 0, 0, 255];
pub const TEXT_WHITE: Color = [255, 255, 255, 255];

/// Parse `#rgb`, `#rrggbb` or `#rrggbbaa` (leading `#` optional).
pub fn parse_hex(hex: &str) -> Option<Color> {
    let hex = hex.trim().trim_start_matches('#');
    if !hex.is_ascii() {
        return None;
    }
    let byte = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 => {
            let mut out = [0, 0, 0, 255];
            for (i, ch) in hex.chars().enumerate() {
                let v = ch.to_digit(16)? as u8;
                out[i] = v * 16 + v;
            }
            Some(out)
        }
        6 => Some([byte(&hex[0..2])?, byte(&hex[2..4])?, byte(&hex[4..6])?, 255]),
        8 => Some([
            byte(&hex[0..2])?,
            byte(&hex[2..4])?,
            byte(&hex[4..6])?,
            byte(&hex[6..8])?,
        ]),
        _ => None,
    }
}

/// Format as `#RRGGBB`, or `#RRGGBBAA` when not fully opaque.
pub fn to_hex(c: Color) -> String {
    if c[3] == 255 {
        format!("#{:02X}{:02X}{:02X}", c[0], c[1], c[2])
    } else {
        format!("#{:02X}{:02X}{:02X}{:02X}", c[0], c[1], c[2], c[3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_long_and_alpha_forms() {
        assert_eq!(parse_hex("#f00"), Some([255, 0, 0, 255]));
        assert_eq!(parse_hex("00ff7f"), Some([0, 255, 127, 255]));
        assert_eq!(parse_hex("#11223344"), Some([0x11, 0x22, 0x33, 0x44]));
        assert_eq!(parse_hex("#12345"), None);
        assert_eq!(parse_hex("#gg0000"), None);
    }

    #[test]
    fn hex_output_drops_opaque_alpha() {
        assert_eq!(to_hex(BRUSH_RED), "#FF0000");
        assert_eq!(to_hex([1, 2, 3, 4]), "#01020304");
    }
}
