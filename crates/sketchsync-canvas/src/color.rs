//! CSS-style colour strings as sent by drawing clients.

use std::fmt;
use std::str::FromStr;

use image::Rgba;

use crate::error::CanvasError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub Rgba<u8>);

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color(Rgba([r, g, b, 255]))
    }

    pub const fn rgba(&self) -> Rgba<u8> {
        self.0
    }
}

impl FromStr for Color {
    type Err = CanvasError;

    /// Accepts any CSS colour: hex forms, `rgb()`/`rgba()`, `hsl()`/`hsla()`,
    /// `hwb()`, the named colours and `transparent`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = csscolorparser::parse(s.trim())
            .map_err(|e| CanvasError::InvalidColor(format!("{s}: {e}")))?;
        Ok(Color(Rgba(parsed.to_rgba8())))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b, a] = self.0.0;
        if a == 255 {
            write!(f, "#{r:02x}{g:02x}{b:02x}")
        } else {
            write!(f, "#{r:02x}{g:02x}{b:02x}{a:02x}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_forms() {
        assert_eq!("#f00".parse::<Color>().unwrap(), Color::rgb(255, 0, 0));
        assert_eq!("#00ff7f".parse::<Color>().unwrap(), Color::rgb(0, 255, 127));
        assert_eq!(
            "#11223380".parse::<Color>().unwrap(),
            Color(Rgba([0x11, 0x22, 0x33, 0x80]))
        );
        assert_eq!(" #FFFFFF ".parse::<Color>().unwrap(), Color::WHITE);
    }

    #[test]
    fn test_parse_named() {
        assert_eq!("Black".parse::<Color>().unwrap(), Color::BLACK);
        assert_eq!("grey".parse::<Color>().unwrap(), Color::rgb(128, 128, 128));
        assert_eq!(
            "cornflowerblue".parse::<Color>().unwrap(),
            Color::rgb(100, 149, 237)
        );
        assert_eq!(
            "transparent".parse::<Color>().unwrap(),
            Color(Rgba([0, 0, 0, 0]))
        );
    }

    #[test]
    fn test_parse_functional_forms() {
        assert_eq!("rgb(255, 0, 0)".parse::<Color>().unwrap(), Color::rgb(255, 0, 0));
        assert_eq!("rgb(1,2,3)".parse::<Color>().unwrap(), Color::rgb(1, 2, 3));
        assert_eq!(
            "hsl(120, 100%, 50%)".parse::<Color>().unwrap(),
            Color::rgb(0, 255, 0)
        );

        let half = "rgba(0,0,0,0.5)".parse::<Color>().unwrap().rgba();
        assert_eq!(&half.0[..3], &[0, 0, 0]);
        assert!((127..=128).contains(&half.0[3]));
    }

    #[test]
    fn test_parse_invalid() {
        for bad in ["", "#", "#12", "#12345", "#gggggg", "chartreuse-ish", "rgb(1,2"] {
            assert!(bad.parse::<Color>().is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn test_display_round_trip() {
        for s in ["#0a0b0c", "#0a0b0c0d"] {
            assert_eq!(s.parse::<Color>().unwrap().to_string(), s);
        }
    }
}
