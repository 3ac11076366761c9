//! Color-space conversion used by the color control methods.
//!
//! The gateway's color properties want HSL in its own integer ranges, so
//! caller-friendly RGB input is converted here before it goes on the wire.

use crate::error::{Error, Result};

/// Linearly remaps `x` from `[in_min, in_max]` to `[out_min, out_max]`.
pub fn map_range(x: f64, in_min: f64, in_max: f64, out_min: f64, out_max: f64) -> f64 {
    (x - in_min) * (out_max - out_min) / (in_max - in_min) + out_min
}

/// Converts an RGB triple to HSL with hue in degrees `[0, 360)` and
/// saturation/lightness in percent `[0, 100]`.
///
/// Achromatic input (`r == g == b`) yields hue and saturation 0. When two
/// channels tie for the maximum, red wins over green, green over blue; that
/// ordering fixes which hue sector formula applies.
pub fn rgb_to_hsl(r: u8, g: u8, b: u8) -> (f64, f64, f64) {
    let r = f64::from(r) / 255.0;
    let g = f64::from(g) / 255.0;
    let b = f64::from(b) / 255.0;

    let maximum = r.max(g).max(b);
    let minimum = r.min(g).min(b);
    let l = (maximum + minimum) / 2.0;

    if maximum == minimum {
        return (0.0, 0.0, l * 100.0);
    }

    let d = maximum - minimum;
    let s = if l > 0.5 {
        d / (2.0 - maximum - minimum)
    } else {
        d / (maximum + minimum)
    };

    let sector = if maximum == r {
        (g - b) / d + if g < b { 6.0 } else { 0.0 }
    } else if maximum == g {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };
    let h = sector / 6.0;

    (h * 360.0, s * 100.0, l * 100.0)
}

/// Parses a 6-hex-digit color string such as `"8f2686"` into RGB bytes.
///
/// Anything that is not exactly three bytes of hex is rejected whole; there
/// is no partial result.
pub fn hex_to_rgb(hex_string: &str) -> Result<(u8, u8, u8)> {
    let bytes = hex::decode(hex_string)
        .map_err(|e| Error::Codec(format!("invalid color hex string {:?}: {}", hex_string, e)))?;
    match bytes.as_slice() {
        [r, g, b] => Ok((*r, *g, *b)),
        _ => Err(Error::Codec(format!(
            "color hex string {:?} must encode exactly 3 bytes",
            hex_string
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_range_hits_both_endpoints() {
        assert_eq!(map_range(0.0, 0.0, 360.0, 0.0, 65279.0), 0.0);
        assert_eq!(map_range(360.0, 0.0, 360.0, 0.0, 65279.0), 65279.0);
        assert_eq!(map_range(50.0, 0.0, 100.0, 0.0, 254.0), 127.0);
    }

    #[test]
    fn map_range_is_monotonic() {
        let mut previous = f64::NEG_INFINITY;
        for x in 0..=100 {
            let y = map_range(f64::from(x), 0.0, 100.0, 0.0, 65279.0);
            assert!(y > previous);
            previous = y;
        }
    }

    #[test]
    fn rgb_to_hsl_stays_in_range() {
        for r in (0..=255).step_by(15) {
            for g in (0..=255).step_by(15) {
                for b in (0..=255).step_by(15) {
                    let (h, s, l) = rgb_to_hsl(r as u8, g as u8, b as u8);
                    assert!((0.0..360.0).contains(&h), "h={} for {},{},{}", h, r, g, b);
                    assert!((0.0..=100.0).contains(&s));
                    assert!((0.0..=100.0).contains(&l));
                }
            }
        }
    }

    #[test]
    fn achromatic_input_has_no_hue_or_saturation() {
        for v in [0u8, 17, 128, 255] {
            let (h, s, _) = rgb_to_hsl(v, v, v);
            assert_eq!(h, 0.0);
            assert_eq!(s, 0.0);
        }
    }

    #[test]
    fn known_conversions() {
        assert_eq!(rgb_to_hsl(255, 0, 0), (0.0, 100.0, 50.0));
        let (h, s, l) = rgb_to_hsl(0, 255, 0);
        assert!((h - 120.0).abs() < 1e-9 && s == 100.0 && l == 50.0);
        let (h, s, l) = rgb_to_hsl(0, 0, 255);
        assert!((h - 240.0).abs() < 1e-9 && s == 100.0 && l == 50.0);

        // The purple from the gateway documentation.
        let (h, s, l) = rgb_to_hsl(143, 38, 134);
        assert!((h - 305.14).abs() < 0.01);
        assert!((s - 58.01).abs() < 0.01);
        assert!((l - 35.49).abs() < 0.01);
    }

    #[test]
    fn parses_hex_colors() {
        assert_eq!(hex_to_rgb("8f2686").unwrap(), (143, 38, 134));
        assert_eq!(hex_to_rgb("000000").unwrap(), (0, 0, 0));
        assert!(matches!(hex_to_rgb("zz0000"), Err(Error::Codec(_))));
        assert!(matches!(hex_to_rgb("8f26"), Err(Error::Codec(_))));
        assert!(matches!(hex_to_rgb("8f268600"), Err(Error::Codec(_))));
    }
}
