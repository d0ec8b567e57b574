//! Color ramps for choropleth fills.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Simple RGB color.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Rgb {
    pub(crate) r: u8,
    pub(crate) g: u8,
    pub(crate) b: u8,
}

impl Rgb {
    /// Neutral fill for missing values.
    pub(crate) const GRAY: Rgb = Rgb { r: 150, g: 150, b: 150 };

    const fn new(r: u8, g: u8, b: u8) -> Self { Self { r, g, b } }

    fn lerp(self, other: Rgb, t: f64) -> Rgb {
        let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round().clamp(0.0, 255.0) as u8;
        Rgb { r: mix(self.r, other.r), g: mix(self.g, other.g), b: mix(self.b, other.b) }
    }
}

impl fmt::Display for Rgb {
    /// Format as CSS hex: #rrggbb
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

const VIRIDIS: &[Rgb] = &[
    Rgb::new(0x44, 0x01, 0x54),
    Rgb::new(0x48, 0x28, 0x78),
    Rgb::new(0x3e, 0x4a, 0x89),
    Rgb::new(0x31, 0x68, 0x8e),
    Rgb::new(0x26, 0x82, 0x8e),
    Rgb::new(0x1f, 0x9e, 0x89),
    Rgb::new(0x35, 0xb7, 0x79),
    Rgb::new(0x6d, 0xcd, 0x59),
    Rgb::new(0xb4, 0xde, 0x2c),
    Rgb::new(0xfd, 0xe7, 0x25),
];

// Blue for negative, red for positive.
const RED_BLUE: &[Rgb] = &[
    Rgb::new(0x05, 0x30, 0x61),
    Rgb::new(0x21, 0x66, 0xac),
    Rgb::new(0x43, 0x93, 0xc3),
    Rgb::new(0x92, 0xc5, 0xde),
    Rgb::new(0xd1, 0xe5, 0xf0),
    Rgb::new(0xf7, 0xf7, 0xf7),
    Rgb::new(0xfd, 0xdb, 0xc7),
    Rgb::new(0xf4, 0xa5, 0x82),
    Rgb::new(0xd6, 0x60, 0x4d),
    Rgb::new(0xb2, 0x18, 0x2b),
    Rgb::new(0x67, 0x00, 0x1f),
];

/// Fill ramp of a choropleth.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Palette {
    /// Sequential, low values dark purple, high values yellow.
    Viridis,
    /// Diverging around zero, negative blue, positive red.
    RedBlue,
}

impl Palette {
    fn stops(&self) -> &'static [Rgb] {
        match self {
            Self::Viridis => VIRIDIS,
            Self::RedBlue => RED_BLUE,
        }
    }

    /// Value interval mapped onto the ramp. Diverging ramps are centred on zero.
    pub(crate) fn domain(&self, values: &[f64]) -> Option<(f64, f64)> {
        let (lo, hi) = values.iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if lo > hi { return None }
        match self {
            Self::Viridis => Some((lo, hi)),
            Self::RedBlue => {
                let extent = lo.abs().max(hi.abs());
                Some((-extent, extent))
            }
        }
    }

    /// Color at position `t` in [0, 1] along the ramp.
    pub(crate) fn at(&self, t: f64) -> Rgb {
        let stops = self.stops();
        if !t.is_finite() { return Rgb::GRAY }
        let x = t.clamp(0.0, 1.0) * (stops.len() - 1) as f64;
        let i = (x.floor() as usize).min(stops.len() - 2);
        stops[i].lerp(stops[i + 1], x - i as f64)
    }

    /// Color of `value` within `domain`; non-finite values are gray.
    pub(crate) fn color(&self, value: f64, (lo, hi): (f64, f64)) -> Rgb {
        if !value.is_finite() { return Rgb::GRAY }
        if hi > lo { self.at((value - lo) / (hi - lo)) } else { self.at(0.5) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_endpoints() {
        assert_eq!(Palette::Viridis.at(0.0), VIRIDIS[0]);
        assert_eq!(Palette::Viridis.at(1.0), VIRIDIS[VIRIDIS.len() - 1]);
        assert_eq!(Palette::RedBlue.at(0.5), RED_BLUE[5]);
    }

    #[test]
    fn diverging_domain_is_symmetric() {
        assert_eq!(Palette::RedBlue.domain(&[-0.2, 0.6]), Some((-0.6, 0.6)));
        assert_eq!(Palette::Viridis.domain(&[3.0, f64::NAN, 1.0]), Some((1.0, 3.0)));
        assert_eq!(Palette::Viridis.domain(&[f64::NAN]), None);
    }

    #[test]
    fn missing_values_are_gray() {
        assert_eq!(Palette::Viridis.color(f64::NAN, (0.0, 1.0)), Rgb::GRAY);
        assert_eq!(Rgb::GRAY.to_string(), "#969696");
    }
}
