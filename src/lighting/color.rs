use serde::{Deserialize, Serialize};

/// 24-bit color. Serialized as `[r, g, b]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "[u8; 3]", into = "[u8; 3]")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const RED: Rgb = Rgb::new(255, 0, 0);
    pub const GREEN: Rgb = Rgb::new(0, 255, 0);
    pub const BLUE: Rgb = Rgb::new(0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Fully saturated color for `hue` degrees.
    pub fn from_hue(hue: f32) -> Self {
        let h = hue.rem_euclid(360.0) / 60.0;
        let x = 1.0 - (h % 2.0 - 1.0).abs();
        let (r, g, b) = match h as u32 {
            0 => (1.0, x, 0.0),
            1 => (x, 1.0, 0.0),
            2 => (0.0, 1.0, x),
            3 => (0.0, x, 1.0),
            4 => (x, 0.0, 1.0),
            _ => (1.0, 0.0, x),
        };
        let scale = |c: f32| (c * 255.0).round() as u8;
        Self::new(scale(r), scale(g), scale(b))
    }

    /// Linear blend; `t` is clamped to 0..=1.
    pub fn lerp(self, other: Rgb, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        Self::new(mix(self.r, other.r), mix(self.g, other.g), mix(self.b, other.b))
    }
}

impl From<[u8; 3]> for Rgb {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self::new(r, g, b)
    }
}

impl From<Rgb> for [u8; 3] {
    fn from(c: Rgb) -> Self {
        [c.r, c.g, c.b]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn primary_hues() {
        assert_eq!(Rgb::from_hue(0.0), Rgb::RED);
        assert_eq!(Rgb::from_hue(120.0), Rgb::GREEN);
        assert_eq!(Rgb::from_hue(240.0), Rgb::BLUE);
        assert_eq!(Rgb::from_hue(360.0), Rgb::RED);
    }

    #[test]
    fn lerp_endpoints_and_midpoint() {
        assert_eq!(Rgb::BLUE.lerp(Rgb::RED, 0.0), Rgb::BLUE);
        assert_eq!(Rgb::BLUE.lerp(Rgb::RED, 1.0), Rgb::RED);
        assert_eq!(Rgb::BLACK.lerp(Rgb::new(200, 100, 50), 0.5), Rgb::new(100, 50, 25));
        assert_eq!(Rgb::BLUE.lerp(Rgb::RED, 7.0), Rgb::RED);
    }

    #[test]
    fn serializes_as_triplet() {
        let c: Rgb = serde_yaml::from_str("[1, 2, 3]").unwrap();
        assert_eq!(c, Rgb::new(1, 2, 3));
        assert_eq!(serde_yaml::to_string(&c).unwrap().trim(), "- 1\n- 2\n- 3");
    }
}
