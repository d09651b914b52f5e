//! Fan curve calculations for temperature-based speed control.

use serde::{Deserialize, Serialize};

/// Maximum iterations for Bezier curve computation.
const MAX_ITERATIONS: usize = 100;

/// Precision epsilon for Bezier curve calculations.
const EPSILON: f32 = 1e-6;

/// Temperature/speed pair (`x` in °C, `y` in percent). Serialized as `[x, y]`.
///
/// # Example
///
/// ```
/// use tt_rgbd::fan::curve::Point;
///
/// let point = Point { x: 45.0, y: 60.0 }; // 45°C -> 60% fan speed
/// let from_tuple: Point = (45.0, 60.0).into();
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 2]", into = "[f32; 2]")]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl From<(f32, f32)> for Point {
    fn from(value: (f32, f32)) -> Self {
        Self {
            x: value.0,
            y: value.1,
        }
    }
}

impl From<[f32; 2]> for Point {
    fn from([x, y]: [f32; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [f32; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

/// Validated speed curve.
///
/// - `Linear`: interpolation between points, clamped to the end points
/// - `Bezier`: cubic Bezier through four control points
#[derive(Debug, Clone, PartialEq)]
pub enum FanCurve {
    Linear(Vec<Point>),
    Bezier([Point; 4]),
}

impl FanCurve {
    /// Builds a linear curve; points must be non-empty, strictly increasing in
    /// temperature and within 0..=100 percent.
    pub fn linear(points: Vec<Point>) -> Result<Self, String> {
        if points.is_empty() {
            return Err("curve needs at least one point".into());
        }
        if points.windows(2).any(|w| w[0].x >= w[1].x) {
            return Err("curve temperatures must be strictly increasing".into());
        }
        check_speeds(&points)?;
        Ok(FanCurve::Linear(points))
    }

    pub fn bezier(points: Vec<Point>) -> Result<Self, String> {
        check_speeds(&points)?;
        let pts: [Point; 4] = points
            .try_into()
            .map_err(|p: Vec<Point>| format!("Bezier curve must have 4 points, got {}", p.len()))?;
        Ok(FanCurve::Bezier(pts))
    }

    /// Speed in percent for `temp`.
    pub fn speed_at(&self, temp: f32) -> u8 {
        let speed = match self {
            FanCurve::Linear(points) => interpolate(points, temp),
            FanCurve::Bezier(points) => get_speed_for_temp(points, temp),
        };
        speed.round().clamp(0.0, 100.0) as u8
    }
}

fn check_speeds(points: &[Point]) -> Result<(), String> {
    match points.iter().find(|p| !(0.0..=100.0).contains(&p.y)) {
        Some(p) => Err(format!("speed {} is outside 0..=100", p.y)),
        None => Ok(()),
    }
}

fn interpolate(points: &[Point], temp: f32) -> f32 {
    let (first, last) = (points[0], points[points.len() - 1]);
    if temp <= first.x {
        return first.y;
    }
    if temp >= last.x {
        return last.y;
    }
    points
        .windows(2)
        .find_map(|w| {
            let (p0, p1) = (w[0], w[1]);
            (p0.x..=p1.x).contains(&temp).then(|| {
                let ratio = (temp - p0.x) / (p1.x - p0.x);
                p0.y * (1.0 - ratio) + p1.y * ratio
            })
        })
        .unwrap_or(last.y)
}

fn compute_bezier_at_t(pts: &[Point; 4], t: f32) -> Point {
    let u = 1.0 - t;
    let tt = t * t;
    let uu = u * u;
    let uuu = uu * u;
    let ttt = tt * t;

    let x = uuu * pts[0].x + 3.0 * uu * t * pts[1].x + 3.0 * u * tt * pts[2].x + ttt * pts[3].x;
    let y = uuu * pts[0].y + 3.0 * uu * t * pts[1].y + 3.0 * u * tt * pts[2].y + ttt * pts[3].y;

    (x, y).into()
}

/// Bisects the curve parameter until its x matches `temp`, then returns y.
fn get_speed_for_temp(pts: &[Point; 4], temp: f32) -> f32 {
    let mut t_low = 0.0_f32;
    let mut t_high = 1.0_f32;
    let mut t_mid = 0.0_f32;

    for _ in 0..MAX_ITERATIONS {
        t_mid = (t_low + t_high) * 0.5;
        let p = compute_bezier_at_t(pts, t_mid);

        if (p.x - temp).abs() < EPSILON {
            return p.y;
        }
        if p.x < temp {
            t_low = t_mid;
        } else {
            t_high = t_mid;
        }
    }

    compute_bezier_at_t(pts, t_mid).y
}
