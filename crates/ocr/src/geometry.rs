//! Line fitting and point/line measurements shared by the skew estimator and
//! both line builders.

use serde::{Deserialize, Serialize};

use crate::types::Point;

const VERTICAL_EPS: f64 = 1e-9;
const DEGENERATE_VARIANCE: f64 = 1e-12;

/// A best-fit line through a set of points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedLine {
    /// `y = slope * x + intercept`
    Sloped { slope: f64, intercept: f64 },
    /// `x = x`
    Vertical { x: f64 },
}

impl FittedLine {
    /// The line through two points; vertical when their x coordinates coincide.
    pub fn through(p0: Point, p1: Point) -> Self {
        let dx = p1.x - p0.x;
        if dx.abs() < VERTICAL_EPS {
            return FittedLine::Vertical { x: p0.x };
        }
        let slope = (p1.y - p0.y) / dx;
        FittedLine::Sloped {
            slope,
            intercept: p0.y - slope * p0.x,
        }
    }

    pub fn horizontal_through(p: Point) -> Self {
        FittedLine::Sloped { slope: 0.0, intercept: p.y }
    }

    /// Least-squares fit (y on x). A single point yields a horizontal line
    /// through it; points sharing one x yield a vertical line.
    pub fn fit(points: &[Point]) -> Self {
        match points {
            [] => FittedLine::Sloped { slope: 0.0, intercept: 0.0 },
            [p] => Self::horizontal_through(*p),
            _ => {
                let n = points.len() as f64;
                let xm = points.iter().map(|p| p.x).sum::<f64>() / n;
                let ym = points.iter().map(|p| p.y).sum::<f64>() / n;
                let num: f64 = points.iter().map(|p| (p.x - xm) * (p.y - ym)).sum();
                let den: f64 = points.iter().map(|p| (p.x - xm).powi(2)).sum();
                if den.abs() < DEGENERATE_VARIANCE {
                    return FittedLine::Vertical { x: xm };
                }
                let slope = num / den;
                FittedLine::Sloped {
                    slope,
                    intercept: ym - slope * xm,
                }
            }
        }
    }

    /// Perpendicular distance from `p` to the line.
    pub fn distance(&self, p: Point) -> f64 {
        match *self {
            FittedLine::Vertical { x } => (p.x - x).abs(),
            FittedLine::Sloped { slope, intercept } => {
                (slope * p.x - p.y + intercept).abs() / (slope * slope + 1.0).sqrt()
            }
        }
    }

    /// Signed position of `p` along the line direction, measured from `origin`.
    pub fn project(&self, origin: Point, p: Point) -> f64 {
        match *self {
            FittedLine::Vertical { .. } => p.y - origin.y,
            FittedLine::Sloped { slope, .. } => {
                ((p.x - origin.x) + slope * (p.y - origin.y)) / (1.0 + slope * slope).sqrt()
            }
        }
    }

    pub fn slope(&self) -> f64 {
        match *self {
            FittedLine::Vertical { .. } => f64::INFINITY,
            FittedLine::Sloped { slope, .. } => slope,
        }
    }

    /// Inclination in degrees; 90 for a vertical fit.
    pub fn angle_deg(&self) -> f64 {
        match *self {
            FittedLine::Vertical { .. } => 90.0,
            FittedLine::Sloped { slope, .. } => slope.atan().to_degrees(),
        }
    }
}

/// Median averaging the two middle values for even lengths. `None` when empty.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Element at `len / 2` of the sorted values (upper median for even lengths).
pub fn upper_median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    Some(sorted[sorted.len() / 2])
}

/// Percentile with linear interpolation between closest ranks, `q` in 0..=100.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    #[test]
    fn through_two_points() {
        let l = FittedLine::through(p(0.0, 1.0), p(2.0, 5.0));
        assert_eq!(l, FittedLine::Sloped { slope: 2.0, intercept: 1.0 });
        assert_eq!(FittedLine::through(p(3.0, 0.0), p(3.0, 9.0)), FittedLine::Vertical { x: 3.0 });
    }

    #[test]
    fn distance_to_sloped_and_vertical() {
        let horizontal = FittedLine::horizontal_through(p(0.0, 10.0));
        assert_eq!(horizontal.distance(p(50.0, 13.0)), 3.0);
        let diagonal = FittedLine::Sloped { slope: 1.0, intercept: 0.0 };
        assert!((diagonal.distance(p(1.0, 0.0)) - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);
        assert_eq!(FittedLine::Vertical { x: 4.0 }.distance(p(1.0, 100.0)), 3.0);
    }

    #[test]
    fn fit_single_point_is_horizontal() {
        assert_eq!(
            FittedLine::fit(&[p(7.0, 3.0)]),
            FittedLine::Sloped { slope: 0.0, intercept: 3.0 }
        );
    }

    #[test]
    fn fit_recovers_exact_line() {
        let pts: Vec<Point> = (0..5)
            .map(|i| p(i as f64 * 10.0, 0.5 * i as f64 * 10.0 + 2.0))
            .collect();
        match FittedLine::fit(&pts) {
            FittedLine::Sloped { slope, intercept } => {
                assert!((slope - 0.5).abs() < 1e-12);
                assert!((intercept - 2.0).abs() < 1e-9);
            }
            other => panic!("unexpected fit {other:?}"),
        }
    }

    #[test]
    fn fit_stacked_points_is_vertical() {
        assert_eq!(FittedLine::fit(&[p(2.0, 0.0), p(2.0, 8.0)]), FittedLine::Vertical { x: 2.0 });
    }

    #[test]
    fn projection_orders_along_line() {
        let l = FittedLine::Sloped { slope: 0.1, intercept: 0.0 };
        let origin = p(0.0, 0.0);
        assert!(l.project(origin, p(10.0, 1.0)) < l.project(origin, p(20.0, 2.0)));
        assert_eq!(FittedLine::Vertical { x: 0.0 }.project(p(0.0, 5.0), p(0.0, 9.0)), 4.0);
    }

    #[test]
    fn angle_of_fit() {
        assert_eq!(FittedLine::Vertical { x: 0.0 }.angle_deg(), 90.0);
        let l = FittedLine::Sloped { slope: 1.0, intercept: 0.0 };
        assert!((l.angle_deg() - 45.0).abs() < 1e-12);
    }

    #[test]
    fn medians_and_percentiles() {
        assert_eq!(median(&[3.0, 1.0, 2.0, 4.0]), Some(2.5));
        assert_eq!(upper_median(&[3.0, 1.0, 2.0, 4.0]), Some(3.0));
        assert_eq!(median(&[]), None);
        assert_eq!(percentile(&[1.0, 2.0, 3.0, 4.0, 5.0], 25.0), Some(2.0));
        assert_eq!(percentile(&[1.0, 2.0, 3.0, 4.0], 75.0), Some(3.25));
    }
}
