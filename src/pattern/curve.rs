use super::model::CurvePoint;

/// Intensity envelope over normalized time. Points are ordered by non-decreasing `x`;
/// both coordinates stay inside [0, 1]. Two points sharing an `x` form a step.
#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    points: Vec<CurvePoint>,
}

impl Curve {
    pub fn new(points: Vec<CurvePoint>) -> Result<Self, String> {
        if points.len() < 2 {
            return Err(format!("needs at least 2 points, got {}", points.len()));
        }
        for p in &points {
            if !p.x.is_finite() || !p.y.is_finite() {
                return Err("points must be finite".to_string());
            }
            if !(0.0..=1.0).contains(&p.x) {
                return Err(format!("x={} outside [0, 1]", p.x));
            }
            if !(0.0..=1.0).contains(&p.y) {
                return Err(format!("y={} outside [0, 1]", p.y));
            }
        }
        if points.windows(2).any(|w| w[1].x < w[0].x) {
            return Err("x must be non-decreasing".to_string());
        }
        Ok(Self { points })
    }

    /// Linear interpolation at normalized time `t`. Values before the first point or after
    /// the last point clamp to the endpoint intensities.
    pub fn sample(&self, t: f64) -> f64 {
        let first = self.points[0];
        let last = self.points[self.points.len() - 1];

        if t.is_nan() || t <= first.x {
            return first.y;
        }
        if t >= last.x {
            return last.y;
        }

        // Last point at or before t; its successor is strictly after t, so the span is never zero.
        let i = self.points.partition_point(|p| p.x <= t) - 1;
        let a = self.points[i];
        let b = self.points[i + 1];
        let span = b.x - a.x;
        let frac = (t - a.x) / span;
        (a.y + (b.y - a.y) * frac).clamp(0.0, 1.0)
    }
}
