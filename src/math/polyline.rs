use super::{Point2d, Vector2d};
use cgmath::prelude::*;

/// A piecewise linear curve, used for the centre line of a lane.
#[derive(Clone, Debug)]
pub struct Polyline {
    /// The vertices of the curve.
    points: Vec<Point2d>,
    /// The arc length at each vertex.
    dists: Vec<f64>,
}

impl Polyline {
    /// Creates a polyline through the given points.
    /// Returns `None` if it has fewer than two points or zero length.
    pub fn new(points: Vec<Point2d>) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }
        let mut dists = Vec::with_capacity(points.len());
        let mut dist = 0.0;
        dists.push(dist);
        for pair in points.windows(2) {
            dist += pair[0].distance(pair[1]);
            dists.push(dist);
        }
        (dist > 0.0).then_some(Self { points, dists })
    }

    /// Creates a straight line of the given length along the x-axis.
    pub fn straight(origin: Point2d, length: f64) -> Self {
        Self {
            points: vec![origin, origin + Vector2d::new(length.max(f64::EPSILON), 0.0)],
            dists: vec![0.0, length.max(f64::EPSILON)],
        }
    }

    /// The arc length of the curve.
    pub fn length(&self) -> f64 {
        self.dists[self.dists.len() - 1]
    }

    /// The vertices of the curve.
    pub fn points(&self) -> &[Point2d] {
        &self.points
    }

    /// Samples the curve at the given arc length, which is clamped onto the curve.
    /// Returns the point and the unit tangent.
    pub fn sample(&self, dist: f64) -> (Point2d, Vector2d) {
        let dist = dist.clamp(0.0, self.length());
        let idx = self
            .dists
            .partition_point(|d| *d <= dist)
            .clamp(1, self.points.len() - 1);
        let (p0, p1) = (self.points[idx - 1], self.points[idx]);
        let (d0, d1) = (self.dists[idx - 1], self.dists[idx]);
        let seg = p1 - p0;
        let t = if d1 > d0 { (dist - d0) / (d1 - d0) } else { 0.0 };
        let tangent = if seg.magnitude2() > 0.0 { seg.normalize() } else { Vector2d::unit_x() };
        (p0 + seg * t, tangent)
    }
}
