//! Polygon and line segment primitives that collision detection is built on.

use crate::math::{self as m, Unit, Vec2};

/// Distance from an edge under which a point is considered to lie on it
/// in [`Polygon::contains`].
const BOUNDARY_EPS: f64 = 1e-12;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum PolygonError {
    #[error("A polygon needs at least 3 vertices, got {0}")]
    TooFewVertices(usize),
    #[error("Polygon vertex {0} is not finite")]
    NonFinite(usize),
    #[error("Polygon has zero area")]
    ZeroArea,
}

/// A straight line between two points.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    pub start: Vec2,
    pub end: Vec2,
}

/// The point where two segments cross.
#[derive(Clone, Copy, Debug)]
pub struct SegmentHit {
    /// Position along the first segment, in [0, 1].
    pub t: f64,
    /// Position along the second segment, in [0, 1].
    pub u: f64,
    pub point: Vec2,
}

impl Segment {
    #[inline]
    pub fn new(start: Vec2, end: Vec2) -> Self {
        Segment { start, end }
    }

    /// The vector from start to end. Not normalized.
    #[inline]
    pub fn direction(&self) -> Vec2 {
        self.end - self.start
    }

    /// Find the point where this segment crosses another one.
    /// Parallel segments never intersect, even if they overlap.
    pub fn intersect(&self, other: &Segment) -> Option<SegmentHit> {
        let r = self.direction();
        let s = other.direction();
        let denom = m::cross(r, s);
        if denom == 0.0 {
            return None;
        }
        let start_dist = other.start - self.start;
        let t = m::cross(start_dist, s) / denom;
        let u = m::cross(start_dist, r) / denom;
        if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
            Some(SegmentHit {
                t,
                u,
                point: self.start + t * r,
            })
        } else {
            None
        }
    }

    /// The point on this segment closest to the given point.
    pub fn closest_point(&self, point: Vec2) -> Vec2 {
        let dir = self.direction();
        let len_sq = dir.mag_sq();
        if len_sq == 0.0 {
            return self.start;
        }
        let t = ((point - self.start).dot(dir) / len_sq).clamp(0.0, 1.0);
        self.start + t * dir
    }

    #[inline]
    pub fn distance_to(&self, point: Vec2) -> f64 {
        (point - self.closest_point(point)).mag()
    }
}

/// A simple polygon in the local space of the body that owns it.
///
/// Vertices are always stored in counter-clockwise order,
/// so the right normal of every edge points out of the polygon.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct Polygon {
    vertices: Vec<Vec2>,
}

impl Polygon {
    /// Create a polygon from its vertices in either winding order.
    pub fn new(vertices: impl Into<Vec<Vec2>>) -> Result<Self, PolygonError> {
        let mut vertices = vertices.into();
        if vertices.len() < 3 {
            return Err(PolygonError::TooFewVertices(vertices.len()));
        }
        if let Some(idx) = vertices.iter().position(|v| !v.x.is_finite() || !v.y.is_finite()) {
            return Err(PolygonError::NonFinite(idx));
        }
        let signed_area = signed_area(&vertices);
        if signed_area.abs() <= f64::EPSILON {
            return Err(PolygonError::ZeroArea);
        }
        if signed_area < 0.0 {
            vertices.reverse();
        }
        Ok(Polygon { vertices })
    }

    /// An axis-aligned rectangle centered on the origin.
    pub fn rect(width: f64, height: f64) -> Result<Self, PolygonError> {
        let hw = width / 2.0;
        let hh = height / 2.0;
        Self::new(vec![
            Vec2::new(-hw, -hh),
            Vec2::new(hw, -hh),
            Vec2::new(hw, hh),
            Vec2::new(-hw, hh),
        ])
    }

    /// A regular polygon centered on the origin,
    /// with the first vertex at `rotation` radians from the x axis.
    ///
    /// Good for approximating circles.
    pub fn regular(vertex_count: usize, radius: f64, rotation: f64) -> Result<Self, PolygonError> {
        let step = std::f64::consts::TAU / vertex_count as f64;
        Self::new(
            (0..vertex_count)
                .map(|i| {
                    let angle = rotation + i as f64 * step;
                    radius * Vec2::new(angle.cos(), angle.sin())
                })
                .collect::<Vec<_>>(),
        )
    }

    #[inline]
    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// Always false, polygons can't be constructed with less than 3 vertices.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// The edge starting from vertex `idx`.
    #[inline]
    pub fn edge(&self, idx: usize) -> Segment {
        Segment::new(
            self.vertices[idx],
            self.vertices[(idx + 1) % self.vertices.len()],
        )
    }

    pub fn edges(&self) -> impl '_ + Iterator<Item = Segment> {
        (0..self.vertices.len()).map(move |idx| self.edge(idx))
    }

    /// Outward-facing unit normal of the edge starting from vertex `idx`:
    /// the edge direction, normalized and rotated 90° clockwise.
    #[inline]
    pub fn edge_normal(&self, idx: usize) -> Unit<Vec2> {
        m::unit_right_normal(Unit::new_normalize(self.edge(idx).direction()))
    }

    /// Check whether a point is strictly inside the polygon.
    /// Points on an edge are not inside.
    pub fn contains(&self, point: Vec2) -> bool {
        if self.edges().any(|e| e.distance_to(point) <= BOUNDARY_EPS) {
            return false;
        }
        let mut inside = false;
        for edge in self.edges() {
            let (a, b) = (edge.start, edge.end);
            if (a.y > point.y) != (b.y > point.y) {
                let x_cross = a.x + (point.y - a.y) * (b.x - a.x) / (b.y - a.y);
                if point.x < x_cross {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// Find an edge that the point lies on, within a distance of `eps`.
    pub fn on_edge(&self, point: Vec2, eps: f64) -> Option<usize> {
        self.edges().position(|e| e.distance_to(point) <= eps)
    }

    /// The edge closest to a point and the distance to it.
    pub fn nearest_edge(&self, point: Vec2) -> (usize, f64) {
        self.edges()
            .map(|e| e.distance_to(point))
            .enumerate()
            .fold((0, f64::MAX), |closest, (idx, dist)| {
                if dist < closest.1 {
                    (idx, dist)
                } else {
                    closest
                }
            })
    }

    /// Distance from the local origin to the farthest vertex.
    pub fn bounding_radius(&self) -> f64 {
        self.vertices
            .iter()
            .map(|v| v.mag())
            .fold(0.0, f64::max)
    }

    pub fn area(&self) -> f64 {
        signed_area(&self.vertices)
    }

    pub fn centroid(&self) -> Vec2 {
        let mut sum = Vec2::zero();
        for edge in self.edges() {
            sum += m::cross(edge.start, edge.end) * (edge.start + edge.end);
        }
        sum / (6.0 * self.area())
    }

    /// Second moment of area about the local origin.
    /// Multiply by density to get the moment of inertia.
    pub fn second_moment_of_area(&self) -> f64 {
        self.edges()
            .map(|e| {
                let (a, b) = (e.start, e.end);
                m::cross(a, b) * (a.dot(a) + a.dot(b) + b.dot(b))
            })
            .sum::<f64>()
            / 12.0
    }

    pub fn translated(&self, offset: Vec2) -> Polygon {
        Polygon {
            vertices: self.vertices.iter().map(|v| *v + offset).collect(),
        }
    }
}

fn signed_area(vertices: &[Vec2]) -> f64 {
    let n = vertices.len();
    (0..n)
        .map(|i| m::cross(vertices[i], vertices[(i + 1) % n]))
        .sum::<f64>()
        / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> Polygon {
        Polygon::new(vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ])
        .unwrap()
    }

    #[test]
    fn winding_is_normalized() {
        let cw = Polygon::new(vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 0.0),
        ])
        .unwrap();
        assert!(cw.area() > 0.0);
        assert_eq!(cw.vertices()[0], Vec2::new(1.0, 0.0));
    }

    #[test]
    fn bad_polygons() {
        assert_eq!(
            Polygon::new(vec![Vec2::zero(), Vec2::unit_x()]),
            Err(PolygonError::TooFewVertices(2))
        );
        assert_eq!(
            Polygon::new(vec![Vec2::zero(), Vec2::unit_x(), Vec2::new(2.0, 0.0)]),
            Err(PolygonError::ZeroArea)
        );
        assert_eq!(
            Polygon::new(vec![Vec2::zero(), Vec2::new(f64::NAN, 1.0), Vec2::unit_y()]),
            Err(PolygonError::NonFinite(1))
        );
    }

    #[test]
    fn edge_normals_point_out() {
        let sq = unit_square();
        let bottom = sq.edge_normal(0);
        assert!((bottom.x).abs() < 1e-12 && (bottom.y + 1.0).abs() < 1e-12);
        for idx in 0..sq.len() {
            let n = sq.edge_normal(idx);
            assert!((n.mag() - 1.0).abs() < 1e-12);
            assert!(n.dot(sq.edge(idx).direction()).abs() < 1e-12);
            let mid = (sq.edge(idx).start + sq.edge(idx).end) / 2.0;
            assert!(!sq.contains(mid + 0.01 * *n));
            assert!(sq.contains(mid - 0.01 * *n));
        }
    }

    #[test]
    fn containment() {
        let sq = unit_square();
        assert!(sq.contains(Vec2::new(0.5, 0.5)));
        assert!(!sq.contains(Vec2::new(1.5, 0.5)));
        // on the boundary
        assert!(!sq.contains(Vec2::new(0.5, 0.0)));
        assert!(!sq.contains(Vec2::new(1.0, 1.0)));
        assert_eq!(sq.on_edge(Vec2::new(0.5, 0.0), 1e-9), Some(0));
        assert_eq!(sq.on_edge(Vec2::new(0.5, 0.5), 1e-9), None);
        let (idx, dist) = sq.nearest_edge(Vec2::new(0.9, 0.5));
        assert_eq!(idx, 1);
        assert!((dist - 0.1).abs() < 1e-12);
    }

    #[test]
    fn segment_intersections() {
        let a = Segment::new(Vec2::new(0.0, -1.0), Vec2::new(0.0, 1.0));
        let b = Segment::new(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0));
        let hit = a.intersect(&b).expect("should cross");
        assert!((hit.t - 0.5).abs() < 1e-12 && (hit.u - 0.5).abs() < 1e-12);
        assert!(hit.point.mag() < 1e-12);

        let short = Segment::new(Vec2::new(-1.0, 0.5), Vec2::new(-0.5, 0.5));
        assert!(a.intersect(&short).is_none());
        let parallel = Segment::new(Vec2::new(0.0, -1.0), Vec2::new(0.0, 3.0));
        assert!(a.intersect(&parallel).is_none());

        assert!((a.distance_to(Vec2::new(2.0, 0.0)) - 2.0).abs() < 1e-12);
        assert!((a.distance_to(Vec2::new(0.0, 3.0)) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn mass_properties() {
        let rect = Polygon::rect(2.0, 4.0).unwrap();
        assert!((rect.area() - 8.0).abs() < 1e-12);
        assert!(rect.centroid().mag() < 1e-12);
        let expected = 2.0 * 4.0 * (2.0 * 2.0 + 4.0 * 4.0) / 12.0;
        assert!((rect.second_moment_of_area() - expected).abs() < 1e-9);

        let sq = unit_square();
        assert!((sq.centroid() - Vec2::new(0.5, 0.5)).mag() < 1e-12);

        let oct = Polygon::regular(8, 1.0, 0.0).unwrap();
        assert_eq!(oct.len(), 8);
        assert!((oct.bounding_radius() - 1.0).abs() < 1e-12);
    }
}
