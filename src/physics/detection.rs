//! Finding the points where polygon vertices cross into other bodies.
//!
//! Every test has two participants: the _wedge_, whose vertices move along a path
//! from their pre-collision to their post-collision position,
//! and the _bumper_, whose edges those paths may cross.
//! The bumper's edge supplies the contact normal.

use super::{
    body::Collidable,
    buffered::Timeframe,
    polygon::{Polygon, Segment},
    MovableKey, ObjectKey,
};
use crate::math::{Unit, Vec2};

/// The part a body played in a contact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// One of the body's vertices crossed into the other body.
    Wedge,
    /// One of the body's edges was crossed by the other body's vertex.
    Bumper,
}

impl Role {
    /// Sign of the contact normal as seen by a body in this role.
    /// The normal points out of the bumper, so the wedge gets pushed along it
    /// and the bumper against it.
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Role::Wedge => 1.0,
            Role::Bumper => -1.0,
        }
    }

    #[inline]
    pub fn flipped(self) -> Self {
        match self {
            Role::Wedge => Role::Bumper,
            Role::Bumper => Role::Wedge,
        }
    }
}

/// A wedge vertex crossing a bumper edge during a time step.
#[derive(Clone, Copy, Debug)]
pub struct Crossing {
    pub wedge_element: usize,
    pub vertex: usize,
    pub bumper_element: usize,
    pub edge: usize,
    /// The crossing point in global space at the start of the step.
    pub point: Vec2,
    /// Normal of the crossed edge in global space, pointing out of the bumper.
    pub normal: Unit<Vec2>,
}

/// A wedge vertex found inside a bumper without any motion involved.
#[derive(Clone, Copy, Debug)]
pub struct Overlap {
    /// The offending vertex in global space.
    pub point: Vec2,
    /// Direction to move the wedge in to get the vertex out, in global space.
    pub normal: Unit<Vec2>,
    pub depth: f64,
}

/// One collision event as seen from one of the participating bodies.
#[derive(Clone, Copy, Debug)]
pub struct ContactData {
    pub role: Role,
    /// Index of this body's polygon element involved in the contact.
    pub element: usize,
    /// Index of the other body's polygon element involved in the contact.
    pub other_element: usize,
    /// The contact point in this body's local space before the collision.
    pub pre: Vec2,
    /// The contact point in this body's local space after the tentative motion.
    pub post: Vec2,
    /// Contact point in global space.
    pub point: Vec2,
    /// Contact normal in global space, pointing out of the bumper.
    pub normal: Unit<Vec2>,
    /// Row and column of this contact in its cluster's equation system.
    /// Both participants' records of the same contact share the index.
    pub index: usize,
}

impl ContactData {
    /// Build the record for one participant of a crossing.
    pub fn from_crossing(
        crossing: &Crossing,
        role: Role,
        body: &(impl Collidable + ?Sized),
        index: usize,
    ) -> Self {
        let (element, other_element) = match role {
            Role::Wedge => (crossing.wedge_element, crossing.bumper_element),
            Role::Bumper => (crossing.bumper_element, crossing.wedge_element),
        };
        ContactData {
            role,
            element,
            other_element,
            pre: body.map_to_local(crossing.point, Timeframe::Pre),
            post: body.map_to_local(crossing.point, Timeframe::Post),
            point: crossing.point,
            normal: crossing.normal,
            index,
        }
    }

    /// The direction an impulse on this body along the contact pushes it in.
    #[inline]
    pub fn direction(&self) -> Vec2 {
        self.role.sign() * *self.normal
    }
}

/// All the contacts recorded between one movable body and one other object.
#[derive(Clone, Debug)]
pub struct DetectionData {
    /// The body the contacts' roles and local points refer to.
    pub subject: MovableKey,
    pub other: ObjectKey,
    pub contacts: Vec<ContactData>,
}

/// Where a wedge vertex's path hits a bumper polygon, in the bumper's local space.
#[derive(Clone, Copy, Debug)]
struct EdgeHit {
    edge: usize,
    point: Vec2,
}

/// Find every wedge vertex whose path from its pre- to its post-collision position
/// crosses into the bumper.
pub fn detect<W, B>(wedge: &W, bumper: &B, eps: f64) -> Vec<Crossing>
where
    W: Collidable + ?Sized,
    B: Collidable + ?Sized,
{
    let mut crossings = Vec::new();
    for (wedge_element, poly) in wedge.elements().iter().enumerate() {
        for (vertex, v) in poly.vertices().iter().enumerate() {
            // each end of the path is mapped through the bumper's pose at the same time,
            // giving the vertex's motion relative to the bumper
            let pre = bumper.map_to_local(wedge.map_to_global(*v, Timeframe::Pre), Timeframe::Pre);
            let post =
                bumper.map_to_local(wedge.map_to_global(*v, Timeframe::Post), Timeframe::Post);

            for (bumper_element, bumper_poly) in bumper.elements().iter().enumerate() {
                if let Some(hit) = vertex_crossing(pre, post, bumper_poly, eps) {
                    let bumper_pose = bumper.pose(Timeframe::Pre);
                    crossings.push(Crossing {
                        wedge_element,
                        vertex,
                        bumper_element,
                        edge: hit.edge,
                        point: *bumper_pose * hit.point,
                        normal: bumper_pose.rotation * bumper_poly.edge_normal(hit.edge),
                    });
                    log::trace!(
                        "vertex {vertex} of element {wedge_element} crossed edge {} of element {bumper_element}",
                        hit.edge
                    );
                }
            }
        }
    }
    crossings
}

/// Run detection both ways between two objects.
///
/// Returns the crossings with the role the first object played in each.
pub fn detect_pair<A, B>(a: &A, b: &B, eps: f64) -> Vec<(Role, Crossing)>
where
    A: Collidable + ?Sized,
    B: Collidable + ?Sized,
{
    if !may_touch(a, b, eps) {
        return Vec::new();
    }
    let mut crossings: Vec<(Role, Crossing)> = detect(a, b, eps)
        .into_iter()
        .map(|c| (Role::Wedge, c))
        .collect();
    crossings.extend(detect(b, a, eps).into_iter().map(|c| (Role::Bumper, c)));
    crossings
}

/// Cheap check with bounding circles swept over the step.
fn may_touch<A, B>(a: &A, b: &B, eps: f64) -> bool
where
    A: Collidable + ?Sized,
    B: Collidable + ?Sized,
{
    let a_pre = a.pose(Timeframe::Pre).translation;
    let a_post = a.pose(Timeframe::Post).translation;
    let b_pre = b.pose(Timeframe::Pre).translation;
    let b_post = b.pose(Timeframe::Post).translation;
    let reach = a.bounding_radius()
        + b.bounding_radius()
        + (a_post - a_pre).mag()
        + (b_post - b_pre).mag()
        + eps;
    (a_pre - b_pre).mag_sq() <= reach * reach
}

fn vertex_crossing(pre: Vec2, post: Vec2, poly: &Polygon, eps: f64) -> Option<EdgeHit> {
    let motion = post - pre;

    // a vertex resting exactly on an edge isn't inside,
    // so it needs its own check to catch it pushing in
    if let Some(edge) = poly.on_edge(pre, eps) {
        return (motion.dot(*poly.edge_normal(edge)) < 0.0).then_some(EdgeHit { edge, point: pre });
    }
    if poly.contains(pre) {
        // already inside before the step, not a crossing
        return None;
    }

    let path = Segment::new(pre, post);
    let first_entry = (0..poly.len())
        .filter(|&edge| motion.dot(*poly.edge_normal(edge)) < 0.0)
        .filter_map(|edge| path.intersect(&poly.edge(edge)).map(|hit| (edge, hit)))
        .min_by(|(_, h1), (_, h2)| h1.t.total_cmp(&h2.t));
    if let Some((edge, hit)) = first_entry {
        return Some(EdgeHit {
            edge,
            point: hit.point,
        });
    }

    // only reachable when `eps` is below the boundary band of `Polygon::contains`,
    // leaving points just inside an edge that neither check claims
    if poly.contains(post) {
        let (edge, _) = poly.nearest_edge(pre);
        log::warn!(
            "Vertex path from {pre:?} to {post:?} ends inside a polygon without crossing an edge, \
             falling back to nearest edge {edge}"
        );
        return Some(EdgeHit { edge, point: pre });
    }
    None
}

/// Find wedge vertices currently inside the bumper.
///
/// Each vertex is pushed out through the edge that the line from the wedge's
/// center of mass to the vertex enters the bumper through,
/// or the nearest edge if that line starts inside the bumper already.
pub fn detect_overlaps<W, B>(wedge: &W, bumper: &B) -> Vec<Overlap>
where
    W: Collidable + ?Sized,
    B: Collidable + ?Sized,
{
    let mut overlaps = Vec::new();
    if !may_touch(wedge, bumper, 0.0) {
        return overlaps;
    }
    let center = bumper.map_to_local(wedge.pose(Timeframe::Pre).translation, Timeframe::Pre);
    let bumper_pose = bumper.pose(Timeframe::Pre);
    for poly in wedge.elements() {
        for v in poly.vertices() {
            let global = wedge.map_to_global(*v, Timeframe::Pre);
            let local = bumper.map_to_local(global, Timeframe::Pre);
            for bumper_poly in bumper.elements() {
                if !bumper_poly.contains(local) {
                    continue;
                }
                let edge = entry_edge(center, local, bumper_poly)
                    .unwrap_or_else(|| bumper_poly.nearest_edge(local).0);
                let normal = bumper_poly.edge_normal(edge);
                let depth = (bumper_poly.edge(edge).start - local).dot(*normal).abs();
                overlaps.push(Overlap {
                    point: global,
                    normal: bumper_pose.rotation * normal,
                    depth,
                });
            }
        }
    }
    overlaps
}

/// The last edge the segment from `from` to `to` enters the polygon through.
fn entry_edge(from: Vec2, to: Vec2, poly: &Polygon) -> Option<usize> {
    if poly.contains(from) {
        return None;
    }
    let path = Segment::new(from, to);
    let dir = to - from;
    (0..poly.len())
        .filter(|&edge| dir.dot(*poly.edge_normal(edge)) < 0.0)
        .filter_map(|edge| path.intersect(&poly.edge(edge)).map(|hit| (edge, hit.t)))
        .max_by(|(_, t1), (_, t2)| t1.total_cmp(t2))
        .map(|(edge, _)| edge)
}

/// Deepest overlap between two objects, checking both ways.
pub fn penetration_depth<A, B>(a: &A, b: &B) -> f64
where
    A: Collidable + ?Sized,
    B: Collidable + ?Sized,
{
    detect_overlaps(a, b)
        .iter()
        .chain(detect_overlaps(b, a).iter())
        .map(|o| o.depth)
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{FixedBody, RigidBody};

    const EPS: f64 = 1e-9;

    fn square_at(pos: Vec2, vel: Vec2) -> RigidBody {
        let mut body = RigidBody::from_density(vec![Polygon::rect(1.0, 1.0).unwrap()], 1.0)
            .unwrap()
            .with_position(pos)
            .with_velocity(vel);
        body.update(1.0);
        body
    }

    fn floor() -> FixedBody {
        FixedBody::new(vec![Polygon::rect(10.0, 1.0).unwrap()], Vec2::new(0.0, -0.5), 0.0)
            .unwrap()
    }

    #[test]
    fn path_without_crossing_falls_back_to_edge_at_start() {
        let rect = Polygon::rect(1.0, 1.0).unwrap();
        // closer to the bottom edge than `contains` can tell, but not on it with zero eps
        let pre = Vec2::new(0.0, -0.5 + 5e-13);
        let post = Vec2::new(0.3, 0.2);
        let hit = vertex_crossing(pre, post, &rect, 0.0).unwrap();
        assert_eq!(hit.point, pre);
        let normal = *rect.edge_normal(hit.edge);
        assert!((normal - Vec2::new(0.0, -1.0)).mag() < 1e-12, "wrong normal {normal:?}");
    }

    #[test]
    fn falling_box_hits_floor() {
        let body = square_at(Vec2::new(0.0, 0.6), Vec2::new(0.0, -0.2));
        let crossings = detect(&body, &floor(), EPS);
        assert_eq!(crossings.len(), 2);
        for c in &crossings {
            assert!((*c.normal - Vec2::unit_y()).mag() < 1e-12);
            assert!(c.point.y.abs() < 1e-12);
        }
        // the floor's corners are far away
        assert!(detect(&floor(), &body, EPS).is_empty());
    }

    #[test]
    fn missing_box_doesnt_hit() {
        let body = square_at(Vec2::new(0.0, 0.8), Vec2::new(0.0, -0.2));
        assert!(detect_pair(&body, &floor(), EPS).is_empty());
        // moving away from the floor
        let body = square_at(Vec2::new(0.0, 0.5), Vec2::new(0.0, 0.2));
        assert!(detect_pair(&body, &floor(), EPS).is_empty());
    }

    #[test]
    fn resting_vertex_pushing_in_is_caught() {
        let body = square_at(Vec2::new(0.0, 0.5), Vec2::new(0.0, -0.1));
        let crossings = detect(&body, &floor(), EPS);
        assert_eq!(crossings.len(), 2);
        // sliding along the surface isn't a collision
        let body = square_at(Vec2::new(0.0, 0.5), Vec2::new(0.3, 0.0));
        assert!(detect(&body, &floor(), EPS).is_empty());
    }

    #[test]
    fn detection_works_from_both_sides() {
        // a diamond's tip dips into a box from the side of the box's edge
        let diamond = RigidBody::from_density(
            vec![Polygon::regular(4, 0.5, 0.0).unwrap()],
            1.0,
        )
        .unwrap();
        let mut diamond = diamond
            .with_position(Vec2::new(1.05, 0.0))
            .with_velocity(Vec2::new(-0.1, 0.0));
        diamond.update(1.0);
        let block = square_at(Vec2::zero(), Vec2::zero());

        let from_diamond = detect_pair(&diamond, &block, EPS);
        assert_eq!(from_diamond.len(), 1);
        assert_eq!(from_diamond[0].0, Role::Wedge);
        let from_block = detect_pair(&block, &diamond, EPS);
        assert_eq!(from_block.len(), 1);
        assert_eq!(from_block[0].0, Role::Bumper);
        // normal points out of the bumper towards the wedge
        assert!((*from_block[0].1.normal - Vec2::unit_x()).mag() < 1e-12);
    }

    #[test]
    fn some_side_catches_every_overlap() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand::rngs::StdRng::seed_from_u64(17);
        let target = square_at(Vec2::zero(), Vec2::zero());
        for _ in 0..200 {
            let angle = rng.gen_range(0.0..std::f64::consts::TAU);
            let dir = Vec2::new(angle.cos(), angle.sin());
            let rotation = rng.gen_range(0.0..std::f64::consts::TAU);
            let mut mover = RigidBody::from_density(
                vec![Polygon::regular(5, 0.4, 0.0).unwrap()],
                1.0,
            )
            .unwrap()
            .with_angle(rotation)
            .with_position(3.0 * dir)
            .with_velocity(-3.0 * dir);
            mover.update(1.0);
            // the path goes straight through the target's center
            assert!(!detect_pair(&mover, &target, EPS).is_empty());
        }
    }

    #[test]
    fn overlaps_point_out_of_entry_edge() {
        let a = square_at(Vec2::zero(), Vec2::zero());
        let b = square_at(Vec2::new(0.8, 0.1), Vec2::zero());
        let overlaps = detect_overlaps(&a, &b);
        assert_eq!(overlaps.len(), 1);
        assert!((*overlaps[0].normal + Vec2::unit_x()).mag() < 1e-12);
        assert!((overlaps[0].depth - 0.2).abs() < 1e-9);
        assert!((penetration_depth(&a, &b) - 0.2).abs() < 1e-9);

        let apart = square_at(Vec2::new(1.5, 0.0), Vec2::zero());
        assert_eq!(penetration_depth(&a, &apart), 0.0);
    }
}
