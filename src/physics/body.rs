use super::{
    buffered::{Buffered, Timeframe},
    equation::CoefContact,
    forcefield::ForceField,
    material::MaterialId,
    polygon::Polygon,
};
use crate::math::{self as m, Pose, Vec2};

use nalgebra as na;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum BodyError {
    #[error("A body needs at least one polygon element")]
    NoElements,
    #[error("Mass must be positive and finite, got {0}")]
    InvalidMass(f64),
    #[error("Moment of inertia must be positive and finite, got {0}")]
    InvalidMomentOfInertia(f64),
}

/// Mass or moment of inertia of a body, which can be infinite.
///
/// This stores both a mass value and its inverse, because calculating inverse mass
/// is expensive and needed a lot in physics calculations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Mass {
    Finite { mass: f64, inverse: f64 },
    Infinite,
}

impl From<f64> for Mass {
    #[inline]
    fn from(mass: f64) -> Self {
        Mass::Finite {
            mass,
            inverse: 1.0 / mass,
        }
    }
}

impl Mass {
    /// Get the inverse of the mass, which is zero if the mass is infinite.
    #[inline]
    pub fn inv(&self) -> f64 {
        match self {
            Mass::Finite { inverse, .. } => *inverse,
            Mass::Infinite => 0.0,
        }
    }
}

/// The numeric state of a body that changes every step.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BodyState {
    /// Position of the center of mass in global space.
    pub position: Vec2,
    /// Rotation in radians, kept within (-2π, 2π].
    pub angle: f64,
    pub momentum: Vec2,
    /// Angular momentum about the body's rotation reference point.
    pub angular_momentum: f64,
}

/// Cached transformation matrices for one buffered state.
#[derive(Clone, Copy, Debug)]
struct Transform {
    pose: Pose,
    inverse: Pose,
}

impl Transform {
    fn of(state: &BodyState) -> Self {
        let pose = m::pose(state.position, state.angle);
        Transform {
            pose,
            inverse: pose.inversed(),
        }
    }
}

/// How a movable body is allowed to move.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Motion {
    /// Translates freely and rotates about its center of mass.
    Free,
    /// Rotates about a point fixed in global space and doesn't translate otherwise.
    ///
    /// Rotation uses the moment of inertia about the pivot
    /// (Steiner's theorem, `I + m·d²`).
    Pivoted {
        /// The pivot in the body's local space.
        pivot: Vec2,
        /// The pivot in global space.
        anchor: Vec2,
    },
}

/// Coordinate frame a mounted force is expressed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForceFrame {
    /// The force doesn't turn with the body.
    Global,
    /// The force turns with the body, like a thruster.
    Local,
}

/// A constant force attached to a point on a body.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MountedForce {
    /// Attachment point in the body's local space.
    pub point: Vec2,
    pub force: Vec2,
    pub frame: ForceFrame,
}

/// Outcome of asking a body to move out of an overlap.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Dislocation {
    Moved,
    /// The move had no effect, e.g. because it was too small to change the position
    /// at floating point resolution. Carries the current position as a hint.
    Stuck { position: Vec2 },
}

/// Something made of polygons that other things can collide with.
pub trait Collidable {
    /// The convex or concave polygon elements the object is made of, in local space.
    fn elements(&self) -> &[Polygon];
    fn pose(&self, tf: Timeframe) -> &Pose;
    fn inverse_pose(&self, tf: Timeframe) -> &Pose;
    fn material(&self) -> MaterialId;
    /// Radius of a circle around the local origin containing every element.
    fn bounding_radius(&self) -> f64;

    #[inline]
    fn map_to_local(&self, point: Vec2, tf: Timeframe) -> Vec2 {
        *self.inverse_pose(tf) * point
    }

    #[inline]
    fn map_to_global(&self, point: Vec2, tf: Timeframe) -> Vec2 {
        *self.pose(tf) * point
    }
}

/// A collidable object that responds to collisions.
pub trait Movable: Collidable {
    /// Add this body's contribution to the coefficient matrix of a cluster's equation system.
    ///
    /// Element `(i, j)` gets the change in this body's velocity at contact `i`
    /// along its direction, caused by a unit impulse at contact `j`.
    fn a_coefs(&self, contacts: &[CoefContact], a: &mut na::DMatrix<f64>);
    /// Add this body's velocity at each contact, projected on the contact direction,
    /// computed from the background momentum.
    fn b_coefs(&self, contacts: &[CoefContact], b: &mut na::DVector<f64>);
    /// Apply an impulse at a point in global space.
    fn apply_impulse(&mut self, impulse: Vec2, point: Vec2);
    /// Move the body by `vector` to get it out of an overlap at `point`.
    fn dislocate(&mut self, vector: Vec2, point: Vec2) -> Dislocation;
    /// Called when the body has been part of too many collision passes in a single step.
    fn pass_limit(&mut self) {}
}

/// A body that never moves but can be collided with.
#[derive(Clone, Debug)]
pub struct FixedBody {
    elements: Vec<Polygon>,
    transform: Transform,
    material: MaterialId,
    bounding_radius: f64,
}

impl FixedBody {
    pub fn new(elements: Vec<Polygon>, position: Vec2, angle: f64) -> Result<Self, BodyError> {
        if elements.is_empty() {
            return Err(BodyError::NoElements);
        }
        let state = BodyState {
            position,
            angle,
            ..Default::default()
        };
        Ok(FixedBody {
            bounding_radius: bounding_radius(&elements),
            elements,
            transform: Transform::of(&state),
            material: MaterialId::default(),
        })
    }

    pub fn with_material(mut self, material: MaterialId) -> Self {
        self.material = material;
        self
    }

    #[inline]
    pub fn position(&self) -> Vec2 {
        self.transform.pose.translation
    }
}

impl Collidable for FixedBody {
    fn elements(&self) -> &[Polygon] {
        &self.elements
    }

    fn pose(&self, _tf: Timeframe) -> &Pose {
        &self.transform.pose
    }

    fn inverse_pose(&self, _tf: Timeframe) -> &Pose {
        &self.transform.inverse
    }

    fn material(&self) -> MaterialId {
        self.material
    }

    fn bounding_radius(&self) -> f64 {
        self.bounding_radius
    }
}

/// A rigid body that moves and responds to collisions.
///
/// The body's numeric state is double-buffered: [`update`][Self::update]
/// writes a tentative state into the background buffer
/// which only becomes observable as the active state after [`swap_buffers`][Self::swap_buffers].
/// Polygon elements are in local space where the origin is the center of mass.
#[derive(Clone, Debug)]
pub struct RigidBody {
    elements: Vec<Polygon>,
    bounding_radius: f64,
    material: MaterialId,
    mass: Mass,
    moment_of_inertia: Mass,
    motion: Motion,
    pub(crate) state: Buffered<BodyState>,
    transform: Buffered<Transform>,
    forces: Vec<MountedForce>,
    // impulses applied since the last commit, kept so that re-integration doesn't lose them
    pending_impulse: Vec2,
    pending_angular_impulse: f64,
    pass_limit_hits: u32,
}

impl RigidBody {
    /// Create a body with the given mass and moment of inertia about the center of mass.
    ///
    /// The elements must be placed so that the local origin is the center of mass.
    pub fn new(elements: Vec<Polygon>, mass: f64, moment_of_inertia: f64) -> Result<Self, BodyError> {
        if elements.is_empty() {
            return Err(BodyError::NoElements);
        }
        if !(mass.is_finite() && mass > 0.0) {
            return Err(BodyError::InvalidMass(mass));
        }
        if !(moment_of_inertia.is_finite() && moment_of_inertia > 0.0) {
            return Err(BodyError::InvalidMomentOfInertia(moment_of_inertia));
        }
        let state = BodyState::default();
        Ok(RigidBody {
            bounding_radius: bounding_radius(&elements),
            elements,
            material: MaterialId::default(),
            mass: Mass::from(mass),
            moment_of_inertia: Mass::from(moment_of_inertia),
            motion: Motion::Free,
            state: Buffered::new(state),
            transform: Buffered::new(Transform::of(&state)),
            forces: Vec::new(),
            pending_impulse: Vec2::zero(),
            pending_angular_impulse: 0.0,
            pass_limit_hits: 0,
        })
    }

    /// Create a body with mass and moment of inertia computed from a uniform density.
    ///
    /// The elements are shifted so that the local origin is the center of mass.
    pub fn from_density(elements: Vec<Polygon>, density: f64) -> Result<Self, BodyError> {
        if elements.is_empty() {
            return Err(BodyError::NoElements);
        }
        let area: f64 = elements.iter().map(|e| e.area()).sum();
        let centroid = elements
            .iter()
            .map(|e| e.area() * e.centroid())
            .fold(Vec2::zero(), |acc, c| acc + c)
            / area;
        let elements: Vec<Polygon> = elements.iter().map(|e| e.translated(-centroid)).collect();
        let second_moment: f64 = elements.iter().map(|e| e.second_moment_of_area()).sum();
        Self::new(elements, area * density, second_moment * density)
    }

    pub fn with_position(mut self, position: Vec2) -> Self {
        self.edit_state(|s| s.position = position);
        self
    }

    pub fn with_angle(mut self, angle: f64) -> Self {
        self.edit_state(|s| s.angle = m::wrap_angle(angle));
        self
    }

    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        let mass = self.mass();
        self.edit_state(|s| s.momentum = mass * velocity);
        self
    }

    pub fn with_angular_velocity(mut self, angular_velocity: f64) -> Self {
        let angular_momentum = match self.rotational_inertia().inv() {
            inv if inv > 0.0 => angular_velocity / inv,
            _ => 0.0,
        };
        self.edit_state(|s| s.angular_momentum = angular_momentum);
        self
    }

    pub fn with_material(mut self, material: MaterialId) -> Self {
        self.material = material;
        self
    }

    /// Prevent the body from rotating, making its moment of inertia infinite.
    pub fn with_fixed_rotation(mut self) -> Self {
        self.moment_of_inertia = Mass::Infinite;
        self.edit_state(|s| s.angular_momentum = 0.0);
        self
    }

    /// Pin the body to the global position of a point given in local space.
    /// From then on it can only rotate about that point.
    ///
    /// Current angular velocity is kept, linear velocity is replaced with
    /// the velocity resulting from the rotation.
    pub fn pivoted(mut self, pivot: Vec2) -> Self {
        let angular_velocity = self.velocity(Timeframe::Pre).1;
        let anchor = self.transform.active().pose * pivot;
        self.motion = Motion::Pivoted { pivot, anchor };
        self = self.with_angular_velocity(angular_velocity);
        let momentum = self.pivoted_momentum(self.state.active());
        self.edit_state(|s| s.momentum = momentum);
        self
    }

    // accessors

    #[inline]
    pub fn mass(&self) -> f64 {
        // always finite, checked on construction
        match self.mass {
            Mass::Finite { mass, .. } => mass,
            Mass::Infinite => f64::INFINITY,
        }
    }

    #[inline]
    pub fn moment_of_inertia(&self) -> Mass {
        self.moment_of_inertia
    }

    #[inline]
    pub fn motion(&self) -> Motion {
        self.motion
    }

    #[inline]
    pub fn state(&self, tf: Timeframe) -> &BodyState {
        self.state.get(tf)
    }

    #[inline]
    pub fn position(&self) -> Vec2 {
        self.state.active().position
    }

    #[inline]
    pub fn angle(&self) -> f64 {
        self.state.active().angle
    }

    /// How many times this body has hit the collision pass limit.
    #[inline]
    pub fn pass_limit_hits(&self) -> u32 {
        self.pass_limit_hits
    }

    /// Moment of inertia used for rotation: the body's own one when moving freely,
    /// or the one about the pivot when pivoted.
    pub fn rotational_inertia(&self) -> Mass {
        match (self.motion, self.moment_of_inertia) {
            (Motion::Free, moi) => moi,
            (Motion::Pivoted { .. }, Mass::Infinite) => Mass::Infinite,
            (Motion::Pivoted { pivot, .. }, Mass::Finite { mass: moi, .. }) => {
                Mass::from(moi + self.mass() * pivot.mag_sq())
            }
        }
    }

    /// The point rotation is measured about, in global space.
    pub fn rotation_reference(&self, tf: Timeframe) -> Vec2 {
        match self.motion {
            Motion::Free => self.state.get(tf).position,
            Motion::Pivoted { anchor, .. } => anchor,
        }
    }

    /// Linear and angular velocity.
    pub fn velocity(&self, tf: Timeframe) -> (Vec2, f64) {
        let state = self.state.get(tf);
        let angular = state.angular_momentum * self.rotational_inertia().inv();
        let linear = match self.motion {
            Motion::Free => state.momentum * self.mass.inv(),
            Motion::Pivoted { anchor, .. } => angular * m::left_normal(state.position - anchor),
        };
        (linear, angular)
    }

    /// Velocity of a point given in global space, as if it were attached to the body.
    pub fn point_velocity(&self, point: Vec2, tf: Timeframe) -> Vec2 {
        let (linear, angular) = self.velocity(tf);
        match self.motion {
            Motion::Free => {
                linear + angular * m::left_normal(point - self.state.get(tf).position)
            }
            Motion::Pivoted { anchor, .. } => angular * m::left_normal(point - anchor),
        }
    }

    /// Post-collision velocity of a global point,
    /// with the lever arm measured from the pre-collision reference
    /// that impulses are applied about.
    ///
    /// This is the velocity that [`Movable::apply_impulse`] changes
    /// by exactly `inverse_effective_mass` per unit impulse.
    pub fn contact_velocity(&self, point: Vec2) -> Vec2 {
        let (linear, angular) = self.velocity(Timeframe::Post);
        match self.motion {
            Motion::Free => {
                linear + angular * m::left_normal(point - self.rotation_reference(Timeframe::Pre))
            }
            Motion::Pivoted { anchor, .. } => angular * m::left_normal(point - anchor),
        }
    }

    pub fn kinetic_energy(&self, tf: Timeframe) -> f64 {
        let state = self.state.get(tf);
        let rotational = 0.5 * state.angular_momentum.powi(2) * self.rotational_inertia().inv();
        match self.motion {
            Motion::Free => 0.5 * state.momentum.mag_sq() * self.mass.inv() + rotational,
            Motion::Pivoted { .. } => rotational,
        }
    }

    /// Inverse of the effective mass seen by an impulse along `dir` at a global point.
    pub fn inverse_effective_mass(&self, point: Vec2, dir: Vec2) -> f64 {
        let r = point - self.rotation_reference(Timeframe::Pre);
        let r_cross_dir = m::cross(r, dir);
        let rotational = r_cross_dir * r_cross_dir * self.rotational_inertia().inv();
        match self.motion {
            Motion::Free => dir.mag_sq() * self.mass.inv() + rotational,
            Motion::Pivoted { .. } => rotational,
        }
    }

    // forces

    /// Attach a force to the body. Returns an index that can be used to remove it.
    pub fn mount_force(&mut self, force: MountedForce) -> usize {
        self.forces.push(force);
        self.forces.len() - 1
    }

    pub fn unmount_force(&mut self, idx: usize) -> Option<MountedForce> {
        (idx < self.forces.len()).then(|| self.forces.remove(idx))
    }

    pub fn forces(&self) -> &[MountedForce] {
        &self.forces
    }

    // stepping

    /// Integrate mounted forces and impulses applied since the last commit
    /// into a new background state. The active state is not touched.
    pub fn update(&mut self, dt: f64) {
        self.integrate(dt, Vec2::zero());
    }

    /// Like [`update`][Self::update], with an additional acceleration from a force field.
    pub fn update_in_field<F: ForceField + ?Sized>(&mut self, dt: f64, field: &F) {
        let accel = field.value_at(self.state.active().position);
        self.integrate(dt, accel);
    }

    fn integrate(&mut self, dt: f64, accel: Vec2) {
        let active = *self.state.active();
        let pre_pose = self.transform.active().pose;
        let reference = self.rotation_reference(Timeframe::Pre);

        let mut force_sum = self.mass() * accel;
        // gravity-like acceleration acts on the center of mass
        let mut torque_sum = m::cross(active.position - reference, force_sum);
        for f in &self.forces {
            let point = pre_pose * f.point;
            let force = match f.frame {
                ForceFrame::Global => f.force,
                ForceFrame::Local => pre_pose.rotation * f.force,
            };
            force_sum += force;
            torque_sum += m::cross(point - reference, force);
        }

        let angular_momentum =
            active.angular_momentum + torque_sum * dt + self.pending_angular_impulse;
        let angular_velocity = angular_momentum * self.rotational_inertia().inv();
        let angle = m::wrap_angle(active.angle + angular_velocity * dt);

        let next = match self.motion {
            Motion::Free => {
                let momentum = active.momentum + force_sum * dt + self.pending_impulse;
                BodyState {
                    position: active.position + momentum * self.mass.inv() * dt,
                    angle,
                    momentum,
                    angular_momentum,
                }
            }
            Motion::Pivoted { pivot, anchor } => {
                let mut next = BodyState {
                    position: anchor - m::Rotor2::from_angle(angle) * pivot,
                    angle,
                    momentum: Vec2::zero(),
                    angular_momentum,
                };
                next.momentum = self.pivoted_momentum(&next);
                next
            }
        };
        *self.state.background_mut() = next;
        self.rebuild_background_transform();
    }

    /// Promote the background state to active.
    pub fn swap_buffers(&mut self) {
        self.state.commit();
        self.transform.commit();
        self.pending_impulse = Vec2::zero();
        self.pending_angular_impulse = 0.0;
    }

    /// Throw away the tentative state, including impulses applied since the last commit.
    pub fn revert(&mut self) {
        self.reset_background();
        self.pending_impulse = Vec2::zero();
        self.pending_angular_impulse = 0.0;
    }

    /// Teleport the body, discarding any tentative state.
    pub fn set_position(&mut self, position: Vec2) {
        if let Motion::Pivoted { pivot, .. } = self.motion {
            let pose = m::pose(position, self.angle());
            self.motion = Motion::Pivoted {
                pivot,
                anchor: pose * pivot,
            };
        }
        self.edit_state(|s| s.position = position);
    }

    /// Impulses applied since the last commit, linear and angular.
    pub(crate) fn pending_impulse(&self) -> (Vec2, f64) {
        (self.pending_impulse, self.pending_angular_impulse)
    }

    pub(crate) fn restore_state(
        &mut self,
        active: BodyState,
        background: BodyState,
        pending: (Vec2, f64),
    ) {
        self.state.set_both(active);
        *self.state.background_mut() = background;
        self.transform.set_both(Transform::of(&active));
        self.rebuild_background_transform();
        (self.pending_impulse, self.pending_angular_impulse) = pending;
    }

    fn pivoted_momentum(&self, state: &BodyState) -> Vec2 {
        match self.motion {
            Motion::Free => state.momentum,
            Motion::Pivoted { anchor, .. } => {
                let angular_velocity = state.angular_momentum * self.rotational_inertia().inv();
                self.mass() * angular_velocity * m::left_normal(state.position - anchor)
            }
        }
    }

    fn reset_background(&mut self) {
        self.state.revert();
        self.transform.revert();
    }

    /// Change the committed state directly, discarding any tentative state.
    fn edit_state(&mut self, f: impl FnOnce(&mut BodyState)) {
        let mut state = *self.state.active();
        f(&mut state);
        self.state.set_both(state);
        self.transform.set_both(Transform::of(&state));
    }

    fn rebuild_background_transform(&mut self) {
        *self.transform.background_mut() = Transform::of(self.state.background());
    }
}

impl Collidable for RigidBody {
    fn elements(&self) -> &[Polygon] {
        &self.elements
    }

    fn pose(&self, tf: Timeframe) -> &Pose {
        &self.transform.get(tf).pose
    }

    fn inverse_pose(&self, tf: Timeframe) -> &Pose {
        &self.transform.get(tf).inverse
    }

    fn material(&self) -> MaterialId {
        self.material
    }

    fn bounding_radius(&self) -> f64 {
        self.bounding_radius
    }
}

impl Movable for RigidBody {
    fn a_coefs(&self, contacts: &[CoefContact], a: &mut na::DMatrix<f64>) {
        let reference = self.rotation_reference(Timeframe::Pre);
        let inv_mass = match self.motion {
            Motion::Free => self.mass.inv(),
            Motion::Pivoted { .. } => 0.0,
        };
        let inv_inertia = self.rotational_inertia().inv();
        for ci in contacts {
            let ri_cross = m::cross(ci.point - reference, ci.direction);
            for cj in contacts {
                let rj_cross = m::cross(cj.point - reference, cj.direction);
                a[(ci.index, cj.index)] += ci.direction.dot(cj.direction) * inv_mass
                    + ri_cross * rj_cross * inv_inertia;
            }
        }
    }

    fn b_coefs(&self, contacts: &[CoefContact], b: &mut na::DVector<f64>) {
        for c in contacts {
            b[c.index] += self.contact_velocity(c.point).dot(c.direction);
        }
    }

    fn apply_impulse(&mut self, impulse: Vec2, point: Vec2) {
        let r = point - self.rotation_reference(Timeframe::Pre);
        let angular = m::cross(r, impulse);
        self.pending_angular_impulse += angular;
        self.state.background_mut().angular_momentum += angular;
        match self.motion {
            Motion::Free => {
                self.pending_impulse += impulse;
                self.state.background_mut().momentum += impulse;
            }
            Motion::Pivoted { .. } => {
                // the pivot absorbs the linear part
                let background = *self.state.background();
                self.state.background_mut().momentum = self.pivoted_momentum(&background);
            }
        }
    }

    fn dislocate(&mut self, vector: Vec2, point: Vec2) -> Dislocation {
        let mut state = *self.state.active();
        match self.motion {
            Motion::Free => {
                let position = state.position + vector;
                if position == state.position {
                    return Dislocation::Stuck {
                        position: state.position,
                    };
                }
                state.position = position;
            }
            Motion::Pivoted { pivot, anchor } => {
                let r = point - anchor;
                let r_sq = r.mag_sq();
                let angle = if r_sq > 0.0 {
                    m::wrap_angle(state.angle + m::cross(r, vector) / r_sq)
                } else {
                    state.angle
                };
                if angle == state.angle {
                    return Dislocation::Stuck {
                        position: state.position,
                    };
                }
                state.angle = angle;
                state.position = anchor - m::Rotor2::from_angle(angle) * pivot;
            }
        }
        self.edit_state(|s| *s = state);
        Dislocation::Moved
    }

    fn pass_limit(&mut self) {
        self.pass_limit_hits += 1;
    }
}

fn bounding_radius(elements: &[Polygon]) -> f64 {
    elements
        .iter()
        .map(|e| e.bounding_radius())
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::forcefield::Gravity;

    fn unit_box() -> RigidBody {
        RigidBody::from_density(vec![Polygon::rect(1.0, 1.0).unwrap()], 1.0).unwrap()
    }

    #[test]
    fn rejects_bad_mass() {
        let poly = Polygon::rect(1.0, 1.0).unwrap();
        assert_eq!(
            RigidBody::new(vec![poly.clone()], 0.0, 1.0).err(),
            Some(BodyError::InvalidMass(0.0))
        );
        assert_eq!(
            RigidBody::new(vec![poly], 1.0, -1.0).err(),
            Some(BodyError::InvalidMomentOfInertia(-1.0))
        );
        assert_eq!(RigidBody::new(vec![], 1.0, 1.0).err(), Some(BodyError::NoElements));
    }

    #[test]
    fn density_centers_elements() {
        let off_center = Polygon::rect(2.0, 2.0).unwrap().translated(Vec2::new(3.0, 0.0));
        let body = RigidBody::from_density(vec![off_center], 2.0).unwrap();
        assert!((body.mass() - 8.0).abs() < 1e-12);
        let centroid = body.elements()[0].centroid();
        assert!(centroid.mag() < 1e-12);
        let expected_moi = 8.0 * (4.0 + 4.0) / 12.0;
        match body.moment_of_inertia() {
            Mass::Finite { mass, .. } => assert!((mass - expected_moi).abs() < 1e-9),
            Mass::Infinite => panic!("should be finite"),
        }
    }

    #[test]
    fn update_only_writes_background() {
        let mut body = unit_box().with_velocity(Vec2::new(1.0, 0.0));
        body.update_in_field(0.5, &Gravity(Vec2::new(0.0, -10.0)));
        assert_eq!(body.position(), Vec2::zero());
        let post = *body.state(Timeframe::Post);
        assert!((post.momentum - Vec2::new(1.0, -5.0)).mag() < 1e-12);
        assert!((post.position - Vec2::new(0.5, -2.5)).mag() < 1e-12);
        // pose caches follow the buffers
        assert!((body.pose(Timeframe::Post).translation - post.position).mag() < 1e-12);
        assert_eq!(body.pose(Timeframe::Pre).translation, Vec2::zero());

        body.swap_buffers();
        assert_eq!(body.position(), post.position);
    }

    #[test]
    fn impulse_survives_reintegration() {
        let mut body = unit_box();
        body.update(0.1);
        body.apply_impulse(Vec2::new(0.0, 2.0), Vec2::new(0.5, 0.0));
        let after_impulse = *body.state(Timeframe::Post);
        assert!((after_impulse.momentum.y - 2.0).abs() < 1e-12);
        assert!((after_impulse.angular_momentum - 1.0).abs() < 1e-12);

        body.update(0.1);
        let reintegrated = *body.state(Timeframe::Post);
        assert!((reintegrated.momentum.y - 2.0).abs() < 1e-12);
        assert!((reintegrated.angular_momentum - 1.0).abs() < 1e-12);
        assert!(reintegrated.angle > 0.0);

        body.swap_buffers();
        body.update(0.1);
        // pending impulses are consumed by the commit
        assert!((body.state(Timeframe::Post).momentum.y - 2.0).abs() < 1e-12);
    }

    #[test]
    fn mounted_force_torque() {
        let mut body = unit_box();
        body.mount_force(MountedForce {
            point: Vec2::new(0.5, 0.0),
            force: Vec2::new(0.0, 1.0),
            frame: ForceFrame::Local,
        });
        body.update(1.0);
        let post = body.state(Timeframe::Post);
        assert!((post.momentum.y - 1.0).abs() < 1e-12);
        assert!((post.angular_momentum - 0.5).abs() < 1e-12);
        assert!(body.unmount_force(0).is_some());
        assert!(body.unmount_force(0).is_none());
    }

    #[test]
    fn contact_velocity_measures_from_start_of_step() {
        let mut body = unit_box()
            .with_velocity(Vec2::new(2.0, 0.0))
            .with_angular_velocity(1.0);
        body.update(0.5);
        let point = Vec2::new(0.0, 1.0);
        // lever arm from the start position
        assert!((body.contact_velocity(point) - Vec2::new(1.0, 0.0)).mag() < 1e-12);
        // about the moved center the lever arm includes the distance travelled
        let moved = body.point_velocity(point, Timeframe::Post);
        assert!((moved - Vec2::new(1.0, -1.0)).mag() < 1e-12);
        assert!((body.point_velocity(Vec2::zero(), Timeframe::Pre) - Vec2::new(2.0, 0.0)).mag() < 1e-12);
    }

    #[test]
    fn angle_wraps() {
        let mut body = unit_box().with_angular_velocity(10.0);
        for _ in 0..10 {
            body.update(1.0);
            body.swap_buffers();
            let angle = body.angle();
            assert!(angle > -std::f64::consts::TAU && angle <= std::f64::consts::TAU);
        }
    }

    #[test]
    fn pivoted_inertia_uses_steiner() {
        let body = unit_box().pivoted(Vec2::new(0.5, 0.0));
        let moi = 1.0 * 2.0 / 12.0;
        match body.rotational_inertia() {
            Mass::Finite { mass, .. } => assert!((mass - (moi + 0.25)).abs() < 1e-12),
            Mass::Infinite => panic!("should be finite"),
        }

        let mut body = body;
        body.apply_impulse(Vec2::new(0.0, -1.0), Vec2::new(-0.5, 0.0));
        body.update(0.01);
        // rotates about the pivot, so the pivot stays put
        let pivot_after = *body.pose(Timeframe::Post) * Vec2::new(0.5, 0.0);
        assert!((pivot_after - Vec2::new(0.5, 0.0)).mag() < 1e-12);
        assert!(body.state(Timeframe::Post).angle > 0.0);
    }

    #[test]
    fn map_between_spaces() {
        let body = unit_box()
            .with_position(Vec2::new(2.0, 1.0))
            .with_angle(std::f64::consts::FRAC_PI_2);
        let global = body.map_to_global(Vec2::new(1.0, 0.0), Timeframe::Pre);
        assert!((global - Vec2::new(2.0, 2.0)).mag() < 1e-12);
        let local = body.map_to_local(global, Timeframe::Pre);
        assert!((local - Vec2::new(1.0, 0.0)).mag() < 1e-12);
    }

    #[test]
    fn dislocation_reports_stuck_moves() {
        let mut body = unit_box().with_position(Vec2::new(1.0e6, 0.0));
        assert_eq!(
            body.dislocate(Vec2::new(1e-20, 0.0), Vec2::zero()),
            Dislocation::Stuck {
                position: Vec2::new(1.0e6, 0.0)
            }
        );
        assert_eq!(body.dislocate(Vec2::new(1.0, 0.0), Vec2::zero()), Dislocation::Moved);
        assert_eq!(body.position(), Vec2::new(1.0e6 + 1.0, 0.0));
        assert_eq!(*body.state(Timeframe::Post), *body.state(Timeframe::Pre));
    }
}
