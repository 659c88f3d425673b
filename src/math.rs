//! Types, aliases and helper operations for doing math with `ultraviolet`.
use std::f64::consts::{PI, TAU};
pub use ultraviolet as uv;

/// A Pose has a rotation and a translation, no scaling.
///
/// Every body caches its pose and the inverse of it,
/// which serve as the body's transformation matrices between local and global space.
pub type Pose = uv::DIsometry2;
pub type Vec2 = uv::DVec2;
pub type Rotor2 = uv::DRotor2;

/// An angle in either degrees or radians.
/// Default conversion from f64 is in degrees.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub enum Angle {
    Rad(f64),
    Deg(f64),
}
impl Angle {
    /// Get the angle as degrees.
    #[inline]
    pub fn deg(&self) -> f64 {
        match self {
            Angle::Rad(rad) => rad * 180.0 / PI,
            Angle::Deg(deg) => *deg,
        }
    }

    /// Get the angle as radians.
    #[inline]
    pub fn rad(&self) -> f64 {
        match self {
            Angle::Rad(rad) => *rad,
            Angle::Deg(deg) => deg * PI / 180.0,
        }
    }
}
impl Default for Angle {
    fn default() -> Self {
        Angle::Rad(0.0)
    }
}
impl From<Angle> for Rotor2 {
    #[inline]
    fn from(ang: Angle) -> Rotor2 {
        Rotor2::from_angle(ang.rad())
    }
}
impl From<Rotor2> for Angle {
    #[inline]
    fn from(rotor: Rotor2) -> Self {
        Angle::Rad(-rotor.bv.xy.atan2(rotor.s) * 2.0)
    }
}

/// A wrapper type to indicate a vector should always be normalized.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Unit<T>(T);

impl Unit<Vec2> {
    pub fn new_normalize(v: Vec2) -> Self {
        Unit(v.normalized())
    }

    pub const fn new_unchecked(v: Vec2) -> Self {
        Unit(v)
    }
}

impl std::ops::Mul<Unit<Vec2>> for Rotor2 {
    type Output = Unit<Vec2>;

    fn mul(self, rhs: Unit<Vec2>) -> Self::Output {
        Unit(self * rhs.0)
    }
}

impl<T> std::ops::Deref for Unit<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Create a pose from a position and an angle in radians.
#[inline]
pub fn pose(position: Vec2, angle: f64) -> Pose {
    Pose::new(position, Rotor2::from_angle(angle))
}

// Vec2 utils

#[inline]
pub fn left_normal(v: Vec2) -> Vec2 {
    Vec2::new(-v.y, v.x)
}
#[inline]
pub fn right_normal(v: Vec2) -> Vec2 {
    Vec2::new(v.y, -v.x)
}
#[inline]
pub fn unit_right_normal(u: Unit<Vec2>) -> Unit<Vec2> {
    Unit::new_unchecked(right_normal(*u))
}

/// The z component of the 3D cross product, also known as the 2D wedge product.
#[inline]
pub fn cross(a: Vec2, b: Vec2) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Remove whole turns from an angle, keeping it in the range (-2π, 2π].
///
/// The sign is preserved so that a body spinning one way
/// doesn't suddenly jump to a negative angle.
#[inline]
pub fn wrap_angle(angle: f64) -> f64 {
    angle % TAU
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_angles() {
        assert_eq!(wrap_angle(1.0), 1.0);
        assert!((wrap_angle(TAU + 0.5) - 0.5).abs() < 1e-12);
        assert!((wrap_angle(-TAU - 0.5) + 0.5).abs() < 1e-12);
        assert_eq!(wrap_angle(TAU), 0.0);
        let a = wrap_angle(-7.0 * PI);
        assert!(a > -TAU && a <= TAU);
    }

    #[test]
    fn normals_and_cross() {
        let v = Vec2::new(1.0, 0.0);
        assert_eq!(right_normal(v), Vec2::new(0.0, -1.0));
        assert_eq!(left_normal(v), Vec2::new(0.0, 1.0));
        assert_eq!(cross(v, Vec2::new(0.0, 1.0)), 1.0);
    }

    #[test]
    fn rotor_is_counterclockwise() {
        let rotated = Rotor2::from_angle(PI / 2.0) * Vec2::unit_x();
        assert!((rotated - Vec2::unit_y()).mag() < 1e-12);
        assert!((Angle::from(Rotor2::from_angle(0.3)).rad() - 0.3).abs() < 1e-12);
    }
}
