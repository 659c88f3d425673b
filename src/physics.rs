//! Continuous collision detection and simultaneous impulse resolution
//! for polygonal rigid bodies.

use thunderdome as td;

//

pub mod body;
pub use body::{
    BodyError, BodyState, Collidable, Dislocation, FixedBody, ForceFrame, Mass, MountedForce,
    Motion, Movable, RigidBody,
};

pub mod buffered;
pub use buffered::{Buffered, Timeframe};

pub mod cluster;
pub use cluster::{Cluster, ClusterBuilder};

pub mod collider;
pub use collider::{AppliedImpulse, ColliderParams, ImpulseKind, NewtonCollider, StepReport};

pub mod debug;
pub use debug::{DebugHook, NoDebug};

pub mod detection;
pub use detection::{ContactData, DetectionData, Role};

pub mod dislocation;
pub use dislocation::{DislocationReport, Dislocator};

pub mod equation;
pub use equation::{EquationSystem, SolveError};

pub mod forcefield;
pub use forcefield::ForceField;

pub mod material;
pub use material::{MaterialId, MaterialTable, Plasticity};

pub mod polygon;
pub use polygon::{Polygon, PolygonError, Segment};

pub mod snapshot;
pub use snapshot::{BodySnapshot, SnapshotError};

//

/// A handle to a fixed body in a [`NewtonCollider`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FixedKey(pub(crate) td::Index);

/// A handle to a movable body in a [`NewtonCollider`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MovableKey(pub(crate) td::Index);

impl FixedKey {
    #[inline]
    pub fn index(&self) -> td::Index {
        self.0
    }
}

impl MovableKey {
    #[inline]
    pub fn index(&self) -> td::Index {
        self.0
    }
}

// ordered by the bits of the arena index, for deduplicating unordered pairs
impl PartialOrd for MovableKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MovableKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.to_bits().cmp(&other.0.to_bits())
    }
}

/// Any object that can take part in a collision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKey {
    Fixed(FixedKey),
    Movable(MovableKey),
}

impl From<FixedKey> for ObjectKey {
    fn from(key: FixedKey) -> Self {
        ObjectKey::Fixed(key)
    }
}

impl From<MovableKey> for ObjectKey {
    fn from(key: MovableKey) -> Self {
        ObjectKey::Movable(key)
    }
}
