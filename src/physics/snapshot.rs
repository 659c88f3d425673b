//! Saving and restoring the changing state of a body as plain bytes,
//! for recording and replaying simulations.

use super::body::{BodyState, RigidBody};
use crate::math::Vec2;

use zerocopy::{AsBytes, FromBytes};

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("Snapshot must be {expected} bytes long, got {actual}")]
    WrongLength { expected: usize, actual: usize },
}

/// Byte layout of a body snapshot.
///
/// States are stored as `[x, y, angle, momentum x, momentum y, angular momentum]`,
/// pending impulses as `[x, y, angular]`.
#[repr(C)]
#[derive(Debug, Clone, Copy, AsBytes, FromBytes)]
pub struct BodySnapshot {
    active: [f64; 6],
    background: [f64; 6],
    pending: [f64; 3],
}

impl BodySnapshot {
    pub const SIZE: usize = std::mem::size_of::<BodySnapshot>();

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        BodySnapshot::read_from(bytes).ok_or(SnapshotError::WrongLength {
            expected: Self::SIZE,
            actual: bytes.len(),
        })
    }
}

fn state_to_array(s: &BodyState) -> [f64; 6] {
    [
        s.position.x,
        s.position.y,
        s.angle,
        s.momentum.x,
        s.momentum.y,
        s.angular_momentum,
    ]
}

fn array_to_state(a: [f64; 6]) -> BodyState {
    BodyState {
        position: Vec2::new(a[0], a[1]),
        angle: a[2],
        momentum: Vec2::new(a[3], a[4]),
        angular_momentum: a[5],
    }
}

impl From<&RigidBody> for BodySnapshot {
    fn from(body: &RigidBody) -> Self {
        let (linear, angular) = body.pending_impulse();
        BodySnapshot {
            active: state_to_array(body.state.active()),
            background: state_to_array(body.state.background()),
            pending: [linear.x, linear.y, angular],
        }
    }
}

impl RigidBody {
    /// Both buffered states and pending impulses as bytes.
    ///
    /// Shape, mass and forces are not included,
    /// a snapshot can only be restored into a body built the same way.
    pub fn snapshot(&self) -> Vec<u8> {
        BodySnapshot::from(self).as_bytes().to_vec()
    }

    pub fn restore(&mut self, bytes: &[u8]) -> Result<(), SnapshotError> {
        let snap = BodySnapshot::from_bytes(bytes)?;
        self.restore_state(
            array_to_state(snap.active),
            array_to_state(snap.background),
            (Vec2::new(snap.pending[0], snap.pending[1]), snap.pending[2]),
        );
        Ok(())
    }
}
