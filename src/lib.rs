pub mod math;
pub use math::{uv, Angle, Pose, Rotor2, Unit, Vec2};

pub mod physics;
pub use physics::{
    body::{Collidable, FixedBody, Mass, Movable, RigidBody},
    collider::{ColliderParams, NewtonCollider, StepReport},
    debug::DebugHook,
    forcefield,
    material::{MaterialId, MaterialTable, Plasticity},
    polygon::Polygon,
    FixedKey, MovableKey, ObjectKey,
};

/// Open a profiling span that lasts until the end of the enclosing scope.
/// Does nothing unless the `tracy` feature is enabled.
#[cfg(feature = "tracy")]
#[macro_export]
macro_rules! tracy_span {
    ($name:literal, $function:literal) => {
        tracy_client::Client::running().map(|client| {
            client.span(
                tracy_client::span_location!($name),
                0,
            )
        })
    };
}

#[cfg(not(feature = "tracy"))]
#[macro_export]
macro_rules! tracy_span {
    ($name:literal, $function:literal) => {
        ()
    };
}
