//! Hooks for inspecting a running collision step from the outside.
//!
//! The collider only calls into its hook when the `introspection` feature is enabled.

use super::{MovableKey, ObjectKey};

/// Receiver for notable events during [`NewtonCollider::update`][super::NewtonCollider::update].
///
/// Every method does nothing by default.
pub trait DebugHook {
    /// An object is taking part in something worth looking at.
    fn highlight(&mut self, _object: ObjectKey) {}
    /// A named point in the step was reached.
    fn breakpoint(&mut self, _label: &str) {}
    /// A body took part in too many collision passes and was left out for the rest of the step.
    fn pass_limit(&mut self, _body: MovableKey) {}
    /// The solver produced a negative impulse for a contact, which got eliminated.
    fn negative_impulse(&mut self, _index: usize, _value: f64) {}
}

/// A hook that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDebug;

impl DebugHook for NoDebug {}

/// A hook that writes a line into a log for every event it sees.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    pub events: Vec<String>,
}

impl DebugHook for EventLog {
    fn highlight(&mut self, object: ObjectKey) {
        self.events.push(format!("highlight {object:?}"));
    }

    fn breakpoint(&mut self, label: &str) {
        self.events.push(format!("breakpoint {label}"));
    }

    fn pass_limit(&mut self, body: MovableKey) {
        self.events.push(format!("pass limit {body:?}"));
    }

    fn negative_impulse(&mut self, index: usize, value: f64) {
        self.events.push(format!("negative impulse {index} {value}"));
    }
}
