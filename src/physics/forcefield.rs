use crate::math::Vec2;

/// A (possibly) position-dependent acceleration that is
/// applied to every movable body when it integrates its motion.
pub trait ForceField {
    fn value_at(&self, position: Vec2) -> Vec2;
}

impl<F: ForceField + ?Sized> ForceField for Box<F> {
    fn value_at(&self, position: Vec2) -> Vec2 {
        (**self).value_at(position)
    }
}

pub struct NoneField;
impl ForceField for NoneField {
    fn value_at(&self, _: Vec2) -> Vec2 {
        Vec2::zero()
    }
}

/// A combination of two different force fields.
pub struct Sum<F1: ForceField, F2: ForceField>(pub F1, pub F2);
impl<F1: ForceField, F2: ForceField> ForceField for Sum<F1, F2> {
    fn value_at(&self, pos: Vec2) -> Vec2 {
        self.0.value_at(pos) + self.1.value_at(pos)
    }
}

/// Constant gravity field over all of space.
pub struct Gravity(pub Vec2);
impl ForceField for Gravity {
    fn value_at(&self, _pos: Vec2) -> Vec2 {
        self.0
    }
}
