use std::collections::HashMap;

/// Identifies the material of a body's surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct MaterialId(pub u16);

/// Determines how kinetic energy and tangential motion carry through a collision
/// between two materials.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-types", serde(default))]
pub struct Plasticity {
    /// Multiplier on the impulse needed to stop the bodies' approach.
    ///
    /// 1.0 stops the bodies dead along the contact normal (a fully plastic collision),
    /// 2.0 reverses their normal velocity (a perfectly elastic one).
    pub elasticity: f64,
    /// Fraction of the relative tangential velocity at a contact
    /// that is removed after the normal impulses, in [0, 1].
    pub stickiness: f64,
}

impl Default for Plasticity {
    fn default() -> Self {
        Plasticity {
            elasticity: 1.5,
            stickiness: 0.0,
        }
    }
}

impl Plasticity {
    pub fn new(elasticity: f64, stickiness: f64) -> Self {
        Plasticity {
            elasticity,
            stickiness: stickiness.clamp(0.0, 1.0),
        }
    }
}

/// Lookup table from pairs of materials to their shared [`Plasticity`].
///
/// The pair order doesn't matter. Pairs without an entry get the table's default value.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct MaterialTable {
    default: Plasticity,
    entries: HashMap<(MaterialId, MaterialId), Plasticity>,
}

impl MaterialTable {
    pub fn new(default: Plasticity) -> Self {
        MaterialTable {
            default,
            entries: HashMap::new(),
        }
    }

    /// Set the plasticity of a pair of materials in a builder-like chain.
    pub fn with(mut self, a: MaterialId, b: MaterialId, plasticity: Plasticity) -> Self {
        self.insert(a, b, plasticity);
        self
    }

    /// Set the plasticity of a pair of materials, returning the previous value if there was one.
    pub fn insert(
        &mut self,
        a: MaterialId,
        b: MaterialId,
        plasticity: Plasticity,
    ) -> Option<Plasticity> {
        self.entries.insert(Self::key(a, b), plasticity)
    }

    pub fn get(&self, a: MaterialId, b: MaterialId) -> Plasticity {
        self.entries
            .get(&Self::key(a, b))
            .copied()
            .unwrap_or(self.default)
    }

    pub fn default_plasticity(&self) -> Plasticity {
        self.default
    }

    #[inline]
    fn key(a: MaterialId, b: MaterialId) -> (MaterialId, MaterialId) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_symmetric() {
        let rubber = MaterialId(1);
        let stone = MaterialId(2);
        let table = MaterialTable::new(Plasticity::new(1.0, 0.0)).with(
            stone,
            rubber,
            Plasticity::new(1.9, 0.5),
        );
        assert_eq!(table.get(rubber, stone), Plasticity::new(1.9, 0.5));
        assert_eq!(table.get(stone, rubber), Plasticity::new(1.9, 0.5));
        assert_eq!(table.get(stone, stone), Plasticity::new(1.0, 0.0));
    }

    #[test]
    fn stickiness_is_clamped() {
        assert_eq!(Plasticity::new(1.0, 3.0).stickiness, 1.0);
        assert_eq!(Plasticity::new(1.0, -1.0).stickiness, 0.0);
    }
}
