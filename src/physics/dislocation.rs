//! Pushing apart bodies that still overlap after collision resolution.

use super::{
    body::{Collidable, Dislocation, FixedBody, Movable, RigidBody},
    detection::{detect_overlaps, Overlap},
    FixedKey, MovableKey, ObjectKey,
};
use crate::math::Vec2;

use std::collections::HashSet;
use thunderdome as td;

/// How many times a stuck body gets retried with a bigger push.
const MAX_RETRIES: usize = 16;

/// What happened during one dislocation run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DislocationReport {
    /// Number of waves that moved at least one body.
    pub waves: usize,
    /// Total number of successful moves.
    pub moves: usize,
    /// Every body moved, in order, possibly repeated.
    pub moved: Vec<MovableKey>,
    /// True if the run stopped at the wave cap with bodies still overlapping.
    pub capped: bool,
}

/// Separation to apply to resolve the deepest overlap of a pair.
#[derive(Clone, Copy, Debug)]
struct Separation {
    /// Vector to move the first body by. The second one moves the opposite way.
    vector: Vec2,
    point: Vec2,
    depth: f64,
}

/// Runs waves of static overlap tests and moves bodies apart until nothing overlaps.
#[derive(Clone, Copy, Debug)]
pub struct Dislocator {
    /// Extra distance added on top of the penetration depth.
    pub margin: f64,
    pub max_waves: usize,
}

impl Dislocator {
    pub fn run(
        &self,
        movables: &mut td::Arena<RigidBody>,
        fixed: &td::Arena<FixedBody>,
    ) -> DislocationReport {
        let _span = crate::tracy_span!("dislocation", "run");

        let mut report = DislocationReport::default();
        let mut candidates: Vec<MovableKey> = movables.iter().map(|(i, _)| MovableKey(i)).collect();

        for _ in 0..self.max_waves {
            let moved = self.wave(&candidates, movables, fixed, &mut report);
            if moved.is_empty() {
                return report;
            }
            report.waves += 1;
            candidates = moved;
        }

        // one more look to tell apart a run that finished exactly at the cap
        let movables: &td::Arena<RigidBody> = movables;
        let still_overlapping = candidates.iter().any(|&key| {
            movables
                .get(key.0)
                .map(|body| self.has_overlap(key, body, movables, fixed))
                .unwrap_or(false)
        });
        if still_overlapping {
            log::warn!(
                "Dislocation stopped after {} waves with bodies still overlapping",
                self.max_waves
            );
            report.capped = true;
        }
        report
    }

    /// Resolve the deepest overlap of every pair involving a candidate once.
    /// Returns the bodies that moved.
    fn wave(
        &self,
        candidates: &[MovableKey],
        movables: &mut td::Arena<RigidBody>,
        fixed: &td::Arena<FixedBody>,
        report: &mut DislocationReport,
    ) -> Vec<MovableKey> {
        let mut moved: Vec<MovableKey> = Vec::new();
        let mut tested: HashSet<(MovableKey, MovableKey)> = HashSet::new();
        let mut note = |key: MovableKey, moved: &mut Vec<MovableKey>| {
            report.moves += 1;
            report.moved.push(key);
            if !moved.contains(&key) {
                moved.push(key);
            }
        };

        for &key in candidates {
            for (_, fixed_body) in fixed.iter() {
                let Some(body) = movables.get_mut(key.0) else {
                    break;
                };
                let Some(sep) = separation(&*body, fixed_body, self.margin) else {
                    continue;
                };
                log::trace!("Dislocating {key:?} out of a fixed body by {:?}", sep.vector);
                if self.push(body, sep.vector, sep.point) {
                    note(key, &mut moved);
                }
            }

            let others: Vec<MovableKey> = movables
                .iter()
                .map(|(i, _)| MovableKey(i))
                .filter(|&other| other != key)
                .collect();
            for other in others {
                let pair = if key <= other { (key, other) } else { (other, key) };
                if !tested.insert(pair) {
                    continue;
                }
                let sep = match (movables.get(key.0), movables.get(other.0)) {
                    (Some(a), Some(b)) => separation(a, b, self.margin),
                    _ => None,
                };
                let Some(sep) = sep else {
                    continue;
                };
                log::trace!("Dislocating {key:?} and {other:?} apart by {:?}", sep.vector);
                let half = 0.5 * sep.vector;
                if let (Some(a), Some(b)) = movables.get2_mut(key.0, other.0) {
                    if self.push(a, half, sep.point) {
                        note(key, &mut moved);
                    }
                    if self.push(b, -half, sep.point) {
                        note(other, &mut moved);
                    }
                }
            }
        }
        moved
    }

    /// Move a body, pushing harder if it doesn't budge.
    fn push(&self, body: &mut RigidBody, vector: Vec2, point: Vec2) -> bool {
        let mut vector = vector;
        if vector.mag_sq() == 0.0 {
            return false;
        }
        for _ in 0..MAX_RETRIES {
            match body.dislocate(vector, point) {
                Dislocation::Moved => return true,
                Dislocation::Stuck { position } => {
                    let magnitude = (2.0 * vector.mag()).max(self.margin * 1e3);
                    log::debug!("Body at {position:?} is stuck, retrying with magnitude {magnitude}");
                    vector = vector.normalized() * magnitude;
                }
            }
        }
        log::warn!("Failed to dislocate a body with {MAX_RETRIES} retries");
        false
    }

    fn has_overlap(
        &self,
        key: MovableKey,
        body: &RigidBody,
        movables: &td::Arena<RigidBody>,
        fixed: &td::Arena<FixedBody>,
    ) -> bool {
        fixed.iter().any(|(_, f)| separation(body, f, 0.0).is_some())
            || movables
                .iter()
                .filter(|(i, _)| MovableKey(*i) != key)
                .any(|(_, other)| separation(body, other, 0.0).is_some())
    }
}

/// The move that gets `a` out of `b` by their deepest overlap, checking both ways.
fn separation<A, B>(a: &A, b: &B, margin: f64) -> Option<Separation>
where
    A: Collidable + ?Sized,
    B: Collidable + ?Sized,
{
    let a_in_b = detect_overlaps(a, b).into_iter().map(|o| (1.0, o));
    // b's vertices inside a push a the other way
    let b_in_a = detect_overlaps(b, a).into_iter().map(|o| (-1.0, o));
    a_in_b
        .chain(b_in_a)
        .max_by(|(_, o1), (_, o2)| o1.depth.total_cmp(&o2.depth))
        .map(|(sign, Overlap { point, normal, depth })| Separation {
            vector: sign * (depth + margin) * *normal,
            point,
            depth,
        })
}

/// Deepest current overlap between a movable body and anything else.
pub fn deepest_overlap(
    key: MovableKey,
    movables: &td::Arena<RigidBody>,
    fixed: &td::Arena<FixedBody>,
) -> Option<(ObjectKey, f64)> {
    let body = movables.get(key.0)?;
    let fixed_depths = fixed.iter().filter_map(|(i, f)| {
        separation(body, f, 0.0).map(|s| (ObjectKey::Fixed(FixedKey(i)), s.depth))
    });
    let movable_depths = movables
        .iter()
        .filter(|(i, _)| MovableKey(*i) != key)
        .filter_map(|(i, other)| {
            separation(body, other, 0.0).map(|s| (ObjectKey::Movable(MovableKey(i)), s.depth))
        });
    fixed_depths
        .chain(movable_depths)
        .max_by(|(_, d1), (_, d2)| d1.total_cmp(d2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{detection::penetration_depth, polygon::Polygon};

    const MARGIN: f64 = 1e-6;

    fn dislocator() -> Dislocator {
        Dislocator {
            margin: MARGIN,
            max_waves: 32,
        }
    }

    fn square_at(pos: Vec2) -> RigidBody {
        RigidBody::new(vec![Polygon::rect(1.0, 1.0).unwrap()], 1.0, 1.0)
            .unwrap()
            .with_position(pos)
    }

    fn floor() -> FixedBody {
        FixedBody::new(vec![Polygon::rect(10.0, 1.0).unwrap()], Vec2::new(0.0, -1.0), 0.0).unwrap()
    }

    #[test]
    fn box_sunk_into_floor_gets_pushed_out() {
        let mut movables = td::Arena::new();
        let mut fixed = td::Arena::new();
        let floor_idx = fixed.insert(floor());
        let key = MovableKey(movables.insert(square_at(Vec2::new(0.0, -0.1))));

        let before = penetration_depth(&movables[key.0], &fixed[floor_idx]);
        assert!((before - 0.1).abs() < 1e-9);

        let report = dislocator().run(&mut movables, &fixed);
        assert!(!report.capped);
        assert!(report.waves >= 1 && report.waves <= 10);
        let after = penetration_depth(&movables[key.0], &fixed[floor_idx]);
        assert!(after <= MARGIN);
        assert!(movables[key.0].position().y >= 0.0);
        assert!(movables[key.0].position().x.abs() < 1e-9);
    }

    #[test]
    fn stuck_body_is_pushed_harder() {
        // far enough out that a push the size of the margin rounds away
        let y = 2.0f64.powi(40);
        let mut body = square_at(Vec2::new(0.0, y));
        let point = Vec2::new(0.0, y - 0.5);
        assert!(matches!(
            body.dislocate(Vec2::new(0.0, MARGIN), point),
            Dislocation::Stuck { .. }
        ));

        assert!(dislocator().push(&mut body, Vec2::new(0.0, 2.0 * MARGIN), point));
        let moved = body.position().y - y;
        assert!(moved >= 0.5 * MARGIN * 1e3 && moved <= 2.0 * MARGIN * 1e3, "moved {moved}");
    }

    #[test]
    fn penetration_decreases_every_wave() {
        let mut movables = td::Arena::new();
        let mut fixed = td::Arena::new();
        let floor_idx = fixed.insert(floor());
        let key = MovableKey(movables.insert(square_at(Vec2::new(0.3, -0.2))));

        let single_wave = Dislocator {
            margin: MARGIN,
            max_waves: 1,
        };
        let mut depth = penetration_depth(&movables[key.0], &fixed[floor_idx]);
        for _ in 0..10 {
            single_wave.run(&mut movables, &fixed);
            let next = penetration_depth(&movables[key.0], &fixed[floor_idx]);
            assert!(next <= depth);
            depth = next;
        }
        assert!(depth <= MARGIN);
    }

    #[test]
    fn overlapping_movables_split_the_move() {
        let mut movables = td::Arena::new();
        let fixed = td::Arena::new();
        let a = MovableKey(movables.insert(square_at(Vec2::new(-0.45, 0.0))));
        let b = MovableKey(movables.insert(
            RigidBody::new(vec![Polygon::rect(1.0, 2.0).unwrap()], 1.0, 1.0)
                .unwrap()
                .with_position(Vec2::new(0.45, 0.0)),
        ));

        let report = dislocator().run(&mut movables, &fixed);
        assert!(report.moves >= 2);
        let pa = movables[a.0].position();
        let pb = movables[b.0].position();
        // symmetric about the origin, separated by at least their half-widths
        assert!((pa.x + pb.x).abs() < 1e-9);
        assert!(pb.x - pa.x >= 1.0);
        assert!(deepest_overlap(a, &movables, &fixed).is_none());
    }

    #[test]
    fn nothing_to_do_without_overlaps() {
        let mut movables = td::Arena::new();
        let mut fixed = td::Arena::new();
        fixed.insert(floor());
        let key = MovableKey(movables.insert(square_at(Vec2::new(0.0, 1.0))));

        let report = dislocator().run(&mut movables, &fixed);
        assert_eq!(report, DislocationReport::default());
        assert_eq!(movables[key.0].position(), Vec2::new(0.0, 1.0));
    }
}
