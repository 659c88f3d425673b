use super::{
    body::{FixedBody, Movable, RigidBody},
    cluster::{Cluster, ClusterBuilder},
    debug::{DebugHook, NoDebug},
    dislocation::{DislocationReport, Dislocator},
    equation::{EquationSystem, Solution},
    forcefield::{ForceField, NoneField},
    material::MaterialTable,
    FixedKey, MovableKey, ObjectKey,
};
use crate::math::{self as m, Vec2};

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use thunderdome as td;

/// Tuning parameters of the collision step.
/// The defaults are good for most purposes.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct ColliderParams {
    /// Maximum number of collision passes a body can take part in during one step.
    /// A body that would need more is left out for the rest of the step.
    pub pass_limit: usize,
    /// Maximum number of dislocation waves per step.
    pub max_dislocation_passes: usize,
    /// Extra distance to separate overlapping bodies by.
    pub dislocation_margin: f64,
    /// Threshold for velocities to count as separating,
    /// also used as the cutoff for small singular values in the solver.
    pub solver_epsilon: f64,
    /// Distance within which a point counts as lying on an edge.
    /// Values below `1e-12`, the boundary band of [`Polygon::contains`](super::Polygon::contains),
    /// make detection fall back to the nearest edge for vertices in between.
    pub geometry_epsilon: f64,
}

impl Default for ColliderParams {
    fn default() -> Self {
        ColliderParams {
            pass_limit: 8,
            max_dislocation_passes: 32,
            dislocation_margin: 1e-6,
            solver_epsilon: 1e-12,
            geometry_epsilon: 1e-9,
        }
    }
}

impl ColliderParams {
    pub fn with_pass_limit(mut self, pass_limit: usize) -> Self {
        self.pass_limit = pass_limit;
        self
    }

    pub fn with_max_dislocation_passes(mut self, passes: usize) -> Self {
        self.max_dislocation_passes = passes;
        self
    }

    pub fn with_dislocation_margin(mut self, margin: f64) -> Self {
        self.dislocation_margin = margin;
        self
    }

    pub fn with_solver_epsilon(mut self, eps: f64) -> Self {
        self.solver_epsilon = eps;
        self
    }

    pub fn with_geometry_epsilon(mut self, eps: f64) -> Self {
        self.geometry_epsilon = eps;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImpulseKind {
    /// Along the contact normal, from the equation system.
    Normal,
    /// Along the contact surface, from stickiness.
    Tangential,
}

/// An impulse given to one body during a step.
#[derive(Clone, Copy, Debug)]
pub struct AppliedImpulse {
    /// Collision pass the impulse was applied in, starting from 0.
    pub pass: usize,
    /// Index of the contact in its cluster.
    pub index: usize,
    pub body: MovableKey,
    pub other: ObjectKey,
    pub kind: ImpulseKind,
    /// Point of application in global space.
    pub point: Vec2,
    pub impulse: Vec2,
}

/// Summary of what happened during [`NewtonCollider::update`].
#[derive(Clone, Debug, Default)]
pub struct StepReport {
    /// Number of collision passes that found contacts.
    pub passes: usize,
    /// Total number of clusters over all passes.
    pub clusters: usize,
    /// Total number of contacts over all passes.
    pub contacts: usize,
    pub impulses: Vec<AppliedImpulse>,
    /// Bodies that hit the pass limit and were left out for the rest of the step.
    pub skipped: Vec<MovableKey>,
    pub dislocation: DislocationReport,
}

impl StepReport {
    /// Sum of all impulses given to a body.
    pub fn total_impulse(&self, body: MovableKey) -> Vec2 {
        self.impulses
            .iter()
            .filter(|i| i.body == body)
            .fold(Vec2::zero(), |sum, i| sum + i.impulse)
    }
}

/// Collision engine that resolves all simultaneous contacts of a cluster of bodies at once
/// by solving a system of linear equations for the impulses.
pub struct NewtonCollider<H: DebugHook = NoDebug> {
    params: ColliderParams,
    materials: MaterialTable,
    forcefield: Box<dyn ForceField>,
    fixed: td::Arena<FixedBody>,
    movables: td::Arena<RigidBody>,
    system: EquationSystem,
    hook: H,
}

impl NewtonCollider<NoDebug> {
    pub fn new(params: ColliderParams, materials: MaterialTable) -> Self {
        NewtonCollider {
            params,
            materials,
            forcefield: Box::new(NoneField),
            fixed: td::Arena::new(),
            movables: td::Arena::new(),
            system: EquationSystem::new(),
            hook: NoDebug,
        }
    }
}

impl Default for NewtonCollider<NoDebug> {
    fn default() -> Self {
        Self::new(ColliderParams::default(), MaterialTable::default())
    }
}

impl<H: DebugHook> NewtonCollider<H> {
    /// Replace the default empty force field.
    pub fn with_forcefield(mut self, forcefield: impl ForceField + 'static) -> Self {
        self.forcefield = Box::new(forcefield);
        self
    }

    /// Replace the debug hook. It's only called with the `introspection` feature enabled.
    pub fn with_debug_hook<H2: DebugHook>(self, hook: H2) -> NewtonCollider<H2> {
        NewtonCollider {
            params: self.params,
            materials: self.materials,
            forcefield: self.forcefield,
            fixed: self.fixed,
            movables: self.movables,
            system: self.system,
            hook,
        }
    }

    pub fn params(&self) -> &ColliderParams {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut ColliderParams {
        &mut self.params
    }

    pub fn materials(&self) -> &MaterialTable {
        &self.materials
    }

    pub fn materials_mut(&mut self) -> &mut MaterialTable {
        &mut self.materials
    }

    pub fn hook(&self) -> &H {
        &self.hook
    }

    pub fn hook_mut(&mut self) -> &mut H {
        &mut self.hook
    }

    // registry

    pub fn add_fixed(&mut self, body: FixedBody) -> FixedKey {
        FixedKey(self.fixed.insert(body))
    }

    pub fn remove_fixed(&mut self, key: FixedKey) -> Option<FixedBody> {
        self.fixed.remove(key.0)
    }

    pub fn add_movable(&mut self, body: RigidBody) -> MovableKey {
        MovableKey(self.movables.insert(body))
    }

    pub fn remove_movable(&mut self, key: MovableKey) -> Option<RigidBody> {
        self.movables.remove(key.0)
    }

    pub fn fixed(&self, key: FixedKey) -> Option<&FixedBody> {
        self.fixed.get(key.0)
    }

    pub fn movable(&self, key: MovableKey) -> Option<&RigidBody> {
        self.movables.get(key.0)
    }

    pub fn movable_mut(&mut self, key: MovableKey) -> Option<&mut RigidBody> {
        self.movables.get_mut(key.0)
    }

    pub fn fixed_bodies(&self) -> impl Iterator<Item = (FixedKey, &FixedBody)> {
        self.fixed.iter().map(|(idx, body)| (FixedKey(idx), body))
    }

    pub fn movables(&self) -> impl Iterator<Item = (MovableKey, &RigidBody)> {
        self.movables.iter().map(|(idx, body)| (MovableKey(idx), body))
    }

    pub fn movables_mut(&mut self) -> impl Iterator<Item = (MovableKey, &mut RigidBody)> {
        self.movables
            .iter_mut()
            .map(|(idx, body)| (MovableKey(idx), body))
    }

    // stepping

    /// Move all movable bodies forward by `dt`, resolving collisions along the way.
    pub fn update(&mut self, dt: f64) -> StepReport {
        let _span = crate::tracy_span!("collision step", "update");

        let mut report = StepReport::default();

        for (_, body) in self.movables.iter_mut() {
            body.update_in_field(dt, &*self.forcefield);
        }
        notify(&mut self.hook, |h| h.breakpoint("tentative motion"));

        let mut pass_counts: HashMap<MovableKey, usize> = HashMap::new();
        let mut skipped: HashSet<MovableKey> = HashSet::new();

        loop {
            let clusters = self.clusters_within_limit(dt, &pass_counts, &mut skipped, &mut report);
            if clusters.is_empty() {
                break;
            }
            let pass = report.passes;
            report.passes += 1;
            report.clusters += clusters.len();
            report.contacts += clusters.iter().map(|c| c.end_index).sum::<usize>();
            notify(&mut self.hook, |h| h.breakpoint("collision pass"));

            let solutions = self.solve_clusters(&clusters);

            let mut any_impulse = false;
            for (cluster, solution) in clusters.iter().zip(&solutions) {
                for &(index, value) in &solution.eliminated {
                    notify(&mut self.hook, |h| h.negative_impulse(index, value));
                }
                any_impulse |= self.apply_normal_impulses(pass, cluster, solution, &mut report);
                self.apply_stickiness(pass, cluster, &mut report);

                for &key in &cluster.members {
                    *pass_counts.entry(key).or_insert(0) += 1;
                    if let Some(body) = self.movables.get_mut(key.0) {
                        body.update_in_field(dt, &*self.forcefield);
                    }
                }
            }

            if !any_impulse {
                break;
            }
        }

        for (_, body) in self.movables.iter_mut() {
            body.swap_buffers();
        }

        notify(&mut self.hook, |h| h.breakpoint("dislocation"));
        let dislocator = Dislocator {
            margin: self.params.dislocation_margin,
            max_waves: self.params.max_dislocation_passes,
        };
        report.dislocation = dislocator.run(&mut self.movables, &self.fixed);
        for &key in &report.dislocation.moved {
            notify(&mut self.hook, |h| h.highlight(ObjectKey::Movable(key)));
        }

        report
    }

    /// Build the clusters of the next pass,
    /// leaving out bodies that have already spent all of their passes.
    fn clusters_within_limit(
        &mut self,
        dt: f64,
        pass_counts: &HashMap<MovableKey, usize>,
        skipped: &mut HashSet<MovableKey>,
        report: &mut StepReport,
    ) -> Vec<Cluster> {
        loop {
            let candidates: Vec<MovableKey> = self
                .movables
                .iter()
                .map(|(idx, _)| MovableKey(idx))
                .filter(|key| !skipped.contains(key))
                .collect();
            let clusters = ClusterBuilder {
                movables: &self.movables,
                fixed: &self.fixed,
                materials: &self.materials,
                eps: self.params.geometry_epsilon,
            }
            .build(&candidates, dt);

            let over_limit: Vec<MovableKey> = clusters
                .iter()
                .flat_map(|c| c.members.iter().copied())
                .filter(|key| pass_counts.get(key).copied().unwrap_or(0) >= self.params.pass_limit)
                .collect();
            if over_limit.is_empty() {
                return clusters;
            }
            for key in over_limit {
                log::warn!(
                    "{key:?} exceeded the limit of {} collision passes, skipping it for the rest of the step",
                    self.params.pass_limit
                );
                skipped.insert(key);
                report.skipped.push(key);
                if let Some(body) = self.movables.get_mut(key.0) {
                    body.pass_limit();
                }
                notify(&mut self.hook, |h| h.pass_limit(key));
            }
        }
    }

    fn solve_clusters(&mut self, clusters: &[Cluster]) -> Vec<Solution> {
        let eps = self.params.solver_epsilon;
        let solve = |system: &mut EquationSystem, cluster: &Cluster| {
            system.assemble(cluster, &self.movables);
            system.solve(eps).unwrap_or_else(|err| {
                log::warn!("Failed to solve a cluster of {} contacts: {err}", cluster.end_index);
                Solution {
                    impulses: vec![0.0; cluster.end_index],
                    ..Default::default()
                }
            })
        };

        #[cfg(feature = "parallel")]
        let solutions = clusters
            .par_iter()
            .map_init(EquationSystem::new, |system, cluster| solve(system, cluster))
            .collect();
        #[cfg(not(feature = "parallel"))]
        let solutions = clusters
            .iter()
            .map(|cluster| solve(&mut self.system, cluster))
            .collect();
        solutions
    }

    /// Push every body along its contact directions by the solved magnitudes.
    /// Returns true if any impulse was non-zero.
    fn apply_normal_impulses(
        &mut self,
        pass: usize,
        cluster: &Cluster,
        solution: &Solution,
        report: &mut StepReport,
    ) -> bool {
        let mut any = false;
        for det in &cluster.detections {
            let Some(body) = self.movables.get_mut(det.subject.0) else {
                continue;
            };
            for contact in &det.contacts {
                let magnitude = solution.impulses.get(contact.index).copied().unwrap_or(0.0);
                if magnitude <= 0.0 {
                    continue;
                }
                let impulse = magnitude * contact.direction();
                body.apply_impulse(impulse, contact.point);
                report.impulses.push(AppliedImpulse {
                    pass,
                    index: contact.index,
                    body: det.subject,
                    other: det.other,
                    kind: ImpulseKind::Normal,
                    point: contact.point,
                    impulse,
                });
                log::trace!("{:?} got impulse {impulse:?} at {:?}", det.subject, contact.point);
                any = true;
            }
            if det.contacts.iter().any(|c| solution.impulses[c.index] > 0.0) {
                notify(&mut self.hook, |h| h.highlight(ObjectKey::Movable(det.subject)));
            }
        }
        any
    }

    /// Remove a fraction of the relative tangential velocity at every sticky contact.
    fn apply_stickiness(&mut self, pass: usize, cluster: &Cluster, report: &mut StepReport) {
        let mut handled: HashSet<usize> = HashSet::new();
        for det in &cluster.detections {
            for contact in &det.contacts {
                let stickiness = cluster.plasticity[contact.index].stickiness;
                if stickiness <= 0.0 || !handled.insert(contact.index) {
                    continue;
                }
                let tangent = m::left_normal(*contact.normal);
                let point = contact.point;

                let Some(subject) = self.movables.get(det.subject.0) else {
                    continue;
                };
                let mut relative = subject.contact_velocity(point).dot(tangent);
                let mut inv_mass = subject.inverse_effective_mass(point, tangent);
                if let ObjectKey::Movable(other) = det.other {
                    if let Some(other) = self.movables.get(other.0) {
                        relative -= other.contact_velocity(point).dot(tangent);
                        inv_mass += other.inverse_effective_mass(point, tangent);
                    }
                }
                if inv_mass <= 0.0 {
                    continue;
                }
                let impulse = (-stickiness * relative / inv_mass) * tangent;

                let mut push = |key: MovableKey, other: ObjectKey, impulse: Vec2| {
                    if let Some(body) = self.movables.get_mut(key.0) {
                        body.apply_impulse(impulse, point);
                        report.impulses.push(AppliedImpulse {
                            pass,
                            index: contact.index,
                            body: key,
                            other,
                            kind: ImpulseKind::Tangential,
                            point,
                            impulse,
                        });
                    }
                };
                push(det.subject, det.other, impulse);
                if let ObjectKey::Movable(other) = det.other {
                    push(other, ObjectKey::Movable(det.subject), -impulse);
                }
            }
        }
    }
}

/// Call into the debug hook if introspection is enabled.
#[inline]
fn notify<H: DebugHook>(hook: &mut H, f: impl FnOnce(&mut H)) {
    #[cfg(feature = "introspection")]
    f(hook);
    #[cfg(not(feature = "introspection"))]
    let _ = (hook, f);
}
