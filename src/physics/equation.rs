//! The linear system `A·Fdt = b` relating contact impulses to contact velocities.

use super::{
    body::{Movable, RigidBody},
    cluster::Cluster,
};
use crate::math::Vec2;

use nalgebra as na;
use thunderdome as td;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    #[error("Failed to decompose the coefficient matrix: {0}")]
    Decomposition(&'static str),
    #[error("Solution contained a non-finite value at contact {0}")]
    NonFinite(usize),
}

/// One contact as seen by one body, in the form the coefficient functions consume.
#[derive(Clone, Copy, Debug)]
pub struct CoefContact {
    /// Row and column in the equation system.
    pub index: usize,
    /// Contact point in global space.
    pub point: Vec2,
    /// Unit direction an impulse along the contact pushes this body in.
    pub direction: Vec2,
}

/// Result of solving a cluster's system.
#[derive(Clone, Debug, Default)]
pub struct Solution {
    /// Non-negative impulse magnitude for every contact index.
    pub impulses: Vec<f64>,
    /// Contacts that were already separating and got no impulse.
    pub separating: Vec<usize>,
    /// Contacts whose solved impulse came out negative and were removed from the system,
    /// with the negative value they got.
    pub eliminated: Vec<(usize, f64)>,
}

/// Scratch buffers for building and solving one cluster's equation system at a time.
///
/// Buffers are resized per cluster rather than reallocated every step.
#[derive(Clone, Debug)]
pub struct EquationSystem {
    a: na::DMatrix<f64>,
    b: na::DVector<f64>,
    // velocities along contact directions, kept to compute b with elasticity
    approach: na::DVector<f64>,
}

impl Default for EquationSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl EquationSystem {
    pub fn new() -> Self {
        EquationSystem {
            a: na::DMatrix::zeros(0, 0),
            b: na::DVector::zeros(0),
            approach: na::DVector::zeros(0),
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.b.len()
    }

    #[inline]
    pub fn a(&self) -> &na::DMatrix<f64> {
        &self.a
    }

    #[inline]
    pub fn b(&self) -> &na::DVector<f64> {
        &self.b
    }

    /// Relative velocity along each contact normal before any impulses,
    /// negative when the bodies approach each other.
    #[inline]
    pub fn approach_velocities(&self) -> &na::DVector<f64> {
        &self.approach
    }

    /// Clear the buffers and resize them for `n` contacts.
    pub fn reset(&mut self, n: usize) {
        self.a.resize_mut(n, n, 0.0);
        self.a.fill(0.0);
        self.b.resize_vertically_mut(n, 0.0);
        self.b.fill(0.0);
        self.approach.resize_vertically_mut(n, 0.0);
        self.approach.fill(0.0);
    }

    /// Build `A` and `b` for a cluster from the coefficients of every movable member.
    ///
    /// `b_i` is the relative approach velocity of contact `i` times its elasticity,
    /// i.e. the change in relative normal velocity the impulses need to achieve.
    pub fn assemble(&mut self, cluster: &Cluster, bodies: &td::Arena<RigidBody>) {
        self.reset(cluster.end_index);
        let mut contacts = Vec::new();
        for &member in &cluster.members {
            let Some(body) = bodies.get(member.0) else {
                continue;
            };
            contacts.clear();
            contacts.extend(
                cluster
                    .detections
                    .iter()
                    .filter(|d| d.subject == member)
                    .flat_map(|d| d.contacts.iter())
                    .map(|c| CoefContact {
                        index: c.index,
                        point: c.point,
                        direction: c.direction(),
                    }),
            );
            body.a_coefs(&contacts, &mut self.a);
            body.b_coefs(&contacts, &mut self.approach);
        }
        for (idx, plasticity) in cluster.plasticity.iter().enumerate() {
            self.b[idx] = -plasticity.elasticity * self.approach[idx];
        }
    }

    /// Solve for non-negative impulse magnitudes.
    ///
    /// Contacts that are already separating get zero impulse.
    /// If the system would need a contact to pull instead of push,
    /// the most negative contact is taken out of the system and the rest re-solved,
    /// until every remaining impulse is non-negative.
    pub fn solve(&mut self, eps: f64) -> Result<Solution, SolveError> {
        let n = self.size();
        let mut solution = Solution {
            impulses: vec![0.0; n],
            ..Default::default()
        };
        for idx in 0..n {
            if self.b[idx] <= eps {
                self.eliminate(idx);
                solution.separating.push(idx);
            }
        }
        if solution.separating.len() == n {
            return Ok(solution);
        }

        loop {
            let x = self.solve_current(eps)?;
            if let Some(idx) = x.iter().position(|v| !v.is_finite()) {
                return Err(SolveError::NonFinite(idx));
            }
            let (most_negative, min_value) = x
                .iter()
                .copied()
                .enumerate()
                .fold((0, f64::MAX), |acc, (idx, v)| if v < acc.1 { (idx, v) } else { acc });
            if min_value >= -eps {
                for (out, v) in solution.impulses.iter_mut().zip(x.iter()) {
                    *out = v.max(0.0);
                }
                return Ok(solution);
            }
            log::debug!(
                "Contact {most_negative} got negative impulse {min_value}, eliminating it"
            );
            self.eliminate(most_negative);
            solution.eliminated.push((most_negative, min_value));
        }
    }

    fn solve_current(&self, eps: f64) -> Result<na::DVector<f64>, SolveError> {
        if let Some(x) = self.a.clone().lu().solve(&self.b) {
            // LU happily returns garbage for nearly singular matrices,
            // which happen whenever two contacts constrain the same motion
            let residual = (&self.a * &x - &self.b).norm();
            if residual <= eps.sqrt() * (1.0 + self.b.norm()) {
                return Ok(x);
            }
        }
        log::debug!("Equation system of size {} is singular, using pseudo-inverse", self.size());
        let svd = self.a.clone().svd(true, true);
        let cutoff = eps * svd.singular_values.max().max(1.0);
        svd.solve(&self.b, cutoff).map_err(SolveError::Decomposition)
    }

    /// Zero the row and column of a contact so that it gets zero impulse.
    fn eliminate(&mut self, idx: usize) {
        self.a.row_mut(idx).fill(0.0);
        self.a.column_mut(idx).fill(0.0);
        self.a[(idx, idx)] = 1.0;
        self.b[idx] = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system(a: &[f64], b: &[f64]) -> EquationSystem {
        let n = b.len();
        let mut sys = EquationSystem::new();
        sys.reset(n);
        sys.a.copy_from_slice(a);
        sys.b.copy_from_slice(b);
        sys
    }

    #[test]
    fn solves_regular_system() {
        // column-major
        let mut sys = system(&[2.0, 0.0, 0.0, 4.0], &[2.0, 2.0]);
        let sol = sys.solve(1e-12).unwrap();
        itertools::assert_equal(sol.impulses.iter().copied(), [1.0, 0.5]);
        assert!(sol.separating.is_empty() && sol.eliminated.is_empty());
    }

    #[test]
    fn separating_contacts_get_nothing() {
        let mut sys = system(&[2.0, 1.0, 1.0, 2.0], &[2.0, -1.0]);
        let sol = sys.solve(1e-12).unwrap();
        assert_eq!(sol.separating, vec![1]);
        assert!((sol.impulses[0] - 1.0).abs() < 1e-12);
        assert_eq!(sol.impulses[1], 0.0);
    }

    #[test]
    fn negative_impulses_are_eliminated() {
        // solving directly gives x = [3, -1]
        let mut sys = system(&[1.0, 1.0, 1.0, 2.0], &[2.0, 1.0]);
        let sol = sys.solve(1e-12).unwrap();
        assert_eq!(sol.eliminated.len(), 1);
        assert_eq!(sol.eliminated[0].0, 1);
        assert!((sol.eliminated[0].1 + 1.0).abs() < 1e-12);
        assert!((sol.impulses[0] - 2.0).abs() < 1e-12);
        assert_eq!(sol.impulses[1], 0.0);
        assert!(sol.impulses.iter().all(|x| *x >= 0.0));
    }

    #[test]
    fn singular_system_uses_pseudo_inverse() {
        // two identical contacts share the load
        let mut sys = system(&[1.0, 1.0, 1.0, 1.0], &[2.0, 2.0]);
        let sol = sys.solve(1e-12).unwrap();
        assert!((sol.impulses[0] - 1.0).abs() < 1e-9);
        assert!((sol.impulses[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn reset_resizes_and_clears() {
        let mut sys = system(&[1.0, 2.0, 3.0, 4.0], &[1.0, 1.0]);
        sys.reset(3);
        assert_eq!(sys.size(), 3);
        assert_eq!(sys.a().shape(), (3, 3));
        assert!(sys.a().iter().all(|v| *v == 0.0));
        sys.reset(1);
        assert_eq!(sys.a().shape(), (1, 1));
    }
}
