//! Grouping bodies that collide with each other during a step
//! into independently solvable clusters.

use super::{
    body::{Collidable, FixedBody, RigidBody},
    detection::{detect_pair, ContactData, Crossing, DetectionData, Role},
    material::{MaterialTable, Plasticity},
    FixedKey, MovableKey, ObjectKey,
};

use std::collections::{HashSet, VecDeque};
use thunderdome as td;

/// A set of bodies connected by contacts within one collision pass,
/// along with every contact between them and the fixed bodies they hit.
#[derive(Clone, Debug)]
pub struct Cluster {
    pub dt: f64,
    /// Number of contacts, each with one row and column in the equation system.
    pub end_index: usize,
    pub detections: Vec<DetectionData>,
    /// Movable bodies in the cluster, in the order they were found.
    pub members: Vec<MovableKey>,
    /// Plasticity of each contact by index.
    pub plasticity: Vec<Plasticity>,
}

impl Cluster {
    pub fn new(dt: f64) -> Self {
        Cluster {
            dt,
            end_index: 0,
            detections: Vec::new(),
            members: Vec::new(),
            plasticity: Vec::new(),
        }
    }

    /// True if no contacts were found.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end_index == 0
    }

    /// All contacts a movable body takes part in, from that body's point of view.
    pub fn contacts_of(&self, key: MovableKey) -> impl Iterator<Item = &ContactData> {
        self.detections
            .iter()
            .filter(move |d| d.subject == key)
            .flat_map(|d| d.contacts.iter())
    }

    fn detection_mut(&mut self, subject: MovableKey, other: ObjectKey) -> &mut DetectionData {
        let pos = match self
            .detections
            .iter()
            .position(|d| d.subject == subject && d.other == other)
        {
            Some(pos) => pos,
            None => {
                self.detections.push(DetectionData {
                    subject,
                    other,
                    contacts: Vec::new(),
                });
                self.detections.len() - 1
            }
        };
        &mut self.detections[pos]
    }

    fn next_index(&mut self, plasticity: Plasticity) -> usize {
        let idx = self.end_index;
        self.end_index += 1;
        self.plasticity.push(plasticity);
        idx
    }

    fn record_fixed(
        &mut self,
        (key, body): (MovableKey, &RigidBody),
        fixed_key: FixedKey,
        crossings: Vec<(Role, Crossing)>,
        plasticity: Plasticity,
    ) {
        // fixed bodies get no record of their own, they add nothing to the system
        for (role, crossing) in crossings {
            let index = self.next_index(plasticity);
            let contact = ContactData::from_crossing(&crossing, role, body, index);
            self.detection_mut(key, ObjectKey::Fixed(fixed_key))
                .contacts
                .push(contact);
        }
    }

    fn record_movable(
        &mut self,
        (key, body): (MovableKey, &RigidBody),
        (other_key, other): (MovableKey, &RigidBody),
        crossings: Vec<(Role, Crossing)>,
        plasticity: Plasticity,
    ) {
        for (role, crossing) in crossings {
            let index = self.next_index(plasticity);
            let own = ContactData::from_crossing(&crossing, role, body, index);
            let mirrored = ContactData::from_crossing(&crossing, role.flipped(), other, index);
            self.detection_mut(key, ObjectKey::Movable(other_key))
                .contacts
                .push(own);
            self.detection_mut(other_key, ObjectKey::Movable(key))
                .contacts
                .push(mirrored);
        }
    }
}

/// Finds the clusters of one collision pass.
pub struct ClusterBuilder<'a> {
    pub movables: &'a td::Arena<RigidBody>,
    pub fixed: &'a td::Arena<FixedBody>,
    pub materials: &'a MaterialTable,
    /// On-edge tolerance for detection.
    pub eps: f64,
}

impl<'a> ClusterBuilder<'a> {
    /// Partition the candidate bodies into clusters.
    ///
    /// Only clusters with at least one contact are returned.
    /// Bodies not in `candidates` are ignored entirely.
    pub fn build(&self, candidates: &[MovableKey], dt: f64) -> Vec<Cluster> {
        let _span = crate::tracy_span!("build clusters", "build");

        let candidates: Vec<(MovableKey, &RigidBody)> = candidates
            .iter()
            .filter_map(|&key| self.movables.get(key.0).map(|body| (key, body)))
            .collect();

        let mut visited: HashSet<MovableKey> = HashSet::new();
        let mut clusters = Vec::new();
        let mut queue = VecDeque::new();

        for &(seed, _) in &candidates {
            if !visited.insert(seed) {
                continue;
            }
            let mut cluster = Cluster::new(dt);
            let mut tested: HashSet<(MovableKey, MovableKey)> = HashSet::new();
            queue.push_back(seed);

            while let Some(key) = queue.pop_front() {
                let Some(body) = self.movables.get(key.0) else {
                    continue;
                };
                cluster.members.push(key);

                for (idx, fixed) in self.fixed.iter() {
                    let crossings = detect_pair(body, fixed, self.eps);
                    if !crossings.is_empty() {
                        let plasticity = self.materials.get(body.material(), fixed.material());
                        cluster.record_fixed((key, body), FixedKey(idx), crossings, plasticity);
                    }
                }

                for &(other_key, other) in &candidates {
                    if other_key == key || visited.contains(&other_key) {
                        continue;
                    }
                    tested.insert(ordered(key, other_key));
                    let crossings = detect_pair(body, other, self.eps);
                    if crossings.is_empty() {
                        continue;
                    }
                    let plasticity = self.materials.get(body.material(), other.material());
                    cluster.record_movable((key, body), (other_key, other), crossings, plasticity);
                    visited.insert(other_key);
                    queue.push_back(other_key);
                }
            }

            self.fulfill(&mut cluster, &mut tested);

            if cluster.is_empty() {
                continue;
            }
            log::debug!(
                "Cluster of {} bodies with {} contacts",
                cluster.members.len(),
                cluster.end_index
            );
            clusters.push(cluster);
        }
        clusters
    }

    /// Test the member pairs that only met after both were already queued.
    ///
    /// Every member was tested against every body left outside the cluster while it was
    /// being expanded, so this can only add contacts, not members.
    fn fulfill(&self, cluster: &mut Cluster, tested: &mut HashSet<(MovableKey, MovableKey)>) {
        let members = cluster.members.clone();
        for (i, &a_key) in members.iter().enumerate() {
            for &b_key in &members[i + 1..] {
                if !tested.insert(ordered(a_key, b_key)) {
                    continue;
                }
                let (Some(a), Some(b)) = (self.movables.get(a_key.0), self.movables.get(b_key.0))
                else {
                    continue;
                };
                let crossings = detect_pair(a, b, self.eps);
                if crossings.is_empty() {
                    continue;
                }
                let plasticity = self.materials.get(a.material(), b.material());
                cluster.record_movable((a_key, a), (b_key, b), crossings, plasticity);
            }
        }
    }
}

fn ordered(a: MovableKey, b: MovableKey) -> (MovableKey, MovableKey) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
