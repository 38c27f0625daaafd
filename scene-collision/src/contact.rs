//! Persistent contacts and penalty response.
//!
//! Contacts are keyed by colliding-model pair and persist across steps
//! while the pair keeps appearing in the narrow-phase output, so the
//! response can retain internal state (here: the accumulated normal
//! impulse). A pair absent from the current step is torn down at
//! [`ContactManager::end_step`].
//!
//! # Contact mappers
//!
//! A [`ContactMapper`] exposes the contact-relevant subset of a body's
//! dofs as an auxiliary mechanical state (the subset relation is the same
//! as `SubsetMapping`'s). The mapper exclusively owns its auxiliary state;
//! both are dropped with the contact that created them.
//!
//! # Response model
//!
//! The response is a compliant spring-damper along the contact normal,
//! `F = k·depth + c·approach_speed`, clamped to repulsion only, applied
//! as a velocity impulse through the mappers.

use hashbrown::HashMap;
use nalgebra::Vector3;
use scene_graph::Scene;
use scene_types::{MechanicalState, ModelId, StateId, VecId};
use tracing::debug;

use crate::narrow::ContactPoint;
use crate::Result;

/// Normalized identity of a colliding model pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    /// Lower model id of the pair.
    pub first: ModelId,
    /// Higher model id of the pair.
    pub second: ModelId,
}

impl PairKey {
    /// Create a normalized key; argument order does not matter.
    #[must_use]
    pub fn new(a: ModelId, b: ModelId) -> Self {
        if a.raw() <= b.raw() {
            Self {
                first: a,
                second: b,
            }
        } else {
            Self {
                first: b,
                second: a,
            }
        }
    }
}

impl std::fmt::Display for PairKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.first.raw(), self.second.raw())
    }
}

/// Penalty response parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResponseParams {
    /// Contact stiffness (N/m of penetration).
    pub stiffness: f64,
    /// Contact damping against approach speed.
    pub damping: f64,
}

impl Default for ResponseParams {
    fn default() -> Self {
        Self {
            stiffness: 1e4,
            damping: 10.0,
        }
    }
}

/// Exposes the contact-relevant dofs of one body as an auxiliary state.
#[derive(Debug)]
pub struct ContactMapper {
    source: StateId,
    dofs: Vec<usize>,
    aux: MechanicalState,
}

impl ContactMapper {
    /// Create a mapper over a subset of a source state's dofs.
    #[must_use]
    pub fn new(name: impl Into<String>, source: StateId, dofs: Vec<usize>) -> Self {
        let aux = MechanicalState::new(name, vec![Vector3::zeros(); dofs.len()]);
        Self { source, dofs, aux }
    }

    /// The source state.
    #[must_use]
    pub fn source(&self) -> StateId {
        self.source
    }

    /// The mapped source dof indices.
    #[must_use]
    pub fn dofs(&self) -> &[usize] {
        &self.dofs
    }

    /// The auxiliary state (exclusively owned by this mapper).
    #[must_use]
    pub fn state(&self) -> &MechanicalState {
        &self.aux
    }

    /// Local index of a source dof, if mapped.
    #[must_use]
    pub fn local_index(&self, source_dof: usize) -> Option<usize> {
        self.dofs.iter().position(|&d| d == source_dof)
    }

    /// Pull positions and velocities from the source and clear the
    /// auxiliary force buffer (the `apply`/`apply_j` direction of the
    /// subset relation).
    pub fn update_from_source(&mut self, scene: &Scene) -> Result<()> {
        let source = scene.state(self.source)?;
        let positions = source.vec(VecId::Position)?;
        let velocities = source.vec(VecId::Velocity)?;
        for (local, &dof) in self.dofs.iter().enumerate() {
            if let (Some(&p), Some(&v)) = (positions.get(dof), velocities.get(dof)) {
                self.aux.vec_mut(VecId::Position)?[local] = p;
                self.aux.vec_mut(VecId::Velocity)?[local] = v;
            }
        }
        self.aux.v_clear(VecId::Force)?;
        Ok(())
    }

    /// Accumulate a force on one auxiliary dof.
    pub fn add_force(&mut self, local: usize, force: Vector3<f64>) -> Result<()> {
        let forces = self.aux.vec_mut(VecId::Force)?;
        if let Some(f) = forces.get_mut(local) {
            *f += force;
        }
        Ok(())
    }

    /// Scatter accumulated auxiliary forces back to the source as velocity
    /// impulses (`apply_jt` of the subset relation, divided by the source
    /// masses). Zero-mass dofs are fixed and receive nothing.
    pub fn scatter_impulses(&self, scene: &mut Scene, dt: f64) -> Result<()> {
        let source = scene.state_mut(self.source)?;
        let masses = source.masses().to_vec();
        let aux_forces = self.aux.vec(VecId::Force)?.to_vec();
        let velocities = source.vec_mut(VecId::Velocity)?;
        for (local, &dof) in self.dofs.iter().enumerate() {
            let mass = masses.get(dof).copied().unwrap_or(0.0);
            if mass > 0.0 {
                if let (Some(v), Some(f)) = (velocities.get_mut(dof), aux_forces.get(local)) {
                    *v += f * (dt / mass);
                }
            }
        }
        Ok(())
    }
}

/// A persistent contact between one model pair.
#[derive(Debug)]
pub struct Contact {
    key: PairKey,
    points: Vec<ContactPoint>,
    /// Steps this contact has been alive.
    age: usize,
    /// Total normal impulse applied over the contact's lifetime.
    accumulated_impulse: f64,
    mapper_a: Option<ContactMapper>,
    mapper_b: Option<ContactMapper>,
    fresh: bool,
}

impl Contact {
    fn new(key: PairKey, state_a: Option<StateId>, state_b: Option<StateId>) -> Self {
        Self {
            key,
            points: Vec::new(),
            age: 0,
            accumulated_impulse: 0.0,
            mapper_a: state_a.map(|s| ContactMapper::new(format!("contact{key}.a"), s, Vec::new())),
            mapper_b: state_b.map(|s| ContactMapper::new(format!("contact{key}.b"), s, Vec::new())),
            fresh: false,
        }
    }

    /// The pair identity.
    #[must_use]
    pub fn key(&self) -> PairKey {
        self.key
    }

    /// Current contact points.
    #[must_use]
    pub fn points(&self) -> &[ContactPoint] {
        &self.points
    }

    /// Steps this contact has persisted.
    #[must_use]
    pub fn age(&self) -> usize {
        self.age
    }

    /// Total normal impulse applied while this contact has been alive.
    #[must_use]
    pub fn accumulated_impulse(&self) -> f64 {
        self.accumulated_impulse
    }

    /// The mapper for the first model's state, if dof-anchored.
    #[must_use]
    pub fn mapper_a(&self) -> Option<&ContactMapper> {
        self.mapper_a.as_ref()
    }

    /// The mapper for the second model's state, if dof-anchored.
    #[must_use]
    pub fn mapper_b(&self) -> Option<&ContactMapper> {
        self.mapper_b.as_ref()
    }

    fn refresh(&mut self, points: Vec<ContactPoint>) {
        // Rebind the mappers when the contact dof set changes.
        let dofs_a = collect_dofs(&points, |p| p.dof_a);
        let dofs_b = collect_dofs(&points, |p| p.dof_b);
        if let Some(mapper) = &mut self.mapper_a {
            if mapper.dofs != dofs_a {
                *mapper = ContactMapper::new(
                    format!("contact{}.a", self.key),
                    mapper.source,
                    dofs_a,
                );
            }
        }
        if let Some(mapper) = &mut self.mapper_b {
            if mapper.dofs != dofs_b {
                *mapper = ContactMapper::new(
                    format!("contact{}.b", self.key),
                    mapper.source,
                    dofs_b,
                );
            }
        }
        self.points = points;
        self.age += 1;
        self.fresh = true;
    }

    fn apply_response(
        &mut self,
        scene: &mut Scene,
        params: &ResponseParams,
        dt: f64,
    ) -> Result<()> {
        if let Some(mapper) = &mut self.mapper_a {
            mapper.update_from_source(scene)?;
        }
        if let Some(mapper) = &mut self.mapper_b {
            mapper.update_from_source(scene)?;
        }

        for point in &self.points {
            let velocity_a = dof_velocity(self.mapper_a.as_ref(), point.dof_a);
            let velocity_b = dof_velocity(self.mapper_b.as_ref(), point.dof_b);
            // Normal points from b to a; closing speed is how fast a moves
            // into b along it.
            let approach = -(velocity_a - velocity_b).dot(&point.normal);

            let magnitude =
                (params.stiffness * point.depth + params.damping * approach).max(0.0);
            if magnitude == 0.0 {
                continue;
            }
            self.accumulated_impulse += magnitude * dt;

            let force = point.normal * magnitude;
            if let (Some(mapper), Some(dof)) = (&mut self.mapper_a, point.dof_a) {
                if let Some(local) = mapper.local_index(dof) {
                    mapper.add_force(local, force)?;
                }
            }
            if let (Some(mapper), Some(dof)) = (&mut self.mapper_b, point.dof_b) {
                if let Some(local) = mapper.local_index(dof) {
                    mapper.add_force(local, -force)?;
                }
            }
        }

        if let Some(mapper) = &self.mapper_a {
            mapper.scatter_impulses(scene, dt)?;
        }
        if let Some(mapper) = &self.mapper_b {
            mapper.scatter_impulses(scene, dt)?;
        }
        Ok(())
    }
}

fn collect_dofs<F: Fn(&ContactPoint) -> Option<usize>>(
    points: &[ContactPoint],
    f: F,
) -> Vec<usize> {
    let mut dofs: Vec<usize> = points.iter().filter_map(f).collect();
    dofs.sort_unstable();
    dofs.dedup();
    dofs
}

fn dof_velocity(mapper: Option<&ContactMapper>, dof: Option<usize>) -> Vector3<f64> {
    let Some((mapper, dof)) = mapper.zip(dof) else {
        return Vector3::zeros();
    };
    mapper
        .local_index(dof)
        .and_then(|local| {
            mapper
                .state()
                .vec(VecId::Velocity)
                .ok()
                .and_then(|v| v.get(local).copied())
        })
        .unwrap_or_else(Vector3::zeros)
}

/// Creates, updates, and tears down contacts by pair identity.
#[derive(Debug, Default)]
pub struct ContactManager {
    contacts: HashMap<PairKey, Contact>,
    params: ResponseParams,
}

impl ContactManager {
    /// Create a manager with the given response parameters.
    #[must_use]
    pub fn new(params: ResponseParams) -> Self {
        Self {
            contacts: HashMap::new(),
            params,
        }
    }

    /// The response parameters.
    #[must_use]
    pub fn params(&self) -> &ResponseParams {
        &self.params
    }

    /// Number of live contacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    /// Whether there are no live contacts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// Look up a contact by pair identity.
    #[must_use]
    pub fn get(&self, key: PairKey) -> Option<&Contact> {
        self.contacts.get(&key)
    }

    /// Iterate live contacts.
    pub fn contacts(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.values()
    }

    /// Mark every contact stale before detection refreshes the survivors.
    pub fn begin_step(&mut self) {
        for contact in self.contacts.values_mut() {
            contact.fresh = false;
        }
    }

    /// Create or refresh the contact for a pair from this step's
    /// narrow-phase output.
    pub fn update(
        &mut self,
        key: PairKey,
        points: Vec<ContactPoint>,
        state_a: Option<StateId>,
        state_b: Option<StateId>,
    ) {
        self.contacts
            .entry(key)
            .or_insert_with(|| Contact::new(key, state_a, state_b))
            .refresh(points);
    }

    /// Tear down contacts whose pair no longer appears. Returns the
    /// removed pair keys.
    pub fn end_step(&mut self) -> Vec<PairKey> {
        let stale: Vec<PairKey> = self
            .contacts
            .values()
            .filter(|c| !c.fresh)
            .map(|c| c.key)
            .collect();
        for key in &stale {
            debug!(%key, "contact pair separated, tearing down");
            self.contacts.remove(key);
        }
        stale
    }

    /// Apply the penalty response of every live contact.
    pub fn apply_responses(&mut self, scene: &mut Scene, dt: f64) -> Result<()> {
        let params = self.params;
        for contact in self.contacts.values_mut() {
            contact.apply_response(scene, &params, dt)?;
        }
        Ok(())
    }
}
