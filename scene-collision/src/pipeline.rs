//! The pipeline orchestrator.
//!
//! Owns exactly one broad phase, one narrow phase (with its intersection
//! strategy), one contact manager, and an optional group manager, and runs
//! them strictly in stage order each step. Detection failures are
//! stage-local: the offending pair is dropped with a diagnostic and the
//! step continues.

use scene_graph::{Scene, VisitResult, Visitor};
use scene_types::{ModelId, NodeId, ShapeKind, StateId};
use tracing::{debug, warn};

use crate::broad::{BroadPhaseConfig, BroadPhaseDetector, BroadPhaseEntry};
use crate::contact::{ContactManager, ContactMapper, PairKey, ResponseParams};
use crate::group::CollisionGroups;
use crate::model::CollisionModel;
use crate::narrow::{Intersection, NarrowPhase};
use crate::{PipelineError, Result};

/// Counters reported by one pipeline step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepSummary {
    /// Active models considered.
    pub active_models: usize,
    /// Candidate pairs from the broad phase.
    pub candidate_pairs: usize,
    /// Pairs dropped for degenerate geometry.
    pub dropped_pairs: usize,
    /// Live contacts after response.
    pub contacts: usize,
    /// Contacts torn down this step.
    pub removed_contacts: usize,
    /// Simulation islands (1 when the group manager is disabled).
    pub islands: usize,
}

/// The collision pipeline.
pub struct Pipeline {
    models: Vec<CollisionModel>,
    broad: BroadPhaseDetector,
    narrow: NarrowPhase,
    manager: ContactManager,
    group_manager: bool,
    groups: CollisionGroups,
    registered_on: Option<NodeId>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// Create a pipeline with default stages: auto broad phase, discrete
    /// intersection, default penalty response, no group manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            models: Vec::new(),
            broad: BroadPhaseDetector::default(),
            narrow: NarrowPhase::default(),
            manager: ContactManager::default(),
            group_manager: false,
            groups: CollisionGroups::default(),
            registered_on: None,
        }
    }

    /// Configure the broad phase.
    #[must_use]
    pub fn with_broad_phase(mut self, config: BroadPhaseConfig) -> Self {
        self.broad = BroadPhaseDetector::new(config);
        self
    }

    /// Swap the intersection strategy.
    #[must_use]
    pub fn with_intersection(mut self, intersection: Box<dyn Intersection>) -> Self {
        self.narrow = NarrowPhase::new(intersection);
        self
    }

    /// Configure the contact response.
    #[must_use]
    pub fn with_response(mut self, params: ResponseParams) -> Self {
        self.manager = ContactManager::new(params);
        self
    }

    /// Enable or disable the group-manager stage.
    #[must_use]
    pub fn with_group_manager(mut self, enabled: bool) -> Self {
        self.group_manager = enabled;
        self
    }

    /// Register this pipeline on a scene node. At most one pipeline is
    /// discoverable per scene; duplicates are rejected.
    pub fn insert_in_node(&mut self, scene: &mut Scene, node: NodeId) -> Result<()> {
        scene.register_pipeline(node)?;
        self.registered_on = Some(node);
        Ok(())
    }

    /// Unregister this pipeline from its node.
    pub fn remove_from_node(&mut self, scene: &mut Scene) -> Result<()> {
        let node = self.registered_on.take().ok_or_else(|| {
            PipelineError::Scene(scene_types::SceneError::PipelineNotRegistered { node: u32::MAX })
        })?;
        scene.unregister_pipeline(node)?;
        Ok(())
    }

    /// The node this pipeline is registered on, if any.
    #[must_use]
    pub fn registered_on(&self) -> Option<NodeId> {
        self.registered_on
    }

    /// Create a collision model bound to a state and attach it to a node.
    pub fn add_model(
        &mut self,
        scene: &mut Scene,
        node: NodeId,
        name: impl Into<String>,
        state: Option<StateId>,
        shape: ShapeKind,
    ) -> Result<ModelId> {
        let id = ModelId::new(self.models.len() as u32);
        let model = CollisionModel::new(id, name, state, shape)?;
        scene.attach_collision_model(node, id)?;
        self.models.push(model);
        Ok(id)
    }

    /// Look up a model.
    pub fn model(&self, id: ModelId) -> Result<&CollisionModel> {
        self.models
            .get(id.index())
            .ok_or(PipelineError::UnknownModel(id.raw()))
    }

    /// Look up a model mutably (to toggle activity).
    pub fn model_mut(&mut self, id: ModelId) -> Result<&mut CollisionModel> {
        self.models
            .get_mut(id.index())
            .ok_or(PipelineError::UnknownModel(id.raw()))
    }

    /// The contact manager.
    #[must_use]
    pub fn contacts(&self) -> &ContactManager {
        &self.manager
    }

    /// Islands from the last step (empty unless the group manager ran).
    #[must_use]
    pub fn groups(&self) -> &CollisionGroups {
        &self.groups
    }

    /// Run one collision step: reset, detect (broad then narrow), respond,
    /// then group.
    pub fn step(&mut self, scene: &mut Scene, dt: f64) -> Result<StepSummary> {
        let mut summary = StepSummary::default();

        // Reset: mark contacts stale, clear last step's groups.
        self.manager.begin_step();
        self.groups = CollisionGroups::default();

        // Detect: gather active models through a traversal, then broad
        // phase over their bounds.
        let mut collector = CollectModelsVisitor { found: Vec::new() };
        scene.execute(&mut collector);

        let margin = self.broad.config().margin;
        let mut entries = Vec::new();
        for id in collector.found {
            let model = self.model(id)?;
            if !model.is_active() {
                continue;
            }
            entries.push(BroadPhaseEntry {
                model: id,
                aabb: model.aabb(scene, margin)?,
                is_static: model.is_static(),
            });
        }
        summary.active_models = entries.len();

        let pairs = self.broad.find_pairs(&entries);
        summary.candidate_pairs = pairs.len();

        // Narrow phase per candidate pair; malformed pairs are dropped,
        // never fatal. Field-level access keeps the contact manager
        // writable while the models are borrowed.
        for (id_a, id_b) in pairs {
            let model_a = self
                .models
                .get(id_a.index())
                .ok_or(PipelineError::UnknownModel(id_a.raw()))?;
            let model_b = self
                .models
                .get(id_b.index())
                .ok_or(PipelineError::UnknownModel(id_b.raw()))?;
            match self.narrow.detect_pair(scene, model_a, model_b) {
                Ok(points) if !points.is_empty() => {
                    self.manager.update(
                        PairKey::new(id_a, id_b),
                        points,
                        model_a.state(),
                        model_b.state(),
                    );
                }
                Ok(_) => {}
                Err(err) if err.is_pair_local() => {
                    warn!(%err, "dropping collision pair");
                    summary.dropped_pairs += 1;
                }
                Err(err) => return Err(err),
            }
        }

        // Respond: tear down separated pairs, then apply penalty responses
        // of the survivors.
        let removed = self.manager.end_step();
        summary.removed_contacts = removed.len();
        self.manager.apply_responses(scene, dt)?;
        summary.contacts = self.manager.len();

        // Group: merge contacting states into islands.
        if self.group_manager {
            let tuples: Vec<(PairKey, Option<StateId>, Option<StateId>)> = self
                .manager
                .contacts()
                .map(|c| {
                    (
                        c.key(),
                        c.mapper_a().map(ContactMapper::source),
                        c.mapper_b().map(ContactMapper::source),
                    )
                })
                .collect();
            self.groups = CollisionGroups::build(&tuples);
            summary.islands = self.groups.len().max(1);
        } else {
            summary.islands = 1;
        }

        debug!(
            active = summary.active_models,
            candidates = summary.candidate_pairs,
            contacts = summary.contacts,
            islands = summary.islands,
            "collision step complete"
        );
        Ok(summary)
    }
}

/// Gathers the collision models attached below the traversal root, in
/// deterministic order.
struct CollectModelsVisitor {
    found: Vec<ModelId>,
}

impl Visitor for CollectModelsVisitor {
    fn name(&self) -> &'static str {
        "collectCollisionModels"
    }

    fn top_down(&mut self, scene: &mut Scene, node: NodeId) -> VisitResult {
        if let Ok(n) = scene.node(node) {
            self.found.extend_from_slice(n.collision_models());
        }
        VisitResult::Continue
    }
}
