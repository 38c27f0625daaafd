//! Scene-graph mechanical simulation core.
//!
//! This is the umbrella crate: it re-exports the simulation stack and
//! provides the [`Simulation`] step orchestration.
//!
//! One simulation step is one sequential pass of traversals:
//!
//! ```text
//! AnimateBegin event ─► mechanical step (forces, solve, integrate)
//!                    ─► collision pipeline (broad, narrow, response)
//!                    ─► AnimateEnd event
//! ```
//!
//! # Example
//!
//! ```
//! use scene_sim::{Simulation, forces::Gravity};
//! use scene_types::{MechanicalState, SimulationConfig, VecId};
//! use nalgebra::Vector3;
//!
//! let mut sim = Simulation::new(SimulationConfig::default()).unwrap();
//!
//! let root = sim.scene().root();
//! let node = sim.scene_mut().add_child(root, "body").unwrap();
//! let state = sim
//!     .scene_mut()
//!     .attach_state(node, MechanicalState::new("body", vec![Vector3::new(0.0, 0.0, 1.0)]))
//!     .unwrap();
//! let gravity = sim.config().gravity;
//! sim.scene_mut()
//!     .attach_force_field(node, Box::new(Gravity::new(state, gravity)))
//!     .unwrap();
//!
//! sim.run_for(0.1).unwrap();
//! assert!(sim.time() >= 0.1);
//! ```

#![doc(html_root_url = "https://docs.rs/scene-sim/0.3.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::missing_errors_doc, // Error docs added where non-obvious
)]

pub use scene_collision::{Pipeline, StepSummary};
use scene_graph::{Event, EventKind, PropagateEventVisitor, Scene};
use scene_mechanics::Integrator;
use scene_types::SimulationConfig;
use thiserror::Error;
use tracing::trace;

pub use scene_collision as collision;
pub use scene_graph as graph;
pub use scene_mechanics as mechanics;
pub use scene_mechanics::{forces, mapping, projection};
pub use scene_solver as solver;
pub use scene_types as types;

pub use scene_collision::{CollisionModel, ContactManager, PairKey, ResponseParams};
pub use scene_graph::{VisitResult, Visitor};
pub use scene_mechanics::{LinearSolverKind, MechanicalOps};
pub use scene_types::{
    IntegrationMethod, MechanicalState, NodeId, SceneError, ShapeKind, StateId, TagRegistry, VecId,
};

/// Errors from the step orchestration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimulationError {
    /// The mechanical step failed.
    #[error(transparent)]
    Step(#[from] scene_mechanics::StepError),

    /// The collision pipeline failed.
    #[error(transparent)]
    Pipeline(#[from] scene_collision::PipelineError),
}

/// Result type for simulation stepping.
pub type Result<T> = std::result::Result<T, SimulationError>;

/// Owns a scene, an integrator, and a collision pipeline, and advances
/// them one synchronous step at a time.
pub struct Simulation {
    scene: Scene,
    integrator: Integrator,
    pipeline: Pipeline,
    config: SimulationConfig,
    time: f64,
    steps: usize,
}

impl Simulation {
    /// Create a simulation with a fresh scene. The collision pipeline is
    /// registered on the root node.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        Self::with_pipeline(config, Pipeline::new())
    }

    /// Create a simulation with a configured pipeline.
    pub fn with_pipeline(config: SimulationConfig, mut pipeline: Pipeline) -> Result<Self> {
        let mut scene = Scene::new();
        let root = scene.root();
        pipeline.insert_in_node(&mut scene, root)?;
        Ok(Self {
            integrator: Integrator::from_config(&config),
            scene,
            pipeline,
            config,
            time: 0.0,
            steps: 0,
        })
    }

    /// Replace the integrator.
    #[must_use]
    pub fn with_integrator(mut self, integrator: Integrator) -> Self {
        self.integrator = integrator;
        self
    }

    /// The scene.
    #[must_use]
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// The scene, mutably (for building).
    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    /// The collision pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// The collision pipeline, mutably (for adding models).
    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    /// Split access for calls that need the pipeline and the scene at
    /// once, like [`Pipeline::add_model`].
    pub fn pipeline_and_scene(&mut self) -> (&mut Pipeline, &mut Scene) {
        (&mut self.pipeline, &mut self.scene)
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Simulated time in seconds.
    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Steps taken so far.
    #[must_use]
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Advance one step.
    pub fn step(&mut self) -> Result<StepSummary> {
        let dt = self.config.dt;
        let root = self.scene.root();

        self.propagate(EventKind::AnimateBegin { dt });
        self.integrator.step(&mut self.scene, root, dt)?;
        let summary = self.pipeline.step(&mut self.scene, dt)?;
        self.propagate(EventKind::AnimateEnd { dt });

        self.time += dt;
        self.steps += 1;
        trace!(time = self.time, ?summary, "step complete");
        Ok(summary)
    }

    /// Run until at least `duration` seconds of simulated time pass.
    pub fn run_for(&mut self, duration: f64) -> Result<()> {
        let end = self.time + duration;
        while self.time < end {
            self.step()?;
        }
        Ok(())
    }

    fn propagate(&mut self, kind: EventKind) {
        let mut visitor = PropagateEventVisitor::new(Event::new(kind));
        self.scene.execute(&mut visitor);
    }
}
