//! Event propagation.
//!
//! Events are opaque payloads pushed top-down through the scene graph. A
//! listener may mark the event handled, which stops propagation into the
//! current subtree (the traversal prunes). Objects reachable through
//! several slave paths are visited at most once per traversal: the visited
//! set is keyed by arena index, not by pointer identity.

use std::collections::HashSet;

use scene_types::{NodeId, ObjectId};
use tracing::trace;

use crate::{Scene, VisitResult, Visitor};

/// What an event announces.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// A simulation step is about to run.
    AnimateBegin {
        /// Step size in seconds.
        dt: f64,
    },
    /// A simulation step has completed.
    AnimateEnd {
        /// Step size in seconds.
        dt: f64,
    },
    /// Collision detection is about to run.
    CollisionBegin,
    /// Collision response has been created.
    CollisionEnd,
    /// Application-defined payload.
    Custom(String),
}

/// An event with its handled flag.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    kind: EventKind,
    handled: bool,
}

impl Event {
    /// Create an unhandled event.
    #[must_use]
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            handled: false,
        }
    }

    /// The event payload.
    #[must_use]
    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// Whether a listener claimed this event.
    #[must_use]
    pub fn is_handled(&self) -> bool {
        self.handled
    }

    /// Claim the event, stopping propagation into the current subtree.
    pub fn set_handled(&mut self) {
        self.handled = true;
    }
}

/// Top-down event propagation traversal.
///
/// Per node, the attached listeners are invoked in insertion order, each
/// followed by its slave objects (depth-first over slave edges). The
/// per-traversal visited set guarantees each object handles the event at
/// most once even when reachable through multiple masters.
pub struct PropagateEventVisitor {
    event: Event,
    visited: HashSet<ObjectId>,
}

impl PropagateEventVisitor {
    /// Create a propagation traversal for an event.
    #[must_use]
    pub fn new(event: Event) -> Self {
        Self {
            event,
            visited: HashSet::new(),
        }
    }

    /// The event being propagated.
    #[must_use]
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Consume the traversal, returning the event.
    #[must_use]
    pub fn into_event(self) -> Event {
        self.event
    }

    fn visit_object(&mut self, scene: &mut Scene, object: ObjectId) {
        if !self.visited.insert(object) {
            trace!(%object, "already visited through another path, skipping");
            return;
        }
        if scene.dispatch_event(object, &mut self.event).is_err() {
            // A dangling slave edge; nothing to deliver to.
            return;
        }
        let slaves = scene.slaves(object).to_vec();
        for slave in slaves {
            self.visit_object(scene, slave);
        }
    }
}

impl Visitor for PropagateEventVisitor {
    fn name(&self) -> &'static str {
        "propagateEvent"
    }

    fn top_down(&mut self, scene: &mut Scene, node: NodeId) -> VisitResult {
        let listeners = match scene.node(node) {
            Ok(n) => n.listeners().to_vec(),
            Err(_) => return VisitResult::Prune,
        };
        for object in listeners {
            self.visit_object(scene, object);
            if self.event.is_handled() {
                return VisitResult::Prune;
            }
        }
        VisitResult::Continue
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::EventListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingListener {
        name: String,
        count: Arc<AtomicUsize>,
        handle: bool,
    }

    impl EventListener for CountingListener {
        fn name(&self) -> &str {
            &self.name
        }

        fn handle_event(&mut self, event: &mut Event) {
            self.count.fetch_add(1, Ordering::SeqCst);
            if self.handle {
                event.set_handled();
            }
        }
    }

    fn listener(name: &str, count: &Arc<AtomicUsize>, handle: bool) -> Box<CountingListener> {
        Box::new(CountingListener {
            name: name.into(),
            count: Arc::clone(count),
            handle,
        })
    }

    #[test]
    fn test_event_reaches_all_listeners() {
        let mut scene = Scene::new();
        let a = scene.add_child(scene.root(), "a").unwrap();
        let b = scene.add_child(scene.root(), "b").unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        scene.attach_listener(a, listener("la", &count, false)).unwrap();
        scene.attach_listener(b, listener("lb", &count, false)).unwrap();

        let mut visitor = PropagateEventVisitor::new(Event::new(EventKind::CollisionBegin));
        scene.execute(&mut visitor);

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(!visitor.event().is_handled());
    }

    #[test]
    fn test_handled_event_prunes_subtree() {
        let mut scene = Scene::new();
        let a = scene.add_child(scene.root(), "a").unwrap();
        let child = scene.add_child(a, "child").unwrap();
        let sibling = scene.add_child(scene.root(), "sibling").unwrap();

        let handled_count = Arc::new(AtomicUsize::new(0));
        let child_count = Arc::new(AtomicUsize::new(0));
        let sibling_count = Arc::new(AtomicUsize::new(0));

        scene
            .attach_listener(a, listener("handler", &handled_count, true))
            .unwrap();
        scene
            .attach_listener(child, listener("child", &child_count, false))
            .unwrap();
        scene
            .attach_listener(sibling, listener("sibling", &sibling_count, false))
            .unwrap();

        let mut visitor =
            PropagateEventVisitor::new(Event::new(EventKind::AnimateBegin { dt: 0.01 }));
        scene.execute(&mut visitor);

        assert_eq!(handled_count.load(Ordering::SeqCst), 1);
        // Subtree below the handling node was pruned.
        assert_eq!(child_count.load(Ordering::SeqCst), 0);
        // Siblings outside the pruned subtree still receive the event.
        assert_eq!(sibling_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_object_visited_once_through_multiple_slave_paths() {
        let mut scene = Scene::new();
        let a = scene.add_child(scene.root(), "a").unwrap();

        let master_count = Arc::new(AtomicUsize::new(0));
        let shared_count = Arc::new(AtomicUsize::new(0));

        // Two masters attached to the node, one shared slave reachable
        // from both.
        let m1 = scene
            .attach_listener(a, listener("m1", &master_count, false))
            .unwrap();
        let m2 = scene
            .attach_listener(a, listener("m2", &master_count, false))
            .unwrap();
        let shared = scene.register_slave_object(listener("shared", &shared_count, false));
        scene.add_slave(m1, shared).unwrap();
        scene.add_slave(m2, shared).unwrap();

        let mut visitor = PropagateEventVisitor::new(Event::new(EventKind::CollisionEnd));
        scene.execute(&mut visitor);

        assert_eq!(master_count.load(Ordering::SeqCst), 2);
        assert_eq!(
            shared_count.load(Ordering::SeqCst),
            1,
            "object reachable via two slave paths must be visited exactly once"
        );
    }

    #[test]
    fn test_slave_chains_are_followed() {
        let mut scene = Scene::new();
        let a = scene.add_child(scene.root(), "a").unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let m = scene.attach_listener(a, listener("m", &count, false)).unwrap();
        let s1 = scene.register_slave_object(listener("s1", &count, false));
        let s2 = scene.register_slave_object(listener("s2", &count, false));
        scene.add_slave(m, s1).unwrap();
        scene.add_slave(s1, s2).unwrap();

        let mut visitor = PropagateEventVisitor::new(Event::new(EventKind::CollisionBegin));
        scene.execute(&mut visitor);

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
