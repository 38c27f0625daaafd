//! Arena index newtypes for the scene graph.
//!
//! The scene graph is a DAG stored in arenas; every cross-reference is a
//! stable index wrapped in one of these newtypes. Identity comparisons and
//! visited-sets are keyed by index, never by pointer.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

macro_rules! arena_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        pub struct $name(pub u32);

        impl $name {
            /// Create an id from a raw index.
            #[must_use]
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// The raw index value.
            #[must_use]
            pub const fn raw(self) -> u32 {
                self.0
            }

            /// The index as a usize, for arena lookups.
            #[must_use]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

arena_id! {
    /// Index of a node in the scene graph arena.
    NodeId
}

arena_id! {
    /// Index of an attached behavior object (event listener, slave object).
    ObjectId
}

arena_id! {
    /// Index of a mechanical state in the state arena.
    StateId
}

arena_id! {
    /// Index of a collision model.
    ModelId
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_id_roundtrip() {
        let id = NodeId::new(7);
        assert_eq!(id.raw(), 7);
        assert_eq!(id.index(), 7);
        assert_eq!(id, NodeId(7));
    }

    #[test]
    fn test_ids_are_ordered() {
        assert!(StateId::new(1) < StateId::new(2));
    }

    #[test]
    fn test_display() {
        assert_eq!(ModelId::new(3).to_string(), "ModelId(3)");
    }
}
