//! Collision groups (simulation islands).
//!
//! The optional group-manager stage merges states linked by live contacts
//! into islands, so solvers that assemble per-island systems work on the
//! smallest clusters possible. Detection is a union-find over the contact
//! graph. When the stage is disabled the pipeline treats the whole scene
//! as one island.

use hashbrown::HashMap;
use scene_types::StateId;

use crate::contact::PairKey;

/// One island: states connected through live contacts.
#[derive(Debug, Clone)]
pub struct Island {
    /// States in this island, sorted for determinism.
    pub states: Vec<StateId>,
    /// Contact pairs belonging to this island.
    pub pairs: Vec<PairKey>,
}

/// Result of island detection over the live contacts.
#[derive(Debug, Clone, Default)]
pub struct CollisionGroups {
    islands: Vec<Island>,
    state_to_island: HashMap<StateId, usize>,
}

impl CollisionGroups {
    /// Build islands from `(pair, state_a, state_b)` tuples of the live
    /// contacts. Static geometry (no state) never merges islands.
    #[must_use]
    pub fn build(contacts: &[(PairKey, Option<StateId>, Option<StateId>)]) -> Self {
        let mut state_index: HashMap<StateId, usize> = HashMap::new();
        for (_, a, b) in contacts {
            for state in [a, b].into_iter().flatten() {
                let next = state_index.len();
                state_index.entry(*state).or_insert(next);
            }
        }

        let mut union_find = UnionFind::new(state_index.len());
        for (_, a, b) in contacts {
            if let (Some(a), Some(b)) = (a, b) {
                if let (Some(&ia), Some(&ib)) = (state_index.get(a), state_index.get(b)) {
                    union_find.union(ia, ib);
                }
            }
        }

        let mut root_to_island: HashMap<usize, usize> = HashMap::new();
        let mut islands: Vec<Island> = Vec::new();
        let mut state_to_island: HashMap<StateId, usize> = HashMap::new();

        let mut states: Vec<(StateId, usize)> =
            state_index.iter().map(|(&s, &i)| (s, i)).collect();
        states.sort_by_key(|&(s, _)| s);

        for (state, index) in states {
            let root = union_find.find(index);
            let island_index = *root_to_island.entry(root).or_insert_with(|| {
                islands.push(Island {
                    states: Vec::new(),
                    pairs: Vec::new(),
                });
                islands.len() - 1
            });
            islands[island_index].states.push(state);
            state_to_island.insert(state, island_index);
        }

        for &(pair, a, b) in contacts {
            let island = a
                .or(b)
                .and_then(|state| state_to_island.get(&state).copied());
            if let Some(island) = island {
                islands[island].pairs.push(pair);
            }
        }

        Self {
            islands,
            state_to_island,
        }
    }

    /// Number of islands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.islands.len()
    }

    /// Whether no islands were detected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.islands.is_empty()
    }

    /// The detected islands.
    #[must_use]
    pub fn islands(&self) -> &[Island] {
        &self.islands
    }

    /// Island index of a state, if it touches any contact.
    #[must_use]
    pub fn island_of(&self, state: StateId) -> Option<usize> {
        self.state_to_island.get(&state).copied()
    }

    /// Whether two states interact through the contact graph.
    #[must_use]
    pub fn same_island(&self, a: StateId, b: StateId) -> bool {
        match (self.island_of(a), self.island_of(b)) {
            (Some(ia), Some(ib)) => ia == ib,
            _ => false,
        }
    }
}

/// Union-find with path compression and union by rank.
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, x: usize, y: usize) {
        let root_x = self.find(x);
        let root_y = self.find(y);
        if root_x == root_y {
            return;
        }
        match self.rank[root_x].cmp(&self.rank[root_y]) {
            std::cmp::Ordering::Less => self.parent[root_x] = root_y,
            std::cmp::Ordering::Greater => self.parent[root_y] = root_x,
            std::cmp::Ordering::Equal => {
                self.parent[root_y] = root_x;
                self.rank[root_x] += 1;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use scene_types::ModelId;

    fn key(a: u32, b: u32) -> PairKey {
        PairKey::new(ModelId::new(a), ModelId::new(b))
    }

    #[test]
    fn test_two_disjoint_islands() {
        let contacts = vec![
            (key(0, 1), Some(StateId::new(0)), Some(StateId::new(1))),
            (key(2, 3), Some(StateId::new(2)), Some(StateId::new(3))),
        ];
        let groups = CollisionGroups::build(&contacts);

        assert_eq!(groups.len(), 2);
        assert!(groups.same_island(StateId::new(0), StateId::new(1)));
        assert!(groups.same_island(StateId::new(2), StateId::new(3)));
        assert!(!groups.same_island(StateId::new(0), StateId::new(2)));
    }

    #[test]
    fn test_chain_merges_into_one_island() {
        let contacts = vec![
            (key(0, 1), Some(StateId::new(0)), Some(StateId::new(1))),
            (key(1, 2), Some(StateId::new(1)), Some(StateId::new(2))),
        ];
        let groups = CollisionGroups::build(&contacts);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups.islands()[0].states.len(), 3);
        assert_eq!(groups.islands()[0].pairs.len(), 2);
    }

    #[test]
    fn test_static_contact_does_not_merge() {
        // Two bodies each touching the static ground stay separate.
        let contacts = vec![
            (key(0, 9), Some(StateId::new(0)), None),
            (key(1, 9), Some(StateId::new(1)), None),
        ];
        let groups = CollisionGroups::build(&contacts);
        assert_eq!(groups.len(), 2);
        assert!(!groups.same_island(StateId::new(0), StateId::new(1)));
    }

    #[test]
    fn test_empty_contacts() {
        let groups = CollisionGroups::build(&[]);
        assert!(groups.is_empty());
        assert!(groups.island_of(StateId::new(0)).is_none());
    }
}
