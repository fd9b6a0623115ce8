use log::info;
use std::collections::HashMap;

use crate::graph::{ClassGraph, MethodId};
use crate::overrides::Overrides;

/// Disjoint-set forest with path compression and union by rank.
#[derive(Debug, Clone)]
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    fn find(&mut self, item: usize) -> usize {
        let mut root = item;
        while self.parent[root] != root {
            root = self.parent[root];
        }

        let mut current = item;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return;
        }

        match self.rank[root_a].cmp(&self.rank[root_b]) {
            std::cmp::Ordering::Less => self.parent[root_a] = root_b,
            std::cmp::Ordering::Greater => self.parent[root_b] = root_a,
            std::cmp::Ordering::Equal => {
                self.parent[root_b] = root_a;
                self.rank[root_a] += 1;
            }
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct EquivalenceId(usize);

impl EquivalenceId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Partition of all methods into groups that must share one generated name.
///
/// Every method belongs to exactly one group; methods that neither override
/// nor are overridden form singleton groups.
#[derive(Debug, Clone)]
pub struct EquivalenceClasses {
    class_of: Vec<EquivalenceId>,
    members: Vec<Vec<MethodId>>,
}

impl EquivalenceClasses {
    pub fn build(graph: &ClassGraph, overrides: &Overrides) -> Self {
        let mut sets = UnionFind::new(graph.method_count());

        for method_id in graph.method_ids() {
            if graph.method(method_id).is_initializer() {
                continue;
            }
            for &overridden in overrides.of(method_id) {
                sets.union(method_id.index(), overridden.index());
            }
        }

        let mut root_to_class: HashMap<usize, EquivalenceId> = HashMap::new();
        let mut class_of = Vec::with_capacity(graph.method_count());
        let mut members: Vec<Vec<MethodId>> = Vec::new();

        for method_id in graph.method_ids() {
            let root = sets.find(method_id.index());
            let class = *root_to_class.entry(root).or_insert_with(|| {
                members.push(Vec::new());
                EquivalenceId(members.len() - 1)
            });
            class_of.push(class);
            members[class.0].push(method_id);
        }

        let shared = members.iter().filter(|group| group.len() > 1).count();
        info!(
            "equivalence classes: {} total, {} shared by more than one method",
            members.len(),
            shared
        );
        Self { class_of, members }
    }

    pub fn class_of(&self, method: MethodId) -> EquivalenceId {
        self.class_of[method.index()]
    }

    /// Members of a group, sorted by method id.
    pub fn members(&self, class: EquivalenceId) -> &[MethodId] {
        &self.members[class.0]
    }

    pub fn ids(&self) -> impl Iterator<Item = EquivalenceId> {
        (0..self.members.len()).map(EquivalenceId)
    }
}
