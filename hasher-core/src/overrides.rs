use log::info;
use std::collections::{BTreeSet, HashSet, VecDeque};

use crate::graph::{ClassGraph, ClassId, ClassNode, MethodId, MethodNode};

/// For every method, the set of methods it directly or transitively overrides.
///
/// Computed once over the whole graph; static, private and initializer
/// methods always have an empty set.
#[derive(Debug, Clone)]
pub struct Overrides {
    by_method: Vec<Vec<MethodId>>,
}

impl Overrides {
    pub fn resolve(graph: &ClassGraph) -> Self {
        let mut by_method = vec![Vec::new(); graph.method_count()];
        let mut overriding = 0usize;

        // Supertypes come first in the arena, so every candidate consulted
        // below already has its own set filled in.
        for class_id in graph.class_ids() {
            for &method_id in &graph.class(class_id).methods {
                let found = resolve_method(graph, &by_method, method_id);
                if !found.is_empty() {
                    overriding += 1;
                }
                by_method[method_id.index()] = found;
            }
        }

        info!(
            "override resolution: {} of {} methods override another method",
            overriding,
            graph.method_count()
        );
        Self { by_method }
    }

    /// Overridden methods, sorted by id.
    pub fn of(&self, method: MethodId) -> &[MethodId] {
        &self.by_method[method.index()]
    }
}

fn resolve_method(graph: &ClassGraph, resolved: &[Vec<MethodId>], method_id: MethodId) -> Vec<MethodId> {
    let method = graph.method(method_id);
    if method.is_static() || method.is_private() || method.is_initializer() {
        return Vec::new();
    }

    let owner = graph.class(method.owner);
    let mut found = BTreeSet::new();
    let mut visited: HashSet<ClassId> = HashSet::new();
    let mut queue: VecDeque<ClassId> = owner.supers.iter().copied().collect();

    while let Some(class_id) = queue.pop_front() {
        if !visited.insert(class_id) {
            continue;
        }

        let class = graph.class(class_id);
        if let Some(candidate) = class.method_by_signature(&method.name, &method.descriptor) {
            if can_override(owner, class, graph.method(candidate)) {
                found.insert(candidate);
                found.extend(resolved[candidate.index()].iter().copied());
                // This branch is settled; the candidate's own set covers
                // everything above it.
                continue;
            }
        }

        // Private or foreign package-private methods do not hide anything
        // further up, keep climbing.
        queue.extend(class.supers.iter().copied());
    }

    found.into_iter().collect()
}

fn can_override(owner: &ClassNode, candidate_owner: &ClassNode, candidate: &MethodNode) -> bool {
    if candidate.is_static() || candidate.is_private() {
        return false;
    }
    candidate.is_public() || candidate.is_protected() || owner.package() == candidate_owner.package()
}
