//! Dependency graph and topological construction ordering

use crate::error::{StartupError, StartupResult};
use crate::registry::TypeKey;
use ahash::{AHashMap, AHashSet};
use std::collections::VecDeque;

/// Directed dependency graph over container targets.
///
/// An edge `target -> dependency` means the target requires the dependency
/// to exist first. The adjacency map and its transpose are kept as
/// consistent mirror images: whenever A depends on B, B's dependents entry
/// contains A.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: AHashMap<TypeKey, AHashSet<TypeKey>>,
    reverse: AHashMap<TypeKey, AHashSet<TypeKey>>,
    /// First-seen order, so sort output is deterministic.
    order: Vec<TypeKey>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn note(&mut self, node: TypeKey) {
        if !self.graph.contains_key(&node) && !self.reverse.contains_key(&node) {
            self.order.push(node);
        }
    }

    /// Add a node with no edges. Isolated nodes still appear in the sort
    /// output, immediately, since their in-degree is zero.
    pub fn add_node(&mut self, node: TypeKey) {
        self.note(node);
        self.graph.entry(node).or_default();
        self.reverse.entry(node).or_default();
    }

    /// Record that `target` requires `dependency` to exist first.
    pub fn add_dependency(&mut self, target: TypeKey, dependency: TypeKey) {
        self.note(target);
        self.note(dependency);
        self.graph.entry(target).or_default().insert(dependency);
        self.reverse.entry(dependency).or_default().insert(target);
        self.graph.entry(dependency).or_default();
        self.reverse.entry(target).or_default();
    }

    /// All dependencies of a target.
    pub fn dependencies(&self, target: &TypeKey) -> AHashSet<TypeKey> {
        self.graph.get(target).cloned().unwrap_or_default()
    }

    /// All targets depending on `dependency`.
    pub fn dependents(&self, dependency: &TypeKey) -> AHashSet<TypeKey> {
        self.reverse.get(dependency).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Kahn's algorithm: every dependency precedes every dependent.
    ///
    /// A node's in-degree is the size of its own dependency set. Zero
    /// in-degree nodes seed the queue; dequeuing a node decrements the
    /// in-degree of its dependents. If anything remains unvisited, a cycle
    /// exists and the remaining node set is named in the error. Nodes are
    /// never silently dropped.
    pub fn topological_sort(&self) -> StartupResult<Vec<TypeKey>> {
        let mut in_degree: AHashMap<TypeKey, usize> = AHashMap::with_capacity(self.order.len());
        for node in &self.order {
            in_degree.insert(*node, self.graph.get(node).map_or(0, |deps| deps.len()));
        }

        let mut queue: VecDeque<TypeKey> = self
            .order
            .iter()
            .filter(|n| in_degree[*n] == 0)
            .copied()
            .collect();
        let mut result = Vec::with_capacity(self.order.len());

        while let Some(node) = queue.pop_front() {
            result.push(node);

            if let Some(dependents) = self.reverse.get(&node) {
                for dependent in dependents {
                    let degree = in_degree
                        .get_mut(dependent)
                        .expect("transpose references unknown node");
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*dependent);
                    }
                }
            }
        }

        if result.len() != self.order.len() {
            let emitted: AHashSet<TypeKey> = result.iter().copied().collect();
            let mut members: Vec<&'static str> = self
                .order
                .iter()
                .filter(|n| !emitted.contains(*n))
                .map(|n| n.short_name())
                .collect();
            members.sort_unstable();
            return Err(StartupError::CircularDependency { members });
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A;
    struct B;
    struct C;
    struct D;

    fn position(order: &[TypeKey], key: TypeKey) -> usize {
        order
            .iter()
            .position(|k| *k == key)
            .unwrap_or_else(|| panic!("{key} not in sort output"))
    }

    #[test]
    fn dependency_precedes_dependent() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(TypeKey::of::<A>(), TypeKey::of::<B>());

        let order = graph.topological_sort().unwrap();
        assert!(position(&order, TypeKey::of::<B>()) < position(&order, TypeKey::of::<A>()));
    }

    #[test]
    fn diamond_orders_correctly() {
        // D -> B, D -> C, B -> A, C -> A
        let mut graph = DependencyGraph::new();
        graph.add_dependency(TypeKey::of::<D>(), TypeKey::of::<B>());
        graph.add_dependency(TypeKey::of::<D>(), TypeKey::of::<C>());
        graph.add_dependency(TypeKey::of::<B>(), TypeKey::of::<A>());
        graph.add_dependency(TypeKey::of::<C>(), TypeKey::of::<A>());

        let order = graph.topological_sort().unwrap();
        let (a, b, c, d) = (
            position(&order, TypeKey::of::<A>()),
            position(&order, TypeKey::of::<B>()),
            position(&order, TypeKey::of::<C>()),
            position(&order, TypeKey::of::<D>()),
        );
        assert!(a < b && a < c, "A must precede both B and C");
        assert!(b < d && c < d, "both B and C must precede D");
    }

    #[test]
    fn three_cycle_names_exact_members() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(TypeKey::of::<A>(), TypeKey::of::<B>());
        graph.add_dependency(TypeKey::of::<B>(), TypeKey::of::<C>());
        graph.add_dependency(TypeKey::of::<C>(), TypeKey::of::<A>());

        match graph.topological_sort() {
            Err(StartupError::CircularDependency { members }) => {
                let mut expected = vec!["A", "B", "C"];
                expected.sort_unstable();
                assert_eq!(members, expected);
            }
            other => panic!("expected CircularDependency, got {other:?}"),
        }
    }

    #[test]
    fn cycle_plus_clean_node_still_fails() {
        // No partial ordering may ever be returned
        let mut graph = DependencyGraph::new();
        graph.add_dependency(TypeKey::of::<A>(), TypeKey::of::<B>());
        graph.add_dependency(TypeKey::of::<B>(), TypeKey::of::<A>());
        graph.add_node(TypeKey::of::<C>());

        match graph.topological_sort() {
            Err(StartupError::CircularDependency { members }) => {
                assert_eq!(members.len(), 2);
                assert!(!members.contains(&"C"));
            }
            other => panic!("expected CircularDependency, got {other:?}"),
        }
    }

    #[test]
    fn isolated_node_appears_in_output() {
        let mut graph = DependencyGraph::new();
        graph.add_node(TypeKey::of::<A>());
        graph.add_dependency(TypeKey::of::<C>(), TypeKey::of::<B>());

        let order = graph.topological_sort().unwrap();
        assert_eq!(order.len(), 3);
        assert!(order.contains(&TypeKey::of::<A>()));
    }

    #[test]
    fn mirror_invariant_holds() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(TypeKey::of::<A>(), TypeKey::of::<B>());

        assert!(graph.dependencies(&TypeKey::of::<A>()).contains(&TypeKey::of::<B>()));
        assert!(graph.dependents(&TypeKey::of::<B>()).contains(&TypeKey::of::<A>()));
    }
}
