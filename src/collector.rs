//! Container collection and dependency analysis

use crate::graph::DependencyGraph;
use crate::registry::{
    ComponentDefinition, ContainerKind, ControllerDefinition, FactoryDefinition, RecordPayload,
    Registry, TypeKey,
};
use ahash::{AHashMap, AHashSet};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

/// The three buckets a registry scan produces: plain components,
/// controllers, and factories grouped by their owning parent type.
#[derive(Default)]
pub struct CollectedContainers {
    pub components: AHashMap<TypeKey, Arc<ComponentDefinition>>,
    pub controllers: AHashMap<TypeKey, Arc<ControllerDefinition>>,
    pub factories: AHashMap<TypeKey, Vec<Arc<FactoryDefinition>>>,
}

impl CollectedContainers {
    /// Every type a factory declares as its return type. Factory-produced
    /// types are first-class dependency targets.
    pub fn factory_produced_types(&self) -> AHashSet<TypeKey> {
        self.factories
            .values()
            .flatten()
            .map(|f| f.produces())
            .collect()
    }

    fn is_known(&self, key: &TypeKey, produced: &AHashSet<TypeKey>) -> bool {
        self.components.contains_key(key)
            || self.controllers.contains_key(key)
            || produced.contains(key)
    }
}

/// Scans the registry and classifies every registered target.
pub struct ContainerCollector;

impl ContainerCollector {
    /// Classify all records into the three buckets, then run a second scan
    /// discovering factory records nested inside component records and
    /// grouping them under their owning class.
    pub fn collect_containers(registry: &Registry) -> CollectedContainers {
        let mut collected = CollectedContainers::default();

        for target in registry.targets() {
            for record in registry.records_for(target) {
                match record.payload() {
                    RecordPayload::Component(def) => {
                        collected.components.insert(*target, Arc::clone(def));
                    }
                    RecordPayload::Controller(def) => {
                        collected.controllers.insert(*target, Arc::clone(def));
                    }
                    RecordPayload::Factory(def) => {
                        collected
                            .factories
                            .entry(def.parent())
                            .or_default()
                            .push(Arc::clone(def));
                    }
                    RecordPayload::Handler(_) => {}
                }
            }
        }

        Self::collect_nested_factories(registry, &mut collected);

        #[cfg(feature = "logging")]
        debug!(
            target: "trellis",
            components = collected.components.len(),
            controllers = collected.controllers.len(),
            factory_parents = collected.factories.len(),
            "Collected container records"
        );

        collected
    }

    /// Factory methods declared as members of collected component classes
    /// live as child records of the component record.
    fn collect_nested_factories(registry: &Registry, collected: &mut CollectedContainers) {
        let component_keys: Vec<TypeKey> = collected.components.keys().copied().collect();

        for key in component_keys {
            for record in registry.records_for(&key) {
                if record.kind() != ContainerKind::Component {
                    continue;
                }
                for child in record.children() {
                    let RecordPayload::Factory(def) = child.payload() else {
                        continue;
                    };
                    let bucket = collected.factories.entry(def.parent()).or_default();
                    if bucket.iter().any(|f| f.produces() == def.produces()) {
                        continue;
                    }
                    bucket.push(Arc::clone(def));
                }
            }
        }
    }
}

/// Populates the dependency graph from the collected containers.
pub struct DependencyAnalyzer;

impl DependencyAnalyzer {
    /// Add an edge for every declared dependency that resolves to a known
    /// component, controller, or factory-produced type. Factory edges hang
    /// off the factory's return type, not its parent, so factory-produced
    /// singletons order correctly relative to what they consume.
    pub fn analyze_dependencies(collected: &CollectedContainers, graph: &mut DependencyGraph) {
        let produced = collected.factory_produced_types();

        for (key, def) in &collected.components {
            for dep in def.dependencies() {
                if collected.is_known(&dep, &produced) {
                    graph.add_dependency(*key, dep);
                }
            }
        }

        for (key, def) in &collected.controllers {
            for dep in def.dependencies() {
                if collected.is_known(&dep, &produced) {
                    graph.add_dependency(*key, dep);
                }
            }
        }

        for factory_list in collected.factories.values() {
            for factory in factory_list {
                for dep in factory.dependencies() {
                    if collected.is_known(dep, &produced) {
                        graph.add_dependency(factory.produces(), *dep);
                    }
                }
            }
        }
    }
}
