//! The container manager: orchestration and query surface

use crate::collector::{CollectedContainers, ContainerCollector, DependencyAnalyzer};
use crate::error::StartupResult;
use crate::graph::DependencyGraph;
use crate::initializer::ComponentInitializer;
use crate::instances::InstanceRegistry;
use crate::registry::{ComponentDefinition, ControllerDefinition, Registry, TypeKey};
use std::any::Any;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

/// Container looked up through [`ContainerManager::get_container`].
#[derive(Debug, Clone)]
pub enum ManagedContainer {
    Component(Arc<ComponentDefinition>),
    Controller(Arc<ControllerDefinition>),
}

/// A controller ready for route registration: its key, definition, and
/// initialized singleton.
#[derive(Clone)]
pub struct ControllerEntry {
    pub key: TypeKey,
    pub definition: Arc<ControllerDefinition>,
    pub instance: Arc<dyn Any + Send + Sync>,
}

/// Orchestrates the whole initialization process and stores the results.
///
/// Actual work is delegated to the responsibility classes:
/// [`ContainerCollector`] gathers records, [`DependencyAnalyzer`] builds
/// the graph, [`ComponentInitializer`] constructs singletons, and the
/// interceptor resolver wires handler interceptors afterwards.
///
/// After [`initialize`](Self::initialize) returns, the instance registry
/// is treated as read-only; concurrent lookups during request handling
/// need no locking.
pub struct ContainerManager {
    collected: CollectedContainers,
    instances: InstanceRegistry,
    graph: DependencyGraph,
}

impl ContainerManager {
    pub fn new() -> Self {
        Self {
            collected: CollectedContainers::default(),
            instances: InstanceRegistry::new(),
            graph: DependencyGraph::new(),
        }
    }

    /// Collect every container record the registry holds.
    ///
    /// The caller is responsible for having registered everything first;
    /// how targets were described is of no concern here.
    pub fn component_scan(&mut self, registry: &Registry) {
        self.collected = ContainerCollector::collect_containers(registry);
    }

    /// Analyze dependencies, compute the construction order, initialize
    /// every singleton, then resolve handler interceptors.
    ///
    /// Fails fast: graph and construction errors abort startup and are
    /// never caught internally.
    pub fn initialize(&mut self) -> StartupResult<()> {
        DependencyAnalyzer::analyze_dependencies(&self.collected, &mut self.graph);

        let sorted_types = self.graph.topological_sort()?;

        #[cfg(feature = "logging")]
        debug!(
            target: "trellis",
            ordered = sorted_types.len(),
            components = self.collected.components.len(),
            controllers = self.collected.controllers.len(),
            "Construction order computed"
        );

        ComponentInitializer::initialize_components(
            &sorted_types,
            &self.collected,
            &self.instances,
        )?;

        self.resolve_handler_interceptors();

        Ok(())
    }

    /// Resolve pending interceptor classes on every handler descriptor,
    /// injecting their field dependencies from the known components.
    fn resolve_handler_interceptors(&self) {
        for controller in self.collected.controllers.values() {
            for descriptor in controller.handlers() {
                if descriptor.interceptors_resolved() {
                    continue;
                }
                let resolved = descriptor
                    .pending_interceptors()
                    .iter()
                    .map(|def| def.resolve(&self.collected.components, &self.instances))
                    .collect();
                descriptor.publish_interceptors(resolved);
            }
        }
    }

    // ========== query API ==========

    /// The container describing a type, if it is managed.
    pub fn get_container(&self, key: &TypeKey) -> Option<ManagedContainer> {
        if let Some(def) = self.collected.components.get(key) {
            return Some(ManagedContainer::Component(Arc::clone(def)));
        }
        if let Some(def) = self.collected.controllers.get(key) {
            return Some(ManagedContainer::Controller(Arc::clone(def)));
        }
        None
    }

    /// The managed singleton of a type, if one was constructed.
    #[inline]
    pub fn get_instance<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.instances.get::<T>()
    }

    /// The instance registry itself.
    pub fn instances(&self) -> &InstanceRegistry {
        &self.instances
    }

    /// Every controller that ended up with an instance, ready for route
    /// registration.
    pub fn get_controllers(&self) -> Vec<ControllerEntry> {
        let mut entries: Vec<ControllerEntry> = self
            .collected
            .controllers
            .iter()
            .filter_map(|(key, definition)| {
                self.instances.get_raw(key).map(|instance| ControllerEntry {
                    key: *key,
                    definition: Arc::clone(definition),
                    instance,
                })
            })
            .collect();
        // Stable listing regardless of map iteration order
        entries.sort_by_key(|e| e.definition.base_path().to_string());
        entries
    }
}

impl Default for ContainerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ContainerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerManager")
            .field("components", &self.collected.components.len())
            .field("controllers", &self.collected.controllers.len())
            .field("instances", &self.instances.len())
            .finish()
    }
}
