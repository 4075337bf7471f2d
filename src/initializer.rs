//! Component initialization in topological order

use crate::collector::CollectedContainers;
use crate::error::{StartupError, StartupResult};
use crate::instances::InstanceRegistry;
use crate::registry::{FactoryDefinition, TypeKey};
use ahash::AHashMap;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Walks the construction order and instantiates every managed singleton.
pub struct ComponentInitializer;

impl ComponentInitializer {
    /// Initialization passes, in order:
    ///
    /// 1. Eagerly construct every factory's parent component — factories
    ///    cannot run before their owning instance exists.
    /// 2. Build the reverse index factory-produced-type → (parent, factory).
    /// 3. Walk the sorted types; skip anything already constructed,
    ///    invoke factories for produced types, initialize components and
    ///    controllers with field injection.
    /// 4. Initialize everything the sorted list never visited (zero
    ///    dependencies, no edges) in arbitrary order: remaining factory
    ///    singletons first, then components and controllers.
    ///
    /// Every managed type ends with exactly one entry in the instance
    /// registry; presence there is checked before any initialize call.
    pub fn initialize_components(
        sorted_types: &[TypeKey],
        collected: &CollectedContainers,
        instances: &InstanceRegistry,
    ) -> StartupResult<()> {
        Self::initialize_factory_parents(collected, instances);

        let produced_index = Self::build_produced_index(collected);

        Self::initialize_sorted_types(sorted_types, collected, &produced_index, instances)?;

        Self::initialize_remaining(collected, &produced_index, instances)?;

        #[cfg(feature = "logging")]
        debug!(
            target: "trellis",
            instance_count = instances.len(),
            "Component initialization complete"
        );

        Ok(())
    }

    fn initialize_factory_parents(collected: &CollectedContainers, instances: &InstanceRegistry) {
        for parent in collected.factories.keys() {
            if instances.contains(parent) {
                continue;
            }
            if let Some(component) = collected.components.get(parent) {
                let instance = component.initialize(instances);
                instances.insert(*parent, instance);

                #[cfg(feature = "logging")]
                trace!(
                    target: "trellis",
                    parent = parent.name(),
                    "Factory parent constructed eagerly"
                );
            }
        }
    }

    fn build_produced_index(
        collected: &CollectedContainers,
    ) -> AHashMap<TypeKey, (TypeKey, Arc<FactoryDefinition>)> {
        let mut index = AHashMap::new();
        for (parent, factory_list) in &collected.factories {
            for factory in factory_list {
                index.insert(factory.produces(), (*parent, Arc::clone(factory)));
            }
        }
        index
    }

    fn initialize_sorted_types(
        sorted_types: &[TypeKey],
        collected: &CollectedContainers,
        produced_index: &AHashMap<TypeKey, (TypeKey, Arc<FactoryDefinition>)>,
        instances: &InstanceRegistry,
    ) -> StartupResult<()> {
        for key in sorted_types {
            if instances.contains(key) {
                continue;
            }

            if let Some((parent, factory)) = produced_index.get(key) {
                let Some(parent_instance) = instances.get_raw(parent) else {
                    return Err(StartupError::FactoryParentMissing {
                        parent: parent.name(),
                        produced: key.name(),
                    });
                };
                let instance = factory.initialize(instances, &parent_instance);
                instances.insert(*key, instance);

                #[cfg(feature = "logging")]
                trace!(
                    target: "trellis",
                    produced = key.name(),
                    factory = factory.name(),
                    "Singleton produced by factory"
                );
                continue;
            }

            if let Some(component) = collected.components.get(key) {
                let instance = component.initialize(instances);
                instances.insert(*key, instance);
            } else if let Some(controller) = collected.controllers.get(key) {
                let instance = controller.initialize(instances);
                instances.insert(*key, instance);
            }
        }
        Ok(())
    }

    fn initialize_remaining(
        collected: &CollectedContainers,
        produced_index: &AHashMap<TypeKey, (TypeKey, Arc<FactoryDefinition>)>,
        instances: &InstanceRegistry,
    ) -> StartupResult<()> {
        // Factories with no declared dependencies never entered the sorted
        // list; their produced singletons are still owed an instance.
        for (key, (parent, factory)) in produced_index {
            if instances.contains(key) {
                continue;
            }
            let Some(parent_instance) = instances.get_raw(parent) else {
                return Err(StartupError::FactoryParentMissing {
                    parent: parent.name(),
                    produced: key.name(),
                });
            };
            let instance = factory.initialize(instances, &parent_instance);
            instances.insert(*key, instance);
        }

        for (key, component) in &collected.components {
            if !instances.contains(key) {
                let instance = component.initialize(instances);
                instances.insert(*key, instance);
            }
        }

        for (key, controller) in &collected.controllers {
            if !instances.contains(key) {
                let instance = controller.initialize(instances);
                instances.insert(*key, instance);
            }
        }

        Ok(())
    }
}
