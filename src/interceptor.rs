//! Handler interceptors and their dependency resolution
//!
//! Interceptors wrap individual route handlers with before/after/on-error
//! hooks. They are declared as definitions (default constructor + field
//! descriptors) at handler registration and resolved into instances after
//! component initialization, so they receive the same singletons as
//! everything else without being components themselves.

use crate::binding::{HandlerArgs, HandlerReply};
use crate::error::HttpError;
use crate::http::HttpRequest;
use crate::instances::InstanceRegistry;
use crate::registry::{ComponentDefinition, FieldInjection, TypeKey};
use ahash::AHashMap;
use std::any::Any;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

/// Hooks around one handler invocation.
///
/// `before` hooks run in attachment order and may adjust the bound
/// arguments; `after` and `on_error` run in reverse order.
pub trait Interceptor: Send + Sync {
    fn before(&self, request: &HttpRequest, args: &mut HandlerArgs) -> Result<(), HttpError> {
        let _ = (request, args);
        Ok(())
    }

    fn after(&self, request: &HttpRequest, reply: HandlerReply) -> Result<HandlerReply, HttpError> {
        let _ = request;
        Ok(reply)
    }

    fn on_error(&self, request: &HttpRequest, error: &HttpError) {
        let _ = (request, error);
    }
}

/// How to build one interceptor: default construction plus field-level
/// injection of declared component dependencies.
pub struct InterceptorDefinition {
    key: TypeKey,
    construct: Box<dyn Fn() -> Box<dyn Any + Send + Sync> + Send + Sync>,
    fields: Vec<FieldInjection>,
    finish: Box<dyn Fn(Box<dyn Any + Send + Sync>) -> Arc<dyn Interceptor> + Send + Sync>,
}

impl InterceptorDefinition {
    pub fn of<I>() -> Self
    where
        I: Interceptor + Default + Send + Sync + 'static,
    {
        Self {
            key: TypeKey::of::<I>(),
            construct: Box::new(|| Box::new(I::default())),
            fields: Vec::new(),
            finish: Box::new(|boxed| {
                let concrete = boxed
                    .downcast::<I>()
                    .expect("interceptor constructed from its own definition");
                Arc::new(*concrete)
            }),
        }
    }

    /// Declare a field dependency injected from the known components.
    pub fn inject<I, D>(mut self, field: &'static str, assign: fn(&mut I, Arc<D>)) -> Self
    where
        I: Send + Sync + 'static,
        D: Send + Sync + 'static,
    {
        self.fields.push(FieldInjection::of::<I, D>(field, assign));
        self
    }

    #[inline]
    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn dependencies(&self) -> Vec<TypeKey> {
        self.fields.iter().map(FieldInjection::dependency).collect()
    }

    /// Default-construct the interceptor and inject every field whose type
    /// is a known component, fetching (and constructing if necessary) the
    /// instance from the registry.
    pub(crate) fn resolve(
        &self,
        components: &AHashMap<TypeKey, Arc<ComponentDefinition>>,
        instances: &InstanceRegistry,
    ) -> Arc<dyn Interceptor> {
        let mut boxed = (self.construct)();

        for field in &self.fields {
            let dependency = field.dependency();
            let Some(component) = components.get(&dependency) else {
                continue;
            };
            let instance = match instances.get_raw(&dependency) {
                Some(existing) => existing,
                None => {
                    let created = component.initialize(instances);
                    instances.insert(dependency, Arc::clone(&created));

                    #[cfg(feature = "logging")]
                    debug!(
                        target: "trellis",
                        interceptor = self.key.name(),
                        dependency = dependency.name(),
                        "Constructed component on demand for interceptor dependency"
                    );

                    created
                }
            };
            field.apply(boxed.as_mut(), instance);
        }

        (self.finish)(boxed)
    }
}

impl std::fmt::Debug for InterceptorDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorDefinition")
            .field("key", &self.key.name())
            .field("fields", &self.fields)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Metrics {
        hits: Mutex<u32>,
    }

    #[derive(Default)]
    struct CountingInterceptor {
        metrics: Option<Arc<Metrics>>,
    }

    impl Interceptor for CountingInterceptor {
        fn before(&self, _request: &HttpRequest, _args: &mut HandlerArgs) -> Result<(), HttpError> {
            if let Some(metrics) = &self.metrics {
                *metrics.hits.lock().unwrap() += 1;
            }
            Ok(())
        }
    }

    #[test]
    fn resolve_injects_known_component() {
        let mut components = AHashMap::new();
        components.insert(
            TypeKey::of::<Metrics>(),
            Arc::new(ComponentDefinition::new::<Metrics>(Vec::new())),
        );
        let instances = InstanceRegistry::new();

        let def = InterceptorDefinition::of::<CountingInterceptor>()
            .inject::<CountingInterceptor, Metrics>("metrics", |i, m| i.metrics = Some(m));

        let interceptor = def.resolve(&components, &instances);

        // The component was constructed on demand and registered
        assert!(instances.contains(&TypeKey::of::<Metrics>()));

        let request = HttpRequest::get("/");
        let mut args = HandlerArgs::new();
        interceptor.before(&request, &mut args).unwrap();

        let metrics = instances.get::<Metrics>().unwrap();
        assert_eq!(*metrics.hits.lock().unwrap(), 1);
    }

    #[test]
    fn resolve_shares_existing_singleton() {
        let mut components = AHashMap::new();
        components.insert(
            TypeKey::of::<Metrics>(),
            Arc::new(ComponentDefinition::new::<Metrics>(Vec::new())),
        );
        let instances = InstanceRegistry::new();
        let existing: Arc<Metrics> = Arc::new(Metrics::default());
        instances.insert(TypeKey::of::<Metrics>(), existing);

        let def = InterceptorDefinition::of::<CountingInterceptor>()
            .inject::<CountingInterceptor, Metrics>("metrics", |i, m| i.metrics = Some(m));
        let interceptor = def.resolve(&components, &instances);

        let shared = instances.get::<Metrics>().unwrap();
        let request = HttpRequest::get("/");
        let mut args = HandlerArgs::new();
        interceptor.before(&request, &mut args).unwrap();
        assert_eq!(*shared.hits.lock().unwrap(), 1);
    }
}
