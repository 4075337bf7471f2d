//! Container records and the registration surface
//!
//! The metadata registry is an explicit value, not process-global state:
//! create one per process (or per test), describe components, controllers,
//! and factories through the builder API, then hand it to
//! [`ContainerManager::component_scan`](crate::manager::ContainerManager::component_scan).
//!
//! Injectable types declare their dependencies as explicit field
//! descriptors — a `(field name, dependency type, assignment fn)` triple —
//! which the initializer reads. No runtime reflection is involved.

use crate::binding::{BindingSpec, HandlerArgs, HandlerReply};
use crate::error::HttpError;
use crate::http::HttpMethod;
use crate::instances::InstanceRegistry;
use crate::interceptor::{Interceptor, InterceptorDefinition};
use ahash::AHashMap;
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// Identity of a registered target: its `TypeId` plus the type name for
/// diagnostics. Equality and hashing use the `TypeId` alone.
#[derive(Debug, Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    #[inline]
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    #[inline]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Full path of the target type.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Last path segment of the target type.
    pub fn short_name(&self) -> &'static str {
        self.name.rsplit("::").next().unwrap_or(self.name)
    }
}

impl PartialEq for TypeKey {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl std::hash::Hash for TypeKey {
    #[inline]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Display for TypeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Collect [`TypeKey`]s for a list of types.
#[macro_export]
macro_rules! type_keys {
    ($($ty:ty),* $(,)?) => {
        vec![$($crate::TypeKey::of::<$ty>()),*]
    };
}

/// One declared field dependency: which field, which type, and how to
/// assign the resolved instance into a freshly constructed target.
pub struct FieldInjection {
    field: &'static str,
    dependency: TypeKey,
    assign: Box<dyn Fn(&mut (dyn Any + Send + Sync), Arc<dyn Any + Send + Sync>) + Send + Sync>,
}

impl FieldInjection {
    pub fn of<T, D>(field: &'static str, assign: fn(&mut T, Arc<D>)) -> Self
    where
        T: Send + Sync + 'static,
        D: Send + Sync + 'static,
    {
        Self {
            field,
            dependency: TypeKey::of::<D>(),
            assign: Box::new(move |target, dep| {
                if let (Some(target), Ok(dep)) = (target.downcast_mut::<T>(), dep.downcast::<D>())
                {
                    assign(target, dep);
                }
            }),
        }
    }

    #[inline]
    pub fn field(&self) -> &'static str {
        self.field
    }

    #[inline]
    pub fn dependency(&self) -> TypeKey {
        self.dependency
    }

    #[inline]
    pub(crate) fn apply(
        &self,
        target: &mut (dyn Any + Send + Sync),
        value: Arc<dyn Any + Send + Sync>,
    ) {
        (self.assign)(target, value);
    }
}

impl std::fmt::Debug for FieldInjection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldInjection")
            .field("field", &self.field)
            .field("dependency", &self.dependency.name())
            .finish()
    }
}

/// Describes how one component singleton is built: default construction
/// followed by field-level injection of whatever declared dependencies are
/// already available.
pub struct ComponentDefinition {
    key: TypeKey,
    construct: Box<dyn Fn() -> Box<dyn Any + Send + Sync> + Send + Sync>,
    fields: Vec<FieldInjection>,
    instance: OnceCell<Arc<dyn Any + Send + Sync>>,
}

impl ComponentDefinition {
    pub(crate) fn new<T: Default + Send + Sync + 'static>(fields: Vec<FieldInjection>) -> Self {
        Self {
            key: TypeKey::of::<T>(),
            construct: Box::new(|| Box::new(T::default())),
            fields,
            instance: OnceCell::new(),
        }
    }

    #[inline]
    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn dependencies(&self) -> Vec<TypeKey> {
        self.fields.iter().map(FieldInjection::dependency).collect()
    }

    /// Construct the singleton, injecting every declared field whose
    /// dependency has an instance. Idempotent: a second call returns the
    /// identical cached `Arc`.
    pub fn initialize(&self, instances: &InstanceRegistry) -> Arc<dyn Any + Send + Sync> {
        Arc::clone(self.instance.get_or_init(|| {
            let mut boxed = (self.construct)();
            for field in &self.fields {
                if let Some(dep) = instances.get_raw(&field.dependency()) {
                    field.apply(boxed.as_mut(), dep);
                }
            }
            Arc::from(boxed)
        }))
    }

    pub fn cached_instance(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.instance.get().cloned()
    }
}

impl std::fmt::Debug for ComponentDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentDefinition")
            .field("key", &self.key.name())
            .field("fields", &self.fields)
            .field("initialized", &self.instance.get().is_some())
            .finish()
    }
}

/// A factory method on a component: invoked once, bound to the parent's
/// instance, producing a managed singleton of its declared return type.
pub struct FactoryDefinition {
    name: &'static str,
    parent: TypeKey,
    produces: TypeKey,
    dependencies: Vec<TypeKey>,
    invoke: Box<
        dyn Fn(&(dyn Any + Send + Sync), &InstanceRegistry) -> Box<dyn Any + Send + Sync>
            + Send
            + Sync,
    >,
    instance: OnceCell<Arc<dyn Any + Send + Sync>>,
}

impl FactoryDefinition {
    pub(crate) fn new<P, R, F>(name: &'static str, dependencies: Vec<TypeKey>, f: F) -> Self
    where
        P: Send + Sync + 'static,
        R: Send + Sync + 'static,
        F: Fn(&P, &InstanceRegistry) -> R + Send + Sync + 'static,
    {
        Self {
            name,
            parent: TypeKey::of::<P>(),
            produces: TypeKey::of::<R>(),
            dependencies,
            invoke: Box::new(move |parent, instances| {
                let parent = parent
                    .downcast_ref::<P>()
                    .expect("factory parent stored under its own type key");
                Box::new(f(parent, instances))
            }),
            instance: OnceCell::new(),
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn parent(&self) -> TypeKey {
        self.parent
    }

    #[inline]
    pub fn produces(&self) -> TypeKey {
        self.produces
    }

    pub fn dependencies(&self) -> &[TypeKey] {
        &self.dependencies
    }

    /// Invoke the factory bound to its parent instance. Idempotent.
    pub fn initialize(
        &self,
        instances: &InstanceRegistry,
        parent: &Arc<dyn Any + Send + Sync>,
    ) -> Arc<dyn Any + Send + Sync> {
        Arc::clone(
            self.instance
                .get_or_init(|| Arc::from((self.invoke)(parent.as_ref(), instances))),
        )
    }
}

impl std::fmt::Debug for FactoryDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactoryDefinition")
            .field("name", &self.name)
            .field("parent", &self.parent.name())
            .field("produces", &self.produces.name())
            .finish()
    }
}

/// Type-erased handler function: receives the controller instance and the
/// bound arguments.
pub type HandlerFn = Arc<
    dyn Fn(&(dyn Any + Send + Sync), &HandlerArgs) -> Result<HandlerReply, HttpError>
        + Send
        + Sync,
>;

/// One declared handler parameter.
///
/// A `None` spec means the parameter was declared without a type
/// annotation — a structural error surfaced when the parameter is first
/// bound.
#[derive(Debug, Clone)]
pub struct ParamDecl {
    pub name: &'static str,
    pub spec: Option<BindingSpec>,
    pub default: Option<Value>,
}

/// Everything known about one route handler, assembled incrementally by
/// [`HandlerBuilder`] at registration time.
pub struct HandlerDescriptor {
    name: &'static str,
    method: HttpMethod,
    path: String,
    params: Vec<ParamDecl>,
    handler: HandlerFn,
    pending_interceptors: Vec<InterceptorDefinition>,
    interceptors: OnceCell<Vec<Arc<dyn Interceptor>>>,
}

impl HandlerDescriptor {
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn params(&self) -> &[ParamDecl] {
        &self.params
    }

    /// Resolved interceptors, empty until the resolver pass has run.
    pub fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        self.interceptors.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn pending_interceptors(&self) -> &[InterceptorDefinition] {
        &self.pending_interceptors
    }

    pub(crate) fn interceptors_resolved(&self) -> bool {
        self.interceptors.get().is_some()
    }

    /// Publish the resolved interceptor list. First publication wins;
    /// the pending definitions are considered cleared afterwards.
    pub(crate) fn publish_interceptors(&self, resolved: Vec<Arc<dyn Interceptor>>) {
        let _ = self.interceptors.set(resolved);
    }

    pub(crate) fn invoke(
        &self,
        controller: &(dyn Any + Send + Sync),
        args: &HandlerArgs,
    ) -> Result<HandlerReply, HttpError> {
        (self.handler)(controller, args)
    }
}

impl std::fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("params", &self.params.len())
            .finish()
    }
}

/// A controller: a component that additionally owns HTTP handler methods
/// under a base path.
pub struct ControllerDefinition {
    inner: ComponentDefinition,
    base_path: String,
    handlers: Vec<Arc<HandlerDescriptor>>,
}

impl ControllerDefinition {
    #[inline]
    pub fn key(&self) -> TypeKey {
        self.inner.key()
    }

    #[inline]
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn dependencies(&self) -> Vec<TypeKey> {
        self.inner.dependencies()
    }

    pub fn handlers(&self) -> &[Arc<HandlerDescriptor>] {
        &self.handlers
    }

    /// See [`ComponentDefinition::initialize`].
    pub fn initialize(&self, instances: &InstanceRegistry) -> Arc<dyn Any + Send + Sync> {
        self.inner.initialize(instances)
    }

    pub fn cached_instance(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.inner.cached_instance()
    }
}

impl std::fmt::Debug for ControllerDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerDefinition")
            .field("key", &self.inner.key().name())
            .field("base_path", &self.base_path)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Kind tag of a container record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    Component,
    Controller,
    Factory,
    Handler,
}

/// Kind-specific payload of a record.
#[derive(Clone)]
pub enum RecordPayload {
    Component(Arc<ComponentDefinition>),
    Controller(Arc<ControllerDefinition>),
    Factory(Arc<FactoryDefinition>),
    Handler(Arc<HandlerDescriptor>),
}

/// Metadata wrapper describing how to construct and manage one target:
/// the target key, a kind tag, free-form metadata, and nested child
/// records (a factory under its owning component, a handler under its
/// controller).
#[derive(Clone)]
pub struct ContainerRecord {
    kind: ContainerKind,
    key: TypeKey,
    metadata: HashMap<String, Value>,
    children: Vec<ContainerRecord>,
    payload: RecordPayload,
}

impl ContainerRecord {
    #[inline]
    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    #[inline]
    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn children(&self) -> &[ContainerRecord] {
        &self.children
    }

    pub fn payload(&self) -> &RecordPayload {
        &self.payload
    }
}

impl std::fmt::Debug for ContainerRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerRecord")
            .field("kind", &self.kind)
            .field("key", &self.key.name())
            .field("children", &self.children.len())
            .finish()
    }
}

/// Explicit metadata registry mapping each registered target to the list
/// of container records attached to it.
///
/// Populated by the builder API, consumed read-only by the collector.
#[derive(Debug, Default)]
pub struct Registry {
    targets: Vec<TypeKey>,
    records: AHashMap<TypeKey, Vec<ContainerRecord>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, record: ContainerRecord) {
        let key = record.key();
        if !self.records.contains_key(&key) {
            self.targets.push(key);
        }
        self.records.entry(key).or_default().push(record);
    }

    /// Every registered target, in registration order.
    pub fn targets(&self) -> &[TypeKey] {
        &self.targets
    }

    pub fn records_for(&self, key: &TypeKey) -> &[ContainerRecord] {
        self.records.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Begin registering a plain component.
    pub fn component<T: Default + Send + Sync + 'static>(&mut self) -> ComponentBuilder<'_, T> {
        ComponentBuilder {
            registry: self,
            fields: Vec::new(),
            metadata: HashMap::new(),
            children: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Begin registering a controller.
    pub fn controller<T: Default + Send + Sync + 'static>(&mut self) -> ControllerBuilder<'_, T> {
        ControllerBuilder {
            registry: self,
            fields: Vec::new(),
            metadata: HashMap::new(),
            base_path: String::new(),
            handlers: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Begin registering a standalone factory method producing `R` on a
    /// parent component `P`.
    pub fn factory<P, R, F>(&mut self, name: &'static str, f: F) -> FactoryRegistration<'_, P, R>
    where
        P: Send + Sync + 'static,
        R: Send + Sync + 'static,
        F: Fn(&P, &InstanceRegistry) -> R + Send + Sync + 'static,
    {
        FactoryRegistration {
            registry: self,
            name,
            dependencies: Vec::new(),
            invoke: Box::new(f),
            _marker: PhantomData,
        }
    }
}

/// Builder for a component registration.
pub struct ComponentBuilder<'r, T> {
    registry: &'r mut Registry,
    fields: Vec<FieldInjection>,
    metadata: HashMap<String, Value>,
    children: Vec<ContainerRecord>,
    _marker: PhantomData<fn() -> T>,
}

impl<'r, T: Default + Send + Sync + 'static> ComponentBuilder<'r, T> {
    /// Declare a field dependency: the initializer assigns the resolved
    /// `D` instance through `assign` after default construction.
    pub fn inject<D: Send + Sync + 'static>(
        mut self,
        field: &'static str,
        assign: fn(&mut T, Arc<D>),
    ) -> Self {
        self.fields.push(FieldInjection::of::<T, D>(field, assign));
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Declare a factory method on this component producing `R`, with no
    /// dependencies of its own.
    pub fn provides<R, F>(self, name: &'static str, f: F) -> Self
    where
        R: Send + Sync + 'static,
        F: Fn(&T, &InstanceRegistry) -> R + Send + Sync + 'static,
    {
        self.provides_with(name, Vec::new(), f)
    }

    /// Declare a factory method on this component producing `R`, naming
    /// the dependency types its parameters consume.
    pub fn provides_with<R, F>(
        mut self,
        name: &'static str,
        dependencies: Vec<TypeKey>,
        f: F,
    ) -> Self
    where
        R: Send + Sync + 'static,
        F: Fn(&T, &InstanceRegistry) -> R + Send + Sync + 'static,
    {
        let def = Arc::new(FactoryDefinition::new::<T, R, F>(name, dependencies, f));
        self.children.push(ContainerRecord {
            kind: ContainerKind::Factory,
            key: def.produces(),
            metadata: HashMap::new(),
            children: Vec::new(),
            payload: RecordPayload::Factory(def),
        });
        self
    }

    pub fn register(self) {
        let def = Arc::new(ComponentDefinition::new::<T>(self.fields));
        self.registry.register(ContainerRecord {
            kind: ContainerKind::Component,
            key: def.key(),
            metadata: self.metadata,
            children: self.children,
            payload: RecordPayload::Component(def),
        });
    }
}

/// Builder for a standalone factory registration.
pub struct FactoryRegistration<'r, P, R> {
    registry: &'r mut Registry,
    name: &'static str,
    dependencies: Vec<TypeKey>,
    invoke: Box<dyn Fn(&P, &InstanceRegistry) -> R + Send + Sync>,
    _marker: PhantomData<fn() -> (P, R)>,
}

impl<'r, P, R> FactoryRegistration<'r, P, R>
where
    P: Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    /// Name a dependency type one of the factory's parameters consumes.
    pub fn depends_on<D: Send + Sync + 'static>(mut self) -> Self {
        self.dependencies.push(TypeKey::of::<D>());
        self
    }

    pub fn register(self) {
        let def = Arc::new(FactoryDefinition::new::<P, R, _>(
            self.name,
            self.dependencies,
            self.invoke,
        ));
        self.registry.register(ContainerRecord {
            kind: ContainerKind::Factory,
            key: def.produces(),
            metadata: HashMap::new(),
            children: Vec::new(),
            payload: RecordPayload::Factory(def),
        });
    }
}

/// Builder for a controller registration.
pub struct ControllerBuilder<'r, T> {
    registry: &'r mut Registry,
    fields: Vec<FieldInjection>,
    metadata: HashMap<String, Value>,
    base_path: String,
    handlers: Vec<Arc<HandlerDescriptor>>,
    _marker: PhantomData<fn() -> T>,
}

impl<'r, T: Default + Send + Sync + 'static> ControllerBuilder<'r, T> {
    /// Base path every route of this controller is mounted under.
    pub fn base_path(mut self, path: impl Into<String>) -> Self {
        self.base_path = path.into();
        self
    }

    /// Declare a field dependency, as for components.
    pub fn inject<D: Send + Sync + 'static>(
        mut self,
        field: &'static str,
        assign: fn(&mut T, Arc<D>),
    ) -> Self {
        self.fields.push(FieldInjection::of::<T, D>(field, assign));
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Register a route handler on this controller.
    pub fn route<F>(
        mut self,
        method: HttpMethod,
        path: impl Into<String>,
        name: &'static str,
        configure: F,
    ) -> Self
    where
        F: FnOnce(HandlerBuilder<T>) -> HandlerBuilder<T>,
    {
        let builder = HandlerBuilder {
            name,
            method,
            path: path.into(),
            params: Vec::new(),
            handler: None,
            interceptors: Vec::new(),
            _marker: PhantomData,
        };
        self.handlers.push(Arc::new(configure(builder).build()));
        self
    }

    pub fn register(self) {
        let base_path = self.base_path.clone();
        let children = self
            .handlers
            .iter()
            .map(|h| ContainerRecord {
                kind: ContainerKind::Handler,
                key: TypeKey::of::<T>(),
                metadata: HashMap::from([
                    ("method".to_string(), Value::from(h.method().as_str())),
                    ("path".to_string(), Value::from(h.path())),
                ]),
                children: Vec::new(),
                payload: RecordPayload::Handler(Arc::clone(h)),
            })
            .collect();

        let def = Arc::new(ControllerDefinition {
            inner: ComponentDefinition::new::<T>(self.fields),
            base_path,
            handlers: self.handlers,
        });
        self.registry.register(ContainerRecord {
            kind: ContainerKind::Controller,
            key: def.key(),
            metadata: self.metadata,
            children,
            payload: RecordPayload::Controller(def),
        });
    }
}

/// Incremental builder for one handler descriptor.
pub struct HandlerBuilder<C> {
    name: &'static str,
    method: HttpMethod,
    path: String,
    params: Vec<ParamDecl>,
    handler: Option<HandlerFn>,
    interceptors: Vec<InterceptorDefinition>,
    _marker: PhantomData<fn() -> C>,
}

impl<C: Send + Sync + 'static> HandlerBuilder<C> {
    /// Declare a parameter with its binding spec.
    pub fn param(mut self, name: &'static str, spec: BindingSpec) -> Self {
        self.params.push(ParamDecl {
            name,
            spec: Some(spec),
            default: None,
        });
        self
    }

    /// Declare a parameter with a default used when the request carries no
    /// value for it.
    pub fn param_with_default(
        mut self,
        name: &'static str,
        spec: BindingSpec,
        default: Value,
    ) -> Self {
        self.params.push(ParamDecl {
            name,
            spec: Some(spec),
            default: Some(default),
        });
        self
    }

    /// Declare a parameter without a binding spec. Binding it fails with
    /// a missing-type-annotation error; this exists so the structural
    /// error path stays testable.
    pub fn untyped_param(mut self, name: &'static str) -> Self {
        self.params.push(ParamDecl {
            name,
            spec: None,
            default: None,
        });
        self
    }

    /// Attach an interceptor resolved after component initialization.
    pub fn intercept(mut self, definition: InterceptorDefinition) -> Self {
        self.interceptors.push(definition);
        self
    }

    /// The handler body. Receives the controller singleton and the bound
    /// arguments.
    pub fn call<F>(mut self, f: F) -> Self
    where
        F: Fn(&C, &HandlerArgs) -> Result<HandlerReply, HttpError> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(move |any, args| {
            let controller = any
                .downcast_ref::<C>()
                .expect("controller instance stored under its own type key");
            f(controller, args)
        }));
        self
    }

    fn build(self) -> HandlerDescriptor {
        let handler = self
            .handler
            .unwrap_or_else(|| panic!("handler '{}' registered without a body", self.name));
        HandlerDescriptor {
            name: self.name,
            method: self.method,
            path: self.path,
            params: self.params,
            handler,
            pending_interceptors: self.interceptors,
            interceptors: OnceCell::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct AuditLog {
        entries: Vec<String>,
    }

    #[derive(Default)]
    struct UserService {
        audit: Option<Arc<AuditLog>>,
    }

    #[derive(Default)]
    struct UserController;

    #[test]
    fn type_key_identity_and_names() {
        assert_eq!(TypeKey::of::<AuditLog>(), TypeKey::of::<AuditLog>());
        assert_ne!(TypeKey::of::<AuditLog>(), TypeKey::of::<UserService>());
        assert_eq!(TypeKey::of::<AuditLog>().short_name(), "AuditLog");
    }

    #[test]
    fn component_initialize_is_idempotent() {
        let def = ComponentDefinition::new::<AuditLog>(Vec::new());
        let instances = InstanceRegistry::new();

        let first = def.initialize(&instances);
        let second = def.initialize(&instances);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn field_injection_assigns_available_dependency() {
        let instances = InstanceRegistry::new();
        instances.insert(
            TypeKey::of::<AuditLog>(),
            Arc::new(AuditLog {
                entries: vec!["boot".into()],
            }),
        );

        let def = ComponentDefinition::new::<UserService>(vec![FieldInjection::of::<
            UserService,
            AuditLog,
        >("audit", |s, d| {
            s.audit = Some(d)
        })]);

        let instance = def.initialize(&instances);
        let service = instance.downcast_ref::<UserService>().unwrap();
        assert_eq!(service.audit.as_ref().unwrap().entries, vec!["boot"]);
    }

    #[test]
    fn missing_dependency_leaves_field_untouched() {
        let instances = InstanceRegistry::new();
        let def = ComponentDefinition::new::<UserService>(vec![FieldInjection::of::<
            UserService,
            AuditLog,
        >("audit", |s, d| {
            s.audit = Some(d)
        })]);

        let instance = def.initialize(&instances);
        assert!(instance.downcast_ref::<UserService>().unwrap().audit.is_none());
    }

    #[test]
    fn registry_groups_records_by_target() {
        let mut registry = Registry::new();
        registry.component::<AuditLog>().register();
        registry
            .component::<UserService>()
            .inject::<AuditLog>("audit", |s, d| s.audit = Some(d))
            .register();

        assert_eq!(registry.len(), 2);
        let records = registry.records_for(&TypeKey::of::<UserService>());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind(), ContainerKind::Component);
    }

    #[test]
    fn nested_factory_becomes_child_record() {
        #[allow(dead_code)]
        struct Pool {
            size: usize,
        }

        let mut registry = Registry::new();
        registry
            .component::<AuditLog>()
            .provides::<Pool, _>("create_pool", |_, _| Pool { size: 4 })
            .register();

        let records = registry.records_for(&TypeKey::of::<AuditLog>());
        assert_eq!(records[0].children().len(), 1);
        let child = &records[0].children()[0];
        assert_eq!(child.kind(), ContainerKind::Factory);
        match child.payload() {
            RecordPayload::Factory(def) => {
                assert_eq!(def.parent(), TypeKey::of::<AuditLog>());
                assert_eq!(def.produces(), TypeKey::of::<Pool>());
            }
            _ => panic!("expected factory payload"),
        }
    }

    #[test]
    fn controller_records_nest_handlers() {
        let mut registry = Registry::new();
        registry
            .controller::<UserController>()
            .base_path("/users")
            .route(HttpMethod::Get, "/{id}", "get_user", |h| {
                h.param("id", BindingSpec::value(crate::binding::ValueKind::Int))
                    .call(|_c: &UserController, args| Ok(json!({"id": args.int("id")?}).into()))
            })
            .register();

        let records = registry.records_for(&TypeKey::of::<UserController>());
        assert_eq!(records[0].kind(), ContainerKind::Controller);
        assert_eq!(records[0].children().len(), 1);
        assert_eq!(
            records[0].children()[0].metadata("method"),
            Some(&Value::from("GET"))
        );
    }
}
