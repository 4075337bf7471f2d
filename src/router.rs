//! Route table construction, matching, and handler invocation

use crate::binding::RequestData;
use crate::error::{HttpError, HttpResult};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::inject::ParameterInjectorRegistry;
use crate::manager::ContainerManager;
use crate::registry::{HandlerDescriptor, TypeKey};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// One registered route: immutable after construction.
pub struct Route {
    pub path: String,
    pub method: HttpMethod,
    pub descriptor: Arc<HandlerDescriptor>,
    pub controller: TypeKey,
    controller_instance: Arc<dyn Any + Send + Sync>,
}

/// Route listing entry for introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    pub method: &'static str,
    pub path: String,
    pub controller: &'static str,
    pub handler: &'static str,
}

/// Resolves requests to registered routes, binds parameters through the
/// injector registry, and invokes handlers with their interceptors.
///
/// Routes are rebuilt from the container manager's snapshot every time a
/// `RouteHandler` is constructed.
pub struct RouteHandler {
    routes: Vec<Route>,
    injectors: ParameterInjectorRegistry,
}

impl RouteHandler {
    /// Build the route table with the default injector catalogue.
    pub fn new(manager: &ContainerManager) -> Self {
        Self::with_injectors(manager, ParameterInjectorRegistry::with_defaults())
    }

    /// Build the route table with a custom injector registry.
    pub fn with_injectors(manager: &ContainerManager, injectors: ParameterInjectorRegistry) -> Self {
        let mut routes = Vec::new();

        for entry in manager.get_controllers() {
            let base_path = entry.definition.base_path().to_string();
            for descriptor in entry.definition.handlers() {
                let full_path = combine_paths(&base_path, descriptor.path());

                #[cfg(feature = "logging")]
                debug!(
                    target: "trellis",
                    method = descriptor.method().as_str(),
                    path = %full_path,
                    controller = entry.key.name(),
                    handler = descriptor.name(),
                    "Route registered"
                );

                routes.push(Route {
                    path: full_path,
                    method: descriptor.method(),
                    descriptor: Arc::clone(descriptor),
                    controller: entry.key,
                    controller_instance: Arc::clone(&entry.instance),
                });
            }
        }

        Self { routes, injectors }
    }

    /// Exact string match over the whole table first, then segment-wise
    /// pattern match where a `{name}` segment matches any single path
    /// segment.
    pub fn find_route(&self, method: HttpMethod, path: &str) -> Option<&Route> {
        if let Some(route) = self
            .routes
            .iter()
            .find(|r| r.method == method && r.path == path)
        {
            return Some(route);
        }
        self.routes
            .iter()
            .find(|r| r.method == method && match_path_pattern(&r.path, path))
    }

    /// Process one request: route lookup, path-parameter extraction,
    /// request-data merge, parameter injection, interceptor-wrapped
    /// handler invocation, and bare-value response normalization.
    pub fn handle_request(&self, request: &mut HttpRequest) -> HttpResult<HttpResponse> {
        let Some(route) = self.find_route(request.method, &request.path) else {
            return Err(HttpError::RouteNotFound {
                method: request.method.to_string(),
                path: request.path.clone(),
            });
        };

        let path_params = extract_path_params(&route.path, &request.path);
        if !path_params.is_empty() {
            request.path_params = path_params;
        }

        #[cfg(feature = "logging")]
        trace!(
            target: "trellis",
            method = request.method.as_str(),
            pattern = %route.path,
            handler = route.descriptor.name(),
            "Route matched"
        );

        let mut data = collect_request_data(request);
        let mut args = self
            .injectors
            .inject_parameters(route.descriptor.params(), request, &mut data)?;

        let interceptors = route.descriptor.interceptors();

        for interceptor in interceptors {
            interceptor.before(request, &mut args)?;
        }

        let invoked = route
            .descriptor
            .invoke(route.controller_instance.as_ref(), &args);

        let reply = match invoked {
            Ok(mut reply) => {
                for interceptor in interceptors.iter().rev() {
                    reply = interceptor.after(request, reply)?;
                }
                reply
            }
            Err(err) => {
                for interceptor in interceptors.iter().rev() {
                    interceptor.on_error(request, &err);
                }
                return Err(err);
            }
        };

        Ok(reply.into_response())
    }

    /// Every registered route, for introspection.
    pub fn routes(&self) -> Vec<RouteInfo> {
        self.routes
            .iter()
            .map(|r| RouteInfo {
                method: r.method.as_str(),
                path: r.path.clone(),
                controller: r.controller.short_name(),
                handler: r.descriptor.name(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl std::fmt::Debug for RouteHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteHandler")
            .field("routes", &self.routes.len())
            .finish()
    }
}

/// Join a controller base path with a handler path.
fn combine_paths(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');

    if path.is_empty() {
        return if base.is_empty() { "/".to_string() } else { base.to_string() };
    }
    if base.is_empty() {
        return format!("/{path}");
    }
    format!("{base}/{path}")
}

/// Segment-wise pattern match. `{name}` segments match any single path
/// segment; segment counts must match exactly.
fn match_path_pattern(pattern: &str, path: &str) -> bool {
    let pattern_parts: Vec<&str> = pattern.split('/').collect();
    let path_parts: Vec<&str> = path.split('/').collect();

    if pattern_parts.len() != path_parts.len() {
        return false;
    }

    pattern_parts
        .iter()
        .zip(&path_parts)
        .all(|(pattern_part, path_part)| {
            (pattern_part.starts_with('{') && pattern_part.ends_with('}'))
                || pattern_part == path_part
        })
}

/// Capture `{name}` segment values from a concrete path.
fn extract_path_params(pattern: &str, path: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for (pattern_part, path_part) in pattern.split('/').zip(path.split('/')) {
        if pattern_part.starts_with('{') && pattern_part.ends_with('}') {
            let name = &pattern_part[1..pattern_part.len() - 1];
            params.insert(name.to_string(), path_part.to_string());
        }
    }
    params
}

/// Merge query params, path params, and body object fields into one map.
/// Later sources win: query, then path, then body.
fn collect_request_data(request: &HttpRequest) -> RequestData {
    let mut data = RequestData::new();
    for (key, value) in &request.query {
        data.insert(key.clone(), Value::String(value.clone()));
    }
    for (key, value) in &request.path_params {
        data.insert(key.clone(), Value::String(value.clone()));
    }
    if let Some(Value::Object(body)) = &request.body {
        for (key, value) in body {
            data.insert(key.clone(), value.clone());
        }
    }
    data
}
