//! Request dispatch pipeline: middleware chain and error handling
//!
//! Per-request state machine: middleware request phase (early return
//! short-circuits past the route handler), route dispatch with parameter
//! injection, then the middleware response phase in strict reverse
//! registration order. Request-scoped errors are caught here and converted
//! to responses; they never propagate past the pipeline.

use crate::error::{AppError, HttpError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::router::RouteHandler;
use serde_json::json;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, info, warn};

/// Request/response middleware.
///
/// `on_request` hooks run in registration order; the first returning a
/// response short-circuits directly to the response phase. `on_response`
/// hooks run in reverse registration order over whatever response resulted.
pub trait Middleware: Send + Sync {
    fn on_request(&self, request: &mut HttpRequest) -> Option<HttpResponse> {
        let _ = request;
        None
    }

    fn on_response(&self, request: &HttpRequest, response: HttpResponse) -> HttpResponse {
        let _ = request;
        response
    }
}

/// Ordered middleware collection.
#[derive(Default)]
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Request phase: registration order, first non-null response wins.
    pub fn execute_request(&self, request: &mut HttpRequest) -> Option<HttpResponse> {
        for middleware in &self.middlewares {
            if let Some(response) = middleware.on_request(request) {
                return Some(response);
            }
        }
        None
    }

    /// Response phase: strict reverse registration order.
    pub fn execute_response(
        &self,
        request: &HttpRequest,
        mut response: HttpResponse,
    ) -> HttpResponse {
        for middleware in self.middlewares.iter().rev() {
            response = middleware.on_response(request, response);
        }
        response
    }
}

type ErrorHandlerFn =
    Box<dyn Fn(&AppError, &HttpRequest) -> Option<HttpResponse> + Send + Sync>;

struct ErrorHandlerEntry {
    type_name: &'static str,
    handle: ErrorHandlerFn,
}

/// The outermost dispatch boundary.
///
/// Owns the route handler, the middleware chain, and the error-handler
/// table. Initialization must complete before the first request is
/// served; after that, concurrent `handle_request` calls share no mutable
/// state.
pub struct Dispatcher {
    router: RouteHandler,
    chain: MiddlewareChain,
    error_handlers: Vec<ErrorHandlerEntry>,
    not_found_through_middleware: bool,
}

impl Dispatcher {
    pub fn new(router: RouteHandler) -> Self {
        Self {
            router,
            chain: MiddlewareChain::new(),
            error_handlers: Vec::new(),
            not_found_through_middleware: true,
        }
    }

    pub fn router(&self) -> &RouteHandler {
        &self.router
    }

    /// Append a middleware; request order is registration order.
    pub fn add_middleware(&mut self, middleware: impl Middleware + 'static) -> &mut Self {
        self.chain.add(Arc::new(middleware));
        self
    }

    /// Register a handler for a concrete application error type.
    ///
    /// The table is checked in registration order; the first entry whose
    /// type matches wins and may return any status code, taking priority
    /// over the default 500 mapping.
    pub fn add_error_handler<E, F>(&mut self, handler: F) -> &mut Self
    where
        E: std::error::Error + Send + Sync + 'static,
        F: Fn(&E, &HttpRequest) -> HttpResponse + Send + Sync + 'static,
    {
        self.error_handlers.push(ErrorHandlerEntry {
            type_name: std::any::type_name::<E>(),
            handle: Box::new(move |err, request| {
                err.downcast_ref::<E>().map(|e| handler(e, request))
            }),
        });

        #[cfg(feature = "logging")]
        debug!(
            target: "trellis",
            error_type = std::any::type_name::<E>(),
            "Error handler registered"
        );

        self
    }

    /// Whether a 404 response still flows through the middleware response
    /// phase. Defaults to `true` so response decorators see 404s like any
    /// other response.
    pub fn route_not_found_through_middleware(&mut self, enabled: bool) -> &mut Self {
        self.not_found_through_middleware = enabled;
        self
    }

    /// Drive one request through the pipeline.
    pub fn handle_request(&self, mut request: HttpRequest) -> HttpResponse {
        #[cfg(feature = "logging")]
        debug!(
            target: "trellis",
            method = request.method.as_str(),
            path = %request.path,
            "Request received"
        );

        let response = if let Some(early) = self.chain.execute_request(&mut request) {
            // Early return: skip the route handler entirely
            early
        } else {
            match self.router.handle_request(&mut request) {
                Ok(response) => response,
                Err(err @ HttpError::RouteNotFound { .. }) => {
                    let response = self.render_error(err, &request);
                    if !self.not_found_through_middleware {
                        return response;
                    }
                    response
                }
                // Other request-scoped errors convert to responses at this
                // boundary without re-entering the middleware chain.
                Err(err) => return self.render_error(err, &request),
            }
        };

        self.chain.execute_response(&request, response)
    }

    fn render_error(&self, error: HttpError, request: &HttpRequest) -> HttpResponse {
        match error {
            HttpError::Validation(err) => {
                #[cfg(feature = "logging")]
                info!(
                    target: "trellis",
                    path = %request.path,
                    details = err.details.len(),
                    "Validation failed"
                );
                HttpResponse::new(400, err.to_body())
            }
            HttpError::AuthenticationRequired(message) => {
                HttpResponse::new(401, json!({"message": message}))
            }
            HttpError::RouteNotFound { .. } => {
                HttpResponse::new(404, json!({"error": "Route not found"}))
            }
            HttpError::MissingTypeAnnotation { param } => HttpResponse::new(
                500,
                json!({
                    "error": "MissingTypeAnnotation",
                    "message": format!("parameter '{param}' has no type annotation"),
                    "path": request.path,
                }),
            ),
            HttpError::App(err) => {
                for entry in &self.error_handlers {
                    if let Some(response) = (entry.handle)(&err, request) {
                        #[cfg(feature = "logging")]
                        info!(
                            target: "trellis",
                            error_type = entry.type_name,
                            "Error handled by registered handler"
                        );
                        return response;
                    }
                }

                #[cfg(feature = "logging")]
                warn!(
                    target: "trellis",
                    error_type = err.short_type_name(),
                    message = %err,
                    path = %request.path,
                    "Unhandled application error"
                );

                HttpResponse::new(
                    500,
                    json!({
                        "error": err.short_type_name(),
                        "message": err.to_string(),
                        "path": request.path,
                    }),
                )
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.router.len())
            .field("middlewares", &self.chain.len())
            .field("error_handlers", &self.error_handlers.len())
            .finish()
    }
}

// =============================================================================
// Built-in middlewares
// =============================================================================

/// CORS middleware: answers OPTIONS preflight requests with 204 via early
/// return and decorates every response with the configured headers.
pub struct CorsMiddleware {
    allowed_origins: Vec<String>,
    allowed_methods: Vec<String>,
    allowed_headers: Vec<String>,
    allow_credentials: bool,
    max_age: Option<u32>,
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: ["GET", "POST", "PUT", "DELETE", "PATCH", "OPTIONS"]
                .map(String::from)
                .to_vec(),
            allowed_headers: ["Content-Type", "Authorization"].map(String::from).to_vec(),
            allow_credentials: false,
            max_age: None,
        }
    }
}

impl CorsMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allowed_origins(mut self, origins: &[&str]) -> Self {
        self.allowed_origins = origins.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn allowed_methods(mut self, methods: &[&str]) -> Self {
        self.allowed_methods = methods.iter().map(|s| s.to_ascii_uppercase()).collect();
        self
    }

    pub fn allowed_headers(mut self, headers: &[&str]) -> Self {
        self.allowed_headers = headers.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }

    pub fn max_age(mut self, seconds: u32) -> Self {
        self.max_age = Some(seconds);
        self
    }

    fn apply_headers(&self, mut response: HttpResponse) -> HttpResponse {
        let origin = self.allowed_origins.join(", ");
        response = response
            .with_header("Access-Control-Allow-Origin", origin)
            .with_header("Access-Control-Allow-Methods", self.allowed_methods.join(", "))
            .with_header("Access-Control-Allow-Headers", self.allowed_headers.join(", "));
        if self.allow_credentials {
            response = response.with_header("Access-Control-Allow-Credentials", "true");
        }
        if let Some(max_age) = self.max_age {
            response = response.with_header("Access-Control-Max-Age", max_age.to_string());
        }
        response
    }
}

impl Middleware for CorsMiddleware {
    fn on_request(&self, request: &mut HttpRequest) -> Option<HttpResponse> {
        if request.method == HttpMethod::Options {
            return Some(self.apply_headers(HttpResponse::new(204, json!({}))));
        }
        None
    }

    fn on_response(&self, _request: &HttpRequest, response: HttpResponse) -> HttpResponse {
        self.apply_headers(response)
    }
}

/// Logs every dispatched request and its response status.
#[derive(Default)]
pub struct RequestLoggingMiddleware;

impl Middleware for RequestLoggingMiddleware {
    fn on_request(&self, request: &mut HttpRequest) -> Option<HttpResponse> {
        #[cfg(feature = "logging")]
        debug!(
            target: "trellis",
            method = request.method.as_str(),
            path = %request.path,
            "Dispatching"
        );
        let _ = request;
        None
    }

    fn on_response(&self, request: &HttpRequest, response: HttpResponse) -> HttpResponse {
        #[cfg(feature = "logging")]
        info!(
            target: "trellis",
            method = request.method.as_str(),
            path = %request.path,
            status = response.status,
            "Request completed"
        );
        let _ = request;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{BindingSpec, ValueKind};
    use crate::manager::ContainerManager;
    use crate::registry::Registry;
    use serde_json::json;
    use std::sync::Mutex;
    use thiserror::Error;

    #[derive(Default)]
    struct ThingController;

    fn dispatcher_for(registry: &Registry) -> Dispatcher {
        let mut manager = ContainerManager::new();
        manager.component_scan(registry);
        manager.initialize().unwrap();
        Dispatcher::new(RouteHandler::new(&manager))
    }

    fn echo_registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .controller::<ThingController>()
            .base_path("/things")
            .route(HttpMethod::Get, "/{id}", "get_thing", |h| {
                h.param("id", BindingSpec::value(ValueKind::Int))
                    .call(|_c: &ThingController, args| Ok(json!({"id": args.int("id")?}).into()))
            })
            .register();
        registry
    }

    /// Records phase execution order through a shared side channel.
    struct Recording {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware for Recording {
        fn on_request(&self, _request: &mut HttpRequest) -> Option<HttpResponse> {
            self.log.lock().unwrap().push(format!("{}:request", self.label));
            None
        }

        fn on_response(&self, _request: &HttpRequest, response: HttpResponse) -> HttpResponse {
            self.log.lock().unwrap().push(format!("{}:response", self.label));
            response
        }
    }

    #[test]
    fn middleware_phases_reverse_on_response() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = dispatcher_for(&echo_registry());
        dispatcher.add_middleware(Recording {
            label: "m1",
            log: Arc::clone(&log),
        });
        dispatcher.add_middleware(Recording {
            label: "m2",
            log: Arc::clone(&log),
        });

        let response = dispatcher.handle_request(HttpRequest::get("/things/1"));
        assert_eq!(response.status, 200);

        let order = log.lock().unwrap().clone();
        assert_eq!(
            order,
            vec!["m1:request", "m2:request", "m2:response", "m1:response"]
        );
    }

    struct EarlyReturner;

    impl Middleware for EarlyReturner {
        fn on_request(&self, _request: &mut HttpRequest) -> Option<HttpResponse> {
            Some(HttpResponse::new(418, json!({"teapot": true})))
        }
    }

    #[test]
    fn early_return_skips_handler_but_runs_response_phase() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = dispatcher_for(&echo_registry());
        dispatcher.add_middleware(EarlyReturner);
        dispatcher.add_middleware(Recording {
            label: "late",
            log: Arc::clone(&log),
        });

        let response = dispatcher.handle_request(HttpRequest::get("/things/1"));
        assert_eq!(response.status, 418);

        // The second middleware's request phase never ran, but its
        // response phase did, over the short-circuited response.
        let order = log.lock().unwrap().clone();
        assert_eq!(order, vec!["late:response"]);
    }

    #[test]
    fn unknown_route_is_404_with_error_body() {
        let dispatcher = dispatcher_for(&echo_registry());
        let response = dispatcher.handle_request(HttpRequest::get("/missing"));
        assert_eq!(response.status, 404);
        assert!(response.body.get("error").is_some());
    }

    #[test]
    fn not_found_middleware_flag_controls_response_phase() {
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut dispatcher = dispatcher_for(&echo_registry());
        dispatcher.add_middleware(Recording {
            label: "m",
            log: Arc::clone(&log),
        });
        dispatcher.handle_request(HttpRequest::get("/missing"));
        assert!(log.lock().unwrap().contains(&"m:response".to_string()));

        log.lock().unwrap().clear();
        let mut dispatcher = dispatcher_for(&echo_registry());
        dispatcher.add_middleware(Recording {
            label: "m",
            log: Arc::clone(&log),
        });
        dispatcher.route_not_found_through_middleware(false);
        dispatcher.handle_request(HttpRequest::get("/missing"));
        assert!(!log.lock().unwrap().contains(&"m:response".to_string()));
    }

    #[test]
    fn coercion_failure_maps_to_400_with_field_entry() {
        let dispatcher = dispatcher_for(&echo_registry());
        let response = dispatcher.handle_request(HttpRequest::get("/things/not-a-number"));
        assert_eq!(response.status, 400);
        let details = response.body["details"].as_array().unwrap();
        assert!(details.iter().any(|d| d["field"] == json!("id")));
    }

    #[derive(Debug, Error)]
    #[error("thing {0} is gone")]
    struct GoneError(i64);

    fn failing_registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .controller::<ThingController>()
            .route(HttpMethod::Get, "/boom", "boom", |h| {
                h.call(|_c: &ThingController, _args| Err(HttpError::app(GoneError(7))))
            })
            .register();
        registry
    }

    #[test]
    fn registered_error_handler_takes_priority() {
        let mut dispatcher = dispatcher_for(&failing_registry());
        dispatcher.add_error_handler::<GoneError, _>(|err, _request| {
            HttpResponse::new(410, json!({"gone": err.0}))
        });

        let response = dispatcher.handle_request(HttpRequest::get("/boom"));
        assert_eq!(response.status, 410);
        assert_eq!(response.body["gone"], json!(7));
    }

    #[test]
    fn unhandled_error_maps_to_500_with_context() {
        let dispatcher = dispatcher_for(&failing_registry());
        let response = dispatcher.handle_request(HttpRequest::get("/boom"));
        assert_eq!(response.status, 500);
        assert_eq!(response.body["error"], json!("GoneError"));
        assert_eq!(response.body["message"], json!("thing 7 is gone"));
        assert_eq!(response.body["path"], json!("/boom"));
    }

    #[test]
    fn first_matching_registered_type_wins() {
        #[derive(Debug, Error)]
        #[error("other")]
        struct OtherError;

        let mut dispatcher = dispatcher_for(&failing_registry());
        dispatcher.add_error_handler::<OtherError, _>(|_err, _request| {
            HttpResponse::new(502, json!({"which": "other"}))
        });
        dispatcher.add_error_handler::<GoneError, _>(|_err, _request| {
            HttpResponse::new(410, json!({"which": "gone"}))
        });

        let response = dispatcher.handle_request(HttpRequest::get("/boom"));
        assert_eq!(response.status, 410);
        assert_eq!(response.body["which"], json!("gone"));
    }

    #[test]
    fn cors_preflight_early_returns_204() {
        let mut dispatcher = dispatcher_for(&echo_registry());
        dispatcher.add_middleware(CorsMiddleware::new().allowed_origins(&["https://example.com"]));

        let response = dispatcher.handle_request(HttpRequest::new(HttpMethod::Options, "/things/1"));
        assert_eq!(response.status, 204);
        assert_eq!(
            response.header("Access-Control-Allow-Origin"),
            Some("https://example.com")
        );
    }

    #[test]
    fn cors_decorates_normal_responses() {
        let mut dispatcher = dispatcher_for(&echo_registry());
        dispatcher.add_middleware(CorsMiddleware::new().max_age(600).allow_credentials(true));

        let response = dispatcher.handle_request(HttpRequest::get("/things/1"));
        assert_eq!(response.status, 200);
        assert_eq!(response.header("Access-Control-Allow-Origin"), Some("*"));
        assert_eq!(response.header("Access-Control-Max-Age"), Some("600"));
        assert_eq!(
            response.header("Access-Control-Allow-Credentials"),
            Some("true")
        );
    }
}
