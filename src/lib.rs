//! # Trellis - Dependency Injection with HTTP Dispatch for Rust
//!
//! An annotation-style IoC container and HTTP dispatch runtime: describe
//! components, controllers, and factory methods through an explicit
//! registry, let the container manager resolve construction order and wire
//! singletons together, then route requests to handlers through a
//! priority-ordered parameter injection registry and a middleware
//! pipeline.
//!
//! ## Features
//!
//! - 🧩 **Explicit wiring** - injectable types declare dependencies as field descriptors, no reflection
//! - 📐 **Ordered construction** - topological sorting with full cycle reporting
//! - 🏭 **Factory methods** - factory-produced types are first-class dependency targets
//! - 🔌 **Parameter injection** - priority-ordered strategies bind request data to handler arguments
//! - 🧅 **Middleware pipeline** - request phase in order, response phase strictly reversed
//! - 🔒 **Read-only serving** - singletons live in a lock-free registry after startup
//! - 📊 **Observable** - optional tracing integration with JSON or pretty output
//!
//! ## Quick Start
//!
//! ```rust
//! use trellis::prelude::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[derive(Default)]
//! struct UserService;
//!
//! impl UserService {
//!     fn display_name(&self, id: i64) -> String {
//!         format!("user-{id}")
//!     }
//! }
//!
//! #[derive(Default)]
//! struct UserController {
//!     users: Option<Arc<UserService>>,
//! }
//!
//! let mut registry = Registry::new();
//! registry.component::<UserService>().register();
//! registry
//!     .controller::<UserController>()
//!     .base_path("/users")
//!     .inject::<UserService>("users", |c, s| c.users = Some(s))
//!     .route(HttpMethod::Get, "/{id}", "get_user", |h| {
//!         h.param("id", BindingSpec::value(ValueKind::Int))
//!             .call(|c: &UserController, args| {
//!                 let id = args.int("id")?;
//!                 let name = c.users.as_ref().unwrap().display_name(id);
//!                 Ok(json!({"id": id, "name": name}).into())
//!             })
//!     })
//!     .register();
//!
//! let mut manager = ContainerManager::new();
//! manager.component_scan(&registry);
//! manager.initialize().unwrap();
//!
//! let dispatcher = Dispatcher::new(RouteHandler::new(&manager));
//! let response = dispatcher.handle_request(HttpRequest::get("/users/42"));
//! assert_eq!(response.status, 200);
//! assert_eq!(response.body["name"], json!("user-42"));
//! ```
//!
//! ## Lifecycle
//!
//! 1. Register targets in a [`Registry`] (one per process, or per test).
//! 2. [`ContainerManager::component_scan`] collects the records.
//! 3. [`ContainerManager::initialize`] analyzes dependencies, sorts,
//!    constructs every singleton exactly once, and resolves handler
//!    interceptors. Startup errors abort here and are never swallowed.
//! 4. A [`RouteHandler`] snapshot builds the route table; a
//!    [`Dispatcher`] drives requests through middleware, parameter
//!    injection, and the error-handler table.
//!
//! Concurrent requests may be dispatched from multiple tasks: per-request
//! state is private to each `handle_request` call, and the instance
//! registry is only read after initialization completes.

mod binding;
mod collector;
mod dispatch;
mod error;
mod graph;
mod http;
mod initializer;
mod inject;
mod instances;
mod interceptor;
#[cfg(feature = "logging")]
pub mod logging;
mod manager;
mod registry;
mod router;

pub use binding::*;
pub use collector::*;
pub use dispatch::*;
pub use error::*;
pub use graph::*;
pub use http::*;
pub use initializer::*;
pub use inject::*;
pub use instances::InstanceRegistry;
pub use interceptor::*;
pub use manager::*;
pub use registry::*;
pub use router::*;

// Re-export tracing macros for convenience when logging feature is enabled
#[cfg(feature = "logging")]
pub use tracing::{debug, error, info, trace, warn};

// Re-export for convenience
pub use std::sync::Arc;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BindingSpec, ContainerManager, Dispatcher, HandlerArgs, HandlerReply, HttpError,
        HttpMethod, HttpRequest, HttpResponse, Interceptor, InterceptorDefinition, Middleware,
        ParameterInjectorRegistry, Registry, RouteHandler, Schema, TypeKey, ValueKind,
    };
    pub use std::sync::Arc;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct ServiceA;

    #[derive(Default)]
    struct ServiceB {
        a: Option<Arc<ServiceA>>,
    }

    fn boot(registry: &Registry) -> ContainerManager {
        let mut manager = ContainerManager::new();
        manager.component_scan(registry);
        manager.initialize().unwrap();
        manager
    }

    #[test]
    fn round_trip_field_injection() {
        // Component A with no dependencies, component B with field a: A.
        let mut registry = Registry::new();
        registry.component::<ServiceA>().register();
        registry
            .component::<ServiceB>()
            .inject::<ServiceA>("a", |b, a| b.a = Some(a))
            .register();

        let manager = boot(&registry);
        let a = manager.get_instance::<ServiceA>().unwrap();
        let b = manager.get_instance::<ServiceB>().unwrap();
        assert!(Arc::ptr_eq(b.a.as_ref().unwrap(), &a));
    }

    #[derive(Default)]
    struct ApiController;

    #[test]
    fn round_trip_path_param_binds_as_int() {
        let mut registry = Registry::new();
        registry
            .controller::<ApiController>()
            .base_path("/users")
            .route(HttpMethod::Get, "/{id}", "get_user", |h| {
                h.param("id", BindingSpec::value(ValueKind::Int))
                    .call(|_c: &ApiController, args| {
                        // Bound as an integer, not a string
                        let id = args.int("id")?;
                        Ok(json!({"id": id}).into())
                    })
            })
            .register();

        let manager = boot(&registry);
        let dispatcher = Dispatcher::new(RouteHandler::new(&manager));
        let response = dispatcher.handle_request(HttpRequest::get("/users/42"));
        assert_eq!(response.status, 200);
        assert_eq!(response.body["id"], json!(42));
    }

    #[test]
    fn round_trip_header_binding() {
        let mut registry = Registry::new();
        registry
            .controller::<ApiController>()
            .route(HttpMethod::Get, "/agent", "agent", |h| {
                h.param("user_agent", BindingSpec::header())
                    .call(|_c: &ApiController, args| {
                        let header = args.header("user_agent")?;
                        Ok(json!({"name": header.name, "value": header.value}).into())
                    })
            })
            .register();

        let manager = boot(&registry);
        let dispatcher = Dispatcher::new(RouteHandler::new(&manager));
        let response = dispatcher
            .handle_request(HttpRequest::get("/agent").with_header("User-Agent", "Foo/1.0"));
        assert_eq!(response.body["name"], json!("User-Agent"));
        assert_eq!(response.body["value"], json!("Foo/1.0"));
    }

    #[test]
    fn round_trip_unregistered_path_is_404_without_invoking_handlers() {
        static INVOKED: AtomicBool = AtomicBool::new(false);

        let mut registry = Registry::new();
        registry
            .controller::<ApiController>()
            .route(HttpMethod::Get, "/known", "known", |h| {
                h.call(|_c: &ApiController, _args| {
                    INVOKED.store(true, Ordering::SeqCst);
                    Ok(json!("ok").into())
                })
            })
            .register();

        let manager = boot(&registry);
        let dispatcher = Dispatcher::new(RouteHandler::new(&manager));
        let response = dispatcher.handle_request(HttpRequest::get("/unknown"));

        assert_eq!(response.status, 404);
        assert!(response.body.get("error").is_some());
        assert!(!INVOKED.load(Ordering::SeqCst));
    }

    #[test]
    fn round_trip_bad_body_value_maps_to_400() {
        let mut registry = Registry::new();
        registry
            .controller::<ApiController>()
            .route(HttpMethod::Post, "/people", "create", |h| {
                h.param("age", BindingSpec::value(ValueKind::Int))
                    .call(|_c: &ApiController, args| Ok(json!({"age": args.int("age")?}).into()))
            })
            .register();

        let manager = boot(&registry);
        let dispatcher = Dispatcher::new(RouteHandler::new(&manager));
        let response = dispatcher
            .handle_request(HttpRequest::post("/people").with_body(json!({"age": "not-a-number"})));

        assert_eq!(response.status, 400);
        let details = response.body["details"].as_array().unwrap();
        assert!(details.iter().any(|d| d["field"] == json!("age")));
    }

    #[test]
    fn round_trip_middleware_strict_reversal() {
        struct Recorder {
            label: &'static str,
            log: Arc<Mutex<Vec<String>>>,
        }

        impl Middleware for Recorder {
            fn on_request(&self, _request: &mut HttpRequest) -> Option<HttpResponse> {
                self.log.lock().unwrap().push(format!("{}>", self.label));
                None
            }

            fn on_response(&self, _request: &HttpRequest, response: HttpResponse) -> HttpResponse {
                self.log.lock().unwrap().push(format!("<{}", self.label));
                response
            }
        }

        let mut registry = Registry::new();
        registry
            .controller::<ApiController>()
            .route(HttpMethod::Get, "/ping", "ping", |h| {
                h.call(|_c: &ApiController, _args| Ok(json!("pong").into()))
            })
            .register();

        let manager = boot(&registry);
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new(RouteHandler::new(&manager));
        dispatcher.add_middleware(Recorder {
            label: "M1",
            log: Arc::clone(&log),
        });
        dispatcher.add_middleware(Recorder {
            label: "M2",
            log: Arc::clone(&log),
        });

        dispatcher.handle_request(HttpRequest::get("/ping"));
        assert_eq!(*log.lock().unwrap(), vec!["M1>", "M2>", "<M2", "<M1"]);
    }

    #[test]
    fn structured_body_deserializes_into_typed_model() {
        #[derive(serde::Deserialize)]
        struct CreateUser {
            name: String,
            age: i64,
        }

        let schema = Schema::builder("CreateUser")
            .required("name", ValueKind::Str)
            .required("age", ValueKind::Int)
            .build();

        let mut registry = Registry::new();
        registry
            .controller::<ApiController>()
            .route(HttpMethod::Post, "/users", "create_user", move |h| {
                h.param("user", BindingSpec::body(schema.clone()))
                    .call(|_c: &ApiController, args| {
                        let user: CreateUser = args.model("user")?;
                        Ok(json!({"created": user.name, "age": user.age}).into())
                    })
            })
            .register();

        let manager = boot(&registry);
        let dispatcher = Dispatcher::new(RouteHandler::new(&manager));
        let response = dispatcher.handle_request(
            HttpRequest::post("/users").with_body(json!({"name": "alice", "age": "30"})),
        );
        assert_eq!(response.status, 200);
        assert_eq!(response.body["created"], json!("alice"));
        assert_eq!(response.body["age"], json!(30));
    }

    #[test]
    fn auth_middleware_feeds_auth_injection() {
        struct BearerAuth;

        impl Middleware for BearerAuth {
            fn on_request(&self, request: &mut HttpRequest) -> Option<HttpResponse> {
                if let Some(token) = request
                    .header("Authorization")
                    .and_then(|v| v.strip_prefix("Bearer "))
                {
                    let principal = token.to_string();
                    request.set_authentication(Authentication::authenticated(principal));
                }
                None
            }
        }

        let mut registry = Registry::new();
        registry
            .controller::<ApiController>()
            .route(HttpMethod::Get, "/me", "me", |h| {
                h.param("auth", BindingSpec::auth())
                    .call(|_c: &ApiController, args| {
                        Ok(json!({"principal": args.auth("auth")?.principal}).into())
                    })
            })
            .register();

        let manager = boot(&registry);
        let mut dispatcher = Dispatcher::new(RouteHandler::new(&manager));
        dispatcher.add_middleware(BearerAuth);

        // Without credentials: 401
        let response = dispatcher.handle_request(HttpRequest::get("/me"));
        assert_eq!(response.status, 401);

        // With credentials: bound principal
        let response = dispatcher
            .handle_request(HttpRequest::get("/me").with_header("Authorization", "Bearer alice"));
        assert_eq!(response.status, 200);
        assert_eq!(response.body["principal"], json!("alice"));
    }

    #[test]
    fn interceptors_wrap_handlers_and_share_singletons() {
        static BEFORE_CALLS: AtomicU32 = AtomicU32::new(0);

        #[derive(Default)]
        struct HitCounter {
            hits: Mutex<u32>,
        }

        #[derive(Default)]
        struct CountingInterceptor {
            counter: Option<Arc<HitCounter>>,
        }

        impl Interceptor for CountingInterceptor {
            fn before(
                &self,
                _request: &HttpRequest,
                _args: &mut HandlerArgs,
            ) -> Result<(), HttpError> {
                BEFORE_CALLS.fetch_add(1, Ordering::SeqCst);
                if let Some(counter) = &self.counter {
                    *counter.hits.lock().unwrap() += 1;
                }
                Ok(())
            }
        }

        let mut registry = Registry::new();
        registry.component::<HitCounter>().register();
        registry
            .controller::<ApiController>()
            .route(HttpMethod::Get, "/counted", "counted", |h| {
                h.intercept(
                    InterceptorDefinition::of::<CountingInterceptor>()
                        .inject::<CountingInterceptor, HitCounter>("counter", |i, c| {
                            i.counter = Some(c)
                        }),
                )
                .call(|_c: &ApiController, _args| Ok(json!("ok").into()))
            })
            .register();

        let manager = boot(&registry);
        let dispatcher = Dispatcher::new(RouteHandler::new(&manager));
        dispatcher.handle_request(HttpRequest::get("/counted"));
        dispatcher.handle_request(HttpRequest::get("/counted"));

        assert_eq!(BEFORE_CALLS.load(Ordering::SeqCst), 2);

        // The interceptor received the managed singleton, not a copy
        let counter = manager.get_instance::<HitCounter>().unwrap();
        assert_eq!(*counter.hits.lock().unwrap(), 2);
    }

    #[test]
    fn factory_produced_singleton_round_trip() {
        #[derive(Default)]
        struct DbConfig {
            url: &'static str,
        }

        struct Connection {
            url: String,
        }

        #[derive(Default)]
        struct Repo {
            conn: Option<Arc<Connection>>,
        }

        let mut registry = Registry::new();
        registry
            .component::<DbConfig>()
            .provides::<Connection, _>("connect", |config, _| Connection {
                url: format!("{}/main", config.url),
            })
            .register();
        registry
            .component::<Repo>()
            .inject::<Connection>("conn", |r, c| r.conn = Some(c))
            .register();

        let manager = boot(&registry);
        let repo = manager.get_instance::<Repo>().unwrap();
        let conn = manager.get_instance::<Connection>().unwrap();
        assert!(Arc::ptr_eq(repo.conn.as_ref().unwrap(), &conn));
        assert_eq!(conn.url, "/main");
    }
}
