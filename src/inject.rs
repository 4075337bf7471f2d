//! Parameter injection registry and the built-in injector catalogue
//!
//! Each injector claims parameters by pattern-matching the precomputed
//! [`BindingSpec`]. Strategies are tried in ascending priority order and
//! the first claimant supplies the value. Priority bands:
//!
//! | priority | strategy |
//! |---|---|
//! | 0 | raw request |
//! | 100 | header |
//! | 101 | cookie |
//! | 150 | authentication |
//! | 150 | structured body |
//! | 200 | uploaded file |
//! | 300 | direct structured model |
//! | 999 | default-value fallback |

use crate::binding::{
    coerce_value, BindingSpec, BindingTarget, BoundValue, HandlerArgs, RequestData, ValueKind,
};
use crate::error::{HttpError, HttpResult, ValidationError};
use crate::http::{
    is_file_value, parse_file_list, parse_file_value, CookieValue, HeaderValue, HttpRequest,
};
use crate::registry::ParamDecl;
use serde_json::Value;

#[cfg(feature = "logging")]
use tracing::trace;

/// Everything an injector sees about one parameter of one request.
pub struct InjectionContext<'a> {
    pub request: &'a HttpRequest,
    pub name: &'a str,
    pub spec: &'a BindingSpec,
    pub default: Option<&'a Value>,
    pub data: &'a mut RequestData,
}

/// One parameter-binding rule.
pub trait ParameterInjector: Send + Sync {
    /// Ascending order of evaluation; lower runs earlier.
    fn priority(&self) -> u16;

    /// Whether this injector claims the parameter.
    fn can_inject(&self, ctx: &InjectionContext<'_>) -> bool;

    /// Produce the bound value. The boolean asks the registry to delete
    /// the parameter's key from the request data so later fallback
    /// strategies do not double-bind it.
    fn inject(&self, ctx: &mut InjectionContext<'_>) -> HttpResult<(BoundValue, bool)>;
}

/// Ordered set of injector strategies.
#[derive(Default)]
pub struct ParameterInjectorRegistry {
    injectors: Vec<Box<dyn ParameterInjector>>,
}

impl ParameterInjectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in catalogue, registered in priority order.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(RequestInjector));
        registry.register(Box::new(HeaderInjector));
        registry.register(Box::new(CookieInjector));
        registry.register(Box::new(AuthenticationInjector));
        registry.register(Box::new(BodyInjector));
        registry.register(Box::new(FileInjector));
        registry.register(Box::new(ModelInjector));
        registry.register(Box::new(DefaultValueInjector));
        registry
    }

    /// Append a strategy and re-sort. The sort is stable, so strategies
    /// sharing a priority keep their registration order.
    pub fn register(&mut self, injector: Box<dyn ParameterInjector>) {
        self.injectors.push(injector);
        self.injectors.sort_by_key(|i| i.priority());
    }

    pub fn len(&self) -> usize {
        self.injectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.injectors.is_empty()
    }

    /// Bind every declared parameter of a handler.
    ///
    /// For each parameter the first claiming strategy wins; if it signals
    /// removal, the parameter's key is deleted from `data` immediately so
    /// later parameters' fallback bindings cannot double-consume it.
    pub fn inject_parameters(
        &self,
        params: &[ParamDecl],
        request: &HttpRequest,
        data: &mut RequestData,
    ) -> HttpResult<HandlerArgs> {
        let mut args = HandlerArgs::new();

        for decl in params {
            // A parameter named `request` with no annotation still binds
            // the raw request; anything else unannotated is a structural
            // error.
            let spec = match &decl.spec {
                Some(spec) => spec.clone(),
                None if decl.name == "request" => BindingSpec::request(),
                None => {
                    return Err(HttpError::MissingTypeAnnotation {
                        param: decl.name.to_string(),
                    })
                }
            };

            let mut outcome: Option<(BoundValue, bool)> = None;
            for injector in &self.injectors {
                let mut ctx = InjectionContext {
                    request,
                    name: decl.name,
                    spec: &spec,
                    default: decl.default.as_ref(),
                    data: &mut *data,
                };
                if injector.can_inject(&ctx) {
                    outcome = Some(injector.inject(&mut ctx)?);
                    break;
                }
            }

            let Some((value, remove)) = outcome else {
                return Err(ValidationError::single(
                    decl.name,
                    format!("no injector claimed parameter '{}'", decl.name),
                )
                .into());
            };

            if remove {
                data.remove(decl.name);
            }

            #[cfg(feature = "logging")]
            trace!(
                target: "trellis",
                param = decl.name,
                removed = remove,
                "Parameter bound"
            );

            args.set(decl.name, value);
        }

        Ok(args)
    }
}

// =============================================================================
// Built-in injectors
// =============================================================================

/// Priority 0: binds the request object itself and marks the key for
/// removal from the request data.
pub struct RequestInjector;

impl ParameterInjector for RequestInjector {
    fn priority(&self) -> u16 {
        0
    }

    fn can_inject(&self, ctx: &InjectionContext<'_>) -> bool {
        matches!(ctx.spec.target(), BindingTarget::Request)
    }

    fn inject(&self, ctx: &mut InjectionContext<'_>) -> HttpResult<(BoundValue, bool)> {
        Ok((BoundValue::Request(ctx.request.clone()), true))
    }
}

/// snake_case parameter name to Title-Case header name.
fn header_name_from_param(param: &str) -> String {
    param
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Priority 100: binds a header name/value pair. The header name defaults
/// to the parameter name converted snake_case to Title-Case unless
/// explicitly overridden.
pub struct HeaderInjector;

impl ParameterInjector for HeaderInjector {
    fn priority(&self) -> u16 {
        100
    }

    fn can_inject(&self, ctx: &InjectionContext<'_>) -> bool {
        matches!(ctx.spec.target(), BindingTarget::Header)
    }

    fn inject(&self, ctx: &mut InjectionContext<'_>) -> HttpResult<(BoundValue, bool)> {
        let name = ctx
            .spec
            .explicit_name()
            .map(str::to_string)
            .unwrap_or_else(|| header_name_from_param(ctx.name));

        match ctx.request.header(&name) {
            Some(value) => Ok((
                BoundValue::Header(HeaderValue {
                    name,
                    value: value.to_string(),
                }),
                false,
            )),
            None if ctx.spec.is_optional() => Ok((BoundValue::None, false)),
            None => Err(ValidationError::single(
                ctx.name,
                format!("Required header '{name}' is missing"),
            )
            .into()),
        }
    }
}

/// Priority 101: binds a cookie name/value pair. The cookie name defaults
/// to the raw parameter name, no case conversion.
pub struct CookieInjector;

impl ParameterInjector for CookieInjector {
    fn priority(&self) -> u16 {
        101
    }

    fn can_inject(&self, ctx: &InjectionContext<'_>) -> bool {
        matches!(ctx.spec.target(), BindingTarget::Cookie)
    }

    fn inject(&self, ctx: &mut InjectionContext<'_>) -> HttpResult<(BoundValue, bool)> {
        let name = ctx
            .spec
            .explicit_name()
            .map(str::to_string)
            .unwrap_or_else(|| ctx.name.to_string());

        match ctx.request.cookie(&name) {
            Some(value) => Ok((
                BoundValue::Cookie(CookieValue {
                    name,
                    value: value.to_string(),
                }),
                false,
            )),
            None if ctx.spec.is_optional() => Ok((BoundValue::None, false)),
            None => Err(ValidationError::single(
                ctx.name,
                format!("Required cookie '{name}' is missing"),
            )
            .into()),
        }
    }
}

/// Priority 150: binds the authentication attached to the request by
/// upstream middleware; a non-optional parameter with no successful
/// authentication maps to HTTP 401.
pub struct AuthenticationInjector;

impl ParameterInjector for AuthenticationInjector {
    fn priority(&self) -> u16 {
        150
    }

    fn can_inject(&self, ctx: &InjectionContext<'_>) -> bool {
        matches!(ctx.spec.target(), BindingTarget::Authentication)
    }

    fn inject(&self, ctx: &mut InjectionContext<'_>) -> HttpResult<(BoundValue, bool)> {
        let auth = ctx
            .request
            .authentication()
            .filter(|a| a.authenticated)
            .cloned();

        match auth {
            Some(auth) => Ok((BoundValue::Auth(auth), false)),
            None if ctx.spec.is_optional() => Ok((BoundValue::None, false)),
            None => Err(HttpError::AuthenticationRequired(
                "Authentication required".to_string(),
            )),
        }
    }
}

/// Priority 150: populates a structured body from matching fields removed
/// out of the request data, reporting every missing or mistyped field at
/// once.
pub struct BodyInjector;

impl ParameterInjector for BodyInjector {
    fn priority(&self) -> u16 {
        150
    }

    fn can_inject(&self, ctx: &InjectionContext<'_>) -> bool {
        matches!(ctx.spec.target(), BindingTarget::Body(_))
    }

    fn inject(&self, ctx: &mut InjectionContext<'_>) -> HttpResult<(BoundValue, bool)> {
        let BindingTarget::Body(schema) = ctx.spec.target() else {
            unreachable!("claimed by can_inject");
        };

        let value = schema.apply(ctx.data, ctx.name)?;

        let consumed: Vec<&'static str> = schema.field_names().collect();
        for field in consumed {
            ctx.data.remove(field);
        }

        Ok((BoundValue::Model(value), false))
    }
}

/// Priority 200: binds an uploaded file (or list of files). A value that
/// is not file-shaped counts as missing; a missing optional file yields no
/// error.
pub struct FileInjector;

impl ParameterInjector for FileInjector {
    fn priority(&self) -> u16 {
        200
    }

    fn can_inject(&self, ctx: &InjectionContext<'_>) -> bool {
        matches!(ctx.spec.target(), BindingTarget::File)
    }

    fn inject(&self, ctx: &mut InjectionContext<'_>) -> HttpResult<(BoundValue, bool)> {
        let key = ctx
            .spec
            .explicit_name()
            .map(str::to_string)
            .unwrap_or_else(|| ctx.name.to_string());

        let entry = ctx.data.get(&key).filter(|v| is_file_value(v));

        let Some(value) = entry else {
            if ctx.spec.is_optional() {
                return Ok((BoundValue::None, false));
            }
            return Err(ValidationError::single(
                ctx.name,
                format!("Required file '{key}' is missing"),
            )
            .into());
        };

        if ctx.spec.is_list() {
            return Ok((BoundValue::Files(parse_file_list(value)), false));
        }

        let file = match value {
            Value::Array(items) => items.first().and_then(parse_file_value),
            other => parse_file_value(other),
        };

        match file {
            Some(file) => Ok((BoundValue::File(file), false)),
            None if ctx.spec.is_optional() => Ok((BoundValue::None, false)),
            None => Err(ValidationError::single(
                ctx.name,
                format!("Required file '{key}' is missing"),
            )
            .into()),
        }
    }
}

/// Priority 300: a structured model nested under the parameter's own name;
/// the named entry must exist and hold an object.
pub struct ModelInjector;

impl ParameterInjector for ModelInjector {
    fn priority(&self) -> u16 {
        300
    }

    fn can_inject(&self, ctx: &InjectionContext<'_>) -> bool {
        matches!(ctx.spec.target(), BindingTarget::Model(_))
    }

    fn inject(&self, ctx: &mut InjectionContext<'_>) -> HttpResult<(BoundValue, bool)> {
        let BindingTarget::Model(schema) = ctx.spec.target() else {
            unreachable!("claimed by can_inject");
        };

        match ctx.data.get(ctx.name) {
            Some(Value::Object(object)) => {
                let value = schema.apply(object, ctx.name)?;
                ctx.data.remove(ctx.name);
                Ok((BoundValue::Model(value), false))
            }
            Some(other) if !other.is_null() => Err(ValidationError::single(
                ctx.name,
                format!(
                    "Parameter '{}' must be an object, got {}",
                    ctx.name,
                    match other {
                        Value::Bool(_) => "bool",
                        Value::Number(_) => "number",
                        Value::String(_) => "string",
                        Value::Array(_) => "array",
                        _ => "null",
                    }
                ),
            )
            .into()),
            _ => {
                if ctx.spec.is_optional() {
                    return Ok((BoundValue::None, false));
                }
                Err(ValidationError::single(
                    ctx.name,
                    format!("Required parameter '{}' not found in request body", ctx.name),
                )
                .into())
            }
        }
    }
}

/// Priority 999: the fallback. Looks the parameter name up in the request
/// data, applies scalar/list/dict coercion to the declared kind, uses the
/// declared default when absent, and fails with a missing-parameter error
/// when absent with no default.
pub struct DefaultValueInjector;

impl ParameterInjector for DefaultValueInjector {
    fn priority(&self) -> u16 {
        999
    }

    fn can_inject(&self, ctx: &InjectionContext<'_>) -> bool {
        matches!(ctx.spec.target(), BindingTarget::Value(_))
    }

    fn inject(&self, ctx: &mut InjectionContext<'_>) -> HttpResult<(BoundValue, bool)> {
        let BindingTarget::Value(kind) = ctx.spec.target() else {
            unreachable!("claimed by can_inject");
        };

        let entry = ctx.data.get(ctx.name).filter(|v| !v.is_null()).cloned();

        let Some(value) = entry else {
            if let Some(default) = ctx.default {
                return Ok((BoundValue::Value(default.clone()), true));
            }
            if ctx.spec.is_optional() {
                return Ok((BoundValue::None, false));
            }
            return Err(ValidationError::single(
                ctx.name,
                format!("Missing required parameter '{}'", ctx.name),
            )
            .into());
        };

        let effective = if ctx.spec.is_list() && !matches!(kind, ValueKind::List(_)) {
            ValueKind::List(Box::new(kind.clone()))
        } else {
            kind.clone()
        };

        match coerce_value(&value, &effective, ctx.name) {
            Ok(coerced) => Ok((BoundValue::Value(coerced), true)),
            Err(message) => Err(ValidationError::single(ctx.name, message).into()),
        }
    }
}
