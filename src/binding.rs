//! Parameter binding specs, schemas, and value coercion
//!
//! Handler parameters are described once, at registration time, by a
//! [`BindingSpec`]: a small sum type over the binding target with optional
//! `Named`/`Optional`/`List` envelopes. Injectors pattern-match the
//! precomputed spec per request instead of re-parsing type metadata.

use crate::error::{AppError, FieldError, HttpError, ValidationError};
use crate::http::{Authentication, CookieValue, HeaderValue, HttpRequest, HttpResponse, UploadedFile};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

/// The merged query + path + body data of one request.
pub type RequestData = Map<String, Value>;

/// Scalar/compound kind a fallback-bound value is coerced to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKind {
    Str,
    Int,
    Float,
    Bool,
    List(Box<ValueKind>),
    Map,
    /// Passes the raw value through untouched.
    Any,
}

impl ValueKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::List(_) => "list",
            Self::Map => "dict",
            Self::Any => "any",
        }
    }
}

/// One field of a structured body/model schema.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub default: Option<Value>,
}

#[derive(Debug, Clone)]
pub enum FieldKind {
    Value(ValueKind),
    Nested(Arc<Schema>),
    NestedList(Arc<Schema>),
}

/// Declared shape of a structured body or model parameter.
///
/// Validation aggregates every field problem before failing, with dotted
/// paths for nested fields (`user.address.city`) and indexed paths for
/// list elements (`tags[2]`).
#[derive(Debug, Clone)]
pub struct Schema {
    pub name: &'static str,
    pub fields: Vec<FieldSchema>,
}

impl Schema {
    pub fn builder(name: &'static str) -> SchemaBuilder {
        SchemaBuilder {
            name,
            fields: Vec::new(),
        }
    }

    /// Populate and validate from a flat source map.
    ///
    /// Field errors are reported under `{prefix}.{field}`.
    pub fn apply(&self, source: &Map<String, Value>, prefix: &str) -> Result<Value, ValidationError> {
        let mut out = Map::new();
        let mut errors = Vec::new();

        for field in &self.fields {
            let path = format!("{prefix}.{}", field.name);
            match source.get(field.name) {
                Some(value) if !value.is_null() => match field.kind.coerce(value, &path) {
                    Ok(coerced) => {
                        out.insert(field.name.to_string(), coerced);
                    }
                    Err(mut field_errors) => errors.append(&mut field_errors),
                },
                _ => {
                    if let Some(default) = &field.default {
                        out.insert(field.name.to_string(), default.clone());
                    } else if field.required {
                        errors.push(FieldError::new(
                            path,
                            format!("Missing required field '{}'", field.name),
                        ));
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(Value::Object(out))
        } else {
            Err(ValidationError::new(errors))
        }
    }

    /// Names of the schema's fields, used to strip consumed entries out of
    /// the request data after a body binds.
    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.name)
    }
}

pub struct SchemaBuilder {
    name: &'static str,
    fields: Vec<FieldSchema>,
}

impl SchemaBuilder {
    pub fn required(mut self, name: &'static str, kind: ValueKind) -> Self {
        self.fields.push(FieldSchema {
            name,
            kind: FieldKind::Value(kind),
            required: true,
            default: None,
        });
        self
    }

    pub fn optional(mut self, name: &'static str, kind: ValueKind, default: Option<Value>) -> Self {
        self.fields.push(FieldSchema {
            name,
            kind: FieldKind::Value(kind),
            required: false,
            default,
        });
        self
    }

    pub fn nested(mut self, name: &'static str, schema: Arc<Schema>) -> Self {
        self.fields.push(FieldSchema {
            name,
            kind: FieldKind::Nested(schema),
            required: true,
            default: None,
        });
        self
    }

    pub fn nested_list(mut self, name: &'static str, schema: Arc<Schema>) -> Self {
        self.fields.push(FieldSchema {
            name,
            kind: FieldKind::NestedList(schema),
            required: true,
            default: None,
        });
        self
    }

    pub fn build(self) -> Arc<Schema> {
        Arc::new(Schema {
            name: self.name,
            fields: self.fields,
        })
    }
}

impl FieldKind {
    fn coerce(&self, value: &Value, path: &str) -> Result<Value, Vec<FieldError>> {
        match self {
            Self::Value(kind) => {
                coerce_value(value, kind, path).map_err(|msg| vec![FieldError::new(path, msg)])
            }
            Self::Nested(schema) => match value.as_object() {
                Some(obj) => schema.apply(obj, path).map_err(|e| e.details),
                None => Err(vec![FieldError::new(
                    path,
                    format!(
                        "expects an object for {}, got {}",
                        schema.name,
                        value_type_name(value)
                    ),
                )]),
            },
            Self::NestedList(schema) => match value.as_array() {
                Some(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    let mut errors = Vec::new();
                    for (i, item) in items.iter().enumerate() {
                        let item_path = format!("{path}[{i}]");
                        match item.as_object() {
                            Some(obj) => match schema.apply(obj, &item_path) {
                                Ok(v) => out.push(v),
                                Err(e) => errors.extend(e.details),
                            },
                            None => errors.push(FieldError::new(
                                item_path,
                                format!(
                                    "expects an object for {}, got {}",
                                    schema.name,
                                    value_type_name(item)
                                ),
                            )),
                        }
                    }
                    if errors.is_empty() {
                        Ok(Value::Array(out))
                    } else {
                        Err(errors)
                    }
                }
                None => Err(vec![FieldError::new(
                    path,
                    format!("expects a list, got {}", value_type_name(value)),
                )]),
            },
        }
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Coerce a raw request value to the declared kind.
///
/// Integers and floats use locale-independent parsing; booleans accept the
/// case-insensitive literal sets true/1/yes/on and false/0/no/off; lists
/// accept an actual list or a comma-delimited string; dicts must already be
/// dict-shaped.
pub fn coerce_value(value: &Value, kind: &ValueKind, path: &str) -> Result<Value, String> {
    match kind {
        ValueKind::Any => Ok(value.clone()),
        ValueKind::Str => match value {
            Value::String(s) => Ok(Value::String(s.clone())),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            other => Err(format!(
                "Cannot convert parameter '{path}' to str: got {}",
                value_type_name(other)
            )),
        },
        ValueKind::Int => match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::from(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Value::from(f.trunc() as i64))
                } else {
                    Err(format!("Cannot convert parameter '{path}' to int"))
                }
            }
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|e| format!("Cannot convert parameter '{path}' to int: {e}")),
            Value::Bool(b) => Ok(Value::from(*b as i64)),
            other => Err(format!(
                "Cannot convert parameter '{path}' to int: got {}",
                value_type_name(other)
            )),
        },
        ValueKind::Float => match value {
            Value::Number(n) => n
                .as_f64()
                .map(Value::from)
                .ok_or_else(|| format!("Cannot convert parameter '{path}' to float")),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::from)
                .map_err(|e| format!("Cannot convert parameter '{path}' to float: {e}")),
            Value::Bool(b) => Ok(Value::from(if *b { 1.0 } else { 0.0 })),
            other => Err(format!(
                "Cannot convert parameter '{path}' to float: got {}",
                value_type_name(other)
            )),
        },
        ValueKind::Bool => match value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(Value::Bool(true)),
                "false" | "0" | "no" | "off" => Ok(Value::Bool(false)),
                _ => Err(format!("Cannot convert '{s}' to boolean")),
            },
            Value::Number(n) => Ok(Value::Bool(n.as_f64().is_some_and(|f| f != 0.0))),
            other => Err(format!(
                "Cannot convert parameter '{path}' to bool: got {}",
                value_type_name(other)
            )),
        },
        ValueKind::List(element) => match value {
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    out.push(coerce_value(item, element, &format!("{path}[{i}]"))?);
                }
                Ok(Value::Array(out))
            }
            Value::String(s) => {
                let mut out = Vec::new();
                for (i, item) in s.split(',').enumerate() {
                    let item = Value::String(item.trim().to_string());
                    out.push(coerce_value(&item, element, &format!("{path}[{i}]"))?);
                }
                Ok(Value::Array(out))
            }
            other => {
                // Single value wrapped in a one-element list
                Ok(Value::Array(vec![coerce_value(
                    other,
                    element,
                    &format!("{path}[0]"),
                )?]))
            }
        },
        ValueKind::Map => match value {
            Value::Object(_) => Ok(value.clone()),
            other => Err(format!(
                "Cannot convert parameter '{path}' to dict: expected dict, got {}",
                value_type_name(other)
            )),
        },
    }
}

/// What a handler parameter binds to.
#[derive(Debug, Clone)]
pub enum BindingTarget {
    /// The request object itself.
    Request,
    /// A single HTTP header.
    Header,
    /// A single cookie.
    Cookie,
    /// The authentication attached by upstream middleware.
    Authentication,
    /// A structured body populated from flat request-data fields.
    Body(Arc<Schema>),
    /// An uploaded file.
    File,
    /// A structured model nested under the parameter's own name.
    Model(Arc<Schema>),
    /// Fallback scalar/list/dict coercion.
    Value(ValueKind),
}

/// Precomputed binding description for one handler parameter.
///
/// Built once at handler registration; injectors pattern-match it per
/// request.
#[derive(Debug, Clone)]
pub enum BindingSpec {
    Plain(BindingTarget),
    Named(BindingTarget, &'static str),
    Optional(Box<BindingSpec>),
    List(Box<BindingSpec>),
}

impl BindingSpec {
    pub fn plain(target: BindingTarget) -> Self {
        Self::Plain(target)
    }

    pub fn named(target: BindingTarget, name: &'static str) -> Self {
        Self::Named(target, name)
    }

    pub fn optional(spec: BindingSpec) -> Self {
        Self::Optional(Box::new(spec))
    }

    pub fn list(spec: BindingSpec) -> Self {
        Self::List(Box::new(spec))
    }

    pub fn request() -> Self {
        Self::Plain(BindingTarget::Request)
    }

    pub fn header() -> Self {
        Self::Plain(BindingTarget::Header)
    }

    pub fn header_named(name: &'static str) -> Self {
        Self::Named(BindingTarget::Header, name)
    }

    pub fn cookie() -> Self {
        Self::Plain(BindingTarget::Cookie)
    }

    pub fn cookie_named(name: &'static str) -> Self {
        Self::Named(BindingTarget::Cookie, name)
    }

    pub fn auth() -> Self {
        Self::Plain(BindingTarget::Authentication)
    }

    pub fn body(schema: Arc<Schema>) -> Self {
        Self::Plain(BindingTarget::Body(schema))
    }

    pub fn file() -> Self {
        Self::Plain(BindingTarget::File)
    }

    pub fn model(schema: Arc<Schema>) -> Self {
        Self::Plain(BindingTarget::Model(schema))
    }

    pub fn value(kind: ValueKind) -> Self {
        Self::Plain(BindingTarget::Value(kind))
    }

    /// The innermost binding target, unwrapping every envelope.
    pub fn target(&self) -> &BindingTarget {
        match self {
            Self::Plain(t) | Self::Named(t, _) => t,
            Self::Optional(inner) | Self::List(inner) => inner.target(),
        }
    }

    /// Whether any envelope marks the parameter optional.
    pub fn is_optional(&self) -> bool {
        match self {
            Self::Optional(_) => true,
            Self::List(inner) => inner.is_optional(),
            _ => false,
        }
    }

    /// Whether any envelope marks the parameter as a list binding.
    pub fn is_list(&self) -> bool {
        match self {
            Self::List(_) => true,
            Self::Optional(inner) => inner.is_list(),
            _ => false,
        }
    }

    /// The explicit lookup name, when one was given.
    pub fn explicit_name(&self) -> Option<&'static str> {
        match self {
            Self::Named(_, name) => Some(name),
            Self::Optional(inner) | Self::List(inner) => inner.explicit_name(),
            Self::Plain(_) => None,
        }
    }
}

/// A value bound to one handler parameter.
#[derive(Debug, Clone)]
pub enum BoundValue {
    Request(HttpRequest),
    Header(HeaderValue),
    Cookie(CookieValue),
    Auth(Arc<Authentication>),
    File(UploadedFile),
    Files(Vec<UploadedFile>),
    /// A validated structured body or model, as a coerced object.
    Model(Value),
    /// A coerced fallback value.
    Value(Value),
    /// An optional binding that found nothing.
    None,
}

/// Errors raised by typed [`HandlerArgs`] accessors.
#[derive(Debug, Error)]
pub enum ArgError {
    #[error("no bound argument named '{0}'")]
    Missing(String),
    #[error("bound argument '{name}' is not a {expected}")]
    Kind { name: String, expected: &'static str },
    #[error("failed to deserialize bound argument '{name}': {message}")]
    Deserialize { name: String, message: String },
}

impl From<ArgError> for HttpError {
    fn from(err: ArgError) -> Self {
        HttpError::App(AppError::new(err))
    }
}

/// The bound arguments of one handler invocation, keyed by parameter name.
#[derive(Debug, Clone, Default)]
pub struct HandlerArgs {
    values: Vec<(String, BoundValue)>,
}

impl HandlerArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: BoundValue) {
        let name = name.into();
        if let Some(slot) = self.values.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.values.push((name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&BoundValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn expect(&self, name: &str) -> Result<&BoundValue, ArgError> {
        self.get(name).ok_or_else(|| ArgError::Missing(name.into()))
    }

    /// Whether an optional binding found nothing.
    pub fn is_none(&self, name: &str) -> bool {
        matches!(self.get(name), Some(BoundValue::None) | None)
    }

    pub fn request(&self, name: &str) -> Result<&HttpRequest, ArgError> {
        match self.expect(name)? {
            BoundValue::Request(r) => Ok(r),
            _ => Err(ArgError::Kind {
                name: name.into(),
                expected: "request",
            }),
        }
    }

    pub fn header(&self, name: &str) -> Result<&HeaderValue, ArgError> {
        match self.expect(name)? {
            BoundValue::Header(h) => Ok(h),
            _ => Err(ArgError::Kind {
                name: name.into(),
                expected: "header",
            }),
        }
    }

    pub fn cookie(&self, name: &str) -> Result<&CookieValue, ArgError> {
        match self.expect(name)? {
            BoundValue::Cookie(c) => Ok(c),
            _ => Err(ArgError::Kind {
                name: name.into(),
                expected: "cookie",
            }),
        }
    }

    pub fn auth(&self, name: &str) -> Result<&Arc<Authentication>, ArgError> {
        match self.expect(name)? {
            BoundValue::Auth(a) => Ok(a),
            _ => Err(ArgError::Kind {
                name: name.into(),
                expected: "authentication",
            }),
        }
    }

    pub fn opt_auth(&self, name: &str) -> Option<&Arc<Authentication>> {
        match self.get(name) {
            Some(BoundValue::Auth(a)) => Some(a),
            _ => None,
        }
    }

    pub fn file(&self, name: &str) -> Result<&UploadedFile, ArgError> {
        match self.expect(name)? {
            BoundValue::File(f) => Ok(f),
            _ => Err(ArgError::Kind {
                name: name.into(),
                expected: "file",
            }),
        }
    }

    pub fn files(&self, name: &str) -> Result<&[UploadedFile], ArgError> {
        match self.expect(name)? {
            BoundValue::Files(fs) => Ok(fs),
            _ => Err(ArgError::Kind {
                name: name.into(),
                expected: "file list",
            }),
        }
    }

    /// Raw coerced value of a fallback or model binding.
    pub fn value(&self, name: &str) -> Result<&Value, ArgError> {
        match self.expect(name)? {
            BoundValue::Value(v) | BoundValue::Model(v) => Ok(v),
            _ => Err(ArgError::Kind {
                name: name.into(),
                expected: "value",
            }),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64, ArgError> {
        self.value(name)?.as_i64().ok_or(ArgError::Kind {
            name: name.into(),
            expected: "int",
        })
    }

    pub fn float(&self, name: &str) -> Result<f64, ArgError> {
        self.value(name)?.as_f64().ok_or(ArgError::Kind {
            name: name.into(),
            expected: "float",
        })
    }

    pub fn boolean(&self, name: &str) -> Result<bool, ArgError> {
        self.value(name)?.as_bool().ok_or(ArgError::Kind {
            name: name.into(),
            expected: "bool",
        })
    }

    pub fn str(&self, name: &str) -> Result<&str, ArgError> {
        self.value(name)?.as_str().ok_or(ArgError::Kind {
            name: name.into(),
            expected: "str",
        })
    }

    /// Deserialize a bound model into a typed struct.
    pub fn model<T: DeserializeOwned>(&self, name: &str) -> Result<T, ArgError> {
        let value = self.value(name)?.clone();
        serde_json::from_value(value).map_err(|e| ArgError::Deserialize {
            name: name.into(),
            message: e.to_string(),
        })
    }
}

/// What a handler hands back: a full response, or a bare body wrapped in 200.
#[derive(Debug, Clone)]
pub enum HandlerReply {
    Response(HttpResponse),
    Body(Value),
}

impl HandlerReply {
    /// Normalize to a response, wrapping bare bodies in 200.
    pub fn into_response(self) -> HttpResponse {
        match self {
            Self::Response(r) => r,
            Self::Body(v) => HttpResponse::ok(v),
        }
    }
}

impl From<HttpResponse> for HandlerReply {
    fn from(response: HttpResponse) -> Self {
        Self::Response(response)
    }
}

impl From<Value> for HandlerReply {
    fn from(body: Value) -> Self {
        Self::Body(body)
    }
}
