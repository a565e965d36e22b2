//! Descriptor parsing and schema validation.

use super::specification::{
    AgentSpecification, ListenSpec, ResourceLimits, SUPPORTED_VERSION,
};
use crate::error::ApiError;
use crate::transport::ListenAddress;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Parses spawn files into `AgentSpecification`s.
///
/// Input is YAML; JSON documents load through the same path since JSON is
/// YAML flow syntax. Loading is pure and never touches the registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorLoader;

impl DescriptorLoader {
    pub fn new() -> Self {
        Self
    }

    pub fn load(&self, bytes: &[u8]) -> Result<AgentSpecification, ApiError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ApiError::MalformedDescriptor(format!("not valid UTF-8: {}", e)))?;
        if text.trim().is_empty() {
            return Err(ApiError::MalformedDescriptor("empty document".into()));
        }

        let document: Value = serde_yaml::from_str(text)
            .map_err(|e| ApiError::MalformedDescriptor(e.to_string()))?;
        let root = match document {
            Value::Object(map) => map,
            Value::Null => return Err(ApiError::MalformedDescriptor("empty document".into())),
            other => {
                return Err(ApiError::schema(
                    "<root>",
                    format!("expected a mapping, found {}", type_name(&other)),
                ))
            }
        };

        let spec = validate(root)?;
        debug!(
            name = %spec.name,
            role = %spec.role,
            behaviors = spec.behaviors.len(),
            "Descriptor loaded"
        );
        Ok(spec)
    }

    pub fn load_file(&self, path: &Path) -> Result<AgentSpecification, ApiError> {
        let bytes = std::fs::read(path).map_err(|e| {
            ApiError::MalformedDescriptor(format!("cannot read {}: {}", path.display(), e))
        })?;
        self.load(&bytes)
    }
}

fn validate(mut root: Map<String, Value>) -> Result<AgentSpecification, ApiError> {
    let version = match root.remove("version") {
        None | Some(Value::Null) => SUPPORTED_VERSION,
        Some(value) => match value.as_u64() {
            Some(v) if v == u64::from(SUPPORTED_VERSION) => SUPPORTED_VERSION,
            Some(v) => {
                return Err(ApiError::schema(
                    "version",
                    format!("unsupported version {}, expected {}", v, SUPPORTED_VERSION),
                ))
            }
            None => return Err(ApiError::schema("version", "must be a positive integer")),
        },
    };

    let name = required_string(&mut root, "name")?;
    let role = required_string(&mut root, "role")?;
    let behaviors = behaviors(root.remove("behaviors"))?;

    let config = match root.remove("config") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(ApiError::schema(
                "config",
                format!("expected a mapping, found {}", type_name(&other)),
            ))
        }
    };

    let resources = resources(root.remove("resources"))?;
    let listen = listen(root.remove("listen"))?;

    // Whatever is left is carried forward untouched.
    let extensions: BTreeMap<String, Value> = root.into_iter().collect();

    Ok(AgentSpecification {
        version,
        name,
        role,
        behaviors,
        config,
        resources,
        listen,
        extensions,
    })
}

fn required_string(root: &mut Map<String, Value>, field: &str) -> Result<String, ApiError> {
    match root.remove(field) {
        None | Some(Value::Null) => Err(ApiError::schema(field, "is required")),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::String(_)) => Err(ApiError::schema(field, "must not be empty")),
        Some(other) => Err(ApiError::schema(
            field,
            format!("expected a string, found {}", type_name(&other)),
        )),
    }
}

fn behaviors(value: Option<Value>) -> Result<Vec<String>, ApiError> {
    let items = match value {
        None | Some(Value::Null) => return Err(ApiError::schema("behaviors", "is required")),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(ApiError::schema(
                "behaviors",
                format!("expected a list, found {}", type_name(&other)),
            ))
        }
    };
    if items.is_empty() {
        return Err(ApiError::schema(
            "behaviors",
            "must list at least one behavior",
        ));
    }

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            _ => Err(ApiError::schema(
                format!("behaviors[{}]", i),
                "must be a non-empty string",
            )),
        })
        .collect()
}

fn resources(value: Option<Value>) -> Result<ResourceLimits, ApiError> {
    let mut limits = ResourceLimits::default();
    let mut map = match value {
        None | Some(Value::Null) => return Ok(limits),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(ApiError::schema(
                "resources",
                format!("expected a mapping, found {}", type_name(&other)),
            ))
        }
    };

    if let Some(v) = map.remove("max_inbox") {
        limits.max_inbox = positive(&v, "resources.max_inbox")?;
    }
    if let Some(v) = map.remove("max_payload_bytes") {
        limits.max_payload_bytes = positive(&v, "resources.max_payload_bytes")?;
    }
    if let Some(unknown) = map.keys().next() {
        return Err(ApiError::schema(
            format!("resources.{}", unknown),
            "unknown resource limit",
        ));
    }
    Ok(limits)
}

fn positive(value: &Value, field: &str) -> Result<usize, ApiError> {
    match value.as_u64() {
        Some(n) if n > 0 => usize::try_from(n)
            .map_err(|_| ApiError::schema(field, "value out of range")),
        _ => Err(ApiError::schema(field, "must be a positive integer")),
    }
}

fn listen(value: Option<Value>) -> Result<ListenSpec, ApiError> {
    match value {
        None | Some(Value::Null) => Ok(ListenSpec::Auto),
        Some(Value::String(s)) if s.trim() == "auto" => Ok(ListenSpec::Auto),
        Some(Value::String(s)) => s
            .trim()
            .parse::<ListenAddress>()
            .map(ListenSpec::Fixed)
            .map_err(|e| ApiError::schema("listen", e.to_string())),
        Some(other) => Err(ApiError::schema(
            "listen",
            format!("expected \"auto\" or a multiaddress, found {}", type_name(&other)),
        )),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}
