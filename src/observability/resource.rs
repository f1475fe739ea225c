//! Resource metadata identifying the running service.
//!
//! A [`ResourceDescriptor`] is merged once at startup from process defaults
//! and service overrides, then shared read-only by all three providers.

use opentelemetry::{KeyValue, Value};
use opentelemetry_sdk::Resource;
use std::collections::{BTreeMap, HashMap};

use crate::error::ConfigError;

// Semantic convention keys (deployment.environment is still experimental upstream)
pub const SERVICE_NAME: &str = "service.name";
pub const SERVICE_VERSION: &str = "service.version";
pub const DEPLOYMENT_ENVIRONMENT: &str = "deployment.environment";
pub const TELEMETRY_SDK_NAME: &str = "telemetry.sdk.name";
pub const TELEMETRY_SDK_LANGUAGE: &str = "telemetry.sdk.language";
pub const PROCESS_PID: &str = "process.pid";

/// Environment variable carrying extra `key=value,...` resource attributes.
pub const RESOURCE_ATTRIBUTES_ENV: &str = "OTEL_RESOURCE_ATTRIBUTES";

const UNKNOWN_SERVICE: &str = "unknown_service";

/// A typed resource attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl AttributeValue {
    fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
        }
    }

    fn same_type(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&AttributeValue> for Value {
    fn from(value: &AttributeValue) -> Self {
        match value {
            AttributeValue::String(s) => Value::String(s.clone().into()),
            AttributeValue::Int(i) => Value::I64(*i),
            AttributeValue::Float(f) => Value::F64(*f),
            AttributeValue::Bool(b) => Value::Bool(*b),
        }
    }
}

/// One unvalidated source of attributes, in insertion order.
///
/// A source may repeat a key; validation happens in
/// [`ResourceDescriptor::merge`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeSet {
    entries: Vec<(String, AttributeValue)>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attribute.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.entries.push((key.into(), value.into()));
        self
    }

    /// Replace every existing entry for `key` with a single new one.
    pub fn replace(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        let key = key.into();
        self.entries.retain(|(k, _)| *k != key);
        self.entries.push((key, value.into()));
    }

    /// Last value given for `key`.
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check a single source and collapse it to unique keys.
    fn validate(&self) -> Result<BTreeMap<String, AttributeValue>, ConfigError> {
        let mut seen: HashMap<&str, &AttributeValue> = HashMap::with_capacity(self.entries.len());
        for (key, value) in &self.entries {
            if key.trim().is_empty() {
                return Err(ConfigError::EmptyAttributeKey);
            }
            if let Some(previous) = seen.insert(key.as_str(), value) {
                if !previous.same_type(value) {
                    return Err(ConfigError::ConflictingAttributeTypes {
                        key: key.clone(),
                        first: previous.type_name(),
                        second: value.type_name(),
                    });
                }
            }
        }
        Ok(seen
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect())
    }
}

/// Immutable, merged resource attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceDescriptor {
    attributes: BTreeMap<String, AttributeValue>,
}

impl ResourceDescriptor {
    /// Merge process defaults with service overrides.
    ///
    /// Keys present in both take the override's value; keys present in only
    /// one source keep that source's value.
    pub fn merge(defaults: &AttributeSet, overrides: &AttributeSet) -> Result<Self, ConfigError> {
        let mut attributes = defaults.validate()?;
        attributes.extend(overrides.validate()?);
        Ok(Self { attributes })
    }

    /// Process defaults, followed by entries from `OTEL_RESOURCE_ATTRIBUTES`.
    pub fn defaults() -> Result<AttributeSet, ConfigError> {
        let mut set = AttributeSet::new()
            .with(SERVICE_NAME, UNKNOWN_SERVICE)
            .with(TELEMETRY_SDK_NAME, "opentelemetry")
            .with(TELEMETRY_SDK_LANGUAGE, "rust")
            .with(PROCESS_PID, i64::from(std::process::id()));

        if let Ok(raw) = std::env::var(RESOURCE_ATTRIBUTES_ENV) {
            for (key, value) in parse_resource_attributes(&raw)?.entries {
                set.replace(key, value);
            }
        }
        Ok(set)
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Name reported as `service.name`.
    pub fn service_name(&self) -> &str {
        match self.attributes.get(SERVICE_NAME) {
            Some(AttributeValue::String(name)) => name,
            _ => UNKNOWN_SERVICE,
        }
    }

    /// Convert into the SDK resource shared by the providers.
    pub fn to_resource(&self) -> Resource {
        Resource::builder_empty()
            .with_attributes(
                self.attributes
                    .iter()
                    .map(|(key, value)| KeyValue::new(key.clone(), Value::from(value))),
            )
            .build()
    }
}

/// Parse the `key=value,key2=value2` format of `OTEL_RESOURCE_ATTRIBUTES`.
pub fn parse_resource_attributes(raw: &str) -> Result<AttributeSet, ConfigError> {
    let mut set = AttributeSet::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| ConfigError::MalformedAttribute(entry.to_string()))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::MalformedAttribute(entry.to_string()));
        }
        set = set.with(key, value.trim());
    }
    Ok(set)
}
