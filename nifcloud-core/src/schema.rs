//! Schema - Define type schemas for resources
//!
//! Every resource handler declares a schema. It drives configuration
//! validation, the Terraform schema exposed by the plugin, and the generic
//! mapping between attributes and API parameters.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::resource::Value;

/// Validation function attached to a custom type
#[derive(Clone)]
pub struct Validator(Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>);

impl Validator {
    pub fn new(f: impl Fn(&Value) -> Result<(), String> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn check(&self, value: &Value) -> Result<(), String> {
        (self.0)(value)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Validator")
    }
}

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    /// String
    String,
    /// Integer
    Int,
    /// Floating point number
    Float,
    /// Boolean
    Bool,
    /// Enum (list of allowed values)
    Enum(Vec<String>),
    /// Custom type (with validation function)
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: Validator,
    },
    /// Ordered list
    List(Box<AttributeType>),
    /// Unordered collection
    Set(Box<AttributeType>),
    /// Map
    Map(Box<AttributeType>),
    /// Nested object with named fields
    Object(Vec<AttributeSchema>),
}

impl AttributeType {
    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            (AttributeType::String, Value::String(_)) => Ok(()),
            (AttributeType::Int, Value::Int(_)) => Ok(()),
            (AttributeType::Int, Value::Float(f)) if f.fract() == 0.0 => Ok(()),
            (AttributeType::Float, Value::Float(_) | Value::Int(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::Enum(variants), Value::String(s)) => {
                if variants.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(TypeError::InvalidEnumVariant {
                        value: s.clone(),
                        expected: variants.clone(),
                    })
                }
            }

            (AttributeType::Custom { base, validate, .. }, v) => {
                base.validate(v)?;
                validate
                    .check(v)
                    .map_err(|msg| TypeError::ValidationFailed { message: msg })
            }

            (AttributeType::List(inner) | AttributeType::Set(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                for (k, v) in map {
                    inner.validate(v).map_err(|e| TypeError::MapValueError {
                        key: k.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Object(fields), Value::Map(map)) => {
                for field in fields {
                    match map.get(&field.name) {
                        Some(v) => field.attr_type.validate(v).map_err(|e| {
                            TypeError::FieldError {
                                field: field.name.clone(),
                                inner: Box::new(e),
                            }
                        })?,
                        None if field.is_required() => {
                            return Err(TypeError::MissingRequired {
                                name: field.name.clone(),
                            });
                        }
                        None => {}
                    }
                }
                if let Some(unknown) = map
                    .keys()
                    .find(|k| !fields.iter().any(|f| &f.name == *k))
                {
                    return Err(TypeError::UnknownAttribute {
                        name: unknown.clone(),
                    });
                }
                Ok(())
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name(),
            }),
        }
    }

    /// The underlying type, looking through custom wrappers
    pub fn base(&self) -> &AttributeType {
        match self {
            AttributeType::Custom { base, .. } => base.base(),
            other => other,
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Float => "Float".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Enum(variants) => format!("Enum({})", variants.join(" | ")),
            AttributeType::Custom { name, .. } => name.clone(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Set(inner) => format!("Set<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
            AttributeType::Object(_) => "Object".to_string(),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid enum variant '{value}', expected one of: {}", expected.join(", "))]
    InvalidEnumVariant {
        value: String,
        expected: Vec<String>,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Unknown attribute '{name}'")]
    UnknownAttribute { name: String },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },

    #[error("Field '{field}': {inner}")]
    FieldError { field: String, inner: Box<TypeError> },

    #[error("Attribute '{name}': {inner}")]
    AttributeError { name: String, inner: Box<TypeError> },
}

impl Value {
    fn type_name(&self) -> String {
        match self {
            Value::String(_) => "String".to_string(),
            Value::Int(_) => "Int".to_string(),
            Value::Float(_) => "Float".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::List(_) => "List".to_string(),
            Value::Map(_) => "Map".to_string(),
        }
    }
}

/// How an attribute is populated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeMode {
    /// Must be set in configuration
    Required,
    /// May be set in configuration
    Optional,
    /// Set by the provider only
    Computed,
    /// May be set in configuration, otherwise filled by the provider
    OptionalComputed,
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub mode: AttributeMode,
    /// Changing the attribute replaces the resource
    pub force_new: bool,
    pub sensitive: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
    /// API parameter name (e.g., "InstanceType" for RunInstances)
    pub provider_name: Option<String>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            mode: AttributeMode::Optional,
            force_new: false,
            sensitive: false,
            default: None,
            description: None,
            provider_name: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.mode = AttributeMode::Required;
        self
    }

    pub fn optional(mut self) -> Self {
        self.mode = AttributeMode::Optional;
        self
    }

    pub fn computed(mut self) -> Self {
        self.mode = AttributeMode::Computed;
        self
    }

    pub fn optional_computed(mut self) -> Self {
        self.mode = AttributeMode::OptionalComputed;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = Some(name.into());
        self
    }

    pub fn is_required(&self) -> bool {
        self.mode == AttributeMode::Required
    }

    /// Whether the provider may fill the value
    pub fn is_computed(&self) -> bool {
        matches!(
            self.mode,
            AttributeMode::Computed | AttributeMode::OptionalComputed
        )
    }

    /// Whether the value can come from configuration
    pub fn is_configurable(&self) -> bool {
        self.mode != AttributeMode::Computed
    }
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            description: None,
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Attribute names in a stable order
    pub fn attribute_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.attributes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Validate resource attributes
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        let mut errors = Vec::new();

        for (name, schema) in &self.attributes {
            if schema.is_required() && !attributes.contains_key(name) && schema.default.is_none() {
                errors.push(TypeError::MissingRequired { name: name.clone() });
            }
        }

        if let Err(mut type_errors) = self.validate_present(attributes) {
            errors.append(&mut type_errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Type-check the attributes that are present, without the required check
    pub fn validate_present(
        &self,
        attributes: &HashMap<String, Value>,
    ) -> Result<(), Vec<TypeError>> {
        let mut errors = Vec::new();

        for (name, value) in attributes {
            match self.attributes.get(name) {
                Some(schema) => {
                    if let Err(e) = schema.attr_type.validate(value) {
                        errors.push(TypeError::AttributeError {
                            name: name.clone(),
                            inner: Box::new(e),
                        });
                    }
                }
                None => errors.push(TypeError::UnknownAttribute { name: name.clone() }),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Fill in declared defaults for attributes that are not set
    pub fn apply_defaults(&self, attributes: &mut HashMap<String, Value>) {
        for (name, schema) in &self.attributes {
            if let Some(default) = &schema.default {
                attributes
                    .entry(name.clone())
                    .or_insert_with(|| default.clone());
            }
        }
    }
}

/// Helper functions for common types
pub mod types {
    use regex::Regex;

    use super::*;

    fn custom(
        name: &str,
        base: AttributeType,
        f: impl Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    ) -> AttributeType {
        AttributeType::Custom {
            name: name.to_string(),
            base: Box::new(base),
            validate: Validator::new(f),
        }
    }

    /// Enumeration from string literals
    pub fn one_of(values: &[&str]) -> AttributeType {
        AttributeType::Enum(values.iter().map(|v| v.to_string()).collect())
    }

    /// Positive integer type
    pub fn positive_int() -> AttributeType {
        int_between("PositiveInt", 1, i64::MAX)
    }

    /// Integer within an inclusive range
    pub fn int_between(name: &str, min: i64, max: i64) -> AttributeType {
        custom(name, AttributeType::Int, move |value| match value.as_int() {
            Some(n) if n >= min && n <= max => Ok(()),
            Some(n) => Err(format!("{} is out of range {}..={}", n, min, max)),
            None => Err("Expected integer".to_string()),
        })
    }

    /// Port number type
    pub fn port_number() -> AttributeType {
        int_between("PortNumber", 0, 65535)
    }

    /// CIDR block type (e.g., "10.0.0.0/16")
    pub fn cidr() -> AttributeType {
        custom("Cidr", AttributeType::String, |value| match value {
            Value::String(s) => validate_cidr(s),
            _ => Err("Expected string".to_string()),
        })
    }

    /// IPv4 address type (e.g., "192.168.0.1")
    pub fn ipv4_address() -> AttributeType {
        custom("Ipv4Address", AttributeType::String, |value| match value {
            Value::String(s) => validate_ipv4(s),
            _ => Err("Expected string".to_string()),
        })
    }

    /// String with a bounded length
    pub fn string_length(min: usize, max: usize) -> AttributeType {
        custom("BoundedString", AttributeType::String, move |value| {
            match value {
                Value::String(s) if s.chars().count() >= min && s.chars().count() <= max => Ok(()),
                Value::String(s) => Err(format!(
                    "length of '{}' must be between {} and {}",
                    s, min, max
                )),
                _ => Err("Expected string".to_string()),
            }
        })
    }

    /// String matching a regular expression
    pub fn pattern(name: &str, pattern: &str, hint: &str) -> AttributeType {
        let re = Regex::new(pattern).ok();
        let hint = hint.to_string();
        custom(name, AttributeType::String, move |value| match (value, &re) {
            (Value::String(s), Some(re)) if re.is_match(s) => Ok(()),
            (Value::String(s), Some(_)) => Err(format!("'{}' {}", s, hint)),
            (Value::String(_), None) => Ok(()),
            _ => Err("Expected string".to_string()),
        })
    }

    /// Alphanumeric NIFCLOUD resource name of at most `max` characters
    pub fn resource_name(max: usize) -> AttributeType {
        pattern(
            "ResourceName",
            &format!("^[a-zA-Z0-9]{{1,{}}}$", max),
            &format!("must be 1 to {} alphanumeric characters", max),
        )
    }
}

/// Validate IPv4 address format
pub fn validate_ipv4(ip: &str) -> Result<(), String> {
    let octets: Vec<&str> = ip.split('.').collect();
    if octets.len() != 4 {
        return Err(format!("Invalid IP address '{}': expected 4 octets", ip));
    }

    for octet in &octets {
        if octet.parse::<u8>().is_err() {
            return Err(format!(
                "Invalid octet '{}' in IP address: must be 0-255",
                octet
            ));
        }
    }
    Ok(())
}

/// Validate CIDR block format (e.g., "10.0.0.0/16")
pub fn validate_cidr(cidr: &str) -> Result<(), String> {
    let parts: Vec<&str> = cidr.split('/').collect();
    if parts.len() != 2 {
        return Err(format!(
            "Invalid CIDR format '{}': expected IP/prefix",
            cidr
        ));
    }

    validate_ipv4(parts[0])?;

    match parts[1].parse::<u8>() {
        Ok(p) if p <= 32 => Ok(()),
        Ok(p) => Err(format!("Invalid prefix length '{}': must be 0-32", p)),
        Err(_) => Err(format!(
            "Invalid prefix length '{}': must be a number",
            parts[1]
        )),
    }
}
