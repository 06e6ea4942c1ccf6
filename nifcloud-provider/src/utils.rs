//! Helpers shared by resource handlers: API calls with error mapping,
//! schema-driven parameter expansion and state flattening.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use nifcloud_core::provider::{ProviderError, ProviderResult};
use nifcloud_core::resource::{Attributes, Resource, ResourceId, Value};
use nifcloud_core::schema::ResourceSchema;
use nifcloud_core::waiter::{Status, Waiter};
use nifcloud_sdk::json;
use nifcloud_sdk::{Api, ClientError, Element, Method, Params, Service};

/// Convert a client error into a provider error for `action`
pub fn api_error(err: ClientError, action: &str) -> ProviderError {
    let mut error = ProviderError::new(format!("{} failed: {}", action, err));
    if let Some(code) = err.code() {
        error = error.with_code(code);
    }
    error.with_cause(err)
}

/// Call a Computing API action
pub async fn computing(
    api: &dyn Api,
    id: &ResourceId,
    action: &str,
    params: &Params,
) -> ProviderResult<serde_json::Value> {
    call(api, id, Service::Computing, action, params).await
}

/// Call an RDB API action
pub async fn rdb(
    api: &dyn Api,
    id: &ResourceId,
    action: &str,
    params: &Params,
) -> ProviderResult<serde_json::Value> {
    call(api, id, Service::Rdb, action, params).await
}

async fn call(
    api: &dyn Api,
    id: &ResourceId,
    service: Service,
    action: &str,
    params: &Params,
) -> ProviderResult<serde_json::Value> {
    api.query(service, action, params)
        .await
        .map_err(|e| api_error(e, action).for_resource(id.clone()))
}

/// Call the DNS REST API, `path` relative to the versioned endpoint
pub async fn dns(
    api: &dyn Api,
    id: &ResourceId,
    method: Method,
    path: &str,
    body: Option<&Element>,
) -> ProviderResult<serde_json::Value> {
    let operation = format!("{} {}", method, path);
    api.rest(Service::Dns, method, path, body.map(Element::to_document))
        .await
        .map_err(|e| api_error(e, &operation).for_resource(id.clone()))
}

/// Map a not-found error to `None`
pub fn found<T>(result: ProviderResult<T>) -> ProviderResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Ignore a not-found error, for deletes of resources already gone
pub fn ignore_not_found(result: ProviderResult<serde_json::Value>) -> ProviderResult<()> {
    found(result).map(|_| ())
}

/// First item of the list at `path`
pub fn first_at<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    json::list_at(value, path).into_iter().next()
}

/// Error for a required attribute that is absent
pub fn missing(id: &ResourceId, attribute: &str) -> ProviderError {
    ProviderError::new(format!("attribute '{}' is required", attribute)).for_resource(id.clone())
}

/// Required string attribute
pub fn require_str<'a>(resource: &'a Resource, attribute: &str) -> ProviderResult<&'a str> {
    resource
        .get_str(attribute)
        .ok_or_else(|| missing(&resource.id, attribute))
}

/// Request parameter form of a scalar value
pub fn param_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Int(i) => Some(i.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::List(_) | Value::Map(_) => None,
    }
}

/// Copy every scalar attribute with a `provider_name` into request parameters
pub fn expand_params(schema: &ResourceSchema, resource: &Resource, params: &mut Params) {
    for name in schema.attribute_names() {
        let Some(attr) = schema.attributes.get(name) else {
            continue;
        };
        let (Some(param), Some(value)) = (&attr.provider_name, resource.attr(name)) else {
            continue;
        };
        if let Some(v) = param_value(value) {
            params.set_opt(param, Some(v));
        }
    }
}

/// Names of the attributes that differ between the prior state and the
/// desired configuration
///
/// Covers attributes set in configuration and optional attributes without a
/// default that were set before but are now removed from it. Computed
/// attributes absent from configuration keep their prior value and are not
/// reported.
pub fn changed<'a>(
    schema: &'a ResourceSchema,
    from: &impl Attributes,
    to: &'a Resource,
) -> Vec<&'a str> {
    let mut names: Vec<&str> = to
        .attributes
        .iter()
        .filter(|(name, value)| from.attr(name) != Some(*value))
        .map(|(name, _)| name.as_str())
        .collect();
    names.extend(
        schema
            .attributes
            .iter()
            .filter(|(name, attr)| {
                attr.is_configurable()
                    && !attr.is_computed()
                    && attr.default.is_none()
                    && from.attr(name).is_some()
                    && to.attr(name).is_none()
            })
            .map(|(name, _)| name.as_str()),
    );
    names.sort_unstable();
    names
}

/// Builder for state attributes flattened from an API response
///
/// Empty strings and absent values are never written.
#[derive(Debug, Default)]
pub struct Flattener {
    attributes: HashMap<String, Value>,
}

impl Flattener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn str(mut self, key: &str, value: Option<&str>) -> Self {
        if let Some(v) = value.filter(|v| !v.is_empty()) {
            self.attributes.insert(key.to_string(), Value::string(v));
        }
        self
    }

    pub fn int(mut self, key: &str, value: Option<i64>) -> Self {
        if let Some(v) = value {
            self.attributes.insert(key.to_string(), Value::Int(v));
        }
        self
    }

    pub fn bool(mut self, key: &str, value: Option<bool>) -> Self {
        if let Some(v) = value {
            self.attributes.insert(key.to_string(), Value::Bool(v));
        }
        self
    }

    pub fn strings(mut self, key: &str, values: Vec<String>) -> Self {
        self.attributes.insert(
            key.to_string(),
            Value::List(values.into_iter().map(Value::String).collect()),
        );
        self
    }

    pub fn value(mut self, key: &str, value: Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }

    /// String field of the response item at `path`
    pub fn field(self, key: &str, item: &serde_json::Value, path: &str) -> Self {
        let value = json::str_at(item, path);
        self.str(key, value)
    }

    /// Integer field of the response item at `path`
    pub fn int_field(self, key: &str, item: &serde_json::Value, path: &str) -> Self {
        let value = json::int_at(item, path);
        self.int(key, value)
    }

    /// Boolean field of the response item at `path`
    pub fn bool_field(self, key: &str, item: &serde_json::Value, path: &str) -> Self {
        let value = json::bool_at(item, path);
        self.bool(key, value)
    }

    pub fn build(self) -> HashMap<String, Value> {
        self.attributes
    }
}

/// Build an object value from named fields, skipping absent ones
pub fn object(fields: Vec<(&str, Option<Value>)>) -> Value {
    Value::Map(
        fields
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k.to_string(), v)))
            .collect(),
    )
}

/// Non-empty string from a response item, as a value
pub fn str_value(item: &serde_json::Value, path: &str) -> Option<Value> {
    json::str_at(item, path).map(Value::string)
}

/// Integer from a response item, as a value
pub fn int_value(item: &serde_json::Value, path: &str) -> Option<Value> {
    json::int_at(item, path).map(Value::Int)
}

/// Object items of a list attribute
pub fn objects<'a>(resource: &'a impl Attributes, key: &str) -> Vec<&'a HashMap<String, Value>> {
    resource
        .get_list(key)
        .iter()
        .filter_map(Value::as_map)
        .collect()
}

/// String field of an object attribute item
pub fn field<'a>(object: &'a HashMap<String, Value>, key: &str) -> Option<&'a str> {
    object.get_str(key).filter(|s| !s.is_empty())
}

/// Poll a status reader with the given waiter, attaching the resource id to
/// failures
pub async fn wait_until<F, Fut>(
    waiter: Waiter,
    id: &ResourceId,
    read_status: F,
) -> ProviderResult<Status>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<Status>>,
{
    waiter.wait(read_status).await.map_err(|e| {
        if e.resource_id.is_some() {
            e
        } else {
            e.for_resource(id.clone())
        }
    })
}

/// Waiter with the given poll interval and timeout in seconds
pub fn waiter(id: &ResourceId, interval: u64, timeout: u64) -> Waiter {
    Waiter::new(id.to_string())
        .interval(Duration::from_secs(interval))
        .timeout(Duration::from_secs(timeout))
}

/// Status of an optional response item
pub fn status_of(item: Option<serde_json::Value>, path: &str) -> Status {
    match item {
        Some(item) => Status::found(json::str_at(&item, path).unwrap_or_default()),
        None => Status::Missing,
    }
}
