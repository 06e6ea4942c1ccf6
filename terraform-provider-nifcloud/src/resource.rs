//! Terraform resource lifecycle over the core provider
//!
//! Plans are computed from the handler schema alone: defaults fill open
//! configurable attributes, computed attributes become unknown on create,
//! and a change to a `force_new` attribute requires replacement. Apply and
//! read go through the configured core provider.

use std::fmt;

use async_trait::async_trait;
use nifcloud_core::resource::{Resource as CoreResource, ResourceId, State};
use nifcloud_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use tf_provider::{AttributePath, Diagnostics, Resource, Schema, Value, ValueEmpty};

use crate::provider::{ProviderSlot, report};
use crate::schema::{ID, to_tf_schema};
use crate::value::{Node, Object, TfValue, fields, from_core, is_known, is_null, same, to_core};

/// One resource handler served to Terraform
pub struct ResourceBridge {
    name: &'static str,
    schema: ResourceSchema,
    slot: ProviderSlot,
}

impl fmt::Debug for ResourceBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceBridge")
            .field("name", &self.name)
            .finish()
    }
}

impl ResourceBridge {
    pub fn new(name: &'static str, schema: ResourceSchema, slot: ProviderSlot) -> Self {
        Self { name, schema, slot }
    }

    /// Label for logs and errors: the identifier once known, else a name
    fn label(&self, attrs: &Object) -> String {
        string_of(attrs, ID)
            .or_else(|| string_of(attrs, "name"))
            .or_else(|| {
                attrs
                    .keys()
                    .filter(|k| k.ends_with("_name"))
                    .find_map(|k| string_of(attrs, k))
            })
            .or_else(|| string_of(attrs, "instance_id"))
            .or_else(|| string_of(attrs, "identifier"))
            .unwrap_or_else(|| self.name.to_string())
    }

    fn resource_id(&self, attrs: &Object) -> ResourceId {
        ResourceId::new(self.name, self.label(attrs))
    }

    /// Core resource holding every known, non-null attribute
    fn core_resource(&self, attrs: &Object) -> CoreResource {
        let mut resource = CoreResource::new(self.name, self.label(attrs));
        for (name, attr) in &self.schema.attributes {
            if let Some(value) = attrs.get(name).and_then(|v| to_core(&attr.attr_type, v)) {
                resource.attributes.insert(name.clone(), value);
            }
        }
        resource
    }

    fn core_state(&self, attrs: &Object, identifier: &str) -> State {
        let resource = self.core_resource(attrs);
        State::existing(resource.id, resource.attributes).with_identifier(identifier)
    }

    /// State after create or update: planned values that were known stand,
    /// the rest come from the API
    fn applied(&self, planned: &Object, state: &State) -> TfValue {
        let mut result = Object::new();
        for (name, attr) in &self.schema.attributes {
            let value = match planned.get(name) {
                Some(value) if is_known(value) => value.clone(),
                _ => state
                    .attributes
                    .get(name)
                    .map(|v| from_core(&attr.attr_type, v))
                    .unwrap_or(Value::Null),
            };
            result.insert(name.clone(), value);
        }
        result.insert(ID.to_string(), id_value(state.identifier.as_deref()));
        Value::Value(Node::Object(result))
    }

    /// State after a refresh: the API wins, attributes it does not report
    /// keep their prior value
    fn refreshed(&self, prior: &Object, state: &State) -> TfValue {
        let mut result = Object::new();
        for (name, attr) in &self.schema.attributes {
            let before = prior.get(name).cloned().unwrap_or(Value::Null);
            let value = match state.attributes.get(name) {
                Some(v) if v.as_str() == Some("") && is_null(&before) => before,
                Some(v) => from_core(&attr.attr_type, v),
                None => before,
            };
            result.insert(name.clone(), value);
        }
        let identifier = state
            .identifier
            .clone()
            .or_else(|| string_of(prior, ID));
        result.insert(ID.to_string(), id_value(identifier.as_deref()));
        Value::Value(Node::Object(result))
    }

    fn missing_id(&self, diags: &mut Diagnostics) {
        diags.root_error(
            format!("nifcloud_{} has no id", self.name),
            "The state does not record the NIFCLOUD identifier of this resource.",
        );
    }
}

fn string_of(attrs: &Object, name: &str) -> Option<String> {
    match attrs.get(name) {
        Some(Value::Value(Node::String(s))) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn id_value(identifier: Option<&str>) -> TfValue {
    match identifier {
        Some(id) => Value::Value(Node::String(id.to_string())),
        None => Value::Null,
    }
}

/// Fill an attribute the configuration leaves null
fn plan(attr: &AttributeSchema, value: &mut TfValue, creating: bool) {
    if is_null(value) {
        match &attr.default {
            Some(default) if attr.is_configurable() => {
                *value = from_core(&attr.attr_type, default);
            }
            _ if creating && attr.is_computed() => *value = Value::Unknown,
            _ => {}
        }
    }
    plan_nested(&attr.attr_type, value, creating);
}

fn plan_nested(ty: &AttributeType, value: &mut TfValue, creating: bool) {
    match (ty.base(), value) {
        (
            AttributeType::List(inner) | AttributeType::Set(inner),
            Value::Value(Node::List(items)),
        ) => {
            for item in items {
                plan_nested(inner, item, creating);
            }
        }
        (AttributeType::Object(schema), Value::Value(Node::Object(members))) => {
            for field in schema {
                let member = members.entry(field.name.clone()).or_insert(Value::Null);
                plan(field, member, creating);
            }
        }
        _ => {}
    }
}

#[async_trait]
impl Resource for ResourceBridge {
    type State<'a> = TfValue;
    type PrivateState<'a> = ValueEmpty;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(to_tf_schema(&self.schema))
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::State<'a>) -> Option<()> {
        let config = fields(&config);
        for (name, attr) in &self.schema.attributes {
            let Some(value) = config.get(name) else {
                continue;
            };
            if !is_null(value) && !attr.is_configurable() {
                diags.error(
                    "Attribute is read-only",
                    format!("'{}' is computed by NIFCLOUD and cannot be set", name),
                    AttributePath::new(name.clone()),
                );
                continue;
            }
            // unknown values are checked once they are known at apply
            if let Some(core) = to_core(&attr.attr_type, value) {
                if let Err(e) = attr.attr_type.validate(&core) {
                    diags.error(
                        "Invalid attribute value",
                        e.to_string(),
                        AttributePath::new(name.clone()),
                    );
                }
            }
        }
        if diags.errors.is_empty() {
            Some(())
        } else {
            None
        }
    }

    async fn read<'a>(
        &self,
        diags: &mut Diagnostics,
        state: Self::State<'a>,
        private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let prior = fields(&state);
        let Some(identifier) = string_of(&prior, ID) else {
            return Some((state, private_state));
        };
        let provider = self.slot.get(diags)?;
        let id = self.resource_id(&prior);

        match provider.read(&id, Some(identifier.as_str())).await {
            Ok(current) if !current.exists => {
                log::info!("{} is gone, removing it from state", id);
                Some((Value::Null, private_state))
            }
            Ok(current) => Some((self.refreshed(&prior, &current), private_state)),
            Err(e) => {
                report(diags, &format!("Failed to read nifcloud_{}", self.name), &e);
                None
            }
        }
    }

    async fn plan_create<'a>(
        &self,
        _diags: &mut Diagnostics,
        proposed_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let mut planned = fields(&proposed_state);
        for (name, attr) in &self.schema.attributes {
            plan(attr, planned.entry(name.clone()).or_insert(Value::Null), true);
        }
        planned.insert(ID.to_string(), Value::Unknown);
        Some((Value::Value(Node::Object(planned)), Default::default()))
    }

    async fn plan_update<'a>(
        &self,
        _diags: &mut Diagnostics,
        prior_state: Self::State<'a>,
        proposed_state: Self::State<'a>,
        config_state: Self::State<'a>,
        prior_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>, Vec<AttributePath>)> {
        let prior = fields(&prior_state);
        let config = fields(&config_state);
        let mut planned = fields(&proposed_state);
        let mut replace = Vec::new();

        for (name, attr) in &self.schema.attributes {
            let value = planned.entry(name.clone()).or_insert(Value::Null);
            plan(attr, value, false);
            let before = prior.get(name).unwrap_or(&Value::Null);
            if attr.force_new && attr.is_configurable() && !same(&attr.attr_type, before, value) {
                replace.push(AttributePath::new(name.clone()));
            }
        }

        if !replace.is_empty() {
            log::debug!(
                "nifcloud_{} {} must be replaced",
                self.name,
                self.label(&prior)
            );
            for (name, attr) in &self.schema.attributes {
                let configured = config.get(name).is_some_and(|v| !is_null(v));
                if attr.is_computed() && !configured {
                    planned.insert(name.clone(), Value::Unknown);
                }
            }
            planned.insert(ID.to_string(), Value::Unknown);
        }

        Some((
            Value::Value(Node::Object(planned)),
            prior_private_state,
            replace,
        ))
    }

    async fn plan_destroy<'a>(
        &self,
        _diags: &mut Diagnostics,
        _prior_state: Self::State<'a>,
        prior_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<Self::PrivateState<'a>> {
        Some(prior_private_state)
    }

    async fn create<'a>(
        &self,
        diags: &mut Diagnostics,
        planned_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let provider = self.slot.get(diags)?;
        let planned = fields(&planned_state);
        let resource = self.core_resource(&planned);

        match provider.create(&resource).await {
            Ok(state) if state.exists && state.identifier.is_some() => {
                Some((self.applied(&planned, &state), private_state))
            }
            Ok(_) => {
                diags.root_error(
                    format!("Failed to create nifcloud_{}", self.name),
                    format!("{} was not found after creation", resource.id),
                );
                None
            }
            Err(e) => {
                report(diags, &format!("Failed to create nifcloud_{}", self.name), &e);
                None
            }
        }
    }

    async fn update<'a>(
        &self,
        diags: &mut Diagnostics,
        prior_state: Self::State<'a>,
        planned_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let prior = fields(&prior_state);
        let Some(identifier) = string_of(&prior, ID) else {
            self.missing_id(diags);
            return None;
        };
        let provider = self.slot.get(diags)?;
        let planned = fields(&planned_state);
        let from = self.core_state(&prior, &identifier);
        let to = self.core_resource(&planned);

        match provider.update(&from.id, &identifier, &from, &to).await {
            Ok(state) => Some((self.applied(&planned, &state), private_state)),
            Err(e) => {
                report(diags, &format!("Failed to update nifcloud_{}", self.name), &e);
                None
            }
        }
    }

    async fn destroy<'a>(
        &self,
        diags: &mut Diagnostics,
        state: Self::State<'a>,
        _planned_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<()> {
        let attrs = fields(&state);
        let Some(identifier) = string_of(&attrs, ID) else {
            self.missing_id(diags);
            return None;
        };
        let provider = self.slot.get(diags)?;

        match provider.delete(&self.resource_id(&attrs), &identifier).await {
            Ok(()) => Some(()),
            Err(e) => {
                report(diags, &format!("Failed to delete nifcloud_{}", self.name), &e);
                None
            }
        }
    }

    async fn import<'a>(
        &self,
        _diags: &mut Diagnostics,
        id: String,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let mut state: Object = self
            .schema
            .attributes
            .keys()
            .map(|name| (name.clone(), Value::Null))
            .collect();
        state.insert(ID.to_string(), Value::Value(Node::String(id)));
        Some((Value::Value(Node::Object(state)), Default::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockProvider;
    use nifcloud_core::resource::Value as CoreValue;
    use nifcloud_core::schema::types;

    fn schema() -> ResourceSchema {
        ResourceSchema::new("security_group")
            .attribute(
                AttributeSchema::new("group_name", types::resource_name(15))
                    .required()
                    .force_new(),
            )
            .attribute(AttributeSchema::new("description", AttributeType::String))
            .attribute(
                AttributeSchema::new("availability_zone", AttributeType::String)
                    .optional_computed()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("log_limit", types::one_of(&["1000", "100000"]))
                    .with_default("1000"),
            )
            .attribute(AttributeSchema::new("status", AttributeType::String).computed())
            .attribute(AttributeSchema::new(
                "rule",
                AttributeType::List(Box::new(AttributeType::Object(vec![
                    AttributeSchema::new("from_port", AttributeType::Int).required(),
                    AttributeSchema::new("protocol", AttributeType::String).with_default("TCP"),
                ]))),
            ))
    }

    fn bridge(mock: &std::sync::Arc<MockProvider>) -> ResourceBridge {
        ResourceBridge::new("security_group", schema(), mock.slot())
    }

    fn string(s: &str) -> TfValue {
        Value::Value(Node::String(s.to_string()))
    }

    fn object(members: &[(&str, TfValue)]) -> TfValue {
        Value::Value(Node::Object(
            members
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        ))
    }

    fn proposed() -> TfValue {
        object(&[
            ("group_name", string("web")),
            ("description", Value::Null),
            ("availability_zone", Value::Null),
            ("log_limit", Value::Null),
            ("status", Value::Null),
            (
                "rule",
                Value::Value(Node::List(vec![object(&[
                    ("from_port", Value::Value(Node::Int(22))),
                    ("protocol", Value::Null),
                ])])),
            ),
            (ID, Value::Null),
        ])
    }

    fn stored() -> TfValue {
        object(&[
            ("group_name", string("web")),
            ("description", Value::Null),
            ("availability_zone", string("east-11")),
            ("log_limit", string("1000")),
            ("status", string("applied")),
            ("rule", Value::Null),
            (ID, string("web")),
        ])
    }

    #[tokio::test]
    async fn plan_create_fills_defaults_and_unknowns() {
        let mock = MockProvider::new("web");
        let mut diags = Diagnostics::default();
        let (planned, _) = bridge(&mock)
            .plan_create(&mut diags, proposed(), proposed(), Default::default())
            .await
            .unwrap();

        let planned = fields(&planned);
        assert_eq!(planned["log_limit"], string("1000"));
        assert_eq!(planned["availability_zone"], Value::Unknown);
        assert_eq!(planned["status"], Value::Unknown);
        assert_eq!(planned["description"], Value::Null);
        assert_eq!(planned[ID], Value::Unknown);

        let Value::Value(Node::List(rules)) = &planned["rule"] else {
            panic!("rule is not a list");
        };
        assert_eq!(fields(&rules[0])["protocol"], string("TCP"));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn plan_update_requires_replacement_for_force_new_changes() {
        let mock = MockProvider::new("web");
        let mut proposed = fields(&stored());
        proposed.insert("group_name".to_string(), string("db"));
        let proposed = Value::Value(Node::Object(proposed));
        let config = object(&[("group_name", string("db"))]);

        let mut diags = Diagnostics::default();
        let (planned, _, replace) = bridge(&mock)
            .plan_update(
                &mut diags,
                stored(),
                proposed,
                config,
                Default::default(),
                Default::default(),
            )
            .await
            .unwrap();

        assert_eq!(replace.len(), 1);
        let planned = fields(&planned);
        assert_eq!(planned["status"], Value::Unknown);
        assert_eq!(planned["availability_zone"], Value::Unknown);
        assert_eq!(planned[ID], Value::Unknown);
    }

    #[tokio::test]
    async fn plan_update_in_place_keeps_computed_values() {
        let mock = MockProvider::new("web");
        let mut proposed = fields(&stored());
        proposed.insert("description".to_string(), string("web tier"));
        let proposed = Value::Value(Node::Object(proposed));

        let mut diags = Diagnostics::default();
        let (planned, _, replace) = bridge(&mock)
            .plan_update(
                &mut diags,
                stored(),
                proposed,
                object(&[("group_name", string("web")), ("description", string("web tier"))]),
                Default::default(),
                Default::default(),
            )
            .await
            .unwrap();

        assert!(replace.is_empty());
        let planned = fields(&planned);
        assert_eq!(planned["status"], string("applied"));
        assert_eq!(planned[ID], string("web"));
    }

    #[tokio::test]
    async fn create_sends_known_attributes_and_records_id() {
        let mock = MockProvider::new("web");
        mock.remote("status", "applied");
        mock.remote("availability_zone", "east-11");
        let bridge = bridge(&mock);

        let mut diags = Diagnostics::default();
        let (planned, _) = bridge
            .plan_create(&mut diags, proposed(), proposed(), Default::default())
            .await
            .unwrap();
        let (state, _) = bridge
            .create(&mut diags, planned, proposed(), Default::default(), Default::default())
            .await
            .unwrap();

        let calls = mock.calls();
        assert_eq!(calls[0].operation, "create");
        assert_eq!(calls[0].id, ResourceId::new("security_group", "web"));
        assert_eq!(calls[0].attributes["log_limit"], CoreValue::from("1000"));
        assert!(!calls[0].attributes.contains_key("status"));

        let state = fields(&state);
        assert_eq!(state[ID], string("web"));
        assert_eq!(state["status"], string("applied"));
        assert_eq!(state["availability_zone"], string("east-11"));
        assert_eq!(state["description"], Value::Null);
    }

    #[tokio::test]
    async fn create_failure_becomes_a_diagnostic() {
        let mock = MockProvider::new("web");
        mock.fail("InvalidParameter: group name in use");

        let mut diags = Diagnostics::default();
        let result = bridge(&mock)
            .create(&mut diags, proposed(), proposed(), Default::default(), Default::default())
            .await;

        assert!(result.is_none());
        assert_eq!(diags.errors.len(), 1);
    }

    #[tokio::test]
    async fn update_passes_identifier_and_prior_state() {
        let mock = MockProvider::new("web");
        let mut planned = fields(&stored());
        planned.insert("description".to_string(), string("web tier"));

        let mut diags = Diagnostics::default();
        let (state, _) = bridge(&mock)
            .update(
                &mut diags,
                stored(),
                Value::Value(Node::Object(planned.clone())),
                Value::Value(Node::Object(planned)),
                Default::default(),
                Default::default(),
            )
            .await
            .unwrap();

        let call = &mock.calls()[0];
        assert_eq!(call.operation, "update");
        assert_eq!(call.identifier.as_deref(), Some("web"));
        assert_eq!(call.attributes["description"], CoreValue::from("web tier"));
        assert_eq!(fields(&state)["description"], string("web tier"));
    }

    #[tokio::test]
    async fn read_refreshes_from_the_api() {
        let mock = MockProvider::new("web");
        mock.remote("status", "processing");
        mock.remote("description", "");

        let mut diags = Diagnostics::default();
        let (state, _) = bridge(&mock)
            .read(&mut diags, stored(), Default::default(), Default::default())
            .await
            .unwrap();

        let state = fields(&state);
        assert_eq!(state["status"], string("processing"));
        // empty API strings do not replace an unset attribute
        assert_eq!(state["description"], Value::Null);
        assert_eq!(state["availability_zone"], string("east-11"));
        assert_eq!(mock.calls()[0].identifier.as_deref(), Some("web"));
    }

    #[tokio::test]
    async fn read_of_a_vanished_resource_clears_state() {
        let mock = MockProvider::new("web");
        mock.gone();

        let mut diags = Diagnostics::default();
        let (state, _) = bridge(&mock)
            .read(&mut diags, stored(), Default::default(), Default::default())
            .await
            .unwrap();
        assert_eq!(state, Value::Null);
    }

    #[tokio::test]
    async fn destroy_deletes_by_id() {
        let mock = MockProvider::new("web");
        let mut diags = Diagnostics::default();
        bridge(&mock)
            .destroy(&mut diags, stored(), Default::default(), Default::default())
            .await
            .unwrap();
        assert_eq!(mock.operations(), vec!["delete"]);
        assert_eq!(mock.calls()[0].identifier.as_deref(), Some("web"));
    }

    #[tokio::test]
    async fn import_then_read_fills_every_attribute() {
        let mock = MockProvider::new("web");
        mock.remote("group_name", "web");
        mock.remote("log_limit", "100000");
        let bridge = bridge(&mock);

        let mut diags = Diagnostics::default();
        let (imported, private) = bridge.import(&mut diags, "web".to_string()).await.unwrap();
        assert_eq!(fields(&imported)[ID], string("web"));
        assert_eq!(fields(&imported)["group_name"], Value::Null);

        let (state, _) = bridge
            .read(&mut diags, imported, private, Default::default())
            .await
            .unwrap();
        let state = fields(&state);
        assert_eq!(state["group_name"], string("web"));
        assert_eq!(state["log_limit"], string("100000"));
    }

    #[tokio::test]
    async fn validate_rejects_bad_and_read_only_values() {
        let mock = MockProvider::new("web");
        let config = object(&[
            ("group_name", string("web")),
            ("log_limit", string("5")),
            ("status", string("applied")),
        ]);

        let mut diags = Diagnostics::default();
        assert!(bridge(&mock).validate(&mut diags, config).await.is_none());
        assert_eq!(diags.errors.len(), 2);
    }

    #[tokio::test]
    async fn unconfigured_provider_fails_apply() {
        let bridge = ResourceBridge::new("security_group", schema(), ProviderSlot::default());
        let mut diags = Diagnostics::default();
        let result = bridge
            .create(&mut diags, proposed(), proposed(), Default::default(), Default::default())
            .await;
        assert!(result.is_none());
        assert_eq!(diags.errors.len(), 1);
    }
}
