//! nifcloud_db_parameter_group
//!
//! Only parameters set by the user are tracked. Parameters removed from
//! configuration are reset to the engine default unless the same name is
//! being set to a new value.

use std::collections::HashMap;

use async_trait::async_trait;
use nifcloud_core::provider::ProviderResult;
use nifcloud_core::reconcile::diff_by_key;
use nifcloud_core::resource::{Attributes, Resource, ResourceId, State, Value};
use nifcloud_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use nifcloud_sdk::{Api, Params, json};

use super::ResourceHandler;
use crate::utils::{
    Flattener, expand_params, field, first_at, found, ignore_not_found, object, objects, rdb,
    require_str,
};

const GROUP_PATH: &str = "DescribeDBParameterGroupsResult.DBParameterGroups.DBParameterGroup";
const PARAMETER_PATH: &str = "DescribeDBParametersResult.Parameters.Parameter";
const MARKER_PATH: &str = "DescribeDBParametersResult.Marker";

/// Parameters accepted per Modify / Reset call
const BATCH: usize = 20;

pub struct DbParameterGroup;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Parameter {
    name: String,
    value: String,
    apply_method: String,
}

impl Parameter {
    fn from_object(object: &HashMap<String, Value>) -> Option<Self> {
        Some(Self {
            name: field(object, "name")?.to_string(),
            value: field(object, "value")?.to_string(),
            apply_method: field(object, "apply_method")
                .unwrap_or("immediate")
                .to_string(),
        })
    }

    fn from_response(item: &serde_json::Value) -> Option<Self> {
        Some(Self {
            name: json::string_at(item, "ParameterName")?,
            value: json::string_at(item, "ParameterValue")?,
            apply_method: json::string_at(item, "ApplyMethod")
                .unwrap_or_else(|| "immediate".to_string()),
        })
    }

    fn to_value(&self) -> Value {
        object(vec![
            ("name", Some(Value::from(self.name.as_str()))),
            ("value", Some(Value::from(self.value.as_str()))),
            ("apply_method", Some(Value::from(self.apply_method.as_str()))),
        ])
    }
}

fn parameters(attributes: &impl Attributes) -> Vec<Parameter> {
    objects(attributes, "parameter")
        .into_iter()
        .filter_map(Parameter::from_object)
        .collect()
}

#[async_trait]
impl ResourceHandler for DbParameterGroup {
    fn name(&self) -> &'static str {
        "db_parameter_group"
    }

    fn schema(&self) -> ResourceSchema {
        let parameter = AttributeType::Object(vec![
            AttributeSchema::new("name", AttributeType::String).required(),
            AttributeSchema::new("value", AttributeType::String).required(),
            AttributeSchema::new("apply_method", types::one_of(&["immediate", "pending-reboot"]))
                .with_default("immediate"),
        ]);
        ResourceSchema::new("db_parameter_group")
            .with_description("Engine parameters shared by database servers")
            .attribute(
                AttributeSchema::new("name", types::resource_name(255))
                    .required()
                    .force_new()
                    .with_provider_name("DBParameterGroupName"),
            )
            .attribute(
                AttributeSchema::new("family", AttributeType::String)
                    .required()
                    .force_new()
                    .with_provider_name("DBParameterGroupFamily")
                    .with_description("Engine family, e.g. mysql8.0"),
            )
            .attribute(
                AttributeSchema::new("description", AttributeType::String)
                    .force_new()
                    .with_provider_name("Description"),
            )
            .attribute(AttributeSchema::new(
                "parameter",
                AttributeType::Set(Box::new(parameter)),
            ))
    }

    async fn create(&self, api: &dyn Api, resource: &Resource) -> ProviderResult<State> {
        let name = require_str(resource, "name")?;
        let id = &resource.id;

        let mut params = Params::new();
        expand_params(&self.schema(), resource, &mut params);
        rdb(api, id, "CreateDBParameterGroup", &params).await?;
        modify(api, id, name, &parameters(resource)).await?;

        Ok(self.read(api, id, name).await?.with_identifier(name))
    }

    async fn read(
        &self,
        api: &dyn Api,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let mut params = Params::new();
        params.set("DBParameterGroupName", identifier);
        let response = found(rdb(api, id, "DescribeDBParameterGroups", &params).await)?;
        let Some(group) = response.as_ref().and_then(|r| first_at(r, GROUP_PATH)) else {
            return Ok(State::not_found(id.clone()));
        };

        params.set("Source", "user");
        let mut parameters: Vec<Value> = Vec::new();
        loop {
            let response = rdb(api, id, "DescribeDBParameters", &params).await?;
            parameters.extend(
                json::list_at(&response, PARAMETER_PATH)
                    .into_iter()
                    .filter_map(Parameter::from_response)
                    .map(|p| p.to_value()),
            );
            match json::str_at(&response, MARKER_PATH) {
                Some(marker) if params.get("Marker") != Some(marker) => {
                    params.set("Marker", marker);
                }
                _ => break,
            }
        }

        let attributes = Flattener::new()
            .field("name", group, "DBParameterGroupName")
            .field("family", group, "DBParameterGroupFamily")
            .field("description", group, "Description")
            .value("parameter", Value::List(parameters))
            .build();
        Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
    }

    async fn update(
        &self,
        api: &dyn Api,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let diff = diff_by_key(&parameters(from), &parameters(to), Parameter::clone);

        let reset: Vec<Parameter> = diff
            .to_remove
            .iter()
            .filter(|old| !diff.to_add.iter().any(|new| new.name == old.name))
            .cloned()
            .collect();
        for batch in reset.chunks(BATCH) {
            let mut params = Params::new();
            params.set("DBParameterGroupName", identifier);
            for (i, parameter) in batch.iter().enumerate() {
                let prefix = format!("Parameters.member.{}", i + 1);
                params
                    .set(format!("{}.ParameterName", prefix), parameter.name.as_str())
                    .set(format!("{}.ApplyMethod", prefix), parameter.apply_method.as_str());
            }
            rdb(api, id, "ResetDBParameterGroup", &params).await?;
        }
        modify(api, id, identifier, &diff.to_add).await?;

        self.read(api, id, identifier).await
    }

    async fn delete(&self, api: &dyn Api, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let mut params = Params::new();
        params.set("DBParameterGroupName", identifier);
        ignore_not_found(rdb(api, id, "DeleteDBParameterGroup", &params).await)
    }
}

async fn modify(
    api: &dyn Api,
    id: &ResourceId,
    group_name: &str,
    parameters: &[Parameter],
) -> ProviderResult<()> {
    for batch in parameters.chunks(BATCH) {
        let mut params = Params::new();
        params.set("DBParameterGroupName", group_name);
        for (i, parameter) in batch.iter().enumerate() {
            let prefix = format!("Parameters.member.{}", i + 1);
            params
                .set(format!("{}.ParameterName", prefix), parameter.name.as_str())
                .set(format!("{}.ParameterValue", prefix), parameter.value.as_str())
                .set(format!("{}.ApplyMethod", prefix), parameter.apply_method.as_str());
        }
        rdb(api, id, "ModifyDBParameterGroup", &params).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeApi;
    use serde_json::json;

    fn parameter(name: &str, value: &str) -> Value {
        object(vec![
            ("name", Some(Value::from(name))),
            ("value", Some(Value::from(value))),
            ("apply_method", Some(Value::from("immediate"))),
        ])
    }

    fn group() -> serde_json::Value {
        json!({"DescribeDBParameterGroupsResult": {"DBParameterGroups": {"DBParameterGroup": {
            "DBParameterGroupName": "app",
            "DBParameterGroupFamily": "mysql8.0",
            "Description": "app settings"
        }}}})
    }

    fn user_parameters(parameters: &[(&str, &str)]) -> serde_json::Value {
        let items: Vec<_> = parameters
            .iter()
            .map(|(name, value)| {
                json!({"ParameterName": name, "ParameterValue": value, "ApplyMethod": "immediate"})
            })
            .collect();
        json!({"DescribeDBParametersResult": {"Parameters": {"Parameter": items}}})
    }

    fn state(parameters: Vec<Value>) -> State {
        State::existing(
            ResourceId::new("db_parameter_group", "app"),
            [("parameter".to_string(), Value::List(parameters))]
                .into_iter()
                .collect(),
        )
    }

    #[tokio::test]
    async fn create_sets_parameters() {
        let api = FakeApi::new();
        api.reply("DescribeDBParameterGroups", group())
            .reply("DescribeDBParameters", user_parameters(&[("max_connections", "200")]));

        let resource = Resource::new("db_parameter_group", "app")
            .with_attribute("name", "app")
            .with_attribute("family", "mysql8.0")
            .with_attribute("parameter", Value::List(vec![parameter("max_connections", "200")]));
        let state = DbParameterGroup.create(&api, &resource).await.unwrap();

        let create = api.call("CreateDBParameterGroup").unwrap();
        assert_eq!(create.param("DBParameterGroupFamily"), Some("mysql8.0"));
        let modify = api.call("ModifyDBParameterGroup").unwrap();
        assert_eq!(
            modify.param("Parameters.member.1.ParameterName"),
            Some("max_connections")
        );
        assert_eq!(modify.param("Parameters.member.1.ParameterValue"), Some("200"));
        assert_eq!(
            api.call("DescribeDBParameters").unwrap().param("Source"),
            Some("user")
        );
        assert_eq!(state.get_list("parameter"), &[parameter("max_connections", "200")]);
    }

    #[tokio::test]
    async fn read_follows_parameter_pages() {
        let api = FakeApi::new();
        let mut first = user_parameters(&[("max_connections", "200")]);
        first["DescribeDBParametersResult"]["Marker"] = json!("page2");
        api.reply("DescribeDBParameterGroups", group())
            .reply("DescribeDBParameters", first)
            .reply("DescribeDBParameters", user_parameters(&[("wait_timeout", "60")]));

        let id = ResourceId::new("db_parameter_group", "app");
        let state = DbParameterGroup.read(&api, &id, "app").await.unwrap();

        let calls = api.calls_of("DescribeDBParameters");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].param("Marker"), None);
        assert_eq!(calls[1].param("Marker"), Some("page2"));
        assert_eq!(
            state.get_list("parameter"),
            &[parameter("max_connections", "200"), parameter("wait_timeout", "60")]
        );
    }

    #[tokio::test]
    async fn changed_value_is_not_reset() {
        let api = FakeApi::new();
        api.reply("DescribeDBParameterGroups", group());

        let from = state(vec![
            parameter("max_connections", "200"),
            parameter("wait_timeout", "60"),
        ]);
        let to = Resource::new("db_parameter_group", "app").with_attribute(
            "parameter",
            Value::List(vec![parameter("max_connections", "300")]),
        );
        DbParameterGroup
            .update(&api, &from.id, "app", &from, &to)
            .await
            .unwrap();

        assert_eq!(
            api.mutations(),
            vec!["ResetDBParameterGroup", "ModifyDBParameterGroup"]
        );
        let reset = api.call("ResetDBParameterGroup").unwrap();
        assert_eq!(
            reset.param("Parameters.member.1.ParameterName"),
            Some("wait_timeout")
        );
        assert_eq!(reset.param("Parameters.member.2.ParameterName"), None);
        assert_eq!(
            api.call("ModifyDBParameterGroup")
                .unwrap()
                .param("Parameters.member.1.ParameterValue"),
            Some("300")
        );
    }

    #[tokio::test]
    async fn large_changes_are_batched() {
        let api = FakeApi::new();
        api.reply("DescribeDBParameterGroups", group());

        let many: Vec<Value> = (0..25).map(|i| parameter(&format!("p{i}"), "1")).collect();
        let to = Resource::new("db_parameter_group", "app").with_attribute("parameter", Value::List(many));
        DbParameterGroup
            .update(&api, &ResourceId::new("db_parameter_group", "app"), "app", &state(vec![]), &to)
            .await
            .unwrap();

        let calls = api.calls_of("ModifyDBParameterGroup");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].param("Parameters.member.5.ParameterName"), Some("p24"));
    }
}
