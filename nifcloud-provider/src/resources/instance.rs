//! nifcloud_instance

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use nifcloud_core::provider::ProviderResult;
use nifcloud_core::resource::{Attributes, Resource, ResourceId, State};
use nifcloud_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use nifcloud_core::waiter::{Status, Waiter};
use nifcloud_sdk::{Api, Params, json};

use super::ResourceHandler;
use crate::utils::{
    Flattener, changed, computing, expand_params, field, first_at, found, objects, require_str,
    wait_until, waiter,
};

const POLL_SECS: u64 = 10;
const TIMEOUT_SECS: u64 = 20 * 60;

pub struct Instance;

fn network_interface() -> AttributeType {
    AttributeType::Object(vec![
        AttributeSchema::new("network_id", AttributeType::String),
        AttributeSchema::new("network_name", AttributeType::String),
        AttributeSchema::new("ip_address", AttributeType::String)
            .with_description("Static IP address, or \"static\" to use the DHCP static mapping"),
    ])
}

#[async_trait]
impl ResourceHandler for Instance {
    fn name(&self) -> &'static str {
        "instance"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("instance")
            .with_description("Cloud server")
            .attribute(
                AttributeSchema::new("instance_id", types::resource_name(15))
                    .required()
                    .force_new()
                    .with_provider_name("InstanceId"),
            )
            .attribute(
                AttributeSchema::new("image_id", AttributeType::String)
                    .required()
                    .force_new()
                    .with_provider_name("ImageId"),
            )
            .attribute(
                AttributeSchema::new("instance_type", AttributeType::String)
                    .optional_computed()
                    .with_provider_name("InstanceType"),
            )
            .attribute(
                AttributeSchema::new("availability_zone", AttributeType::String)
                    .optional_computed()
                    .force_new()
                    .with_provider_name("Placement.AvailabilityZone"),
            )
            .attribute(
                AttributeSchema::new("key_name", AttributeType::String)
                    .force_new()
                    .with_provider_name("KeyName"),
            )
            .attribute(
                AttributeSchema::new("security_group", AttributeType::String)
                    .with_provider_name("SecurityGroup.1"),
            )
            .attribute(
                AttributeSchema::new("accounting_type", types::one_of(&["1", "2"]))
                    .with_default("2")
                    .with_provider_name("AccountingType")
                    .with_description("1: monthly, 2: pay per use"),
            )
            .attribute(
                AttributeSchema::new("admin", AttributeType::String)
                    .force_new()
                    .with_provider_name("Admin"),
            )
            .attribute(
                AttributeSchema::new("password", types::string_length(6, 32))
                    .force_new()
                    .sensitive()
                    .with_provider_name("Password"),
            )
            .attribute(
                AttributeSchema::new("description", types::string_length(0, 40))
                    .with_provider_name("Description"),
            )
            .attribute(
                AttributeSchema::new("disable_api_termination", AttributeType::Bool)
                    .with_default(false)
                    .with_provider_name("DisableApiTermination"),
            )
            .attribute(
                AttributeSchema::new("user_data", AttributeType::String)
                    .force_new()
                    .with_description("Script run at first boot, sent base64 encoded"),
            )
            .attribute(AttributeSchema::new(
                "network_interface",
                AttributeType::List(Box::new(network_interface())),
            ))
            .attribute(AttributeSchema::new("instance_state", AttributeType::String).computed())
            .attribute(AttributeSchema::new("public_ip", AttributeType::String).computed())
            .attribute(AttributeSchema::new("private_ip", AttributeType::String).computed())
            .attribute(AttributeSchema::new("unique_id", AttributeType::String).computed())
    }

    async fn create(&self, api: &dyn Api, resource: &Resource) -> ProviderResult<State> {
        let instance_id = require_str(resource, "instance_id")?;
        let id = &resource.id;

        let mut params = Params::new();
        expand_params(&self.schema(), resource, &mut params);
        if let Some(user_data) = resource.get_str("user_data") {
            params
                .set("UserData", STANDARD.encode(user_data))
                .set("UserData.Encoding", "base64");
        }
        expand_network_interfaces(resource, &mut params);

        computing(api, id, "RunInstances", &params).await?;
        wait_for(api, id, instance_id, &["running"]).await?;

        Ok(self.read(api, id, instance_id).await?.with_identifier(instance_id))
    }

    async fn read(
        &self,
        api: &dyn Api,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let Some(reservation) = describe(api, id, identifier).await? else {
            return Ok(State::not_found(id.clone()));
        };
        let Some(instance) = first_at(&reservation, "instancesSet") else {
            return Ok(State::not_found(id.clone()));
        };
        if json::str_at(instance, "instanceState.name") == Some("terminated") {
            return Ok(State::not_found(id.clone()));
        }

        let attributes = Flattener::new()
            .field("instance_id", instance, "instanceId")
            .field("image_id", instance, "imageId")
            .field("instance_type", instance, "instanceType")
            .field("availability_zone", instance, "placement.availabilityZone")
            .field("key_name", instance, "keyName")
            .str(
                "security_group",
                first_at(&reservation, "groupSet").and_then(|g| json::str_at(g, "groupId")),
            )
            .field("accounting_type", instance, "nextMonthAccountingType")
            .field("description", instance, "description")
            .field("admin", instance, "admin")
            .field("instance_state", instance, "instanceState.name")
            .field("public_ip", instance, "ipAddress")
            .field("private_ip", instance, "privateIpAddress")
            .field("unique_id", instance, "instanceUniqueId")
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
        let schema = self.schema();
        let changes = changed(&schema, from, to);

        for (attribute, api_attribute) in [
            ("description", "description"),
            ("disable_api_termination", "disableApiTermination"),
            ("accounting_type", "accountingType"),
            ("security_group", "groupId"),
        ] {
            if !changes.contains(&attribute) {
                continue;
            }
            let value = to
                .attr(attribute)
                .and_then(crate::utils::param_value)
                .unwrap_or_default();
            modify_attribute(api, id, identifier, api_attribute, &value).await?;
        }

        if changes.contains(&"network_interface") {
            let mut params = Params::new();
            params.set("InstanceId", identifier).set_bool("NiftyReboot", true);
            expand_network_interfaces(to, &mut params);
            computing(api, id, "NiftyUpdateInstanceNetworkInterfaces", &params).await?;
            wait_for(api, id, identifier, &["running"]).await?;
        }

        if changes.contains(&"instance_type")
            && let Some(instance_type) = to.get_str("instance_type")
        {
            // only a running server is stopped for the resize and started again
            let running = instance_status(api, id, identifier).await? == Status::found("running");
            if running {
                stop(api, id, identifier).await?;
            }
            modify_attribute(api, id, identifier, "instanceType", instance_type).await?;
            if running {
                let mut params = Params::new();
                params.set("InstanceId.1", identifier);
                computing(api, id, "StartInstances", &params).await?;
                wait_for(api, id, identifier, &["running"]).await?;
            }
        }

        self.read(api, id, identifier).await
    }

    async fn delete(&self, api: &dyn Api, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let state = self.read(api, id, identifier).await?;
        if !state.exists {
            return Ok(());
        }
        if state.get_str("instance_state") != Some("stopped") {
            stop(api, id, identifier).await?;
        }

        let mut params = Params::new();
        params.set("InstanceId.1", identifier);
        computing(api, id, "TerminateInstances", &params).await?;

        let gone = waiter(id, POLL_SECS, TIMEOUT_SECS).until(&[Waiter::GONE, "terminated"]);
        wait_until(gone, id, move || async move {
            instance_status(api, id, identifier).await
        })
        .await?;
        Ok(())
    }
}

fn expand_network_interfaces(resource: &Resource, params: &mut Params) {
    for (i, nic) in objects(resource, "network_interface").into_iter().enumerate() {
        let prefix = format!("NetworkInterface.{}", i + 1);
        params
            .set_opt(&format!("{}.NetworkId", prefix), field(nic, "network_id"))
            .set_opt(&format!("{}.NetworkName", prefix), field(nic, "network_name"))
            .set_opt(&format!("{}.IpAddress", prefix), field(nic, "ip_address"));
    }
}

async fn describe(
    api: &dyn Api,
    id: &ResourceId,
    instance_id: &str,
) -> ProviderResult<Option<serde_json::Value>> {
    let mut params = Params::new();
    params.set("InstanceId.1", instance_id);
    let response = found(computing(api, id, "DescribeInstances", &params).await)?;
    Ok(response.and_then(|r| first_at(&r, "reservationSet").cloned()))
}

async fn instance_status(api: &dyn Api, id: &ResourceId, instance_id: &str) -> ProviderResult<Status> {
    let reservation = describe(api, id, instance_id).await?;
    let instance = reservation.as_ref().and_then(|r| first_at(r, "instancesSet"));
    Ok(match instance {
        Some(instance) => {
            Status::found(json::str_at(instance, "instanceState.name").unwrap_or_default())
        }
        None => Status::Missing,
    })
}

async fn wait_for(
    api: &dyn Api,
    id: &ResourceId,
    instance_id: &str,
    targets: &[&str],
) -> ProviderResult<()> {
    let waiter = waiter(id, POLL_SECS, TIMEOUT_SECS)
        .until(targets)
        .failing_on(&["warning", "import_error"]);
    wait_until(waiter, id, move || async move {
        instance_status(api, id, instance_id).await
    })
    .await?;
    Ok(())
}

async fn stop(api: &dyn Api, id: &ResourceId, instance_id: &str) -> ProviderResult<()> {
    let mut params = Params::new();
    params.set("InstanceId.1", instance_id);
    computing(api, id, "StopInstances", &params).await?;
    wait_for(api, id, instance_id, &["stopped"]).await
}

async fn modify_attribute(
    api: &dyn Api,
    id: &ResourceId,
    instance_id: &str,
    attribute: &str,
    value: &str,
) -> ProviderResult<()> {
    let mut params = Params::new();
    params
        .set("InstanceId", instance_id)
        .set("Attribute", attribute)
        .set("Value", value);
    computing(api, id, "ModifyInstanceAttribute", &params).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeApi;
    use nifcloud_core::resource::Value;
    use serde_json::json;

    fn described(state: &str, instance_type: &str) -> serde_json::Value {
        json!({
            "reservationSet": [{
                "groupSet": [{"groupId": "fw1"}],
                "instancesSet": [{
                    "instanceId": "web001",
                    "imageId": "221",
                    "instanceType": instance_type,
                    "instanceState": {"code": "16", "name": state},
                    "placement": {"availabilityZone": "east-11"},
                    "ipAddress": "203.0.113.10",
                    "privateIpAddress": "10.0.0.10",
                    "instanceUniqueId": "i-0abc",
                    "nextMonthAccountingType": "2",
                    "description": null
                }]
            }]
        })
    }

    fn id() -> ResourceId {
        ResourceId::new("instance", "web001")
    }

    #[tokio::test(start_paused = true)]
    async fn create_runs_and_waits_for_running() {
        let api = FakeApi::new();
        api.reply("DescribeInstances", described("pending", "e-small"))
            .reply("DescribeInstances", described("running", "e-small"));

        let network = Value::Map(
            [("network_id".to_string(), Value::from("net-COMMON_GLOBAL"))]
                .into_iter()
                .collect(),
        );
        let resource = Resource::new("instance", "web001")
            .with_attribute("instance_id", "web001")
            .with_attribute("image_id", "221")
            .with_attribute("security_group", "fw1")
            .with_attribute("user_data", "#!/bin/sh")
            .with_attribute("network_interface", Value::List(vec![network]));
        let state = Instance.create(&api, &resource).await.unwrap();

        let run = api.call("RunInstances").unwrap();
        assert_eq!(run.param("ImageId"), Some("221"));
        assert_eq!(run.param("SecurityGroup.1"), Some("fw1"));
        assert_eq!(run.param("UserData"), Some("IyEvYmluL3No"));
        assert_eq!(run.param("UserData.Encoding"), Some("base64"));
        assert_eq!(run.param("NetworkInterface.1.NetworkId"), Some("net-COMMON_GLOBAL"));
        assert_eq!(state.identifier.as_deref(), Some("web001"));
        assert_eq!(state.get_str("instance_state"), Some("running"));
        assert_eq!(state.get_str("security_group"), Some("fw1"));
        assert!(!state.attributes.contains_key("description"));
    }

    #[tokio::test(start_paused = true)]
    async fn instance_type_change_stops_modifies_and_starts() {
        let api = FakeApi::new();
        api.reply("DescribeInstances", described("running", "e-small"))
            .reply("DescribeInstances", described("stopped", "e-small"))
            .reply("DescribeInstances", described("running", "e-medium"));

        let from = State::existing(
            id(),
            [("instance_type".to_string(), Value::from("e-small"))].into_iter().collect(),
        );
        let to = Resource::new("instance", "web001").with_attribute("instance_type", "e-medium");
        Instance.update(&api, &id(), "web001", &from, &to).await.unwrap();

        assert_eq!(
            api.mutations(),
            vec!["StopInstances", "ModifyInstanceAttribute", "StartInstances"]
        );
        let modify = api.call("ModifyInstanceAttribute").unwrap();
        assert_eq!(modify.param("Attribute"), Some("instanceType"));
        assert_eq!(modify.param("Value"), Some("e-medium"));
    }

    #[tokio::test(start_paused = true)]
    async fn instance_type_change_leaves_stopped_instance_stopped() {
        let api = FakeApi::new();
        api.reply("DescribeInstances", described("stopped", "e-small"))
            .reply("DescribeInstances", described("stopped", "e-medium"));

        let from = State::existing(
            id(),
            [
                ("instance_type".to_string(), Value::from("e-small")),
                ("instance_state".to_string(), Value::from("stopped")),
            ]
            .into_iter()
            .collect(),
        );
        let to = Resource::new("instance", "web001").with_attribute("instance_type", "e-medium");
        let state = Instance.update(&api, &id(), "web001", &from, &to).await.unwrap();

        assert_eq!(api.mutations(), vec!["ModifyInstanceAttribute"]);
        assert_eq!(state.get_str("instance_state"), Some("stopped"));
        assert_eq!(state.get_str("instance_type"), Some("e-medium"));
    }

    #[tokio::test]
    async fn removed_description_is_cleared() {
        let api = FakeApi::new();
        api.reply("DescribeInstances", described("running", "e-small"));

        let from = State::existing(
            id(),
            [
                ("instance_id".to_string(), Value::from("web001")),
                ("description".to_string(), Value::from("web tier")),
            ]
            .into_iter()
            .collect(),
        );
        let to = Resource::new("instance", "web001").with_attribute("instance_id", "web001");
        Instance.update(&api, &id(), "web001", &from, &to).await.unwrap();

        assert_eq!(api.mutations(), vec!["ModifyInstanceAttribute"]);
        let modify = api.call("ModifyInstanceAttribute").unwrap();
        assert_eq!(modify.param("Attribute"), Some("description"));
        assert_eq!(modify.param("Value"), Some(""));
    }

    #[tokio::test(start_paused = true)]
    async fn delete_stops_then_terminates() {
        let api = FakeApi::new();
        api.reply("DescribeInstances", described("running", "e-small"))
            .reply("DescribeInstances", described("stopped", "e-small"))
            .fail("DescribeInstances", 400, "Client.InvalidParameterNotFound.Instance");

        Instance.delete(&api, &id(), "web001").await.unwrap();

        assert_eq!(api.mutations(), vec!["StopInstances", "TerminateInstances"]);
    }

    #[tokio::test]
    async fn terminated_instance_reads_as_not_found() {
        let api = FakeApi::new();
        api.reply("DescribeInstances", described("terminated", "e-small"));

        let state = Instance.read(&api, &id(), "web001").await.unwrap();
        assert!(!state.exists);
    }
}
