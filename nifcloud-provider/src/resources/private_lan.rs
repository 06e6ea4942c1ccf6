//! nifcloud_private_lan

use async_trait::async_trait;
use nifcloud_core::provider::{ProviderError, ProviderResult};
use nifcloud_core::resource::{Attributes, Resource, ResourceId, State};
use nifcloud_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use nifcloud_core::waiter::{Status, Waiter};
use nifcloud_sdk::{Api, Params, json};

use super::ResourceHandler;
use crate::utils::{
    Flattener, changed, computing, expand_params, first_at, found, ignore_not_found, status_of,
    wait_until, waiter,
};

const POLL_SECS: u64 = 5;
const TIMEOUT_SECS: u64 = 10 * 60;

pub struct PrivateLan;

/// Attributes changed through NiftyModifyPrivateLanAttribute, with the API
/// attribute name
const MODIFIABLE: &[(&str, &str)] = &[
    ("private_lan_name", "privateLanName"),
    ("cidr_block", "cidrBlock"),
    ("accounting_type", "accountingType"),
    ("description", "description"),
];

#[async_trait]
impl ResourceHandler for PrivateLan {
    fn name(&self) -> &'static str {
        "private_lan"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("private_lan")
            .with_description("Private network between servers and routers")
            .attribute(
                AttributeSchema::new("private_lan_name", types::resource_name(15))
                    .optional_computed()
                    .with_provider_name("PrivateLanName"),
            )
            .attribute(
                AttributeSchema::new("cidr_block", types::cidr())
                    .required()
                    .with_provider_name("CidrBlock"),
            )
            .attribute(
                AttributeSchema::new("availability_zone", AttributeType::String)
                    .optional_computed()
                    .force_new()
                    .with_provider_name("AvailabilityZone"),
            )
            .attribute(
                AttributeSchema::new("accounting_type", types::one_of(&["1", "2"]))
                    .with_default("2")
                    .with_provider_name("AccountingType"),
            )
            .attribute(
                AttributeSchema::new("description", types::string_length(0, 40))
                    .with_provider_name("Description"),
            )
            .attribute(AttributeSchema::new("network_id", AttributeType::String).computed())
            .attribute(AttributeSchema::new("state", AttributeType::String).computed())
    }

    async fn create(&self, api: &dyn Api, resource: &Resource) -> ProviderResult<State> {
        let id = &resource.id;

        let mut params = Params::new();
        expand_params(&self.schema(), resource, &mut params);
        let response = computing(api, id, "NiftyCreatePrivateLan", &params).await?;
        let network_id = json::string_at(&response, "privateLan.networkId").ok_or_else(|| {
            ProviderError::new("NiftyCreatePrivateLan returned no network id")
                .for_resource(id.clone())
        })?;

        wait_for(api, id, &network_id, "available").await?;
        Ok(self.read(api, id, &network_id).await?.with_identifier(network_id))
    }

    async fn read(
        &self,
        api: &dyn Api,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let Some(lan) = describe(api, id, identifier).await? else {
            return Ok(State::not_found(id.clone()));
        };

        let attributes = Flattener::new()
            .field("network_id", &lan, "networkId")
            .field("private_lan_name", &lan, "privateLanName")
            .field("cidr_block", &lan, "cidrBlock")
            .field("availability_zone", &lan, "availabilityZone")
            .field("accounting_type", &lan, "nextMonthAccountingType")
            .field("description", &lan, "description")
            .field("state", &lan, "state")
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

        for (attribute, api_attribute) in MODIFIABLE {
            if !changes.contains(attribute) {
                continue;
            }
            let mut params = Params::new();
            params
                .set("NetworkId", identifier)
                .set("Attribute", *api_attribute)
                .set("Value", to.get_str(attribute).unwrap_or_default());
            computing(api, id, "NiftyModifyPrivateLanAttribute", &params).await?;
            wait_for(api, id, identifier, "available").await?;
        }

        self.read(api, id, identifier).await
    }

    async fn delete(&self, api: &dyn Api, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let mut params = Params::new();
        params.set("NetworkId", identifier);
        ignore_not_found(computing(api, id, "NiftyDeletePrivateLan", &params).await)?;
        wait_for(api, id, identifier, Waiter::GONE).await
    }
}

async fn describe(
    api: &dyn Api,
    id: &ResourceId,
    network_id: &str,
) -> ProviderResult<Option<serde_json::Value>> {
    let mut params = Params::new();
    params.set("NetworkId.1", network_id);
    let response = found(computing(api, id, "NiftyDescribePrivateLans", &params).await)?;
    Ok(response.and_then(|r| first_at(&r, "privateLanSet").cloned()))
}

async fn wait_for(
    api: &dyn Api,
    id: &ResourceId,
    network_id: &str,
    target: &str,
) -> ProviderResult<()> {
    let waiter = waiter(id, POLL_SECS, TIMEOUT_SECS).until(&[target]);
    wait_until(waiter, id, move || async move {
        let lan = describe(api, id, network_id).await?;
        Ok::<Status, _>(status_of(lan, "state"))
    })
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeApi;
    use nifcloud_core::resource::Value;
    use serde_json::json;

    fn described(state: &str, cidr: &str) -> serde_json::Value {
        json!({
            "privateLanSet": [{
                "networkId": "net-0a1b2c3d",
                "privateLanName": "lan1",
                "cidrBlock": cidr,
                "availabilityZone": "east-11",
                "nextMonthAccountingType": "2",
                "state": state
            }]
        })
    }

    fn id() -> ResourceId {
        ResourceId::new("private_lan", "lan1")
    }

    #[tokio::test(start_paused = true)]
    async fn create_uses_returned_network_id() {
        let api = FakeApi::new();
        api.reply(
            "NiftyCreatePrivateLan",
            json!({"privateLan": {"networkId": "net-0a1b2c3d"}}),
        )
        .reply("NiftyDescribePrivateLans", described("pending", "192.168.1.0/24"))
        .reply("NiftyDescribePrivateLans", described("available", "192.168.1.0/24"));

        let resource = Resource::new("private_lan", "lan1")
            .with_attribute("private_lan_name", "lan1")
            .with_attribute("cidr_block", "192.168.1.0/24")
            .with_attribute("accounting_type", "2");
        let state = PrivateLan.create(&api, &resource).await.unwrap();

        let create = api.call("NiftyCreatePrivateLan").unwrap();
        assert_eq!(create.param("CidrBlock"), Some("192.168.1.0/24"));
        assert_eq!(create.param("PrivateLanName"), Some("lan1"));
        assert_eq!(state.identifier.as_deref(), Some("net-0a1b2c3d"));
        assert_eq!(state.get_str("state"), Some("available"));
        assert_eq!(
            api.call("NiftyDescribePrivateLans").unwrap().param("NetworkId.1"),
            Some("net-0a1b2c3d")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cidr_change_modifies_in_place() {
        let api = FakeApi::new();
        api.reply("NiftyDescribePrivateLans", described("available", "192.168.2.0/24"));

        let from = State::existing(
            id(),
            [("cidr_block".to_string(), Value::from("192.168.1.0/24"))]
                .into_iter()
                .collect(),
        );
        let to = Resource::new("private_lan", "lan1").with_attribute("cidr_block", "192.168.2.0/24");
        let state = PrivateLan
            .update(&api, &id(), "net-0a1b2c3d", &from, &to)
            .await
            .unwrap();

        assert_eq!(api.mutations(), vec!["NiftyModifyPrivateLanAttribute"]);
        let modify = api.call("NiftyModifyPrivateLanAttribute").unwrap();
        assert_eq!(modify.param("Attribute"), Some("cidrBlock"));
        assert_eq!(modify.param("Value"), Some("192.168.2.0/24"));
        assert_eq!(state.get_str("cidr_block"), Some("192.168.2.0/24"));
    }

    #[tokio::test(start_paused = true)]
    async fn removed_description_is_cleared() {
        let api = FakeApi::new();
        api.reply("NiftyDescribePrivateLans", described("available", "192.168.1.0/24"));

        let from = State::existing(
            id(),
            [
                ("cidr_block".to_string(), Value::from("192.168.1.0/24")),
                ("description".to_string(), Value::from("app tier")),
            ]
            .into_iter()
            .collect(),
        );
        let to = Resource::new("private_lan", "lan1").with_attribute("cidr_block", "192.168.1.0/24");
        PrivateLan
            .update(&api, &id(), "net-0a1b2c3d", &from, &to)
            .await
            .unwrap();

        assert_eq!(api.mutations(), vec!["NiftyModifyPrivateLanAttribute"]);
        let modify = api.call("NiftyModifyPrivateLanAttribute").unwrap();
        assert_eq!(modify.param("Attribute"), Some("description"));
        assert_eq!(modify.param("Value"), Some(""));
    }

    #[tokio::test(start_paused = true)]
    async fn delete_waits_until_gone() {
        let api = FakeApi::new();
        api.reply("NiftyDescribePrivateLans", described("deleting", "192.168.1.0/24"))
            .fail("NiftyDescribePrivateLans", 400, "Client.InvalidParameterNotFound.NetworkId");

        PrivateLan.delete(&api, &id(), "net-0a1b2c3d").await.unwrap();
        assert_eq!(api.calls_of("NiftyDescribePrivateLans").len(), 2);
    }
}
