//! nifcloud_vpn_gateway

use async_trait::async_trait;
use nifcloud_core::provider::{ProviderError, ProviderResult};
use nifcloud_core::resource::{Attributes, Resource, ResourceId, State};
use nifcloud_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use nifcloud_core::waiter::{Status, Waiter};
use nifcloud_sdk::{Api, Params, json};

use super::ResourceHandler;
use crate::utils::{
    Flattener, changed, computing, expand_params, first_at, found, ignore_not_found, param_value,
    status_of, wait_until, waiter,
};

const POLL_SECS: u64 = 10;
const TIMEOUT_SECS: u64 = 30 * 60;

const MODIFIABLE: &[(&str, &str)] = &[
    ("name", "niftyVpnGatewayName"),
    ("type", "niftyVpnGatewayType"),
    ("description", "niftyVpnGatewayDescription"),
    ("security_group", "groupId"),
    ("accounting_type", "accountingType"),
];

pub struct VpnGateway;

#[async_trait]
impl ResourceHandler for VpnGateway {
    fn name(&self) -> &'static str {
        "vpn_gateway"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("vpn_gateway")
            .with_description("IPsec VPN endpoint attached to a private LAN")
            .attribute(
                AttributeSchema::new("name", types::resource_name(15))
                    .optional_computed()
                    .with_provider_name("NiftyVpnGatewayName"),
            )
            .attribute(
                AttributeSchema::new("type", types::one_of(&["small", "medium", "large"]))
                    .with_default("small")
                    .with_provider_name("NiftyVpnGatewayType"),
            )
            .attribute(
                AttributeSchema::new("availability_zone", AttributeType::String)
                    .optional_computed()
                    .force_new()
                    .with_provider_name("Placement.AvailabilityZone"),
            )
            .attribute(
                AttributeSchema::new("accounting_type", types::one_of(&["1", "2"]))
                    .with_default("2")
                    .with_provider_name("AccountingType"),
            )
            .attribute(
                AttributeSchema::new("description", types::string_length(0, 40))
                    .with_provider_name("NiftyVpnGatewayDescription"),
            )
            .attribute(
                AttributeSchema::new("security_group", AttributeType::String)
                    .with_provider_name("SecurityGroup.1"),
            )
            .attribute(
                AttributeSchema::new("network_id", AttributeType::String)
                    .optional_computed()
                    .force_new()
                    .with_provider_name("NiftyNetwork.NetworkId"),
            )
            .attribute(
                AttributeSchema::new("network_name", AttributeType::String)
                    .optional_computed()
                    .force_new()
                    .with_provider_name("NiftyNetwork.NetworkName"),
            )
            .attribute(
                AttributeSchema::new("ip_address", types::ipv4_address())
                    .required()
                    .force_new()
                    .with_provider_name("NiftyNetwork.IpAddress")
                    .with_description("Address on the private LAN"),
            )
            .attribute(AttributeSchema::new("vpn_gateway_id", AttributeType::String).computed())
            .attribute(AttributeSchema::new("public_ip_address", AttributeType::String).computed())
            .attribute(AttributeSchema::new("state", AttributeType::String).computed())
    }

    async fn create(&self, api: &dyn Api, resource: &Resource) -> ProviderResult<State> {
        let id = &resource.id;

        let mut params = Params::new();
        expand_params(&self.schema(), resource, &mut params);
        let response = computing(api, id, "CreateVpnGateway", &params).await?;
        let gateway_id = json::string_at(&response, "vpnGateway.vpnGatewayId").ok_or_else(|| {
            ProviderError::new("CreateVpnGateway returned no VPN gateway id")
                .for_resource(id.clone())
        })?;

        wait_for(api, id, &gateway_id, "available").await?;
        Ok(self.read(api, id, &gateway_id).await?.with_identifier(gateway_id))
    }

    async fn read(
        &self,
        api: &dyn Api,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let Some(gateway) = describe(api, id, identifier).await? else {
            return Ok(State::not_found(id.clone()));
        };

        // interface 0 faces the internet, interface 1 the private LAN
        let interfaces = json::list_at(&gateway, "networkInterfaceSet");
        let interface = |index: &str| {
            interfaces
                .iter()
                .find(|nic| json::str_at(nic, "deviceIndex") == Some(index))
                .copied()
        };
        let public = interface("0");
        let private = interface("1");

        let attributes = Flattener::new()
            .field("vpn_gateway_id", &gateway, "vpnGatewayId")
            .field("name", &gateway, "niftyVpnGatewayName")
            .field("type", &gateway, "niftyVpnGatewayType")
            .field("availability_zone", &gateway, "availabilityZone")
            .field("accounting_type", &gateway, "nextMonthAccountingType")
            .field("description", &gateway, "niftyVpnGatewayDescription")
            .str(
                "security_group",
                first_at(&gateway, "groupSet").and_then(|g| json::str_at(g, "groupId")),
            )
            .str("network_id", private.and_then(|n| json::str_at(n, "networkId")))
            .str("network_name", private.and_then(|n| json::str_at(n, "networkName")))
            .str("ip_address", private.and_then(|n| json::str_at(n, "ipAddress")))
            .str("public_ip_address", public.and_then(|n| json::str_at(n, "ipAddress")))
            .field("state", &gateway, "vpnGatewayState")
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
            let value = to.attr(attribute).and_then(param_value).unwrap_or_default();
            let mut params = Params::new();
            params
                .set("VpnGatewayId", identifier)
                .set("Attribute", *api_attribute)
                .set("Value", value);
            computing(api, id, "NiftyModifyVpnGatewayAttribute", &params).await?;
            wait_for(api, id, identifier, "available").await?;
        }

        self.read(api, id, identifier).await
    }

    async fn delete(&self, api: &dyn Api, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let mut params = Params::new();
        params.set("VpnGatewayId", identifier);
        ignore_not_found(computing(api, id, "DeleteVpnGateway", &params).await)?;
        wait_for(api, id, identifier, Waiter::GONE).await
    }
}

async fn describe(
    api: &dyn Api,
    id: &ResourceId,
    gateway_id: &str,
) -> ProviderResult<Option<serde_json::Value>> {
    let mut params = Params::new();
    params.set("VpnGatewayId.1", gateway_id);
    let response = found(computing(api, id, "DescribeVpnGateways", &params).await)?;
    Ok(response.and_then(|r| first_at(&r, "vpnGatewaySet").cloned()))
}

async fn wait_for(
    api: &dyn Api,
    id: &ResourceId,
    gateway_id: &str,
    target: &str,
) -> ProviderResult<()> {
    let waiter = waiter(id, POLL_SECS, TIMEOUT_SECS)
        .until(&[target])
        .failing_on(&["warning"]);
    wait_until(waiter, id, move || async move {
        let gateway = describe(api, id, gateway_id).await?;
        Ok::<Status, _>(status_of(gateway, "vpnGatewayState"))
    })
    .await?;
    Ok(())
}
