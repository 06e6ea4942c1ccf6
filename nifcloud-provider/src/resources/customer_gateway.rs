//! nifcloud_customer_gateway

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

pub struct CustomerGateway;

#[async_trait]
impl ResourceHandler for CustomerGateway {
    fn name(&self) -> &'static str {
        "customer_gateway"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("customer_gateway")
            .with_description("On-premises side of a VPN connection")
            .attribute(
                AttributeSchema::new("ip_address", types::ipv4_address())
                    .required()
                    .force_new()
                    .with_provider_name("IpAddress"),
            )
            .attribute(
                AttributeSchema::new("name", types::resource_name(15))
                    .optional_computed()
                    .with_provider_name("NiftyCustomerGatewayName"),
            )
            .attribute(
                AttributeSchema::new("lan_side_ip_address", types::ipv4_address())
                    .force_new()
                    .with_provider_name("NiftyLanSideIpAddress"),
            )
            .attribute(
                AttributeSchema::new("lan_side_cidr_block", types::cidr())
                    .force_new()
                    .with_provider_name("NiftyLanSideCidrBlock"),
            )
            .attribute(
                AttributeSchema::new("description", types::string_length(0, 40))
                    .with_provider_name("NiftyCustomerGatewayDescription"),
            )
            .attribute(AttributeSchema::new("customer_gateway_id", AttributeType::String).computed())
            .attribute(AttributeSchema::new("state", AttributeType::String).computed())
    }

    async fn create(&self, api: &dyn Api, resource: &Resource) -> ProviderResult<State> {
        let id = &resource.id;

        let mut params = Params::new();
        expand_params(&self.schema(), resource, &mut params);
        let response = computing(api, id, "CreateCustomerGateway", &params).await?;
        let gateway_id = json::string_at(&response, "customerGateway.customerGatewayId")
            .ok_or_else(|| {
                ProviderError::new("CreateCustomerGateway returned no customer gateway id")
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

        let attributes = Flattener::new()
            .field("customer_gateway_id", &gateway, "customerGatewayId")
            .field("ip_address", &gateway, "ipAddress")
            .field("name", &gateway, "niftyCustomerGatewayName")
            .field("lan_side_ip_address", &gateway, "niftyLanSideIpAddress")
            .field("lan_side_cidr_block", &gateway, "niftyLanSideCidrBlock")
            .field("description", &gateway, "niftyCustomerGatewayDescription")
            .field("state", &gateway, "state")
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
            ("name", "niftyCustomerGatewayName"),
            ("description", "niftyCustomerGatewayDescription"),
        ] {
            if !changes.contains(&attribute) {
                continue;
            }
            let mut params = Params::new();
            params
                .set("CustomerGatewayId", identifier)
                .set("Attribute", api_attribute)
                .set("Value", to.get_str(attribute).unwrap_or_default());
            computing(api, id, "NiftyModifyCustomerGatewayAttribute", &params).await?;
            wait_for(api, id, identifier, "available").await?;
        }

        self.read(api, id, identifier).await
    }

    async fn delete(&self, api: &dyn Api, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let mut params = Params::new();
        params.set("CustomerGatewayId", identifier);
        ignore_not_found(computing(api, id, "DeleteCustomerGateway", &params).await)?;
        wait_for(api, id, identifier, Waiter::GONE).await
    }
}

async fn describe(
    api: &dyn Api,
    id: &ResourceId,
    gateway_id: &str,
) -> ProviderResult<Option<serde_json::Value>> {
    let mut params = Params::new();
    params.set("CustomerGatewayId.1", gateway_id);
    let response = found(computing(api, id, "DescribeCustomerGateways", &params).await)?;
    Ok(response.and_then(|r| first_at(&r, "customerGatewaySet").cloned()))
}

async fn wait_for(
    api: &dyn Api,
    id: &ResourceId,
    gateway_id: &str,
    target: &str,
) -> ProviderResult<()> {
    let waiter = waiter(id, POLL_SECS, TIMEOUT_SECS).until(&[target]);
    wait_until(waiter, id, move || async move {
        let gateway = describe(api, id, gateway_id).await?;
        Ok::<Status, _>(status_of(gateway, "state"))
    })
    .await?;
    Ok(())
}
