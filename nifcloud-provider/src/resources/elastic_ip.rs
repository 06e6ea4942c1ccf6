//! nifcloud_elastic_ip
//!
//! The identifier is the allocated address. Addresses from private ranges are
//! addressed with `PrivateIpAddress` in requests, all others with `PublicIp`.

use std::net::Ipv4Addr;

use async_trait::async_trait;
use nifcloud_core::provider::{ProviderError, ProviderResult};
use nifcloud_core::resource::{Attributes, Resource, ResourceId, State};
use nifcloud_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use nifcloud_sdk::{Api, Params, json};

use super::ResourceHandler;
use crate::utils::{Flattener, computing, expand_params, first_at, found, ignore_not_found};

pub struct ElasticIp;

#[async_trait]
impl ResourceHandler for ElasticIp {
    fn name(&self) -> &'static str {
        "elastic_ip"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("elastic_ip")
            .with_description("Fixed public or private IP address")
            .attribute(
                AttributeSchema::new("ip_type", AttributeType::Bool)
                    .required()
                    .force_new()
                    .with_provider_name("NiftyPrivateIp")
                    .with_description("true allocates a private address"),
            )
            .attribute(
                AttributeSchema::new("availability_zone", AttributeType::String)
                    .optional_computed()
                    .force_new()
                    .with_provider_name("Placement.AvailabilityZone"),
            )
            .attribute(AttributeSchema::new("description", types::string_length(0, 40)))
            .attribute(AttributeSchema::new("public_ip", AttributeType::String).computed())
            .attribute(AttributeSchema::new("private_ip", AttributeType::String).computed())
    }

    async fn create(&self, api: &dyn Api, resource: &Resource) -> ProviderResult<State> {
        let id = &resource.id;

        let mut params = Params::new();
        expand_params(&self.schema(), resource, &mut params);
        let response = computing(api, id, "AllocateAddress", &params).await?;

        let address = json::string_at(&response, "publicIp")
            .or_else(|| json::string_at(&response, "privateIpAddress"))
            .ok_or_else(|| {
                ProviderError::new("AllocateAddress returned no address").for_resource(id.clone())
            })?;

        if let Some(description) = resource.get_str("description") {
            modify_description(api, id, &address, description).await?;
        }

        Ok(self.read(api, id, &address).await?.with_identifier(address))
    }

    async fn read(
        &self,
        api: &dyn Api,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let mut params = Params::new();
        params.set(format!("{}.1", address_param(identifier)), identifier);
        let response = found(computing(api, id, "DescribeAddresses", &params).await)?;

        let Some(address) = response.as_ref().and_then(|r| first_at(r, "addressesSet")) else {
            return Ok(State::not_found(id.clone()));
        };

        let private = is_private(identifier);
        let attributes = Flattener::new()
            .bool("ip_type", Some(private))
            .field("availability_zone", address, "availabilityZone")
            .field("description", address, "description")
            .field("public_ip", address, "publicIp")
            .field("private_ip", address, "privateIpAddress")
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
        let description = to.get_str("description").unwrap_or_default();
        if from.get_str("description").unwrap_or_default() != description {
            modify_description(api, id, identifier, description).await?;
        }
        self.read(api, id, identifier).await
    }

    async fn delete(&self, api: &dyn Api, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let mut params = Params::new();
        params.set(address_param(identifier), identifier);
        ignore_not_found(computing(api, id, "ReleaseAddress", &params).await)
    }
}

fn is_private(address: &str) -> bool {
    address
        .parse::<Ipv4Addr>()
        .is_ok_and(|ip| ip.is_private())
}

fn address_param(address: &str) -> &'static str {
    if is_private(address) {
        "PrivateIpAddress"
    } else {
        "PublicIp"
    }
}

async fn modify_description(
    api: &dyn Api,
    id: &ResourceId,
    address: &str,
    description: &str,
) -> ProviderResult<()> {
    let mut params = Params::new();
    params
        .set(address_param(address), address)
        .set("Attribute", "description")
        .set("Value", description);
    computing(api, id, "NiftyModifyAddressAttribute", &params).await?;
    Ok(())
}
