//! nifcloud_dhcp_config

use std::collections::HashMap;

use async_trait::async_trait;
use nifcloud_core::provider::{ProviderError, ProviderResult};
use nifcloud_core::reconcile::{apply, diff_by_key};
use nifcloud_core::resource::{Attributes, Resource, ResourceId, State, Value};
use nifcloud_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use nifcloud_sdk::{Api, Params, json};

use super::ResourceHandler;
use crate::utils::{Flattener, computing, field, first_at, found, ignore_not_found, object, objects};

pub struct DhcpConfig;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StaticMapping {
    ip_address: String,
    mac_address: String,
    description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct IpAddressPool {
    start: String,
    stop: String,
    description: Option<String>,
}

impl StaticMapping {
    fn from_object(object: &HashMap<String, Value>) -> Option<Self> {
        Some(Self {
            ip_address: field(object, "static_mapping_ipaddress")?.to_string(),
            mac_address: field(object, "static_mapping_macaddress")?.to_string(),
            description: field(object, "static_mapping_description").map(str::to_string),
        })
    }

    fn from_response(item: &serde_json::Value) -> Option<Self> {
        Some(Self {
            ip_address: json::string_at(item, "ipAddress")?,
            mac_address: json::string_at(item, "macAddress")?,
            description: json::string_at(item, "description"),
        })
    }

    fn to_value(&self) -> Value {
        object(vec![
            ("static_mapping_ipaddress", Some(Value::from(self.ip_address.as_str()))),
            ("static_mapping_macaddress", Some(Value::from(self.mac_address.as_str()))),
            ("static_mapping_description", self.description.clone().map(Value::String)),
        ])
    }

    fn params(&self, config_id: &str) -> Params {
        let mut params = Params::new();
        params
            .set("DhcpConfigId", config_id)
            .set("IpAddress", self.ip_address.as_str())
            .set("MacAddress", self.mac_address.as_str());
        params
    }
}

impl IpAddressPool {
    fn from_object(object: &HashMap<String, Value>) -> Option<Self> {
        Some(Self {
            start: field(object, "ipaddress_pool_start")?.to_string(),
            stop: field(object, "ipaddress_pool_stop")?.to_string(),
            description: field(object, "ipaddress_pool_description").map(str::to_string),
        })
    }

    fn from_response(item: &serde_json::Value) -> Option<Self> {
        Some(Self {
            start: json::string_at(item, "startIpAddress")?,
            stop: json::string_at(item, "stopIpAddress")?,
            description: json::string_at(item, "description"),
        })
    }

    fn to_value(&self) -> Value {
        object(vec![
            ("ipaddress_pool_start", Some(Value::from(self.start.as_str()))),
            ("ipaddress_pool_stop", Some(Value::from(self.stop.as_str()))),
            ("ipaddress_pool_description", self.description.clone().map(Value::String)),
        ])
    }

    fn params(&self, config_id: &str) -> Params {
        let mut params = Params::new();
        params
            .set("DhcpConfigId", config_id)
            .set("StartIpAddress", self.start.as_str())
            .set("StopIpAddress", self.stop.as_str());
        params
    }
}

fn static_mappings(attributes: &impl Attributes) -> Vec<StaticMapping> {
    objects(attributes, "static_mapping")
        .into_iter()
        .filter_map(StaticMapping::from_object)
        .collect()
}

fn ip_address_pools(attributes: &impl Attributes) -> Vec<IpAddressPool> {
    objects(attributes, "ipaddress_pool")
        .into_iter()
        .filter_map(IpAddressPool::from_object)
        .collect()
}

#[async_trait]
impl ResourceHandler for DhcpConfig {
    fn name(&self) -> &'static str {
        "dhcp_config"
    }

    fn schema(&self) -> ResourceSchema {
        let static_mapping = AttributeType::Object(vec![
            AttributeSchema::new("static_mapping_ipaddress", types::ipv4_address()).required(),
            AttributeSchema::new(
                "static_mapping_macaddress",
                types::pattern(
                    "MacAddress",
                    r"^([0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}$",
                    "colon separated MAC address",
                ),
            )
            .required(),
            AttributeSchema::new("static_mapping_description", types::string_length(0, 40)),
        ]);
        let pool = AttributeType::Object(vec![
            AttributeSchema::new("ipaddress_pool_start", types::ipv4_address()).required(),
            AttributeSchema::new("ipaddress_pool_stop", types::ipv4_address()).required(),
            AttributeSchema::new("ipaddress_pool_description", types::string_length(0, 40)),
        ]);
        ResourceSchema::new("dhcp_config")
            .with_description("DHCP static mappings and address pools used by routers")
            .attribute(AttributeSchema::new(
                "static_mapping",
                AttributeType::Set(Box::new(static_mapping)),
            ))
            .attribute(AttributeSchema::new(
                "ipaddress_pool",
                AttributeType::Set(Box::new(pool)),
            ))
            .attribute(AttributeSchema::new("dhcp_config_id", AttributeType::String).computed())
    }

    async fn create(&self, api: &dyn Api, resource: &Resource) -> ProviderResult<State> {
        let id = &resource.id;

        let response = computing(api, id, "NiftyCreateDhcpConfig", &Params::new()).await?;
        let config_id = json::string_at(&response, "dhcpConfig.dhcpConfigId").ok_or_else(|| {
            ProviderError::new("NiftyCreateDhcpConfig returned no DHCP config id")
                .for_resource(id.clone())
        })?;

        for mapping in static_mappings(resource) {
            create_static_mapping(api, id, &config_id, &mapping).await?;
        }
        for pool in ip_address_pools(resource) {
            create_pool(api, id, &config_id, &pool).await?;
        }

        Ok(self.read(api, id, &config_id).await?.with_identifier(config_id))
    }

    async fn read(
        &self,
        api: &dyn Api,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let mut params = Params::new();
        params.set("DhcpConfigId.1", identifier);
        let response = found(computing(api, id, "NiftyDescribeDhcpConfigs", &params).await)?;
        let Some(config) = response.as_ref().and_then(|r| first_at(r, "dhcpConfigsSet")) else {
            return Ok(State::not_found(id.clone()));
        };

        let mappings = json::list_at(config, "staticMappingsSet")
            .into_iter()
            .filter_map(StaticMapping::from_response)
            .map(|m| m.to_value())
            .collect();
        let pools = json::list_at(config, "ipAddressPoolsSet")
            .into_iter()
            .filter_map(IpAddressPool::from_response)
            .map(|p| p.to_value())
            .collect();

        let attributes = Flattener::new()
            .field("dhcp_config_id", config, "dhcpConfigId")
            .value("static_mapping", Value::List(mappings))
            .value("ipaddress_pool", Value::List(pools))
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
        let mappings = diff_by_key(
            &static_mappings(from),
            &static_mappings(to),
            StaticMapping::clone,
        );
        apply(
            &mappings,
            |mapping| async move {
                let params = mapping.params(identifier);
                computing(api, id, "NiftyDeleteDhcpStaticMapping", &params)
                    .await
                    .map(|_| ())
            },
            |mapping| async move { create_static_mapping(api, id, identifier, &mapping).await },
        )
        .await?;

        let pools = diff_by_key(
            &ip_address_pools(from),
            &ip_address_pools(to),
            IpAddressPool::clone,
        );
        apply(
            &pools,
            |pool| async move {
                let params = pool.params(identifier);
                computing(api, id, "NiftyDeleteDhcpIpAddressPool", &params)
                    .await
                    .map(|_| ())
            },
            |pool| async move { create_pool(api, id, identifier, &pool).await },
        )
        .await?;

        self.read(api, id, identifier).await
    }

    async fn delete(&self, api: &dyn Api, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let mut params = Params::new();
        params.set("DhcpConfigId", identifier);
        ignore_not_found(computing(api, id, "NiftyDeleteDhcpConfig", &params).await)
    }
}

async fn create_static_mapping(
    api: &dyn Api,
    id: &ResourceId,
    config_id: &str,
    mapping: &StaticMapping,
) -> ProviderResult<()> {
    let mut params = mapping.params(config_id);
    params.set_opt("Description", mapping.description.as_deref());
    computing(api, id, "NiftyCreateDhcpStaticMapping", &params).await?;
    Ok(())
}

async fn create_pool(
    api: &dyn Api,
    id: &ResourceId,
    config_id: &str,
    pool: &IpAddressPool,
) -> ProviderResult<()> {
    let mut params = pool.params(config_id);
    params.set_opt("Description", pool.description.as_deref());
    computing(api, id, "NiftyCreateDhcpIpAddressPool", &params).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeApi;
    use serde_json::json;

    fn mapping(ip: &str, mac: &str) -> Value {
        object(vec![
            ("static_mapping_ipaddress", Some(Value::from(ip))),
            ("static_mapping_macaddress", Some(Value::from(mac))),
        ])
    }

    fn pool(start: &str, stop: &str) -> Value {
        object(vec![
            ("ipaddress_pool_start", Some(Value::from(start))),
            ("ipaddress_pool_stop", Some(Value::from(stop))),
        ])
    }

    fn described() -> serde_json::Value {
        json!({"dhcpConfigsSet": [{
            "dhcpConfigId": "dhcp-0a1b2c3d",
            "staticMappingsSet": [
                {"ipAddress": "192.168.1.10", "macAddress": "00:00:5e:00:53:01"}
            ],
            "ipAddressPoolsSet": [
                {"startIpAddress": "192.168.1.100", "stopIpAddress": "192.168.1.200"}
            ]
        }]})
    }

    fn id() -> ResourceId {
        ResourceId::new("dhcp_config", "dhcp")
    }

    #[tokio::test]
    async fn create_adds_mappings_and_pools() {
        let api = FakeApi::new();
        api.reply("NiftyCreateDhcpConfig", json!({"dhcpConfig": {"dhcpConfigId": "dhcp-0a1b2c3d"}}))
            .reply("NiftyDescribeDhcpConfigs", described());

        let resource = Resource::new("dhcp_config", "dhcp")
            .with_attribute(
                "static_mapping",
                Value::List(vec![mapping("192.168.1.10", "00:00:5e:00:53:01")]),
            )
            .with_attribute(
                "ipaddress_pool",
                Value::List(vec![pool("192.168.1.100", "192.168.1.200")]),
            );
        let state = DhcpConfig.create(&api, &resource).await.unwrap();

        assert_eq!(
            api.mutations(),
            vec![
                "NiftyCreateDhcpConfig",
                "NiftyCreateDhcpStaticMapping",
                "NiftyCreateDhcpIpAddressPool"
            ]
        );
        let create = api.call("NiftyCreateDhcpStaticMapping").unwrap();
        assert_eq!(create.param("DhcpConfigId"), Some("dhcp-0a1b2c3d"));
        assert_eq!(create.param("MacAddress"), Some("00:00:5e:00:53:01"));
        assert_eq!(
            state.get_list("static_mapping"),
            &[mapping("192.168.1.10", "00:00:5e:00:53:01")]
        );
        assert_eq!(
            state.get_list("ipaddress_pool"),
            &[pool("192.168.1.100", "192.168.1.200")]
        );
    }

    #[tokio::test]
    async fn pool_change_leaves_mappings_alone() {
        let api = FakeApi::new();
        api.reply("NiftyDescribeDhcpConfigs", described());

        let from = DhcpConfig.read(&api, &id(), "dhcp-0a1b2c3d").await.unwrap();
        let to = Resource::new("dhcp_config", "dhcp")
            .with_attribute(
                "static_mapping",
                Value::List(vec![mapping("192.168.1.10", "00:00:5e:00:53:01")]),
            )
            .with_attribute(
                "ipaddress_pool",
                Value::List(vec![pool("192.168.1.100", "192.168.1.150")]),
            );
        DhcpConfig
            .update(&api, &id(), "dhcp-0a1b2c3d", &from, &to)
            .await
            .unwrap();

        assert_eq!(
            api.mutations(),
            vec!["NiftyDeleteDhcpIpAddressPool", "NiftyCreateDhcpIpAddressPool"]
        );
        let delete = api.call("NiftyDeleteDhcpIpAddressPool").unwrap();
        assert_eq!(delete.param("StopIpAddress"), Some("192.168.1.200"));
        assert_eq!(delete.param("Description"), None);
    }
}
