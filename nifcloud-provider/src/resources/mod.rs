//! Resource handlers
//!
//! Each NIFCLOUD resource type is one handler: a schema declaration plus the
//! create / read / update / delete call sequences against the API.

use async_trait::async_trait;
use nifcloud_core::provider::{ProviderResult, ResourceType};
use nifcloud_core::resource::{Resource, ResourceId, State};
use nifcloud_core::schema::ResourceSchema;
use nifcloud_sdk::Api;

pub mod customer_gateway;
pub mod db_instance;
pub mod db_parameter_group;
pub mod dhcp_config;
pub mod dns_record;
pub mod dns_zone;
pub mod elastic_ip;
pub mod image;
pub mod instance;
pub mod key_pair;
pub mod load_balancer;
pub mod nat_table;
pub mod private_lan;
pub mod route_table;
pub mod router;
pub mod security_group;
pub mod security_group_rule;
pub mod volume;
pub mod vpn_gateway;

/// Schema and lifecycle of one resource type
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Resource type name without the `nifcloud_` prefix
    fn name(&self) -> &'static str;

    fn schema(&self) -> ResourceSchema;

    /// Create the resource; the returned state carries the new identifier
    async fn create(&self, api: &dyn Api, resource: &Resource) -> ProviderResult<State>;

    /// Read the resource, `State::not_found` when it no longer exists
    async fn read(&self, api: &dyn Api, id: &ResourceId, identifier: &str)
    -> ProviderResult<State>;

    /// Apply in-place changes. Resources whose attributes all force
    /// replacement only refresh.
    async fn update(
        &self,
        api: &dyn Api,
        id: &ResourceId,
        identifier: &str,
        _from: &State,
        _to: &Resource,
    ) -> ProviderResult<State> {
        self.read(api, id, identifier).await
    }

    async fn delete(&self, api: &dyn Api, id: &ResourceId, identifier: &str) -> ProviderResult<()>;
}

/// Schema and read of one data source type
#[async_trait]
pub trait DataSourceHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn schema(&self) -> ResourceSchema;

    async fn read(&self, api: &dyn Api, config: &Resource) -> ProviderResult<State>;
}

/// Exposes a handler's schema through the core `ResourceType` trait
pub struct HandlerType {
    name: &'static str,
    schema: ResourceSchema,
}

impl HandlerType {
    pub fn of_resource(handler: &dyn ResourceHandler) -> Self {
        Self {
            name: handler.name(),
            schema: handler.schema(),
        }
    }

    pub fn of_data_source(handler: &dyn DataSourceHandler) -> Self {
        Self {
            name: handler.name(),
            schema: handler.schema(),
        }
    }
}

impl ResourceType for HandlerType {
    fn name(&self) -> &'static str {
        self.name
    }

    fn schema(&self) -> ResourceSchema {
        self.schema.clone()
    }
}

/// Returns every resource handler of this provider
pub fn handlers() -> Vec<Box<dyn ResourceHandler>> {
    vec![
        Box::new(instance::Instance),
        Box::new(volume::Volume),
        Box::new(key_pair::KeyPair),
        Box::new(security_group::SecurityGroup),
        Box::new(security_group_rule::SecurityGroupRule),
        Box::new(elastic_ip::ElasticIp),
        Box::new(private_lan::PrivateLan),
        Box::new(router::Router),
        Box::new(route_table::RouteTable),
        Box::new(nat_table::NatTable),
        Box::new(dhcp_config::DhcpConfig),
        Box::new(load_balancer::LoadBalancer),
        Box::new(vpn_gateway::VpnGateway),
        Box::new(customer_gateway::CustomerGateway),
        Box::new(db_instance::DbInstance),
        Box::new(db_parameter_group::DbParameterGroup),
        Box::new(dns_zone::DnsZone),
        Box::new(dns_record::DnsRecord),
    ]
}

/// Returns every data source handler of this provider
pub fn data_source_handlers() -> Vec<Box<dyn DataSourceHandler>> {
    vec![Box::new(image::Image)]
}
