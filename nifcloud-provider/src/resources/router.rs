//! nifcloud_router
//!
//! Network interfaces are fixed at creation. Route table and NAT table
//! associations are managed in place through the association calls.

use async_trait::async_trait;
use nifcloud_core::provider::{ProviderError, ProviderResult};
use nifcloud_core::resource::{Attributes, Resource, ResourceId, State, Value};
use nifcloud_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use nifcloud_core::waiter::{Status, Waiter};
use nifcloud_sdk::{Api, Params, json};

use super::ResourceHandler;
use crate::utils::{
    Flattener, changed, computing, expand_params, field, first_at, found, ignore_not_found, object,
    objects, param_value, status_of, str_value, wait_until, waiter,
};

const POLL_SECS: u64 = 10;
const TIMEOUT_SECS: u64 = 20 * 60;

const MODIFIABLE: &[(&str, &str)] = &[
    ("name", "routerName"),
    ("type", "type"),
    ("accounting_type", "accountingType"),
    ("description", "description"),
    ("security_group", "groupId"),
];

/// Calls managing one kind of table association
struct Association {
    /// Attribute holding the table id
    attribute: &'static str,
    /// Field of the describe response holding the association id
    association_field: &'static str,
    table_param: &'static str,
    associate: &'static str,
    replace: &'static str,
    disassociate: &'static str,
}

const ROUTE_TABLE: Association = Association {
    attribute: "route_table_id",
    association_field: "routeTableAssociationId",
    table_param: "RouteTableId",
    associate: "AssociateRouteTable",
    replace: "ReplaceRouteTableAssociation",
    disassociate: "DisassociateRouteTable",
};

const NAT_TABLE: Association = Association {
    attribute: "nat_table_id",
    association_field: "natTableAssociationId",
    table_param: "NatTableId",
    associate: "NiftyAssociateNatTable",
    replace: "NiftyReplaceNatTableAssociation",
    disassociate: "NiftyDisassociateNatTable",
};

pub struct Router;

fn network_interface() -> AttributeType {
    AttributeType::Object(vec![
        AttributeSchema::new("network_id", AttributeType::String)
            .with_description("net-COMMON_GLOBAL, net-COMMON_PRIVATE or a private LAN id"),
        AttributeSchema::new("network_name", AttributeType::String),
        AttributeSchema::new("ip_address", AttributeType::String),
        AttributeSchema::new("dhcp", AttributeType::Bool),
        AttributeSchema::new("dhcp_options_id", AttributeType::String),
        AttributeSchema::new("dhcp_config_id", AttributeType::String),
    ])
}

#[async_trait]
impl ResourceHandler for Router {
    fn name(&self) -> &'static str {
        "router"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("router")
            .with_description("Router connecting private LANs")
            .attribute(
                AttributeSchema::new("name", types::resource_name(15))
                    .optional_computed()
                    .with_provider_name("RouterName"),
            )
            .attribute(
                AttributeSchema::new("availability_zone", AttributeType::String)
                    .optional_computed()
                    .force_new()
                    .with_provider_name("AvailabilityZone"),
            )
            .attribute(
                AttributeSchema::new("type", types::one_of(&["small", "medium", "large"]))
                    .with_default("small")
                    .with_provider_name("Type"),
            )
            .attribute(
                AttributeSchema::new("accounting_type", types::one_of(&["1", "2"]))
                    .with_default("2")
                    .with_provider_name("AccountingType"),
            )
            .attribute(
                AttributeSchema::new("security_group", AttributeType::String)
                    .with_provider_name("SecurityGroup.1"),
            )
            .attribute(
                AttributeSchema::new("description", types::string_length(0, 40))
                    .with_provider_name("Description"),
            )
            .attribute(
                AttributeSchema::new(
                    "network_interface",
                    AttributeType::Set(Box::new(network_interface())),
                )
                .required()
                .force_new(),
            )
            .attribute(AttributeSchema::new("route_table_id", AttributeType::String))
            .attribute(AttributeSchema::new("nat_table_id", AttributeType::String))
            .attribute(AttributeSchema::new("router_id", AttributeType::String).computed())
            .attribute(
                AttributeSchema::new("route_table_association_id", AttributeType::String)
                    .computed(),
            )
            .attribute(
                AttributeSchema::new("nat_table_association_id", AttributeType::String).computed(),
            )
            .attribute(AttributeSchema::new("state", AttributeType::String).computed())
    }

    async fn create(&self, api: &dyn Api, resource: &Resource) -> ProviderResult<State> {
        let id = &resource.id;

        let mut params = Params::new();
        expand_params(&self.schema(), resource, &mut params);
        expand_network_interfaces(resource, &mut params);
        let response = computing(api, id, "NiftyCreateRouter", &params).await?;
        let router_id = json::string_at(&response, "router.routerId").ok_or_else(|| {
            ProviderError::new("NiftyCreateRouter returned no router id").for_resource(id.clone())
        })?;
        wait_for(api, id, &router_id, "available").await?;

        for association in [&ROUTE_TABLE, &NAT_TABLE] {
            if let Some(table_id) = resource.get_str(association.attribute) {
                associate(api, id, &router_id, association, None, Some(table_id)).await?;
            }
        }

        Ok(self.read(api, id, &router_id).await?.with_identifier(router_id))
    }

    async fn read(
        &self,
        api: &dyn Api,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let Some(router) = describe(api, id, identifier).await? else {
            return Ok(State::not_found(id.clone()));
        };

        let interfaces = json::list_at(&router, "networkInterfaceSet")
            .into_iter()
            .map(|nic| {
                object(vec![
                    ("network_id", str_value(nic, "networkId")),
                    ("network_name", str_value(nic, "networkName")),
                    ("ip_address", str_value(nic, "ipAddress")),
                    ("dhcp", json::bool_at(nic, "dhcp").map(Value::Bool)),
                    ("dhcp_options_id", str_value(nic, "dhcpOptionsId")),
                    ("dhcp_config_id", str_value(nic, "dhcpConfigId")),
                ])
            })
            .collect();

        let attributes = Flattener::new()
            .field("router_id", &router, "routerId")
            .field("name", &router, "routerName")
            .field("availability_zone", &router, "availabilityZone")
            .field("type", &router, "type")
            .field("accounting_type", &router, "nextMonthAccountingType")
            .field("description", &router, "description")
            .str(
                "security_group",
                first_at(&router, "groupSet").and_then(|g| json::str_at(g, "groupId")),
            )
            .value("network_interface", Value::List(interfaces))
            .field("route_table_id", &router, "routeTableId")
            .field("route_table_association_id", &router, "routeTableAssociationId")
            .field("nat_table_id", &router, "natTableId")
            .field("nat_table_association_id", &router, "natTableAssociationId")
            .field("state", &router, "state")
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
                .set("RouterId", identifier)
                .set("Attribute", *api_attribute)
                .set("Value", value);
            computing(api, id, "NiftyModifyRouterAttribute", &params).await?;
            wait_for(api, id, identifier, "available").await?;
        }

        for association in [&ROUTE_TABLE, &NAT_TABLE] {
            let old = from.get_str(association.attribute);
            let new = to.get_str(association.attribute);
            if old != new {
                let current = describe(api, id, identifier).await?;
                let association_id = current
                    .as_ref()
                    .and_then(|r| json::str_at(r, association.association_field));
                associate(api, id, identifier, association, association_id, new).await?;
            }
        }

        self.read(api, id, identifier).await
    }

    async fn delete(&self, api: &dyn Api, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let mut params = Params::new();
        params.set("RouterId", identifier);
        ignore_not_found(computing(api, id, "NiftyDeleteRouter", &params).await)?;
        wait_for(api, id, identifier, Waiter::GONE).await
    }
}

fn expand_network_interfaces(resource: &Resource, params: &mut Params) {
    for (i, nic) in objects(resource, "network_interface").into_iter().enumerate() {
        let prefix = format!("NetworkInterface.{}", i + 1);
        params
            .set_opt(&format!("{}.NetworkId", prefix), field(nic, "network_id"))
            .set_opt(&format!("{}.NetworkName", prefix), field(nic, "network_name"))
            .set_opt(&format!("{}.IpAddress", prefix), field(nic, "ip_address"))
            .set_opt(&format!("{}.DhcpOptionsId", prefix), field(nic, "dhcp_options_id"))
            .set_opt(&format!("{}.DhcpConfigId", prefix), field(nic, "dhcp_config_id"));
        if let Some(dhcp) = nic.get_bool("dhcp") {
            params.set_bool(&format!("{}.Dhcp", prefix), dhcp);
        }
    }
}

/// Move a table association from `association_id` to `table_id`:
/// associate, replace or disassociate as the pair requires.
async fn associate(
    api: &dyn Api,
    id: &ResourceId,
    router_id: &str,
    association: &Association,
    association_id: Option<&str>,
    table_id: Option<&str>,
) -> ProviderResult<()> {
    let mut params = Params::new();
    let action = match (association_id, table_id) {
        (None, None) => return Ok(()),
        (None, Some(table_id)) => {
            params
                .set("RouterId", router_id)
                .set(association.table_param, table_id);
            association.associate
        }
        (Some(association_id), Some(table_id)) => {
            params
                .set("AssociationId", association_id)
                .set(association.table_param, table_id);
            association.replace
        }
        (Some(association_id), None) => {
            params.set("AssociationId", association_id);
            association.disassociate
        }
    };
    computing(api, id, action, &params).await?;
    wait_for(api, id, router_id, "available").await
}

async fn describe(
    api: &dyn Api,
    id: &ResourceId,
    router_id: &str,
) -> ProviderResult<Option<serde_json::Value>> {
    let mut params = Params::new();
    params.set("RouterId.1", router_id);
    let response = found(computing(api, id, "NiftyDescribeRouters", &params).await)?;
    Ok(response.and_then(|r| first_at(&r, "routerSet").cloned()))
}

async fn wait_for(
    api: &dyn Api,
    id: &ResourceId,
    router_id: &str,
    target: &str,
) -> ProviderResult<()> {
    let waiter = waiter(id, POLL_SECS, TIMEOUT_SECS)
        .until(&[target])
        .failing_on(&["warning"]);
    wait_until(waiter, id, move || async move {
        let router = describe(api, id, router_id).await?;
        Ok::<Status, _>(status_of(router, "state"))
    })
    .await?;
    Ok(())
}
