//! nifcloud_route_table

use async_trait::async_trait;
use nifcloud_core::provider::{ProviderError, ProviderResult};
use nifcloud_core::reconcile::{apply, diff_by_key};
use nifcloud_core::resource::{Attributes, Resource, ResourceId, State, Value};
use nifcloud_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use nifcloud_sdk::{Api, Params, json};

use super::ResourceHandler;
use crate::utils::{Flattener, computing, field, first_at, found, ignore_not_found, object, objects};

pub struct RouteTable;

/// One static route. Every field is part of its identity: a changed route is
/// deleted and created again.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Route {
    cidr_block: String,
    ip_address: Option<String>,
    network_id: Option<String>,
    network_name: Option<String>,
}

impl Route {
    fn from_object(object: &std::collections::HashMap<String, Value>) -> Option<Self> {
        Some(Self {
            cidr_block: field(object, "cidr_block")?.to_string(),
            ip_address: field(object, "ip_address").map(str::to_string),
            network_id: field(object, "network_id").map(str::to_string),
            network_name: field(object, "network_name").map(str::to_string),
        })
    }

    fn from_response(item: &serde_json::Value) -> Option<Self> {
        Some(Self {
            cidr_block: json::string_at(item, "destinationCidrBlock")?,
            ip_address: json::string_at(item, "ipAddress"),
            network_id: json::string_at(item, "networkId"),
            network_name: json::string_at(item, "networkName"),
        })
    }

    fn to_value(&self) -> Value {
        object(vec![
            ("cidr_block", Some(Value::from(self.cidr_block.as_str()))),
            ("ip_address", self.ip_address.clone().map(Value::String)),
            ("network_id", self.network_id.clone().map(Value::String)),
            ("network_name", self.network_name.clone().map(Value::String)),
        ])
    }
}

fn routes(attributes: &impl Attributes) -> Vec<Route> {
    objects(attributes, "route")
        .into_iter()
        .filter_map(Route::from_object)
        .collect()
}

#[async_trait]
impl ResourceHandler for RouteTable {
    fn name(&self) -> &'static str {
        "route_table"
    }

    fn schema(&self) -> ResourceSchema {
        let route = AttributeType::Object(vec![
            AttributeSchema::new("cidr_block", types::cidr()).required(),
            AttributeSchema::new("ip_address", types::ipv4_address()),
            AttributeSchema::new("network_id", AttributeType::String),
            AttributeSchema::new("network_name", AttributeType::String),
        ]);
        ResourceSchema::new("route_table")
            .with_description("Static routes associated to routers")
            .attribute(AttributeSchema::new("route", AttributeType::Set(Box::new(route))))
            .attribute(AttributeSchema::new("route_table_id", AttributeType::String).computed())
    }

    async fn create(&self, api: &dyn Api, resource: &Resource) -> ProviderResult<State> {
        let id = &resource.id;

        let response = computing(api, id, "CreateRouteTable", &Params::new()).await?;
        let table_id = json::string_at(&response, "routeTable.routeTableId").ok_or_else(|| {
            ProviderError::new("CreateRouteTable returned no route table id")
                .for_resource(id.clone())
        })?;

        for route in routes(resource) {
            create_route(api, id, &table_id, &route).await?;
        }

        Ok(self.read(api, id, &table_id).await?.with_identifier(table_id))
    }

    async fn read(
        &self,
        api: &dyn Api,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let mut params = Params::new();
        params.set("RouteTableId.1", identifier);
        let response = found(computing(api, id, "DescribeRouteTables", &params).await)?;
        let Some(table) = response.as_ref().and_then(|r| first_at(r, "routeTableSet")) else {
            return Ok(State::not_found(id.clone()));
        };

        // routes to attached networks are implicit and carry no target
        let routes: Vec<Value> = json::list_at(table, "routeSet")
            .into_iter()
            .filter_map(Route::from_response)
            .filter(|r| r.ip_address.is_some() || r.network_id.is_some() || r.network_name.is_some())
            .map(|r| r.to_value())
            .collect();

        let attributes = Flattener::new()
            .field("route_table_id", table, "routeTableId")
            .value("route", Value::List(routes))
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
        let diff = diff_by_key(&routes(from), &routes(to), Route::clone);
        apply(
            &diff,
            |route| async move { delete_route(api, id, identifier, &route).await },
            |route| async move { create_route(api, id, identifier, &route).await },
        )
        .await?;

        self.read(api, id, identifier).await
    }

    async fn delete(&self, api: &dyn Api, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let mut params = Params::new();
        params.set("RouteTableId", identifier);
        ignore_not_found(computing(api, id, "DeleteRouteTable", &params).await)
    }
}

async fn create_route(
    api: &dyn Api,
    id: &ResourceId,
    table_id: &str,
    route: &Route,
) -> ProviderResult<()> {
    let mut params = Params::new();
    params
        .set("RouteTableId", table_id)
        .set("DestinationCidrBlock", route.cidr_block.as_str())
        .set_opt("IpAddress", route.ip_address.as_deref())
        .set_opt("NetworkId", route.network_id.as_deref())
        .set_opt("NetworkName", route.network_name.as_deref());
    computing(api, id, "CreateRoute", &params).await?;
    Ok(())
}

async fn delete_route(
    api: &dyn Api,
    id: &ResourceId,
    table_id: &str,
    route: &Route,
) -> ProviderResult<()> {
    let mut params = Params::new();
    params
        .set("RouteTableId", table_id)
        .set("DestinationCidrBlock", route.cidr_block.as_str());
    computing(api, id, "DeleteRoute", &params).await?;
    Ok(())
}
