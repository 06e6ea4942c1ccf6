//! nifcloud_nat_table
//!
//! SNAT and DNAT rules are kept in two sets. A rule is identified by all of
//! its fields, so editing a rule deletes it and creates it again.

use std::collections::HashMap;

use async_trait::async_trait;
use nifcloud_core::provider::{ProviderError, ProviderResult};
use nifcloud_core::reconcile::{apply, diff_by_key};
use nifcloud_core::resource::{Attributes, Resource, ResourceId, State, Value};
use nifcloud_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use nifcloud_sdk::{Api, Params, json};

use super::ResourceHandler;
use crate::utils::{Flattener, computing, field, first_at, found, ignore_not_found, object, objects};

pub struct NatTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum NatType {
    Snat,
    Dnat,
}

impl NatType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Snat => "snat",
            Self::Dnat => "dnat",
        }
    }

    /// Interface the rule matches on: outbound for SNAT, inbound for DNAT
    fn interface(self) -> (&'static str, &'static str) {
        match self {
            Self::Snat => ("outbound_interface", "OutboundInterface"),
            Self::Dnat => ("inbound_interface", "InboundInterface"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NatRule {
    nat_type: NatType,
    rule_number: String,
    description: Option<String>,
    protocol: Option<String>,
    source_address: Option<String>,
    source_port: Option<String>,
    destination_port: Option<String>,
    translation_address: Option<String>,
    translation_port: Option<String>,
    interface_network_id: Option<String>,
    interface_network_name: Option<String>,
}

impl NatRule {
    fn from_object(nat_type: NatType, object: &HashMap<String, Value>) -> Option<Self> {
        let text = |key: &str| match object.get(key) {
            Some(Value::Int(i)) => Some(i.to_string()),
            _ => field(object, key).map(str::to_string),
        };
        let (interface, _) = nat_type.interface();
        Some(Self {
            nat_type,
            rule_number: text("rule_number")?,
            description: text("description"),
            protocol: text("protocol"),
            source_address: text("source_address"),
            source_port: text("source_port"),
            destination_port: text("destination_port"),
            translation_address: text("translation_address"),
            translation_port: text("translation_port"),
            interface_network_id: text(format!("{}_network_id", interface).as_str()),
            interface_network_name: text(format!("{}_network_name", interface).as_str()),
        })
    }

    fn from_response(item: &serde_json::Value) -> Option<Self> {
        let nat_type = match json::str_at(item, "natType")? {
            "snat" => NatType::Snat,
            "dnat" => NatType::Dnat,
            _ => return None,
        };
        let interface = match nat_type {
            NatType::Snat => "outboundInterface",
            NatType::Dnat => "inboundInterface",
        };
        Some(Self {
            nat_type,
            rule_number: json::string_at(item, "ruleNumber")?,
            description: json::string_at(item, "description"),
            protocol: json::string_at(item, "protocol"),
            source_address: json::string_at(item, "source.address"),
            source_port: json::string_at(item, "source.port"),
            destination_port: json::string_at(item, "destination.port"),
            translation_address: json::string_at(item, "translation.address"),
            translation_port: json::string_at(item, "translation.port"),
            interface_network_id: json::string_at(item, &format!("{}.networkId", interface)),
            interface_network_name: json::string_at(item, &format!("{}.networkName", interface)),
        })
    }

    fn to_value(&self) -> Value {
        let text = |v: &Option<String>| v.clone().map(Value::String);
        let (interface, _) = self.nat_type.interface();
        let network_id = format!("{}_network_id", interface);
        let network_name = format!("{}_network_name", interface);
        let mut fields = vec![
            ("rule_number", Some(Value::from(self.rule_number.as_str()))),
            ("description", text(&self.description)),
            ("protocol", text(&self.protocol)),
            ("translation_port", text(&self.translation_port)),
            (network_id.as_str(), text(&self.interface_network_id)),
            (network_name.as_str(), text(&self.interface_network_name)),
        ];
        match self.nat_type {
            NatType::Snat => fields.extend([
                ("source_address", text(&self.source_address)),
                ("source_port", text(&self.source_port)),
            ]),
            NatType::Dnat => fields.extend([
                ("destination_port", text(&self.destination_port)),
                ("translation_address", text(&self.translation_address)),
            ]),
        }
        object(fields)
    }

    fn params(&self, table_id: &str) -> Params {
        let (_, interface) = self.nat_type.interface();
        let mut params = Params::new();
        params
            .set("NatTableId", table_id)
            .set("NatType", self.nat_type.as_str())
            .set("RuleNumber", self.rule_number.as_str())
            .set_opt("Description", self.description.as_deref())
            .set_opt("Protocol", self.protocol.as_deref())
            .set_opt("Source.Address", self.source_address.as_deref())
            .set_opt("Source.Port", self.source_port.as_deref())
            .set_opt("Destination.Port", self.destination_port.as_deref())
            .set_opt("Translation.Address", self.translation_address.as_deref())
            .set_opt("Translation.Port", self.translation_port.as_deref())
            .set_opt(
                &format!("{}.NetworkId", interface),
                self.interface_network_id.as_deref(),
            )
            .set_opt(
                &format!("{}.NetworkName", interface),
                self.interface_network_name.as_deref(),
            );
        params
    }
}

fn rules(attributes: &impl Attributes) -> Vec<NatRule> {
    [(NatType::Snat, "snat"), (NatType::Dnat, "dnat")]
        .into_iter()
        .flat_map(|(nat_type, key)| {
            objects(attributes, key)
                .into_iter()
                .filter_map(move |o| NatRule::from_object(nat_type, o))
        })
        .collect()
}

fn rule_schema(nat_type: NatType) -> AttributeType {
    let (interface, _) = nat_type.interface();
    let protocols = types::one_of(&["ALL", "TCP", "UDP", "TCP_UDP", "ICMP"]);
    let mut fields = vec![
        AttributeSchema::new("rule_number", AttributeType::String).required(),
        AttributeSchema::new("description", types::string_length(0, 40)),
        AttributeSchema::new("protocol", protocols).required(),
        AttributeSchema::new("translation_port", AttributeType::String),
        AttributeSchema::new(format!("{}_network_id", interface), AttributeType::String),
        AttributeSchema::new(format!("{}_network_name", interface), AttributeType::String),
    ];
    match nat_type {
        NatType::Snat => fields.extend([
            AttributeSchema::new("source_address", AttributeType::String).required(),
            AttributeSchema::new("source_port", AttributeType::String),
        ]),
        NatType::Dnat => fields.extend([
            AttributeSchema::new("destination_port", AttributeType::String),
            AttributeSchema::new("translation_address", types::ipv4_address()).required(),
        ]),
    }
    AttributeType::Object(fields)
}

#[async_trait]
impl ResourceHandler for NatTable {
    fn name(&self) -> &'static str {
        "nat_table"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("nat_table")
            .with_description("Source and destination NAT rules for routers")
            .attribute(AttributeSchema::new(
                "snat",
                AttributeType::Set(Box::new(rule_schema(NatType::Snat))),
            ))
            .attribute(AttributeSchema::new(
                "dnat",
                AttributeType::Set(Box::new(rule_schema(NatType::Dnat))),
            ))
            .attribute(AttributeSchema::new("nat_table_id", AttributeType::String).computed())
    }

    async fn create(&self, api: &dyn Api, resource: &Resource) -> ProviderResult<State> {
        let id = &resource.id;

        let response = computing(api, id, "NiftyCreateNatTable", &Params::new()).await?;
        let table_id = json::string_at(&response, "natTable.natTableId").ok_or_else(|| {
            ProviderError::new("NiftyCreateNatTable returned no NAT table id")
                .for_resource(id.clone())
        })?;

        for rule in rules(resource) {
            computing(api, id, "NiftyCreateNatRule", &rule.params(&table_id)).await?;
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
        params.set("NatTableId.1", identifier);
        let response = found(computing(api, id, "NiftyDescribeNatTables", &params).await)?;
        let Some(table) = response.as_ref().and_then(|r| first_at(r, "natTableSet")) else {
            return Ok(State::not_found(id.clone()));
        };

        let (snat, dnat): (Vec<NatRule>, Vec<NatRule>) = json::list_at(table, "natRuleSet")
            .into_iter()
            .filter_map(NatRule::from_response)
            .partition(|r| r.nat_type == NatType::Snat);
        let values = |rules: Vec<NatRule>| Value::List(rules.iter().map(NatRule::to_value).collect());

        let attributes = Flattener::new()
            .field("nat_table_id", table, "natTableId")
            .value("snat", values(snat))
            .value("dnat", values(dnat))
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
        let diff = diff_by_key(&rules(from), &rules(to), NatRule::clone);
        apply(
            &diff,
            |rule| async move { delete_rule(api, id, identifier, &rule).await },
            |rule| async move { create_rule(api, id, identifier, &rule).await },
        )
        .await?;

        self.read(api, id, identifier).await
    }

    async fn delete(&self, api: &dyn Api, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let mut params = Params::new();
        params.set("NatTableId", identifier);
        ignore_not_found(computing(api, id, "NiftyDeleteNatTable", &params).await)
    }
}

async fn create_rule(
    api: &dyn Api,
    id: &ResourceId,
    table_id: &str,
    rule: &NatRule,
) -> ProviderResult<()> {
    computing(api, id, "NiftyCreateNatRule", &rule.params(table_id)).await?;
    Ok(())
}

async fn delete_rule(
    api: &dyn Api,
    id: &ResourceId,
    table_id: &str,
    rule: &NatRule,
) -> ProviderResult<()> {
    let mut params = Params::new();
    params
        .set("NatTableId", table_id)
        .set("NatType", rule.nat_type.as_str())
        .set("RuleNumber", rule.rule_number.as_str());
    computing(api, id, "NiftyDeleteNatRule", &params).await?;
    Ok(())
}
