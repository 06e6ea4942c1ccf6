//! nifcloud_dns_record
//!
//! A record set is addressed by the zone and a set identifier generated at
//! create time; the identifier is `{zone}:{set_identifier}`. Record sets
//! cannot be changed in place, so every attribute forces replacement.

use async_trait::async_trait;
use nifcloud_core::provider::{ProviderError, ProviderResult};
use nifcloud_core::resource::{Attributes, Resource, ResourceId, State};
use nifcloud_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use nifcloud_sdk::{Api, Element, Method, json};
use uuid::Uuid;

use super::ResourceHandler;
use super::dns_zone::XMLNS;
use crate::utils::{Flattener, dns, found, ignore_not_found, require_str};

const RECORD_TYPES: &[&str] = &["A", "AAAA", "CNAME", "MX", "TXT", "SPF", "NS", "PTR"];
const DEFAULT_TTL: i64 = 3600;

pub struct DnsRecord;

/// Split `{zone}:{set_identifier}`
fn split(id: &ResourceId, identifier: &str) -> ProviderResult<(String, String)> {
    identifier
        .split_once(':')
        .map(|(zone, set)| (zone.to_string(), set.to_string()))
        .ok_or_else(|| {
            ProviderError::new(format!("malformed DNS record identifier '{}'", identifier))
                .for_resource(id.clone())
        })
}

/// Full record set as stored in state, used for both CREATE and DELETE
fn record_set(attributes: &impl Attributes, set_identifier: &str) -> Element {
    let ttl = attributes.get_int("ttl").unwrap_or(DEFAULT_TTL);
    Element::new("ResourceRecordSet")
        .child_text("Name", attributes.get_str("name"))
        .child_text("Type", attributes.get_str("type"))
        .child(Element::text("SetIdentifier", set_identifier))
        .child_text(
            "Weight",
            attributes.get_int("weight").map(|w| w.to_string()).as_deref(),
        )
        .child_text("Failover", attributes.get_str("failover"))
        .child(Element::text("TTL", ttl.to_string()))
        .child(Element::new("ResourceRecords").child(
            Element::new("ResourceRecord").child_text("Value", attributes.get_str("record")),
        ))
        .child_text("XniftyComment", attributes.get_str("comment"))
}

fn change_request(action: &str, record_set: Element) -> Element {
    Element::new("ChangeResourceRecordSetsRequest")
        .xmlns(XMLNS)
        .child(
            Element::new("ChangeBatch").child(
                Element::new("Changes").child(
                    Element::new("Change")
                        .child(Element::text("Action", action))
                        .child(record_set),
                ),
            ),
        )
}

#[async_trait]
impl ResourceHandler for DnsRecord {
    fn name(&self) -> &'static str {
        "dns_record"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("dns_record")
            .with_description("Record set in a hosted zone")
            .attribute(
                AttributeSchema::new("zone_id", AttributeType::String)
                    .required()
                    .force_new()
                    .with_description("Name of the hosted zone"),
            )
            .attribute(
                AttributeSchema::new("name", AttributeType::String)
                    .required()
                    .force_new()
                    .with_description("Fully qualified record name"),
            )
            .attribute(
                AttributeSchema::new("type", types::one_of(RECORD_TYPES))
                    .required()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("record", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("ttl", AttributeType::Int)
                    .with_default(DEFAULT_TTL)
                    .force_new(),
            )
            .attribute(AttributeSchema::new("weight", AttributeType::Int).force_new())
            .attribute(
                AttributeSchema::new("failover", types::one_of(&["PRIMARY", "SECONDARY"]))
                    .force_new(),
            )
            .attribute(AttributeSchema::new("comment", types::string_length(0, 255)).force_new())
            .attribute(AttributeSchema::new("set_identifier", AttributeType::String).computed())
    }

    async fn create(&self, api: &dyn Api, resource: &Resource) -> ProviderResult<State> {
        let zone = require_str(resource, "zone_id")?;
        let id = &resource.id;

        let set_identifier = Uuid::new_v4().to_string();
        let body = change_request("CREATE", record_set(resource, &set_identifier));
        let path = format!("hostedzone/{}/rrset", zone);
        dns(api, id, Method::POST, &path, Some(&body)).await?;

        let identifier = format!("{}:{}", zone, set_identifier);
        Ok(self
            .read(api, id, &identifier)
            .await?
            .with_identifier(identifier))
    }

    async fn read(
        &self,
        api: &dyn Api,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let (zone, set_identifier) = split(id, identifier)?;
        let path = format!("hostedzone/{}/rrset?identifier={}", zone, set_identifier);
        let Some(response) = found(dns(api, id, Method::GET, &path, None).await)? else {
            return Ok(State::not_found(id.clone()));
        };
        let Some(record) = json::list_at(&response, "ResourceRecordSets.ResourceRecordSet")
            .into_iter()
            .find(|r| json::str_at(r, "SetIdentifier") == Some(set_identifier.as_str()))
        else {
            return Ok(State::not_found(id.clone()));
        };

        let attributes = Flattener::new()
            .str("zone_id", Some(zone.as_str()))
            .field("name", record, "Name")
            .field("type", record, "Type")
            .str(
                "record",
                json::list_at(record, "ResourceRecords.ResourceRecord")
                    .into_iter()
                    .next()
                    .and_then(|r| json::str_at(r, "Value")),
            )
            .int_field("ttl", record, "TTL")
            .int_field("weight", record, "Weight")
            .field("failover", record, "Failover")
            .field("comment", record, "XniftyComment")
            .str("set_identifier", Some(set_identifier.as_str()))
            .build();
        Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
    }

    async fn delete(&self, api: &dyn Api, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        // DELETE must repeat the record set exactly as it exists
        let state = self.read(api, id, identifier).await?;
        if !state.exists {
            return Ok(());
        }
        let (zone, set_identifier) = split(id, identifier)?;
        let body = change_request("DELETE", record_set(&state, &set_identifier));
        let path = format!("hostedzone/{}/rrset", zone);
        ignore_not_found(dns(api, id, Method::POST, &path, Some(&body)).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeApi;
    use serde_json::json;

    const IDENTIFIER: &str = "example.com:1f0c6a4e";

    fn listed() -> serde_json::Value {
        json!({"ResourceRecordSets": {"ResourceRecordSet": [
            {
                "Name": "www.example.com.",
                "Type": "A",
                "SetIdentifier": "other",
                "TTL": "60",
                "ResourceRecords": {"ResourceRecord": {"Value": "192.0.2.9"}}
            },
            {
                "Name": "www.example.com.",
                "Type": "A",
                "SetIdentifier": "1f0c6a4e",
                "Weight": "10",
                "TTL": "300",
                "ResourceRecords": {"ResourceRecord": {"Value": "192.0.2.1"}},
                "XniftyComment": "web"
            }
        ]}})
    }

    fn id() -> ResourceId {
        ResourceId::new("dns_record", "www")
    }

    #[tokio::test]
    async fn create_posts_change_batch() {
        let api = FakeApi::new();
        let resource = Resource::new("dns_record", "www")
            .with_attribute("zone_id", "example.com")
            .with_attribute("name", "www.example.com.")
            .with_attribute("type", "A")
            .with_attribute("record", "192.0.2.1")
            .with_attribute("ttl", 300i64);
        DnsRecord.create(&api, &resource).await.unwrap();

        let create = api.call("POST hostedzone/example.com/rrset").unwrap();
        let body = create.body.unwrap();
        assert!(body.contains("<Action>CREATE</Action>"));
        assert!(body.contains("<Name>www.example.com.</Name>"));
        assert!(body.contains("<TTL>300</TTL>"));
        assert!(
            body.contains("<ResourceRecords><ResourceRecord><Value>192.0.2.1</Value></ResourceRecord></ResourceRecords>")
        );
        assert!(!body.contains("<Weight>"));
    }

    #[tokio::test]
    async fn read_picks_record_by_set_identifier() {
        let api = FakeApi::new();
        api.reply("GET hostedzone/example.com/rrset?identifier=1f0c6a4e", listed());

        let state = DnsRecord.read(&api, &id(), IDENTIFIER).await.unwrap();
        assert_eq!(state.get_str("record"), Some("192.0.2.1"));
        assert_eq!(state.get_int("ttl"), Some(300));
        assert_eq!(state.get_int("weight"), Some(10));
        assert_eq!(state.get_str("comment"), Some("web"));
        assert_eq!(state.get_str("zone_id"), Some("example.com"));
    }

    #[tokio::test]
    async fn delete_sends_existing_record_set() {
        let api = FakeApi::new();
        api.reply("GET hostedzone/example.com/rrset?identifier=1f0c6a4e", listed());

        DnsRecord.delete(&api, &id(), IDENTIFIER).await.unwrap();

        let delete = api.call("POST hostedzone/example.com/rrset").unwrap();
        let body = delete.body.unwrap();
        assert!(body.contains("<Action>DELETE</Action>"));
        assert!(body.contains("<SetIdentifier>1f0c6a4e</SetIdentifier>"));
        assert!(body.contains("<Weight>10</Weight>"));
    }

    #[tokio::test]
    async fn vanished_record_is_not_deleted() {
        let api = FakeApi::new();
        api.reply(
            "GET hostedzone/example.com/rrset?identifier=1f0c6a4e",
            json!({"ResourceRecordSets": null}),
        );

        DnsRecord.delete(&api, &id(), IDENTIFIER).await.unwrap();
        assert!(api.mutations().is_empty());
    }

    #[tokio::test]
    async fn malformed_identifier_is_rejected() {
        let api = FakeApi::new();
        assert!(DnsRecord.read(&api, &id(), "example.com").await.is_err());
    }
}
