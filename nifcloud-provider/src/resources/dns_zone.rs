//! nifcloud_dns_zone
//!
//! Hosted zones live on the REST style DNS API. The zone name doubles as its
//! id, so it is also the identifier.

use async_trait::async_trait;
use nifcloud_core::provider::ProviderResult;
use nifcloud_core::resource::{Attributes, Resource, ResourceId, State};
use nifcloud_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use nifcloud_sdk::{Api, Element, Method, json};
use uuid::Uuid;

use super::ResourceHandler;
use crate::utils::{Flattener, dns, found, ignore_not_found, require_str};

pub(crate) const XMLNS: &str = "https://route53.amazonaws.com/doc/2012-12-12/";

pub struct DnsZone;

#[async_trait]
impl ResourceHandler for DnsZone {
    fn name(&self) -> &'static str {
        "dns_zone"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("dns_zone")
            .with_description("Hosted zone on the NIFCLOUD DNS")
            .attribute(
                AttributeSchema::new("name", AttributeType::String)
                    .required()
                    .force_new()
                    .with_description("Domain name, e.g. example.com"),
            )
            .attribute(AttributeSchema::new("comment", types::string_length(0, 255)).force_new())
            .attribute(AttributeSchema::new("caller_reference", AttributeType::String).computed())
            .attribute(
                AttributeSchema::new(
                    "name_servers",
                    AttributeType::List(Box::new(AttributeType::String)),
                )
                .computed(),
            )
    }

    async fn create(&self, api: &dyn Api, resource: &Resource) -> ProviderResult<State> {
        let name = require_str(resource, "name")?;
        let id = &resource.id;

        let body = Element::new("CreateHostedZoneRequest")
            .xmlns(XMLNS)
            .child(Element::text("Name", name))
            .child(Element::text("CallerReference", Uuid::new_v4().to_string()))
            .child(
                Element::new("HostedZoneConfig")
                    .child_text("Comment", resource.get_str("comment")),
            );
        dns(api, id, Method::POST, "hostedzone", Some(&body)).await?;

        Ok(self.read(api, id, name).await?.with_identifier(name))
    }

    async fn read(
        &self,
        api: &dyn Api,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let path = format!("hostedzone/{}", identifier);
        let Some(response) = found(dns(api, id, Method::GET, &path, None).await)? else {
            return Ok(State::not_found(id.clone()));
        };
        let Some(zone) = json::at(&response, "HostedZone") else {
            return Ok(State::not_found(id.clone()));
        };

        let attributes = Flattener::new()
            .field("name", zone, "Name")
            .field("comment", zone, "Config.Comment")
            .field("caller_reference", zone, "CallerReference")
            .strings(
                "name_servers",
                json::list_at(&response, "DelegationSet.NameServers.NameServer")
                    .into_iter()
                    .filter_map(|ns| ns.as_str().map(str::to_string))
                    .collect(),
            )
            .build();
        Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
    }

    async fn delete(&self, api: &dyn Api, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let path = format!("hostedzone/{}", identifier);
        ignore_not_found(dns(api, id, Method::DELETE, &path, None).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeApi;
    use nifcloud_core::resource::Value;
    use nifcloud_sdk::Service;
    use serde_json::json;

    fn hosted_zone() -> serde_json::Value {
        json!({
            "HostedZone": {
                "Id": "example.com",
                "Name": "example.com",
                "CallerReference": "ref-1",
                "Config": {"Comment": "main zone"}
            },
            "DelegationSet": {"NameServers": {"NameServer": [
                "ns1.nifcloud.jp", "ns2.nifcloud.jp"
            ]}}
        })
    }

    #[tokio::test]
    async fn create_posts_hosted_zone_request() {
        let api = FakeApi::new();
        api.reply("GET hostedzone/example.com", hosted_zone());

        let resource = Resource::new("dns_zone", "main")
            .with_attribute("name", "example.com")
            .with_attribute("comment", "main zone");
        let state = DnsZone.create(&api, &resource).await.unwrap();

        let create = api.call("POST hostedzone").unwrap();
        assert_eq!(create.service, Service::Dns);
        let body = create.body.unwrap();
        assert!(body.contains("<Name>example.com</Name>"));
        assert!(body.contains("<HostedZoneConfig><Comment>main zone</Comment></HostedZoneConfig>"));
        assert!(body.contains("<CallerReference>"));

        assert_eq!(state.identifier.as_deref(), Some("example.com"));
        assert_eq!(
            state.get_list("name_servers"),
            &[Value::from("ns1.nifcloud.jp"), Value::from("ns2.nifcloud.jp")]
        );
        assert_eq!(state.get_str("comment"), Some("main zone"));
    }

    #[tokio::test]
    async fn missing_zone_reads_as_not_found() {
        let api = FakeApi::new();
        api.fail("GET hostedzone/example.com", 404, "NoSuchHostedZone");

        let state = DnsZone
            .read(&api, &ResourceId::new("dns_zone", "main"), "example.com")
            .await
            .unwrap();
        assert!(!state.exists);
    }

    #[tokio::test]
    async fn delete_tolerates_missing_zone() {
        let api = FakeApi::new();
        api.fail("DELETE hostedzone/example.com", 404, "NoSuchHostedZone");

        DnsZone
            .delete(&api, &ResourceId::new("dns_zone", "main"), "example.com")
            .await
            .unwrap();
        assert_eq!(api.actions(), vec!["DELETE hostedzone/example.com"]);
    }
}
