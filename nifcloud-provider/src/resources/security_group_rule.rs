//! nifcloud_security_group_rule
//!
//! One firewall rule authorized in one or more security groups. The rule
//! itself cannot be modified; only the set of groups holding it changes in
//! place. The identifier encodes the rule so it can be found again:
//! `{type}_{protocol}_{from_port}_{to_port}_{cidr_ip or source group}`.

use async_trait::async_trait;
use nifcloud_core::provider::{ProviderError, ProviderResult};
use nifcloud_core::reconcile::{apply, diff_strings};
use nifcloud_core::resource::{Attributes, Resource, ResourceId, State};
use nifcloud_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use nifcloud_sdk::{Api, Params, json};

use super::ResourceHandler;
use super::security_group::wait_applied;
use crate::utils::{Flattener, computing};

pub struct SecurityGroupRule;

const PROTOCOLS: &[&str] = &[
    "ANY", "TCP", "UDP", "ICMP", "SSH", "HTTP", "HTTPS", "SMTP", "SMTPS", "POP3", "POP3S", "IMAP",
    "IMAPS", "GRE", "ESP", "AH", "VRRP", "ICMPv6-all",
];

#[derive(Debug, Clone, PartialEq)]
enum Source {
    Cidr(String),
    Group(String),
}

/// Fields identifying a rule within a group
#[derive(Debug, Clone, PartialEq)]
struct RuleKey {
    direction: String,
    protocol: String,
    from_port: Option<i64>,
    to_port: Option<i64>,
    source: Source,
}

impl RuleKey {
    fn from_resource(resource: &Resource) -> ProviderResult<Self> {
        let source = match (
            resource.get_str("cidr_ip"),
            resource.get_str("source_security_group_name"),
        ) {
            (Some(cidr), None) => Source::Cidr(cidr.to_string()),
            (None, Some(group)) => Source::Group(group.to_string()),
            _ => {
                return Err(ProviderError::new(
                    "exactly one of cidr_ip and source_security_group_name must be set",
                )
                .for_resource(resource.id.clone()));
            }
        };
        let from_port = resource.get_int("from_port");
        Ok(Self {
            direction: resource.get_str("type").unwrap_or("IN").to_string(),
            protocol: resource.get_str("protocol").unwrap_or("TCP").to_string(),
            from_port,
            to_port: resource.get_int("to_port").or(from_port),
            source,
        })
    }

    fn identifier(&self) -> String {
        let port = |p: Option<i64>| p.map(|p| p.to_string()).unwrap_or_default();
        let source = match &self.source {
            Source::Cidr(s) | Source::Group(s) => s,
        };
        format!(
            "{}_{}_{}_{}_{}",
            self.direction,
            self.protocol,
            port(self.from_port),
            port(self.to_port),
            source
        )
    }

    fn parse(identifier: &str) -> Option<Self> {
        // the source is last and keeps any further underscores
        let parts: Vec<&str> = identifier.splitn(5, '_').collect();
        let [direction, protocol, from, to, source] = parts.as_slice() else {
            return None;
        };
        let port = |p: &str| -> Option<Option<i64>> {
            if p.is_empty() { Some(None) } else { p.parse().ok().map(Some) }
        };
        let source = if source.contains('.') {
            Source::Cidr(source.to_string())
        } else {
            Source::Group(source.to_string())
        };
        Some(Self {
            direction: direction.to_string(),
            protocol: protocol.to_string(),
            from_port: port(from)?,
            to_port: port(to)?,
            source,
        })
    }

    /// Whether an `ipPermissions` item of a describe response is this rule
    fn matches(&self, permission: &serde_json::Value) -> bool {
        let protocol_matches = json::str_at(permission, "ipProtocol")
            .is_some_and(|p| p.eq_ignore_ascii_case(&self.protocol));
        let direction_matches = json::str_at(permission, "inOut").unwrap_or("IN") == self.direction;
        let ports_match = json::int_at(permission, "fromPort") == self.from_port
            && json::int_at(permission, "toPort").or(json::int_at(permission, "fromPort"))
                == self.to_port;
        let source_matches = match &self.source {
            Source::Cidr(cidr) => json::strings_at(permission, "ipRanges", "cidrIp").contains(cidr),
            Source::Group(group) => {
                json::strings_at(permission, "groups", "groupName").contains(group)
            }
        };
        protocol_matches && direction_matches && ports_match && source_matches
    }

    fn params(&self, group_name: &str, description: Option<&str>) -> Params {
        let mut params = Params::new();
        params
            .set("GroupName", group_name)
            .set("IpPermissions.1.IpProtocol", self.protocol.as_str())
            .set("IpPermissions.1.InOut", self.direction.as_str())
            .set_opt("IpPermissions.1.FromPort", self.from_port.map(|p| p.to_string()))
            .set_opt("IpPermissions.1.ToPort", self.to_port.map(|p| p.to_string()))
            .set_opt("IpPermissions.1.Description", description);
        match &self.source {
            Source::Cidr(cidr) => params.set("IpPermissions.1.IpRanges.1.CidrIp", cidr.as_str()),
            Source::Group(group) => params.set("IpPermissions.1.Groups.1.GroupName", group.as_str()),
        };
        params
    }
}

#[async_trait]
impl ResourceHandler for SecurityGroupRule {
    fn name(&self) -> &'static str {
        "security_group_rule"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("security_group_rule")
            .with_description("Firewall rule shared by one or more security groups")
            .attribute(
                AttributeSchema::new(
                    "security_group_names",
                    AttributeType::Set(Box::new(types::resource_name(15))),
                )
                .required(),
            )
            .attribute(
                AttributeSchema::new("type", types::one_of(&["IN", "OUT"]))
                    .with_default("IN")
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("protocol", types::one_of(PROTOCOLS))
                    .with_default("TCP")
                    .force_new(),
            )
            .attribute(AttributeSchema::new("from_port", types::port_number()).force_new())
            .attribute(
                AttributeSchema::new("to_port", types::port_number())
                    .optional_computed()
                    .force_new(),
            )
            .attribute(AttributeSchema::new("cidr_ip", AttributeType::String).force_new())
            .attribute(
                AttributeSchema::new("source_security_group_name", types::resource_name(15))
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("description", types::string_length(0, 40)).force_new(),
            )
    }

    async fn create(&self, api: &dyn Api, resource: &Resource) -> ProviderResult<State> {
        let key = RuleKey::from_resource(resource)?;
        let id = &resource.id;
        let description = resource.get_str("description");

        for group in resource.get_strings("security_group_names") {
            authorize(api, id, &key, &group, description).await?;
        }

        let identifier = key.identifier();
        Ok(self.read(api, id, &identifier).await?.with_identifier(identifier))
    }

    async fn read(
        &self,
        api: &dyn Api,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let key = RuleKey::parse(identifier).ok_or_else(|| {
            ProviderError::new(format!("invalid security group rule id '{}'", identifier))
                .for_resource(id.clone())
        })?;

        let response = computing(api, id, "DescribeSecurityGroups", &Params::new()).await?;
        let mut groups = Vec::new();
        let mut description = None;
        for group in json::list_at(&response, "securityGroupInfo") {
            let matching = json::list_at(group, "ipPermissions")
                .into_iter()
                .find(|p| key.matches(p));
            if let (Some(permission), Some(name)) = (matching, json::str_at(group, "groupName")) {
                groups.push(name.to_string());
                description = description.or_else(|| json::string_at(permission, "description"));
            }
        }
        if groups.is_empty() {
            return Ok(State::not_found(id.clone()));
        }

        let mut attributes = Flattener::new()
            .strings("security_group_names", groups)
            .str("type", Some(&key.direction))
            .str("protocol", Some(&key.protocol))
            .int("from_port", key.from_port)
            .int("to_port", key.to_port)
            .str("description", description.as_deref());
        attributes = match &key.source {
            Source::Cidr(cidr) => attributes.str("cidr_ip", Some(cidr)),
            Source::Group(group) => attributes.str("source_security_group_name", Some(group)),
        };
        Ok(State::existing(id.clone(), attributes.build()).with_identifier(identifier))
    }

    async fn update(
        &self,
        api: &dyn Api,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let key = RuleKey::from_resource(to)?;
        let description = to.get_str("description");
        let diff = diff_strings(
            &from.get_strings("security_group_names"),
            &to.get_strings("security_group_names"),
        );

        let key = &key;
        apply(
            &diff,
            |group| async move { revoke(api, id, key, &group).await },
            |group| async move { authorize(api, id, key, &group, description).await },
        )
        .await?;

        self.read(api, id, identifier).await
    }

    async fn delete(&self, api: &dyn Api, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let state = self.read(api, id, identifier).await?;
        let Some(key) = RuleKey::parse(identifier) else {
            return Ok(());
        };
        for group in state.get_strings("security_group_names") {
            revoke(api, id, &key, &group).await?;
        }
        Ok(())
    }
}

async fn authorize(
    api: &dyn Api,
    id: &ResourceId,
    key: &RuleKey,
    group: &str,
    description: Option<&str>,
) -> ProviderResult<()> {
    wait_applied(api, id, group).await?;
    computing(api, id, "AuthorizeSecurityGroupIngress", &key.params(group, description)).await?;
    wait_applied(api, id, group).await
}

async fn revoke(api: &dyn Api, id: &ResourceId, key: &RuleKey, group: &str) -> ProviderResult<()> {
    wait_applied(api, id, group).await?;
    computing(api, id, "RevokeSecurityGroupIngress", &key.params(group, None)).await?;
    wait_applied(api, id, group).await
}
