//! nifcloud_load_balancer
//!
//! Manages a load balancer through its first listener. The identifier is the
//! load balancer name; requests that target a listener carry the port pair.

use async_trait::async_trait;
use nifcloud_core::provider::{ProviderError, ProviderResult};
use nifcloud_core::reconcile::{apply, diff_strings};
use nifcloud_core::resource::{Attributes, Resource, ResourceId, State};
use nifcloud_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use nifcloud_sdk::{Api, Params, json};

use super::ResourceHandler;
use crate::utils::{
    Flattener, changed, computing, expand_params, first_at, found, ignore_not_found, require_str,
};

const RESULT_PATH: &str = "DescribeLoadBalancersResult.LoadBalancerDescriptions";

const LISTENER: &[&str] = &["load_balancer_port", "instance_port", "protocol", "balancing_type"];
const HEALTH_CHECK: &[&str] = &[
    "health_check_target",
    "health_check_interval",
    "unhealthy_threshold",
    "healthy_threshold",
];

pub struct LoadBalancer;

/// Port pair selecting one listener of a load balancer
#[derive(Debug, Clone, Copy, PartialEq)]
struct Ports {
    load_balancer: i64,
    instance: i64,
}

impl Ports {
    fn of(id: &ResourceId, attributes: &impl Attributes) -> ProviderResult<Self> {
        match (
            attributes.get_int("load_balancer_port"),
            attributes.get_int("instance_port"),
        ) {
            (Some(load_balancer), Some(instance)) => Ok(Self {
                load_balancer,
                instance,
            }),
            _ => Err(ProviderError::new("load_balancer_port and instance_port are required")
                .for_resource(id.clone())),
        }
    }

    fn params(&self, name: &str) -> Params {
        let mut params = Params::new();
        params
            .set("LoadBalancerName", name)
            .set("LoadBalancerPort", self.load_balancer.to_string())
            .set("InstancePort", self.instance.to_string());
        params
    }
}

#[async_trait]
impl ResourceHandler for LoadBalancer {
    fn name(&self) -> &'static str {
        "load_balancer"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("load_balancer")
            .with_description("L4 load balancer in front of servers")
            .attribute(
                AttributeSchema::new("load_balancer_name", types::resource_name(15))
                    .required()
                    .force_new()
                    .with_provider_name("LoadBalancerName"),
            )
            .attribute(
                AttributeSchema::new("load_balancer_port", types::port_number())
                    .required()
                    .with_provider_name("Listeners.member.1.LoadBalancerPort"),
            )
            .attribute(
                AttributeSchema::new("instance_port", types::port_number())
                    .required()
                    .with_provider_name("Listeners.member.1.InstancePort"),
            )
            .attribute(
                AttributeSchema::new("protocol", AttributeType::String)
                    .optional_computed()
                    .with_provider_name("Listeners.member.1.Protocol"),
            )
            .attribute(
                AttributeSchema::new("balancing_type", types::one_of(&["1", "2"]))
                    .with_default("1")
                    .with_provider_name("Listeners.member.1.BalancingType")
                    .with_description("1: round robin, 2: least connection"),
            )
            .attribute(
                AttributeSchema::new("network_volume", types::positive_int())
                    .with_default(10)
                    .with_provider_name("NetworkVolume")
                    .with_description("Bandwidth in Mbps"),
            )
            .attribute(
                AttributeSchema::new("accounting_type", types::one_of(&["1", "2"]))
                    .with_default("1")
                    .with_provider_name("AccountingType"),
            )
            .attribute(
                AttributeSchema::new("ip_version", types::one_of(&["v4", "v6"]))
                    .with_default("v4")
                    .force_new()
                    .with_provider_name("IpVersion"),
            )
            .attribute(
                AttributeSchema::new("policy_type", types::one_of(&["standard", "ats"]))
                    .with_default("standard")
                    .force_new()
                    .with_provider_name("PolicyType"),
            )
            .attribute(
                AttributeSchema::new("availability_zone", AttributeType::String)
                    .optional_computed()
                    .force_new()
                    .with_provider_name("AvailabilityZones.member.1"),
            )
            .attribute(
                AttributeSchema::new("health_check_target", AttributeType::String)
                    .optional_computed()
                    .with_description("ICMP or TCP:<port>"),
            )
            .attribute(
                AttributeSchema::new("health_check_interval", types::int_between("Interval", 5, 300))
                    .optional_computed(),
            )
            .attribute(
                AttributeSchema::new("unhealthy_threshold", types::int_between("Threshold", 1, 10))
                    .optional_computed(),
            )
            .attribute(
                AttributeSchema::new("healthy_threshold", types::int_between("Threshold", 1, 10))
                    .optional_computed(),
            )
            .attribute(AttributeSchema::new(
                "instances",
                AttributeType::Set(Box::new(AttributeType::String)),
            ))
            .attribute(AttributeSchema::new("dns_name", AttributeType::String).computed())
    }

    async fn create(&self, api: &dyn Api, resource: &Resource) -> ProviderResult<State> {
        let id = &resource.id;
        let name = require_str(resource, "load_balancer_name")?;
        let ports = Ports::of(id, resource)?;

        let mut params = Params::new();
        expand_params(&self.schema(), resource, &mut params);
        computing(api, id, "CreateLoadBalancer", &params).await?;

        if HEALTH_CHECK.iter().any(|a| resource.attr(a).is_some()) {
            configure_health_check(api, id, name, ports, resource).await?;
        }
        for instance in resource.get_strings("instances") {
            register(api, id, name, ports, "RegisterInstancesWithLoadBalancer", &instance).await?;
        }

        Ok(self.read(api, id, name).await?.with_identifier(name))
    }

    async fn read(
        &self,
        api: &dyn Api,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let mut params = Params::new();
        params.set("LoadBalancerNames.member.1", identifier);
        let response = found(computing(api, id, "DescribeLoadBalancers", &params).await)?;
        let Some(lb) = response.as_ref().and_then(|r| first_at(r, RESULT_PATH)) else {
            return Ok(State::not_found(id.clone()));
        };

        let listener = first_at(lb, "ListenerDescriptions")
            .and_then(|l| json::at(l, "Listener"))
            .cloned()
            .unwrap_or_default();
        let zone = json::list_at(lb, "AvailabilityZones")
            .into_iter()
            .find_map(|z| z.as_str());
        let instances = json::strings_at(lb, "Instances", "InstanceId");

        let attributes = Flattener::new()
            .field("load_balancer_name", lb, "LoadBalancerName")
            .int_field("load_balancer_port", &listener, "LoadBalancerPort")
            .int_field("instance_port", &listener, "InstancePort")
            .field("protocol", &listener, "Protocol")
            .field("balancing_type", &listener, "BalancingType")
            .int_field("network_volume", lb, "NetworkVolume")
            .field("accounting_type", lb, "NextMonthAccountingType")
            .field("ip_version", lb, "IpVersion")
            .field("policy_type", lb, "PolicyType")
            .str("availability_zone", zone)
            .field("health_check_target", lb, "HealthCheck.Target")
            .int_field("health_check_interval", lb, "HealthCheck.Interval")
            .int_field("unhealthy_threshold", lb, "HealthCheck.UnhealthyThreshold")
            .int_field("healthy_threshold", lb, "HealthCheck.HealthyThreshold")
            .strings("instances", instances)
            .field("dns_name", lb, "DNSName")
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
        let old_ports = Ports::of(id, from)?;
        let ports = Ports::of(id, to)?;

        let mut params = old_ports.params(identifier);
        let mut modified = false;
        if LISTENER.iter().any(|a| changes.contains(a)) {
            modified = true;
            params
                .set("ListenerUpdate.LoadBalancerPort", ports.load_balancer.to_string())
                .set("ListenerUpdate.Listener.InstancePort", ports.instance.to_string())
                .set_opt("ListenerUpdate.Listener.Protocol", to.get_str("protocol"))
                .set_opt(
                    "ListenerUpdate.Listener.BalancingType",
                    to.get_str("balancing_type"),
                );
        }
        if changes.contains(&"network_volume") {
            modified = true;
            params.set_opt(
                "NetworkVolumeUpdate",
                to.get_int("network_volume").map(|v| v.to_string()),
            );
        }
        if changes.contains(&"accounting_type") {
            modified = true;
            params.set_opt("AccountingTypeUpdate", to.get_str("accounting_type"));
        }
        if modified {
            computing(api, id, "UpdateLoadBalancer", &params).await?;
        }

        if HEALTH_CHECK.iter().any(|a| changes.contains(a)) {
            configure_health_check(api, id, identifier, ports, to).await?;
        }

        let diff = diff_strings(&from.get_strings("instances"), &to.get_strings("instances"));
        apply(
            &diff,
            |instance| async move {
                let action = "DeregisterInstancesFromLoadBalancer";
                register(api, id, identifier, ports, action, &instance).await
            },
            |instance| async move {
                let action = "RegisterInstancesWithLoadBalancer";
                register(api, id, identifier, ports, action, &instance).await
            },
        )
        .await?;

        self.read(api, id, identifier).await
    }

    async fn delete(&self, api: &dyn Api, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let state = self.read(api, id, identifier).await?;
        if !state.exists {
            return Ok(());
        }
        let params = Ports::of(id, &state)?.params(identifier);
        ignore_not_found(computing(api, id, "DeleteLoadBalancer", &params).await)
    }
}

async fn configure_health_check(
    api: &dyn Api,
    id: &ResourceId,
    name: &str,
    ports: Ports,
    resource: &Resource,
) -> ProviderResult<()> {
    let int = |attribute: &str| resource.get_int(attribute).map(|v| v.to_string());
    let mut params = ports.params(name);
    params
        .set_opt("HealthCheck.Target", resource.get_str("health_check_target"))
        .set_opt("HealthCheck.Interval", int("health_check_interval"))
        .set_opt("HealthCheck.UnhealthyThreshold", int("unhealthy_threshold"))
        .set_opt("HealthCheck.HealthyThreshold", int("healthy_threshold"));
    computing(api, id, "ConfigureHealthCheck", &params).await?;
    Ok(())
}

/// Register or deregister one instance on the listener
async fn register(
    api: &dyn Api,
    id: &ResourceId,
    name: &str,
    ports: Ports,
    action: &str,
    instance_id: &str,
) -> ProviderResult<()> {
    let mut params = ports.params(name);
    params.set("Instances.member.1.InstanceId", instance_id);
    computing(api, id, action, &params).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeApi;
    use nifcloud_core::resource::Value;
    use serde_json::json;

    fn described(instances: &[&str], network_volume: i64) -> serde_json::Value {
        let instances: Vec<_> = instances.iter().map(|i| json!({"InstanceId": i})).collect();
        json!({
            "DescribeLoadBalancersResult": {
                "LoadBalancerDescriptions": [{
                    "LoadBalancerName": "web",
                    "DNSName": "web.lb.example.jp",
                    "NetworkVolume": network_volume.to_string(),
                    "NextMonthAccountingType": "1",
                    "IpVersion": "v4",
                    "PolicyType": "standard",
                    "AvailabilityZones": ["east-11"],
                    "ListenerDescriptions": [{
                        "Listener": {
                            "Protocol": "HTTP",
                            "LoadBalancerPort": "80",
                            "InstancePort": "8080",
                            "BalancingType": "1"
                        }
                    }],
                    "HealthCheck": {
                        "Target": "TCP:8080",
                        "Interval": "10",
                        "UnhealthyThreshold": "2",
                        "HealthyThreshold": "10"
                    },
                    "Instances": instances
                }]
            }
        })
    }

    fn desired(instances: &[&str]) -> Resource {
        Resource::new("load_balancer", "web")
            .with_attribute("load_balancer_name", "web")
            .with_attribute("load_balancer_port", 80)
            .with_attribute("instance_port", 8080)
            .with_attribute("balancing_type", "1")
            .with_attribute("network_volume", 10)
            .with_attribute(
                "instances",
                Value::List(instances.iter().map(|i| Value::from(*i)).collect()),
            )
    }

    fn id() -> ResourceId {
        ResourceId::new("load_balancer", "web")
    }

    #[tokio::test]
    async fn create_registers_instances() {
        let api = FakeApi::new();
        api.reply("DescribeLoadBalancers", described(&["web001", "web002"], 10));

        let resource = desired(&["web001", "web002"]).with_attribute("health_check_target", "TCP:8080");
        let state = LoadBalancer.create(&api, &resource).await.unwrap();

        let create = api.call("CreateLoadBalancer").unwrap();
        assert_eq!(create.param("LoadBalancerName"), Some("web"));
        assert_eq!(create.param("Listeners.member.1.LoadBalancerPort"), Some("80"));
        assert_eq!(create.param("Listeners.member.1.InstancePort"), Some("8080"));
        assert_eq!(create.param("NetworkVolume"), Some("10"));
        assert_eq!(
            api.call("ConfigureHealthCheck").unwrap().param("HealthCheck.Target"),
            Some("TCP:8080")
        );
        assert_eq!(api.calls_of("RegisterInstancesWithLoadBalancer").len(), 2);

        assert_eq!(state.get_int("instance_port"), Some(8080));
        assert_eq!(state.get_str("protocol"), Some("HTTP"));
        assert_eq!(state.get_str("availability_zone"), Some("east-11"));
        assert_eq!(state.get_strings("instances"), vec!["web001", "web002"]);
        assert_eq!(state.get_int("health_check_interval"), Some(10));
    }

    #[tokio::test]
    async fn update_moves_listener_with_old_ports() {
        let api = FakeApi::new();
        api.reply("DescribeLoadBalancers", described(&["web001"], 10));

        let from = LoadBalancer.read(&api, &id(), "web").await.unwrap();
        let to = desired(&["web001"])
            .with_attribute("instance_port", 8081)
            .with_attribute("network_volume", 20);
        LoadBalancer.update(&api, &id(), "web", &from, &to).await.unwrap();

        assert_eq!(api.mutations(), vec!["UpdateLoadBalancer"]);
        let update = api.call("UpdateLoadBalancer").unwrap();
        assert_eq!(update.param("InstancePort"), Some("8080"));
        assert_eq!(update.param("ListenerUpdate.Listener.InstancePort"), Some("8081"));
        assert_eq!(update.param("NetworkVolumeUpdate"), Some("20"));
    }

    #[tokio::test]
    async fn instance_changes_are_reconciled() {
        let api = FakeApi::new();
        api.reply("DescribeLoadBalancers", described(&["web001", "web002"], 10));

        let from = LoadBalancer.read(&api, &id(), "web").await.unwrap();
        let to = desired(&["web002", "web003"]);
        LoadBalancer.update(&api, &id(), "web", &from, &to).await.unwrap();

        assert_eq!(
            api.mutations(),
            vec![
                "DeregisterInstancesFromLoadBalancer",
                "RegisterInstancesWithLoadBalancer"
            ]
        );
        assert_eq!(
            api.call("DeregisterInstancesFromLoadBalancer")
                .unwrap()
                .param("Instances.member.1.InstanceId"),
            Some("web001")
        );
        assert_eq!(
            api.call("RegisterInstancesWithLoadBalancer")
                .unwrap()
                .param("Instances.member.1.InstanceId"),
            Some("web003")
        );
    }

    #[tokio::test]
    async fn delete_names_the_listener() {
        let api = FakeApi::new();
        api.reply("DescribeLoadBalancers", described(&[], 10));

        LoadBalancer.delete(&api, &id(), "web").await.unwrap();

        let delete = api.call("DeleteLoadBalancer").unwrap();
        assert_eq!(delete.param("LoadBalancerPort"), Some("80"));
        assert_eq!(delete.param("InstancePort"), Some("8080"));
    }
}
