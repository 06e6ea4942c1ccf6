//! nifcloud_security_group

use async_trait::async_trait;
use nifcloud_core::provider::ProviderResult;
use nifcloud_core::resource::{Attributes, Resource, ResourceId, State};
use nifcloud_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use nifcloud_core::waiter::{Status, Waiter};
use nifcloud_sdk::{Api, Params};

use super::ResourceHandler;
use crate::utils::{
    Flattener, changed, computing, expand_params, first_at, found, ignore_not_found, require_str,
    status_of, wait_until, waiter,
};

const POLL_SECS: u64 = 5;
const TIMEOUT_SECS: u64 = 10 * 60;

pub struct SecurityGroup;

#[async_trait]
impl ResourceHandler for SecurityGroup {
    fn name(&self) -> &'static str {
        "security_group"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("security_group")
            .with_description("Firewall group applied to servers")
            .attribute(
                AttributeSchema::new("group_name", types::resource_name(15))
                    .required()
                    .force_new()
                    .with_provider_name("GroupName"),
            )
            .attribute(
                AttributeSchema::new("description", types::string_length(0, 40))
                    .with_provider_name("GroupDescription"),
            )
            .attribute(
                AttributeSchema::new("availability_zone", AttributeType::String)
                    .optional_computed()
                    .force_new()
                    .with_provider_name("Placement.AvailabilityZone"),
            )
            .attribute(
                AttributeSchema::new("log_limit", types::one_of(&["1000", "100000"]))
                    .optional_computed()
                    .with_description("Number of log lines kept"),
            )
            .attribute(AttributeSchema::new("status", AttributeType::String).computed())
    }

    async fn create(&self, api: &dyn Api, resource: &Resource) -> ProviderResult<State> {
        let group_name = require_str(resource, "group_name")?;
        let id = &resource.id;

        let mut params = Params::new();
        expand_params(&self.schema(), resource, &mut params);
        computing(api, id, "CreateSecurityGroup", &params).await?;
        wait_applied(api, id, group_name).await?;

        if let Some(log_limit) = resource.get_str("log_limit") {
            update_group(api, id, group_name, "GroupLogLimitUpdate", log_limit).await?;
        }

        Ok(self.read(api, id, group_name).await?.with_identifier(group_name))
    }

    async fn read(
        &self,
        api: &dyn Api,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let Some(group) = describe(api, id, identifier).await? else {
            return Ok(State::not_found(id.clone()));
        };

        let attributes = Flattener::new()
            .field("group_name", &group, "groupName")
            .field("description", &group, "groupDescription")
            .field("availability_zone", &group, "availabilityZone")
            .field("log_limit", &group, "groupLogLimit")
            .field("status", &group, "groupStatus")
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

        if changes.contains(&"description") {
            let description = to.get_str("description").unwrap_or_default();
            update_group(api, id, identifier, "GroupDescriptionUpdate", description).await?;
        }
        if changes.contains(&"log_limit")
            && let Some(log_limit) = to.get_str("log_limit")
        {
            update_group(api, id, identifier, "GroupLogLimitUpdate", log_limit).await?;
        }

        self.read(api, id, identifier).await
    }

    async fn delete(&self, api: &dyn Api, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let mut params = Params::new();
        params.set("GroupName", identifier);
        ignore_not_found(computing(api, id, "DeleteSecurityGroup", &params).await)?;

        let gone = waiter(id, POLL_SECS, TIMEOUT_SECS).until(&[Waiter::GONE]);
        wait_until(gone, id, move || async move {
            let group = describe(api, id, identifier).await?;
            Ok::<Status, _>(status_of(group, "groupStatus"))
        })
        .await?;
        Ok(())
    }
}

pub(crate) async fn describe(
    api: &dyn Api,
    id: &ResourceId,
    group_name: &str,
) -> ProviderResult<Option<serde_json::Value>> {
    let mut params = Params::new();
    params.set("GroupName.1", group_name);
    let response = found(computing(api, id, "DescribeSecurityGroups", &params).await)?;
    Ok(response.and_then(|r| first_at(&r, "securityGroupInfo").cloned()))
}

/// Wait until pending changes to the group are applied
pub(crate) async fn wait_applied(
    api: &dyn Api,
    id: &ResourceId,
    group_name: &str,
) -> ProviderResult<()> {
    let applied = waiter(id, POLL_SECS, TIMEOUT_SECS).until(&["applied"]);
    wait_until(applied, id, move || async move {
        let group = describe(api, id, group_name).await?;
        Ok::<Status, _>(status_of(group, "groupStatus"))
    })
    .await?;
    Ok(())
}

async fn update_group(
    api: &dyn Api,
    id: &ResourceId,
    group_name: &str,
    parameter: &str,
    value: &str,
) -> ProviderResult<()> {
    let mut params = Params::new();
    params.set("GroupName", group_name).set(parameter, value);
    computing(api, id, "UpdateSecurityGroup", &params).await?;
    wait_applied(api, id, group_name).await
}
