//! nifcloud_volume

use async_trait::async_trait;
use nifcloud_core::provider::ProviderResult;
use nifcloud_core::resource::{Attributes, Resource, ResourceId, State};
use nifcloud_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use nifcloud_core::waiter::{Status, Waiter};
use nifcloud_sdk::{Api, Params, json};

use super::ResourceHandler;
use crate::utils::{
    Flattener, changed, computing, expand_params, first_at, found, ignore_not_found, require_str,
    status_of, wait_until, waiter,
};

const POLL_SECS: u64 = 10;
const TIMEOUT_SECS: u64 = 20 * 60;

pub struct Volume;

#[async_trait]
impl ResourceHandler for Volume {
    fn name(&self) -> &'static str {
        "volume"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("volume")
            .with_description("Additional disk attached to a server")
            .attribute(
                AttributeSchema::new("volume_id", types::resource_name(15))
                    .required()
                    .force_new()
                    .with_provider_name("VolumeId"),
            )
            .attribute(
                AttributeSchema::new("size", types::int_between("VolumeSize", 100, 4000))
                    .required()
                    .with_provider_name("Size")
                    .with_description("Size in GB; can only grow"),
            )
            .attribute(
                AttributeSchema::new("disk_type", AttributeType::String)
                    .optional_computed()
                    .force_new()
                    .with_provider_name("DiskType"),
            )
            .attribute(
                AttributeSchema::new("instance_id", AttributeType::String)
                    .required()
                    .with_provider_name("InstanceId"),
            )
            .attribute(
                AttributeSchema::new("reboot", types::one_of(&["force", "true", "false"]))
                    .with_default("true"),
            )
            .attribute(
                AttributeSchema::new("accounting_type", types::one_of(&["1", "2"]))
                    .with_default("2")
                    .with_provider_name("AccountingType"),
            )
            .attribute(
                AttributeSchema::new("description", types::string_length(0, 40))
                    .with_provider_name("Description"),
            )
            .attribute(AttributeSchema::new("instance_unique_id", AttributeType::String).computed())
            .attribute(AttributeSchema::new("status", AttributeType::String).computed())
    }

    async fn create(&self, api: &dyn Api, resource: &Resource) -> ProviderResult<State> {
        let volume_id = require_str(resource, "volume_id")?;
        let id = &resource.id;

        let mut params = Params::new();
        expand_params(&self.schema(), resource, &mut params);
        computing(api, id, "CreateVolume", &params).await?;
        wait_for(api, id, volume_id, &["in-use"]).await?;

        Ok(self.read(api, id, volume_id).await?.with_identifier(volume_id))
    }

    async fn read(
        &self,
        api: &dyn Api,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let Some(volume) = describe(api, id, identifier).await? else {
            return Ok(State::not_found(id.clone()));
        };

        let attachment = first_at(&volume, "attachmentSet");
        let attributes = Flattener::new()
            .field("volume_id", &volume, "volumeId")
            .int_field("size", &volume, "size")
            .field("disk_type", &volume, "diskType")
            .str("instance_id", attachment.and_then(|a| json::str_at(a, "instanceId")))
            .str(
                "instance_unique_id",
                attachment.and_then(|a| json::str_at(a, "instanceUniqueId")),
            )
            .field("accounting_type", &volume, "nextMonthAccountingType")
            .field("description", &volume, "description")
            .field("status", &volume, "status")
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

        for (attribute, api_attribute) in [
            ("description", "description"),
            ("accounting_type", "accountingType"),
        ] {
            if changes.contains(&attribute) {
                let mut params = Params::new();
                params
                    .set("VolumeId", identifier)
                    .set("Attribute", api_attribute)
                    .set("Value", to.get_str(attribute).unwrap_or_default());
                computing(api, id, "ModifyVolumeAttribute", &params).await?;
            }
        }

        if changes.contains(&"instance_id")
            && let Some(instance_id) = to.get_str("instance_id")
        {
            if let Some(old) = from.get_str("instance_id") {
                detach(api, id, identifier, old).await?;
            }
            let mut params = Params::new();
            params.set("VolumeId", identifier).set("InstanceId", instance_id);
            computing(api, id, "AttachVolume", &params).await?;
            wait_for(api, id, identifier, &["in-use"]).await?;
        }

        if changes.contains(&"size")
            && let Some(size) = to.get_int("size")
        {
            let mut params = Params::new();
            params
                .set("VolumeId", identifier)
                .set("NewVolumeSize", size.to_string())
                .set_opt("NiftyReboot", to.get_str("reboot"));
            computing(api, id, "ExtendVolumeSize", &params).await?;
            wait_for(api, id, identifier, &["in-use"]).await?;
        }

        self.read(api, id, identifier).await
    }

    async fn delete(&self, api: &dyn Api, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let state = self.read(api, id, identifier).await?;
        if !state.exists {
            return Ok(());
        }
        if let Some(instance_id) = state.get_str("instance_id") {
            detach(api, id, identifier, instance_id).await?;
        }

        let mut params = Params::new();
        params.set("VolumeId", identifier);
        ignore_not_found(computing(api, id, "DeleteVolume", &params).await)?;
        wait_for(api, id, identifier, &[Waiter::GONE]).await
    }
}

async fn describe(
    api: &dyn Api,
    id: &ResourceId,
    volume_id: &str,
) -> ProviderResult<Option<serde_json::Value>> {
    let mut params = Params::new();
    params.set("VolumeId.1", volume_id);
    let response = found(computing(api, id, "DescribeVolumes", &params).await)?;
    Ok(response.and_then(|r| first_at(&r, "volumeSet").cloned()))
}

async fn wait_for(
    api: &dyn Api,
    id: &ResourceId,
    volume_id: &str,
    targets: &[&str],
) -> ProviderResult<()> {
    let waiter = waiter(id, POLL_SECS, TIMEOUT_SECS)
        .until(targets)
        .failing_on(&["error"]);
    wait_until(waiter, id, move || async move {
        let volume = describe(api, id, volume_id).await?;
        Ok::<Status, _>(status_of(volume, "status"))
    })
    .await?;
    Ok(())
}

async fn detach(
    api: &dyn Api,
    id: &ResourceId,
    volume_id: &str,
    instance_id: &str,
) -> ProviderResult<()> {
    let mut params = Params::new();
    params
        .set("VolumeId", volume_id)
        .set("InstanceId", instance_id)
        .set_bool("Agreement", true);
    computing(api, id, "DetachVolume", &params).await?;
    wait_for(api, id, volume_id, &["available"]).await
}
