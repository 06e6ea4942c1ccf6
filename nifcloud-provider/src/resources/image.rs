//! nifcloud_image data source

use async_trait::async_trait;
use nifcloud_core::provider::{ProviderError, ProviderResult};
use nifcloud_core::resource::{Attributes, Resource, State};
use nifcloud_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use nifcloud_sdk::{Api, Params, json};

use super::DataSourceHandler;
use crate::utils::{Flattener, computing, first_at, require_str};

pub struct Image;

#[async_trait]
impl DataSourceHandler for Image {
    fn name(&self) -> &'static str {
        "image"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("image")
            .with_description("Looks up an OS image by name")
            .attribute(AttributeSchema::new("image_name", AttributeType::String).required())
            .attribute(
                AttributeSchema::new("owner", types::one_of(&["niftycloud", "self"]))
                    .with_description("Public images or images of this account"),
            )
            .attribute(AttributeSchema::new("image_id", AttributeType::String).computed())
    }

    async fn read(&self, api: &dyn Api, config: &Resource) -> ProviderResult<State> {
        let name = require_str(config, "image_name")?;
        let id = &config.id;

        let mut params = Params::new();
        params
            .set("ImageName.1", name)
            .set_opt("Owner.1", config.get_str("owner"));
        let response = computing(api, id, "DescribeImages", &params).await?;
        let image = first_at(&response, "imagesSet").ok_or_else(|| {
            ProviderError::new(format!("no image named '{}'", name)).for_resource(id.clone())
        })?;

        let image_id = json::str_at(image, "imageId").unwrap_or_default();

        let attributes = Flattener::new()
            .str("image_name", Some(name))
            .str("owner", config.get_str("owner"))
            .str("image_id", Some(image_id))
            .build();
        Ok(State::existing(id.clone(), attributes).with_identifier(image_id))
    }
}
