//! nifcloud_key_pair

use async_trait::async_trait;
use nifcloud_core::provider::ProviderResult;
use nifcloud_core::resource::{Attributes, Resource, ResourceId, State};
use nifcloud_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use nifcloud_sdk::{Api, Params};

use super::ResourceHandler;
use crate::utils::{Flattener, computing, expand_params, first_at, found, ignore_not_found, require_str};

pub struct KeyPair;

#[async_trait]
impl ResourceHandler for KeyPair {
    fn name(&self) -> &'static str {
        "key_pair"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("key_pair")
            .with_description("SSH key pair imported for server login")
            .attribute(
                AttributeSchema::new("key_name", types::resource_name(32))
                    .required()
                    .force_new()
                    .with_provider_name("KeyName"),
            )
            .attribute(
                AttributeSchema::new("public_key", AttributeType::String)
                    .required()
                    .force_new()
                    .with_provider_name("PublicKeyMaterial")
                    .with_description("Base64 encoded public key"),
            )
            .attribute(
                AttributeSchema::new("description", types::string_length(0, 40))
                    .with_provider_name("Description"),
            )
            .attribute(AttributeSchema::new("fingerprint", AttributeType::String).computed())
    }

    async fn create(&self, api: &dyn Api, resource: &Resource) -> ProviderResult<State> {
        let key_name = require_str(resource, "key_name")?;

        let mut params = Params::new();
        expand_params(&self.schema(), resource, &mut params);
        computing(api, &resource.id, "ImportKeyPair", &params).await?;

        Ok(self
            .read(api, &resource.id, key_name)
            .await?
            .with_identifier(key_name))
    }

    async fn read(
        &self,
        api: &dyn Api,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let mut params = Params::new();
        params.set("KeyName.1", identifier);
        let response = found(computing(api, id, "DescribeKeyPairs", &params).await)?;

        let Some(key) = response.as_ref().and_then(|r| first_at(r, "keySet")) else {
            return Ok(State::not_found(id.clone()));
        };

        let attributes = Flattener::new()
            .field("key_name", key, "keyName")
            .field("fingerprint", key, "keyFingerprint")
            .field("description", key, "description")
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
        let description = to.get_str("description").unwrap_or_default();
        if from.get_str("description").unwrap_or_default() != description {
            let mut params = Params::new();
            params
                .set("KeyName", identifier)
                .set("Attribute", "description")
                .set("Value", description);
            computing(api, id, "NiftyModifyKeyPairAttribute", &params).await?;
        }
        self.read(api, id, identifier).await
    }

    async fn delete(&self, api: &dyn Api, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let mut params = Params::new();
        params.set("KeyName", identifier);
        ignore_not_found(computing(api, id, "DeleteKeyPair", &params).await)
    }
}
