//! Provider block and configuration
//!
//! Terraform hands the provider block to `configure` once per run. The
//! configured core provider is stored in a slot shared with every resource
//! and data source bridge.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use nifcloud_core::provider::{Provider as CoreProvider, ProviderError};
use nifcloud_provider::NifcloudProvider;
use nifcloud_provider::resources::{data_source_handlers, handlers};
use nifcloud_sdk::config::{ENV_ACCESS_KEY, ENV_REGION, ENV_SECRET_KEY};
use nifcloud_sdk::{ClientConfig, ClientResult, NifcloudClient, Service};
use serde::{Deserialize, Serialize};
use tf_provider::data_source::DynamicDataSource;
use tf_provider::resource::DynamicResource;
use tf_provider::schema::{Attribute, AttributeConstraint, AttributeType, Block, Description, Schema};
use tf_provider::{Diagnostics, Provider, ValueEmpty, ValueString};

use crate::data_source::DataSourceBridge;
use crate::resource::ResourceBridge;

/// Configured core provider, empty until `configure` runs
#[derive(Clone, Default)]
pub struct ProviderSlot(Arc<RwLock<Option<Arc<dyn CoreProvider>>>>);

impl fmt::Debug for ProviderSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProviderSlot")
    }
}

impl ProviderSlot {
    pub fn fill(&self, provider: Arc<dyn CoreProvider>) {
        let mut slot = match self.0.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(provider);
    }

    /// The configured provider, or a diagnostic when there is none yet
    pub fn get(&self, diags: &mut Diagnostics) -> Option<Arc<dyn CoreProvider>> {
        let provider = match self.0.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if provider.is_none() {
            diags.root_error(
                "Provider not configured",
                "The nifcloud provider was used before its configuration was applied.",
            );
        }
        provider
    }
}

/// Report a provider error with its cause chain in the detail
pub fn report(diags: &mut Diagnostics, summary: &str, error: &ProviderError) {
    let mut detail = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        detail.push_str(&format!("\ncaused by: {}", cause));
        source = cause.source();
    }
    log::warn!("{}: {}", summary, error);
    diags.root_error(summary, detail);
}

/// The `provider "nifcloud"` block
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ProviderConfig<'a> {
    #[serde(borrow = "'a")]
    pub access_key: ValueString<'a>,
    #[serde(borrow = "'a")]
    pub secret_key: ValueString<'a>,
    #[serde(borrow = "'a")]
    pub region: ValueString<'a>,
    #[serde(borrow = "'a")]
    pub computing_endpoint: ValueString<'a>,
    #[serde(borrow = "'a")]
    pub rdb_endpoint: ValueString<'a>,
    #[serde(borrow = "'a")]
    pub dns_endpoint: ValueString<'a>,
}

impl ProviderConfig<'_> {
    /// Client configuration from the block, falling back to `lookup` for
    /// credentials and region
    pub fn client_config(&self, lookup: impl Fn(&str) -> Option<String>) -> ClientResult<ClientConfig> {
        let setting = |value: &ValueString<'_>, env: &str| {
            value
                .as_deref_option()
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .or_else(|| lookup(env))
        };
        let mut config = ClientConfig::from_lookup(|key| match key {
            ENV_ACCESS_KEY => setting(&self.access_key, key),
            ENV_SECRET_KEY => setting(&self.secret_key, key),
            ENV_REGION => setting(&self.region, key),
            _ => lookup(key),
        })?;

        for (service, endpoint) in [
            (Service::Computing, &self.computing_endpoint),
            (Service::Rdb, &self.rdb_endpoint),
            (Service::Dns, &self.dns_endpoint),
        ] {
            if let Some(endpoint) = endpoint.as_deref_option().filter(|e| !e.is_empty()) {
                config = config.with_endpoint(service, endpoint);
            }
        }
        config.validate()?;
        Ok(config)
    }
}

fn setting(description: &str, sensitive: bool) -> Attribute {
    Attribute {
        attr_type: AttributeType::String,
        description: Description::plain(description),
        constraint: AttributeConstraint::Optional,
        sensitive,
        deprecated: false,
    }
}

/// tf-provider `Provider` serving every NIFCLOUD resource handler
#[derive(Debug, Clone, Default)]
pub struct NifcloudPlugin {
    slot: ProviderSlot,
}

#[async_trait]
impl Provider for NifcloudPlugin {
    type Config<'a> = ProviderConfig<'a>;
    type MetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        let attributes = HashMap::from([
            (
                "access_key".to_string(),
                setting("Access key, or NIFCLOUD_ACCESS_KEY_ID", true),
            ),
            (
                "secret_key".to_string(),
                setting("Secret access key, or NIFCLOUD_SECRET_ACCESS_KEY", true),
            ),
            (
                "region".to_string(),
                setting("Region, or NIFCLOUD_DEFAULT_REGION (default jp-east-1)", false),
            ),
            (
                "computing_endpoint".to_string(),
                setting("Computing API endpoint override", false),
            ),
            (
                "rdb_endpoint".to_string(),
                setting("RDB API endpoint override", false),
            ),
            (
                "dns_endpoint".to_string(),
                setting("DNS API endpoint override", false),
            ),
        ]);
        Some(Schema {
            version: 1,
            block: Block {
                attributes,
                description: Description::plain("NIFCLOUD"),
                ..Default::default()
            },
        })
    }

    async fn validate<'a>(&self, _diags: &mut Diagnostics, _config: Self::Config<'a>) -> Option<()> {
        // credentials may come from the environment at configure time
        Some(())
    }

    async fn configure<'a>(
        &self,
        diags: &mut Diagnostics,
        terraform_version: String,
        config: Self::Config<'a>,
    ) -> Option<()> {
        let client = match config
            .client_config(|key| std::env::var(key).ok())
            .and_then(NifcloudClient::new)
        {
            Ok(client) => client,
            Err(e) => {
                diags.root_error("Invalid provider configuration", e.to_string());
                return None;
            }
        };

        log::info!(
            "configured for region {} (Terraform {})",
            client.config().region,
            terraform_version
        );
        self.slot
            .fill(Arc::new(NifcloudProvider::new(Arc::new(client))));
        Some(())
    }

    fn get_resources(
        &self,
        _diags: &mut Diagnostics,
    ) -> Option<HashMap<String, Box<dyn DynamicResource>>> {
        Some(
            handlers()
                .iter()
                .map(|h| {
                    let bridge = ResourceBridge::new(h.name(), h.schema(), self.slot.clone());
                    (h.name().to_string(), Box::new(bridge) as Box<dyn DynamicResource>)
                })
                .collect(),
        )
    }

    fn get_data_sources(
        &self,
        _diags: &mut Diagnostics,
    ) -> Option<HashMap<String, Box<dyn DynamicDataSource>>> {
        Some(
            data_source_handlers()
                .iter()
                .map(|h| {
                    let bridge = DataSourceBridge::new(h.name(), h.schema(), self.slot.clone());
                    (h.name().to_string(), Box::new(bridge) as Box<dyn DynamicDataSource>)
                })
                .collect(),
        )
    }
}
