//! NIFCLOUD provider implementation
//!
//! Dispatches resource operations to the handler registered for the
//! resource type and attaches the resource id to every failure.

use std::collections::HashMap;
use std::sync::Arc;

use nifcloud_core::provider::{ProviderError, ProviderResult};
use nifcloud_core::resource::{Resource, ResourceId, State};
use nifcloud_sdk::Api;

use crate::resources::{DataSourceHandler, ResourceHandler, data_source_handlers, handlers};

/// NIFCLOUD Provider
pub struct NifcloudProvider {
    api: Arc<dyn Api>,
    handlers: HashMap<&'static str, Box<dyn ResourceHandler>>,
    data_sources: HashMap<&'static str, Box<dyn DataSourceHandler>>,
}

impl NifcloudProvider {
    pub fn new(api: Arc<dyn Api>) -> Self {
        Self {
            api,
            handlers: handlers().into_iter().map(|h| (h.name(), h)).collect(),
            data_sources: data_source_handlers()
                .into_iter()
                .map(|h| (h.name(), h))
                .collect(),
        }
    }

    pub(crate) fn handler(&self, id: &ResourceId) -> ProviderResult<&dyn ResourceHandler> {
        self.handlers
            .get(id.resource_type.as_str())
            .map(|h| h.as_ref())
            .ok_or_else(|| {
                ProviderError::new(format!("Unknown resource type: {}", id.resource_type))
                    .for_resource(id.clone())
            })
    }

    pub(crate) fn handlers(&self) -> impl Iterator<Item = &dyn ResourceHandler> {
        self.handlers.values().map(|h| h.as_ref())
    }

    pub(crate) fn data_source_handlers(&self) -> impl Iterator<Item = &dyn DataSourceHandler> {
        self.data_sources.values().map(|h| h.as_ref())
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    pub async fn read_resource(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> ProviderResult<State> {
        let handler = self.handler(id)?;
        let Some(identifier) = identifier.filter(|i| !i.is_empty()) else {
            return Ok(State::not_found(id.clone()));
        };

        log::debug!("reading {} ({})", id, identifier);
        let state = handler
            .read(self.api.as_ref(), id, identifier)
            .await
            .map_err(|e| attach(e, id))?;
        if !state.exists {
            log::info!("{} ({}) no longer exists", id, identifier);
        }
        Ok(state)
    }

    pub async fn create_resource(&self, resource: &Resource) -> ProviderResult<State> {
        let handler = self.handler(&resource.id)?;

        let mut resource = resource.clone();
        handler.schema().apply_defaults(&mut resource.attributes);

        log::info!("creating {}", resource.id);
        let state = handler
            .create(self.api.as_ref(), &resource)
            .await
            .map_err(|e| attach(e, &resource.id))?;

        match &state.identifier {
            Some(identifier) => log::info!("created {} ({})", resource.id, identifier),
            None => {
                return Err(ProviderError::new("created but no identifier was returned")
                    .for_resource(resource.id.clone()));
            }
        }
        Ok(state)
    }

    pub async fn update_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let handler = self.handler(id)?;

        let mut to = to.clone();
        handler.schema().apply_defaults(&mut to.attributes);

        log::info!("updating {} ({})", id, identifier);
        let state = handler
            .update(self.api.as_ref(), id, identifier, from, &to)
            .await
            .map_err(|e| attach(e, id))?;

        if state.identifier.is_none() {
            return Ok(state.with_identifier(identifier));
        }
        Ok(state)
    }

    pub async fn delete_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let handler = self.handler(id)?;

        log::info!("deleting {} ({})", id, identifier);
        handler
            .delete(self.api.as_ref(), id, identifier)
            .await
            .map_err(|e| attach(e, id))
    }

    pub async fn read_data(&self, config: &Resource) -> ProviderResult<State> {
        let handler = self
            .data_sources
            .get(config.id.resource_type.as_str())
            .ok_or_else(|| {
                ProviderError::new(format!("Unknown data source: {}", config.id.resource_type))
                    .for_resource(config.id.clone())
            })?;

        handler
            .read(self.api.as_ref(), config)
            .await
            .map_err(|e| attach(e, &config.id))
    }
}

fn attach(error: ProviderError, id: &ResourceId) -> ProviderError {
    if error.resource_id.is_some() {
        error
    } else {
        error.for_resource(id.clone())
    }
}
