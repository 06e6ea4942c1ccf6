//! NIFCLOUD Provider
//!
//! Resource handlers translating resource attributes into NIFCLOUD API
//! calls, behind the core `Provider` trait.
//!
//! ## Module Structure
//!
//! - `provider` - NifcloudProvider and handler dispatch
//! - `resources` - One handler per resource type, plus data sources
//! - `utils` - API call, expansion and flattening helpers

pub mod provider;
pub mod resources;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use provider::NifcloudProvider;

use nifcloud_core::provider::{BoxFuture, Provider, ProviderResult, ResourceType};
use nifcloud_core::resource::{Resource, ResourceId, State};

use resources::HandlerType;

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl Provider for NifcloudProvider {
    fn name(&self) -> &'static str {
        "nifcloud"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        let mut types: Vec<Box<dyn ResourceType>> = self
            .handlers()
            .map(|h| Box::new(HandlerType::of_resource(h)) as Box<dyn ResourceType>)
            .collect();
        types.sort_by_key(|t| t.name());
        types
    }

    fn data_source_types(&self) -> Vec<Box<dyn ResourceType>> {
        let mut types: Vec<Box<dyn ResourceType>> = self
            .data_source_handlers()
            .map(|h| Box::new(HandlerType::of_data_source(h)) as Box<dyn ResourceType>)
            .collect();
        types.sort_by_key(|t| t.name());
        types
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(|s| s.to_string());
        Box::pin(async move { self.read_resource(&id, identifier.as_deref()).await })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.create_resource(&resource).await })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move { self.update_resource(&id, &identifier, &from, &to).await })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.delete_resource(&id, &identifier).await })
    }

    fn read_data_source(&self, config: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let config = config.clone();
        Box::pin(async move { self.read_data(&config).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeApi;
    use std::sync::Arc;

    #[test]
    fn resource_types_are_sorted() {
        let provider = NifcloudProvider::new(Arc::new(FakeApi::new()));
        let names: Vec<&str> = provider.resource_types().iter().map(|t| t.name()).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
        assert!(names.contains(&"instance"));
        assert!(names.contains(&"dns_record"));
    }

    #[test]
    fn image_is_a_data_source() {
        let provider = NifcloudProvider::new(Arc::new(FakeApi::new()));
        let names: Vec<&str> = provider
            .data_source_types()
            .iter()
            .map(|t| t.name())
            .collect();
        assert_eq!(names, vec!["image"]);
    }
}
