//! In-memory core provider for bridge tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use nifcloud_core::provider::{BoxFuture, Provider, ProviderError, ProviderResult, ResourceType};
use nifcloud_core::resource::{Resource, ResourceId, State, Value};

use crate::provider::ProviderSlot;

/// One recorded call
#[derive(Debug, Clone)]
pub struct Call {
    pub operation: &'static str,
    pub id: ResourceId,
    pub identifier: Option<String>,
    pub attributes: HashMap<String, Value>,
}

/// Answers every operation from `remote`, the attributes the API would
/// report. `None` means the resource is gone.
pub struct MockProvider {
    identifier: String,
    remote: Mutex<Option<HashMap<String, Value>>>,
    error: Mutex<Option<String>>,
    calls: Mutex<Vec<Call>>,
}

impl MockProvider {
    pub fn new(identifier: &str) -> Arc<Self> {
        Arc::new(Self {
            identifier: identifier.to_string(),
            remote: Mutex::new(Some(HashMap::new())),
            error: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn remote(&self, key: &str, value: impl Into<Value>) {
        if let Some(attrs) = self.remote.lock().unwrap().as_mut() {
            attrs.insert(key.to_string(), value.into());
        }
    }

    pub fn gone(&self) {
        *self.remote.lock().unwrap() = None;
    }

    pub fn fail(&self, message: &str) {
        *self.error.lock().unwrap() = Some(message.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn operations(&self) -> Vec<&'static str> {
        self.calls().iter().map(|c| c.operation).collect()
    }

    pub fn slot(self: &Arc<Self>) -> ProviderSlot {
        let slot = ProviderSlot::default();
        slot.fill(self.clone());
        slot
    }

    fn record(
        &self,
        operation: &'static str,
        id: &ResourceId,
        identifier: Option<&str>,
        attributes: &HashMap<String, Value>,
    ) -> ProviderResult<()> {
        self.calls.lock().unwrap().push(Call {
            operation,
            id: id.clone(),
            identifier: identifier.map(str::to_string),
            attributes: attributes.clone(),
        });
        match self.error.lock().unwrap().as_ref() {
            Some(message) => Err(ProviderError::new(message.clone()).for_resource(id.clone())),
            None => Ok(()),
        }
    }

    /// `sent` overlaid with what the API reports
    fn answer(&self, id: &ResourceId, sent: &HashMap<String, Value>) -> State {
        match self.remote.lock().unwrap().as_ref() {
            Some(remote) => {
                let mut attrs = sent.clone();
                attrs.extend(remote.clone());
                State::existing(id.clone(), attrs).with_identifier(self.identifier.clone())
            }
            None => State::not_found(id.clone()),
        }
    }
}

impl Provider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        vec![]
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let result = self
            .record("read", id, identifier, &HashMap::new())
            .map(|()| self.answer(id, &HashMap::new()));
        Box::pin(async move { result })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let result = self
            .record("create", &resource.id, None, &resource.attributes)
            .map(|()| self.answer(&resource.id, &resource.attributes));
        Box::pin(async move { result })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        _from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let result = self
            .record("update", id, Some(identifier), &to.attributes)
            .map(|()| self.answer(id, &to.attributes));
        Box::pin(async move { result })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let result = self.record("delete", id, Some(identifier), &HashMap::new());
        Box::pin(async move { result })
    }

    fn read_data_source(&self, config: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let result = self
            .record("read_data_source", &config.id, None, &config.attributes)
            .map(|()| self.answer(&config.id, &HashMap::new()));
        Box::pin(async move { result })
    }
}
