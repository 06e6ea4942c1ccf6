//! Terraform data sources over the core provider

use std::fmt;

use async_trait::async_trait;
use nifcloud_core::resource::Resource as CoreResource;
use nifcloud_core::schema::ResourceSchema;
use tf_provider::{AttributePath, DataSource, Diagnostics, Schema, Value, ValueEmpty};

use crate::provider::{ProviderSlot, report};
use crate::schema::{ID, to_tf_schema};
use crate::value::{Node, Object, TfValue, fields, from_core, is_known, is_null, to_core};

/// One data source handler served to Terraform
pub struct DataSourceBridge {
    name: &'static str,
    schema: ResourceSchema,
    slot: ProviderSlot,
}

impl fmt::Debug for DataSourceBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSourceBridge")
            .field("name", &self.name)
            .finish()
    }
}

impl DataSourceBridge {
    pub fn new(name: &'static str, schema: ResourceSchema, slot: ProviderSlot) -> Self {
        Self { name, schema, slot }
    }

    fn config(&self, attrs: &Object) -> CoreResource {
        let mut config = CoreResource::new(self.name, self.name);
        for (name, attr) in &self.schema.attributes {
            if let Some(value) = attrs.get(name).and_then(|v| to_core(&attr.attr_type, v)) {
                config.attributes.insert(name.clone(), value);
            }
        }
        config
    }
}

#[async_trait]
impl DataSource for DataSourceBridge {
    type State<'a> = TfValue;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(to_tf_schema(&self.schema))
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::State<'a>) -> Option<()> {
        let config = fields(&config);
        for (name, attr) in &self.schema.attributes {
            let value = config.get(name).unwrap_or(&Value::Null);
            if let Some(core) = to_core(&attr.attr_type, value) {
                if let Err(e) = attr.attr_type.validate(&core) {
                    diags.error(
                        "Invalid attribute value",
                        e.to_string(),
                        AttributePath::new(name.clone()),
                    );
                }
            }
        }
        if diags.errors.is_empty() {
            Some(())
        } else {
            None
        }
    }

    async fn read<'a>(
        &self,
        diags: &mut Diagnostics,
        config: Self::State<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<Self::State<'a>> {
        let provider = self.slot.get(diags)?;
        let given = fields(&config);

        let state = match provider.read_data_source(&self.config(&given)).await {
            Ok(state) => state,
            Err(e) => {
                report(diags, &format!("Failed to read data.nifcloud_{}", self.name), &e);
                return None;
            }
        };

        let mut result = Object::new();
        for (name, attr) in &self.schema.attributes {
            let value = match given.get(name) {
                Some(value) if is_known(value) && !is_null(value) => value.clone(),
                _ => state
                    .attributes
                    .get(name)
                    .map(|v| from_core(&attr.attr_type, v))
                    .unwrap_or(Value::Null),
            };
            result.insert(name.clone(), value);
        }
        let id = state
            .identifier
            .map(|id| Value::Value(Node::String(id)))
            .unwrap_or(Value::Null);
        result.insert(ID.to_string(), id);
        Some(Value::Value(Node::Object(result)))
    }
}
