//! Core schema to plugin schema conversion

use std::collections::HashMap;

use nifcloud_core::schema::{AttributeMode, AttributeSchema, AttributeType, ResourceSchema};
use tf_provider::schema::{
    Attribute, AttributeConstraint, AttributeType as TfType, Block, Description, Schema,
};

/// Attribute every resource and data source carries for its identifier
pub const ID: &str = "id";

/// Plugin schema of a resource or data source, with a computed `id`
pub fn to_tf_schema(schema: &ResourceSchema) -> Schema {
    let mut attributes = nested(schema.attributes.values());
    attributes.insert(
        ID.to_string(),
        Attribute {
            attr_type: TfType::String,
            description: Description::plain("NIFCLOUD identifier"),
            constraint: AttributeConstraint::Computed,
            ..Default::default()
        },
    );

    Schema {
        version: 1,
        block: Block {
            version: 1,
            attributes,
            description: Description::plain(
                schema
                    .description
                    .as_deref()
                    .unwrap_or(schema.resource_type.as_str()),
            ),
            ..Default::default()
        },
    }
}

fn nested<'a>(fields: impl Iterator<Item = &'a AttributeSchema>) -> HashMap<String, Attribute> {
    fields.map(|f| (f.name.clone(), attribute(f))).collect()
}

fn attribute(schema: &AttributeSchema) -> Attribute {
    Attribute {
        attr_type: attribute_type(&schema.attr_type),
        description: Description::plain(schema.description.as_deref().unwrap_or(&schema.name)),
        constraint: constraint(schema),
        sensitive: schema.sensitive,
        deprecated: false,
    }
}

/// Optional attributes with a default are filled during plan, which
/// Terraform only accepts for computed attributes.
fn constraint(schema: &AttributeSchema) -> AttributeConstraint {
    match schema.mode {
        AttributeMode::Required => AttributeConstraint::Required,
        AttributeMode::Optional if schema.default.is_some() => AttributeConstraint::OptionalComputed,
        AttributeMode::Optional => AttributeConstraint::Optional,
        AttributeMode::Computed => AttributeConstraint::Computed,
        AttributeMode::OptionalComputed => AttributeConstraint::OptionalComputed,
    }
}

/// Objects become nested attributes so their fields keep their own
/// constraints
fn attribute_type(ty: &AttributeType) -> TfType {
    match ty {
        AttributeType::String | AttributeType::Enum(_) => TfType::String,
        AttributeType::Int | AttributeType::Float => TfType::Number,
        AttributeType::Bool => TfType::Bool,
        AttributeType::Custom { base, .. } => attribute_type(base),
        AttributeType::List(inner) => match inner.base() {
            AttributeType::Object(fields) => TfType::AttributeList(nested(fields.iter())),
            _ => TfType::List(Box::new(attribute_type(inner))),
        },
        AttributeType::Set(inner) => match inner.base() {
            AttributeType::Object(fields) => TfType::AttributeSet(nested(fields.iter())),
            _ => TfType::Set(Box::new(attribute_type(inner))),
        },
        AttributeType::Map(inner) => match inner.base() {
            AttributeType::Object(fields) => TfType::AttributeMap(nested(fields.iter())),
            _ => TfType::Map(Box::new(attribute_type(inner))),
        },
        AttributeType::Object(fields) => TfType::AttributeSingle(nested(fields.iter())),
    }
}
