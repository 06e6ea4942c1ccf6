//! Terraform values and their conversion to the core value model
//!
//! Terraform sends resource objects whose members may be null or unknown at
//! any depth. `TfValue` wraps every node in `tf_provider::Value`, which
//! carries the null and unknown markers, so a whole resource object is a
//! single `TfValue`. Conversion to core values is guided by the attribute
//! type, so numbers land as Int or Float and objects carry every declared
//! field.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use nifcloud_core::resource::Value as CoreValue;
use nifcloud_core::schema::AttributeType;
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tf_provider::Value;

pub type TfValue = Value<Node>;
pub type Object = BTreeMap<String, TfValue>;

/// A known Terraform value
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<TfValue>),
    Object(Object),
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Node::String(s) => serializer.serialize_str(s),
            Node::Int(i) => serializer.serialize_i64(*i),
            Node::Float(f) => serializer.serialize_f64(*f),
            Node::Bool(b) => serializer.serialize_bool(*b),
            Node::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Node::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (name, value) in fields {
                    map.serialize_entry(name, value)?;
                }
                map.end()
            }
        }
    }
}

struct NodeVisitor;

impl<'de> Visitor<'de> for NodeVisitor {
    type Value = Node;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a Terraform value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Node, E> {
        Ok(Node::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Node, E> {
        Ok(Node::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Node, E> {
        Ok(match i64::try_from(v) {
            Ok(i) => Node::Int(i),
            Err(_) => Node::Float(v as f64),
        })
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Node, E> {
        Ok(Node::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Node, E> {
        Ok(Node::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Node, E> {
        Ok(Node::String(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Node, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element::<TfValue>()? {
            items.push(item);
        }
        Ok(Node::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Node, A::Error> {
        let mut fields = Object::new();
        while let Some((name, value)) = map.next_entry::<String, TfValue>()? {
            fields.insert(name, value);
        }
        Ok(Node::Object(fields))
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Node, D::Error> {
        deserializer.deserialize_any(NodeVisitor)
    }
}

/// Whether the value holds no unknown anywhere
pub fn is_known(value: &TfValue) -> bool {
    match value {
        Value::Unknown => false,
        Value::Null => true,
        Value::Value(Node::List(items)) => items.iter().all(is_known),
        Value::Value(Node::Object(fields)) => fields.values().all(is_known),
        Value::Value(_) => true,
    }
}

pub fn is_null(value: &TfValue) -> bool {
    matches!(value, Value::Null)
}

/// Members of an object value; null and unknown objects have none
pub fn fields(value: &TfValue) -> Object {
    match value {
        Value::Value(Node::Object(fields)) => fields.clone(),
        _ => Object::new(),
    }
}

/// Core form of a Terraform value
///
/// Null yields `None`, and so does a value that is not wholly known. Null
/// members of objects are left out.
pub fn to_core(ty: &AttributeType, value: &TfValue) -> Option<CoreValue> {
    let Value::Value(node) = value else {
        return None;
    };
    match (ty.base(), node) {
        (AttributeType::Int, Node::Float(f)) if f.fract() == 0.0 => Some(CoreValue::Int(*f as i64)),
        (AttributeType::Float, Node::Int(i)) => Some(CoreValue::Float(*i as f64)),
        (_, Node::String(s)) => Some(CoreValue::String(s.clone())),
        (_, Node::Int(i)) => Some(CoreValue::Int(*i)),
        (_, Node::Float(f)) => Some(CoreValue::Float(*f)),
        (_, Node::Bool(b)) => Some(CoreValue::Bool(*b)),
        (AttributeType::List(inner) | AttributeType::Set(inner), Node::List(items)) => items
            .iter()
            .map(|item| to_core(inner, item))
            .collect::<Option<Vec<_>>>()
            .map(CoreValue::List),
        (AttributeType::Map(inner), Node::Object(entries)) => entries
            .iter()
            .map(|(k, v)| to_core(inner, v).map(|v| (k.clone(), v)))
            .collect::<Option<HashMap<_, _>>>()
            .map(CoreValue::Map),
        (AttributeType::Object(schema), Node::Object(members)) => {
            let mut map = HashMap::new();
            for (name, member) in members {
                if is_null(member) {
                    continue;
                }
                let field = schema.iter().find(|f| &f.name == name)?;
                map.insert(name.clone(), to_core(&field.attr_type, member)?);
            }
            Some(CoreValue::Map(map))
        }
        _ => None,
    }
}

/// Terraform form of a core value
///
/// Scalars are coerced to the declared type where the API answered in
/// another representation, and objects gain a null for every declared field
/// the value lacks.
pub fn from_core(ty: &AttributeType, value: &CoreValue) -> TfValue {
    let node = match (ty.base(), value) {
        (AttributeType::String | AttributeType::Enum(_), CoreValue::Int(i)) => {
            Node::String(i.to_string())
        }
        (AttributeType::String | AttributeType::Enum(_), CoreValue::Bool(b)) => {
            Node::String(b.to_string())
        }
        (AttributeType::Int, CoreValue::String(s)) => match s.trim().parse() {
            Ok(i) => Node::Int(i),
            Err(_) => Node::String(s.clone()),
        },
        (AttributeType::Float, CoreValue::String(s)) => match s.trim().parse() {
            Ok(f) => Node::Float(f),
            Err(_) => Node::String(s.clone()),
        },
        (AttributeType::Bool, CoreValue::String(s)) => match s.as_str() {
            "true" | "True" | "TRUE" => Node::Bool(true),
            "false" | "False" | "FALSE" => Node::Bool(false),
            _ => Node::String(s.clone()),
        },
        (AttributeType::List(inner) | AttributeType::Set(inner), CoreValue::List(items)) => {
            Node::List(items.iter().map(|item| from_core(inner, item)).collect())
        }
        (AttributeType::Map(inner), CoreValue::Map(entries)) => Node::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), from_core(inner, v)))
                .collect(),
        ),
        (AttributeType::Object(schema), CoreValue::Map(members)) => Node::Object(
            schema
                .iter()
                .map(|field| {
                    let member = members
                        .get(&field.name)
                        .map(|v| from_core(&field.attr_type, v))
                        .unwrap_or(Value::Null);
                    (field.name.clone(), member)
                })
                .collect(),
        ),
        (_, other) => untyped(other),
    };
    Value::Value(node)
}

fn untyped(value: &CoreValue) -> Node {
    match value {
        CoreValue::String(s) => Node::String(s.clone()),
        CoreValue::Int(i) => Node::Int(*i),
        CoreValue::Float(f) => Node::Float(*f),
        CoreValue::Bool(b) => Node::Bool(*b),
        CoreValue::List(items) => {
            Node::List(items.iter().map(|i| Value::Value(untyped(i))).collect())
        }
        CoreValue::Map(entries) => Node::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), Value::Value(untyped(v))))
                .collect(),
        ),
    }
}

/// Whether two values are equal, ignoring order for sets
pub fn same(ty: &AttributeType, a: &TfValue, b: &TfValue) -> bool {
    match (ty.base(), a, b) {
        (AttributeType::Set(_), Value::Value(Node::List(x)), Value::Value(Node::List(y))) => {
            x.len() == y.len() && x.iter().all(|item| y.contains(item))
        }
        _ => a == b,
    }
}
