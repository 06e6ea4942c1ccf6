//! XML response decoding and request bodies
//!
//! NIFCLOUD answers in XML. Responses are converted into `serde_json::Value`
//! so resource code can navigate them with the helpers in `json`:
//!
//! - an element with child elements becomes an object
//! - an element whose children are all `item` or `member` becomes an array
//! - repeated sibling elements become an array
//! - text becomes a string, an empty element becomes null
//!
//! Attributes and namespaces are ignored.
//!
//! `Element` renders the small documents sent to the REST style DNS API.

use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use serde_json::{Map, Value};

use crate::error::{ClientError, ClientResult};

const LIST_ELEMENTS: &[&str] = &["item", "member"];

struct Frame {
    name: String,
    children: Vec<(String, Value)>,
    text: String,
}

impl Frame {
    fn new(name: String) -> Self {
        Self {
            name,
            children: Vec::new(),
            text: String::new(),
        }
    }

    fn into_value(self) -> (String, Value) {
        if self.children.is_empty() {
            let text = self.text.trim();
            let value = if text.is_empty() {
                Value::Null
            } else {
                Value::String(text.to_string())
            };
            return (self.name, value);
        }

        if self
            .children
            .iter()
            .all(|(name, _)| LIST_ELEMENTS.contains(&name.as_str()))
        {
            let items = self.children.into_iter().map(|(_, v)| v).collect();
            return (self.name, Value::Array(items));
        }

        let mut groups: Vec<(String, Vec<Value>)> = Vec::new();
        for (name, value) in self.children {
            match groups.iter_mut().find(|(n, _)| *n == name) {
                Some((_, values)) => values.push(value),
                None => groups.push((name, vec![value])),
            }
        }

        let object: Map<String, Value> = groups
            .into_iter()
            .map(|(name, mut values)| {
                let value = if values.len() == 1 {
                    values.remove(0)
                } else {
                    Value::Array(values)
                };
                (name, value)
            })
            .collect();
        (self.name, Value::Object(object))
    }
}

/// Convert an XML document into JSON, returning the root element's content
pub fn to_json(xml: &str) -> ClientResult<Value> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Frame> = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ClientError::Xml(format!("at position {}: {}", reader.error_position(), e)))?;

        match event {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                stack.push(Frame::new(name));
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match stack.last_mut() {
                    Some(parent) => parent.children.push((name, Value::Null)),
                    None => return Ok(Value::Null),
                }
            }
            Event::Text(t) => {
                if let Some(frame) = stack.last_mut() {
                    let text = t.unescape().map_err(|e| ClientError::Xml(e.to_string()))?;
                    frame.text.push_str(&text);
                }
            }
            Event::CData(c) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(_) => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| ClientError::Xml("unbalanced end tag".to_string()))?;
                let (name, value) = frame.into_value();
                match stack.last_mut() {
                    Some(parent) => parent.children.push((name, value)),
                    None => return Ok(value),
                }
            }
            Event::Eof => {
                return Err(ClientError::Xml(if stack.is_empty() {
                    "empty document".to_string()
                } else {
                    "unexpected end of document".to_string()
                }));
            }
            _ => {}
        }
    }
}

// ============================================================================
// Request bodies
// ============================================================================

/// Element of an XML request body
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    name: String,
    xmlns: Option<String>,
    text: Option<String>,
    children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            xmlns: None,
            text: None,
            children: Vec::new(),
        }
    }

    /// Element holding only text
    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::new(name)
        }
    }

    pub fn xmlns(mut self, namespace: impl Into<String>) -> Self {
        self.xmlns = Some(namespace.into());
        self
    }

    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Append a text child when `text` is present and non-empty
    pub fn child_text(self, name: &str, text: Option<&str>) -> Self {
        match text.filter(|t| !t.is_empty()) {
            Some(text) => self.child(Element::text(name, text)),
            None => self,
        }
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children.extend(children);
        self
    }

    /// Render as a complete document with an XML declaration
    pub fn to_document(&self) -> String {
        let mut out = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        self.write(&mut out);
        out
    }

    fn write(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        if let Some(ns) = &self.xmlns {
            out.push_str(&format!(r#" xmlns="{}""#, escape(ns.as_str())));
        }
        out.push('>');
        if let Some(text) = &self.text {
            out.push_str(&escape(text.as_str()));
        }
        for child in &self.children {
            child.write(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}
