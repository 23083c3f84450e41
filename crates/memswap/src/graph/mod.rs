//! Dataflow graph data model.
//!
//! A [`GraphDef`] is a flat list of [`NodeDef`]s. Edges are not stored
//! separately: each node carries an ordered list of input references, either
//! data (`"producer:port"`, with `"producer"` shorthand for port 0) or
//! control (`"^producer"`). Control inputs do not consume data port ids.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::DataType;

pub mod device;
pub mod view;

/// Attribute key holding colocation tags (`"loc@<tensor>"`).
pub const COLOCATION_ATTR: &str = "_class";
/// Attribute key holding the element type carried by transfer nodes.
pub const TYPE_ATTR: &str = "T";

/// Typed attribute value attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    I64(i64),
    F64(f64),
    Bool(bool),
    String(String),
    Type(DataType),
    StringList(Vec<String>),
}

/// A single unit of computation in the graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
    pub name: String,
    pub op: String,
    pub device: String,
    pub input: Vec<String>,
    #[serde(default)]
    pub attr: BTreeMap<String, AttrValue>,
    /// Partition id assigned by the wave partitioner; 0 means unassigned.
    #[serde(default)]
    pub priority: i32,
}

impl NodeDef {
    pub fn new(name: impl Into<String>, op: impl Into<String>) -> Self {
        NodeDef {
            name: name.into(),
            op: op.into(),
            ..NodeDef::default()
        }
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input.push(input.into());
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: AttrValue) -> Self {
        self.attr.insert(key.into(), value);
        self
    }

    pub fn add_input(&mut self, input: impl Into<String>) {
        self.input.push(input.into());
    }

    /// Resolves an attribute expected to hold a [`DataType`].
    pub fn type_attr(&self, key: &str) -> Option<DataType> {
        match self.attr.get(key) {
            Some(AttrValue::Type(dtype)) => Some(*dtype),
            _ => None,
        }
    }

    /// Appends a colocation tag to the node's `_class` list.
    pub fn add_colocation_tag(&mut self, tag: impl Into<String>) {
        let entry = self
            .attr
            .entry(COLOCATION_ATTR.to_string())
            .or_insert_with(|| AttrValue::StringList(Vec::new()));
        if let AttrValue::StringList(tags) = entry {
            tags.push(tag.into());
        } else {
            *entry = AttrValue::StringList(vec![tag.into()]);
        }
    }

    pub fn colocation_tags(&self) -> &[String] {
        match self.attr.get(COLOCATION_ATTR) {
            Some(AttrValue::StringList(tags)) => tags,
            _ => &[],
        }
    }

    /// Replaces the data input occupying the given port with `value`.
    ///
    /// Ports index data inputs only; control inputs are skipped over.
    pub fn set_data_input(
        &mut self,
        port: usize,
        value: impl Into<String>,
    ) -> Result<(), GraphError> {
        let slot = self
            .input
            .iter_mut()
            .filter(|raw| !raw.starts_with('^'))
            .nth(port);
        match slot {
            Some(slot) => {
                *slot = value.into();
                Ok(())
            }
            None => Err(GraphError::PortOutOfRange {
                node: self.name.clone(),
                port,
            }),
        }
    }
}

/// A parsed input reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputRef<'a> {
    Data { node: &'a str, port: usize },
    Control { node: &'a str },
}

impl<'a> InputRef<'a> {
    pub fn parse(raw: &'a str) -> Result<Self, MalformedInput> {
        if let Some(name) = raw.strip_prefix('^') {
            if name.is_empty() {
                return Err(MalformedInput(raw.to_string()));
            }
            return Ok(InputRef::Control { node: name });
        }
        match raw.rsplit_once(':') {
            Some((node, port)) => {
                let port = port.parse().map_err(|_| MalformedInput(raw.to_string()))?;
                if node.is_empty() {
                    return Err(MalformedInput(raw.to_string()));
                }
                Ok(InputRef::Data { node, port })
            }
            None if raw.is_empty() => Err(MalformedInput(raw.to_string())),
            None => Ok(InputRef::Data { node: raw, port: 0 }),
        }
    }

    pub fn node(&self) -> &'a str {
        match self {
            InputRef::Data { node, .. } | InputRef::Control { node } => node,
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self, InputRef::Control { .. })
    }
}

/// Raw input string that failed to parse as a data or control reference.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed input reference `{0}`")]
pub struct MalformedInput(pub String);

/// A dataflow graph owned by the optimizer for the duration of a pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDef {
    pub node: Vec<NodeDef>,
}

impl GraphDef {
    pub fn new(node: Vec<NodeDef>) -> Self {
        GraphDef { node }
    }

    pub fn add_node(&mut self, node: NodeDef) -> &mut NodeDef {
        self.node.push(node);
        self.node.last_mut().expect("node was just pushed")
    }
}

/// Errors surfaced while indexing or mutating a graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("duplicate node name `{name}`")]
    DuplicateNodeName { name: String },
    #[error("node `{node}` references unknown node `{input}`")]
    UnknownInput { node: String, input: String },
    #[error("node `{node}`: {source}")]
    MalformedInput {
        node: String,
        #[source]
        source: MalformedInput,
    },
    #[error("node `{node}` has no data input at port {port}")]
    PortOutOfRange { node: String, port: usize },
}
