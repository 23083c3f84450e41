//! Read-only indexed view over a [`GraphDef`].
//!
//! Built once per pass; the borrow on the graph keeps the view consistent,
//! so it must be rebuilt after any structural mutation. Iteration order is
//! deterministic: fan-in edges preserve the node's input list order, fan-out
//! edges are sorted by `(consumer_node_index, input_port)`.

use std::collections::HashMap;

use smallvec::SmallVec;

use super::{GraphDef, GraphError, InputRef, NodeDef};

/// References a producer's yielded tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputPort {
    pub node: usize,
    pub port: usize,
}

/// References a consumer's data input slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputPort {
    pub node: usize,
    pub port: usize,
}

/// A directed data edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub src: OutputPort,
    pub dst: InputPort,
}

#[derive(Debug, Default, Clone)]
struct NodeIndex {
    /// Data edges into the node, in input list order (one entry per edge).
    fanin_edges: Vec<Edge>,
    /// Control predecessors, in input list order.
    control_fanins: Vec<usize>,
    /// Data edges out of the node, sorted by `(dst.node, dst.port)`.
    fanout_edges: SmallVec<[Edge; 4]>,
    /// Control successors, sorted by node index.
    control_fanouts: Vec<usize>,
}

pub struct GraphView<'g> {
    graph: &'g GraphDef,
    name_to_index: HashMap<&'g str, usize>,
    nodes: Vec<NodeIndex>,
}

impl<'g> GraphView<'g> {
    /// Indexes the graph, validating node-name uniqueness and that every
    /// input reference resolves.
    pub fn build(graph: &'g GraphDef) -> Result<Self, GraphError> {
        let mut name_to_index = HashMap::with_capacity(graph.node.len());
        for (index, node) in graph.node.iter().enumerate() {
            if name_to_index.insert(node.name.as_str(), index).is_some() {
                return Err(GraphError::DuplicateNodeName {
                    name: node.name.clone(),
                });
            }
        }

        let mut nodes = vec![NodeIndex::default(); graph.node.len()];
        for (index, node) in graph.node.iter().enumerate() {
            let mut data_port = 0usize;
            for raw in &node.input {
                let parsed =
                    InputRef::parse(raw).map_err(|source| GraphError::MalformedInput {
                        node: node.name.clone(),
                        source,
                    })?;
                let src_index = *name_to_index.get(parsed.node()).ok_or_else(|| {
                    GraphError::UnknownInput {
                        node: node.name.clone(),
                        input: raw.clone(),
                    }
                })?;
                match parsed {
                    InputRef::Data { port, .. } => {
                        let edge = Edge {
                            src: OutputPort {
                                node: src_index,
                                port,
                            },
                            dst: InputPort {
                                node: index,
                                port: data_port,
                            },
                        };
                        nodes[index].fanin_edges.push(edge);
                        nodes[src_index].fanout_edges.push(edge);
                        data_port += 1;
                    }
                    InputRef::Control { .. } => {
                        nodes[index].control_fanins.push(src_index);
                        nodes[src_index].control_fanouts.push(index);
                    }
                }
            }
        }

        for entry in &mut nodes {
            entry
                .fanout_edges
                .sort_by_key(|edge| (edge.dst.node, edge.dst.port));
            entry.control_fanouts.sort_unstable();
        }

        Ok(GraphView {
            graph,
            name_to_index,
            nodes,
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.graph.node.len()
    }

    pub fn node(&self, index: usize) -> &'g NodeDef {
        &self.graph.node[index]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    pub fn get_node(&self, name: &str) -> Option<&'g NodeDef> {
        self.index_of(name).map(|index| self.node(index))
    }

    /// Number of data inputs (one per data edge, duplicates included).
    pub fn data_in_degree(&self, index: usize) -> usize {
        self.nodes[index].fanin_edges.len()
    }

    /// Data edges into the node, in input list order.
    pub fn fanin_edges(&self, index: usize) -> &[Edge] {
        &self.nodes[index].fanin_edges
    }

    /// Data edges out of the node, sorted by `(consumer_index, input_port)`.
    pub fn fanout_edges(&self, index: usize) -> &[Edge] {
        &self.nodes[index].fanout_edges
    }

    /// The producer port feeding the node's data input `port`, if any.
    pub fn data_fanin(&self, index: usize, port: usize) -> Option<OutputPort> {
        self.nodes[index]
            .fanin_edges
            .iter()
            .find(|edge| edge.dst.port == port)
            .map(|edge| edge.src)
    }

    /// Upstream node indices, in input list order.
    pub fn fanin_nodes(&self, index: usize, include_control: bool) -> Vec<usize> {
        let entry = &self.nodes[index];
        let mut out: Vec<usize> = entry.fanin_edges.iter().map(|edge| edge.src.node).collect();
        if include_control {
            out.extend_from_slice(&entry.control_fanins);
        }
        out
    }

    /// Downstream node indices, in fan-out edge order.
    pub fn fanout_nodes(&self, index: usize, include_control: bool) -> Vec<usize> {
        let entry = &self.nodes[index];
        let mut out: Vec<usize> = entry.fanout_edges.iter().map(|edge| edge.dst.node).collect();
        if include_control {
            out.extend_from_slice(&entry.control_fanouts);
        }
        out
    }
}
