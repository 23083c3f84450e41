//! Op signatures and per-port type resolution.
//!
//! Signatures declare each port's type either as a fixed [`DataType`] or as
//! deferred to a node attribute (the usual `T`/`dtype` pattern), so the same
//! signature serves every instantiation of a polymorphic op.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::NodeDef;

/// Op kind of the device-to-host copy inserted by the swap rewriter.
pub const SWAP_OUT_OP: &str = "_CopyFromGpuToHost";
/// Op kind of the host-to-device copy inserted by the swap rewriter.
pub const SWAP_IN_OP: &str = "_CopyFromHostToGpu";

/// Scalar element types, plus their reference variants.
///
/// Reference types alias persistent storage; the backing memory cannot be
/// released, so reference-typed tensors are never swapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    Int32,
    Int64,
    Half,
    Float,
    Double,
    Resource,
    BoolRef,
    Int32Ref,
    Int64Ref,
    HalfRef,
    FloatRef,
    DoubleRef,
}

impl DataType {
    pub fn is_ref(self) -> bool {
        matches!(
            self,
            DataType::BoolRef
                | DataType::Int32Ref
                | DataType::Int64Ref
                | DataType::HalfRef
                | DataType::FloatRef
                | DataType::DoubleRef
        )
    }

    /// Strips the reference qualifier.
    pub fn base(self) -> DataType {
        match self {
            DataType::BoolRef => DataType::Bool,
            DataType::Int32Ref => DataType::Int32,
            DataType::Int64Ref => DataType::Int64,
            DataType::HalfRef => DataType::Half,
            DataType::FloatRef => DataType::Float,
            DataType::DoubleRef => DataType::Double,
            other => other,
        }
    }

    /// Adds the reference qualifier. `Resource` has no reference form and is
    /// returned unchanged.
    pub fn to_ref(self) -> DataType {
        match self.base() {
            DataType::Bool => DataType::BoolRef,
            DataType::Int32 => DataType::Int32Ref,
            DataType::Int64 => DataType::Int64Ref,
            DataType::Half => DataType::HalfRef,
            DataType::Float => DataType::FloatRef,
            DataType::Double => DataType::DoubleRef,
            other => other,
        }
    }
}

/// How a signature determines the type of one port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeSpec {
    Fixed(DataType),
    /// Resolved from the named node attribute.
    Attr(&'static str),
    /// Resolved from the named node attribute, then reference-qualified.
    RefAttr(&'static str),
}

/// Declared port types for one op kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpSignature {
    pub name: &'static str,
    pub inputs: Vec<TypeSpec>,
    pub outputs: Vec<TypeSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("op `{op}` is not registered")]
    UnknownOp { op: String },
    #[error("node `{node}` has no port {port}")]
    PortOutOfRange { node: String, port: usize },
    #[error("node `{node}` is missing type attribute `{attr}`")]
    MissingTypeAttr { node: String, attr: &'static str },
}

/// Read-only registry of op signatures, safe for concurrent lookups.
#[derive(Debug, Default, Clone)]
pub struct OpRegistry {
    ops: HashMap<&'static str, OpSignature>,
}

impl OpRegistry {
    pub fn new() -> Self {
        OpRegistry::default()
    }

    /// Registry preloaded with the op set the optimizer and its tests use.
    pub fn with_core_ops() -> Self {
        let mut registry = OpRegistry::new();
        let t = TypeSpec::Attr("T");

        registry.register(OpSignature {
            name: "Const",
            inputs: vec![],
            outputs: vec![TypeSpec::Attr("dtype")],
        });
        registry.register(OpSignature {
            name: "Placeholder",
            inputs: vec![],
            outputs: vec![TypeSpec::Attr("dtype")],
        });
        registry.register(OpSignature {
            name: "Variable",
            inputs: vec![],
            outputs: vec![TypeSpec::RefAttr("dtype")],
        });
        registry.register(OpSignature {
            name: "VariableV2",
            inputs: vec![],
            outputs: vec![TypeSpec::RefAttr("dtype")],
        });
        registry.register(OpSignature {
            name: "Assign",
            inputs: vec![TypeSpec::RefAttr("T"), t],
            outputs: vec![TypeSpec::RefAttr("T")],
        });
        registry.register(OpSignature {
            name: "Identity",
            inputs: vec![t],
            outputs: vec![t],
        });
        registry.register(OpSignature {
            name: "Reshape",
            inputs: vec![t, TypeSpec::Fixed(DataType::Int32)],
            outputs: vec![t],
        });
        for name in ["Add", "Sub", "Mul", "MatMul"] {
            registry.register(OpSignature {
                name,
                inputs: vec![t, t],
                outputs: vec![t],
            });
        }
        registry.register(OpSignature {
            name: "Merge",
            inputs: vec![t, t],
            outputs: vec![t, TypeSpec::Fixed(DataType::Int32)],
        });
        registry.register(OpSignature {
            name: "NextIteration",
            inputs: vec![t],
            outputs: vec![t],
        });
        registry.register(OpSignature {
            name: "Enter",
            inputs: vec![t],
            outputs: vec![t],
        });
        registry.register(OpSignature {
            name: "Exit",
            inputs: vec![t],
            outputs: vec![t],
        });
        registry.register(OpSignature {
            name: SWAP_OUT_OP,
            inputs: vec![t],
            outputs: vec![t],
        });
        registry.register(OpSignature {
            name: SWAP_IN_OP,
            inputs: vec![t],
            outputs: vec![t],
        });
        registry.register(OpSignature {
            name: "NoOp",
            inputs: vec![],
            outputs: vec![],
        });

        registry
    }

    pub fn register(&mut self, signature: OpSignature) {
        self.ops.insert(signature.name, signature);
    }

    pub fn lookup(&self, op: &str) -> Option<&OpSignature> {
        self.ops.get(op)
    }

    /// Resolves the type yielded at the node's output `port`.
    pub fn output_type(
        &self,
        node: &NodeDef,
        signature: &OpSignature,
        port: usize,
    ) -> Result<DataType, TypeError> {
        let spec = signature
            .outputs
            .get(port)
            .ok_or_else(|| TypeError::PortOutOfRange {
                node: node.name.clone(),
                port,
            })?;
        resolve(node, spec)
    }

    /// Resolves the type expected at the node's data input `port`.
    pub fn input_type(
        &self,
        node: &NodeDef,
        signature: &OpSignature,
        port: usize,
    ) -> Result<DataType, TypeError> {
        let spec = signature
            .inputs
            .get(port)
            .ok_or_else(|| TypeError::PortOutOfRange {
                node: node.name.clone(),
                port,
            })?;
        resolve(node, spec)
    }
}

fn resolve(node: &NodeDef, spec: &TypeSpec) -> Result<DataType, TypeError> {
    match *spec {
        TypeSpec::Fixed(dtype) => Ok(dtype),
        TypeSpec::Attr(attr) => {
            node.type_attr(attr)
                .ok_or_else(|| TypeError::MissingTypeAttr {
                    node: node.name.clone(),
                    attr,
                })
        }
        TypeSpec::RefAttr(attr) => node
            .type_attr(attr)
            .map(DataType::to_ref)
            .ok_or_else(|| TypeError::MissingTypeAttr {
                node: node.name.clone(),
                attr,
            }),
    }
}

/// True for nodes whose output tensor lives for the session (variables and
/// constants); such tensors are never swapped.
pub fn is_persistent(node: &NodeDef) -> bool {
    matches!(
        node.op.as_str(),
        "Const" | "Variable" | "VariableV2" | "VarHandleOp"
    )
}

pub fn is_merge(node: &NodeDef) -> bool {
    matches!(node.op.as_str(), "Merge" | "RefMerge")
}

pub fn is_next_iteration(node: &NodeDef) -> bool {
    matches!(node.op.as_str(), "NextIteration" | "RefNextIteration")
}

/// True for the transfer nodes inserted by the swap rewriter.
pub fn is_swap(node: &NodeDef) -> bool {
    node.op == SWAP_OUT_OP || node.op == SWAP_IN_OP
}
