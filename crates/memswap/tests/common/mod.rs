#![allow(dead_code)]

use std::collections::BTreeMap;

use memswap::optimizer::{MemoryEstimateError, MemoryOracle};
use memswap::{AttrValue, DataType, DeviceCatalog, DeviceProperties, NodeDef};

pub const GPU0: &str = "/device:GPU:0";
pub const GPU1: &str = "/device:GPU:1";
pub const CPU0: &str = "/device:CPU:0";

/// Node with a `T: Float` attribute and the given data inputs.
pub fn op_node(name: &str, op: &str, device: &str, inputs: &[&str]) -> NodeDef {
    let mut node = NodeDef::new(name, op)
        .with_device(device)
        .with_attr("T", AttrValue::Type(DataType::Float));
    for input in inputs {
        node.add_input(*input);
    }
    node
}

/// Float placeholder source.
pub fn source(name: &str, device: &str) -> NodeDef {
    NodeDef::new(name, "Placeholder")
        .with_device(device)
        .with_attr("dtype", AttrValue::Type(DataType::Float))
}

/// Float variable (persistent, reference-typed output).
pub fn variable(name: &str, device: &str) -> NodeDef {
    NodeDef::new(name, "Variable")
        .with_device(device)
        .with_attr("dtype", AttrValue::Type(DataType::Float))
}

pub fn identity(name: &str, device: &str, input: &str) -> NodeDef {
    op_node(name, "Identity", device, &[input])
}

/// Integer constant for the interpreter tests.
pub fn const_i64(name: &str, device: &str, value: i64) -> NodeDef {
    NodeDef::new(name, "Const")
        .with_device(device)
        .with_attr("dtype", AttrValue::Type(DataType::Int64))
        .with_attr("value", AttrValue::I64(value))
}

/// Catalog with one 16 GiB GPU and a host CPU.
pub fn gpu_catalog() -> DeviceCatalog {
    let mut devices = BTreeMap::new();
    devices.insert(GPU0.to_string(), DeviceProperties::gpu(16 << 30));
    devices.insert(CPU0.to_string(), DeviceProperties::cpu());
    devices
}

/// Oracle returning a fixed per-device peak.
pub struct FixedOracle(pub BTreeMap<String, u64>);

impl FixedOracle {
    pub fn uniform(devices: &DeviceCatalog, peak: u64) -> Self {
        FixedOracle(devices.keys().map(|name| (name.clone(), peak)).collect())
    }
}

impl MemoryOracle for FixedOracle {
    fn peak_memory(&self, device: &str) -> Result<u64, MemoryEstimateError> {
        self.0
            .get(device)
            .copied()
            .ok_or_else(|| MemoryEstimateError {
                device: device.to_string(),
            })
    }
}

/// Oracle that never produces an estimate.
pub struct NoEstimate;

impl MemoryOracle for NoEstimate {
    fn peak_memory(&self, device: &str) -> Result<u64, MemoryEstimateError> {
        Err(MemoryEstimateError {
            device: device.to_string(),
        })
    }
}
