//! Device names and the device catalog.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Properties the optimizer needs from the placement layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProperties {
    pub device_type: String,
    /// Total device memory in bytes; 0 when unknown.
    pub memory_size: u64,
}

impl DeviceProperties {
    pub fn gpu(memory_size: u64) -> Self {
        DeviceProperties {
            device_type: "GPU".to_string(),
            memory_size,
        }
    }

    pub fn cpu() -> Self {
        DeviceProperties {
            device_type: "CPU".to_string(),
            memory_size: 0,
        }
    }

    pub fn is_gpu(&self) -> bool {
        self.device_type.eq_ignore_ascii_case("GPU")
    }
}

/// Catalog mapping fully-qualified device names to their properties.
///
/// A `BTreeMap` keeps device iteration order stable, which makes partition
/// ids reproducible across runs.
pub type DeviceCatalog = BTreeMap<String, DeviceProperties>;

/// The `{type, id}` tail of a fully-qualified device string.
///
/// Accepts `"/job:w/replica:0/task:0/device:GPU:0"`, `"/device:GPU:0"`,
/// `"/GPU:0"` and `"GPU:0"`; the id defaults to 0 when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceName {
    pub device_type: String,
    pub id: u32,
}

impl DeviceName {
    pub fn parse(raw: &str) -> Option<Self> {
        let tail = raw.rsplit('/').next()?;
        let tail = tail.strip_prefix("device:").unwrap_or(tail);
        if tail.is_empty() {
            return None;
        }
        match tail.split_once(':') {
            Some((device_type, id)) => {
                if device_type.is_empty() {
                    return None;
                }
                let id = id.parse().ok()?;
                Some(DeviceName {
                    device_type: device_type.to_string(),
                    id,
                })
            }
            None => Some(DeviceName {
                device_type: tail.to_string(),
                id: 0,
            }),
        }
    }

    pub fn is_gpu(&self) -> bool {
        self.device_type.eq_ignore_ascii_case("GPU")
    }
}
