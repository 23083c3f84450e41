//! Graph-rewriting optimizer that reduces peak accelerator memory pressure
//! by swapping long-lived intermediate tensors out to host memory.
//!
//! The pass partitions the graph into pipeline waves with a capacity-bounded
//! topological walk, selects producer output ports whose consumers sit far
//! enough in the future, and rewires those consumers through
//! `_CopyFromGpuToHost`/`_CopyFromHostToGpu` transfer nodes.

pub mod graph;
pub mod optimizer;
pub mod registry;

pub use graph::device::{DeviceCatalog, DeviceName, DeviceProperties};
pub use graph::view::GraphView;
pub use graph::{AttrValue, GraphDef, NodeDef};
pub use optimizer::{
    MemoryOracle, MemorySwapOptimizer, OptLevel, OptimizeConfig, SwapError, SwapStats,
};
pub use registry::{DataType, OpRegistry};
