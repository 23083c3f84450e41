//! Pass driver: memory-pressure gating, wave partitioning, swap rewriting.

pub mod partition;
pub mod stats;
pub mod swap;

use thiserror::Error;
use tracing::{debug, info};

use crate::graph::device::DeviceCatalog;
use crate::graph::view::GraphView;
use crate::graph::{GraphDef, GraphError};
use crate::registry::{DataType, OpRegistry, TypeError};

pub use partition::{partition, Partitioning};
pub use stats::GraphStats;

/// Optimization level controlling whether the swapping pass runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptLevel {
    /// Pass disabled entirely.
    Off,
    /// Run when the memory oracle reports a device over budget.
    Heuristic,
    /// Run unconditionally.
    Manual,
    /// Same gating as [`OptLevel::Heuristic`].
    Default,
}

#[derive(Debug, Clone)]
pub struct OptimizeConfig {
    wave_capacity: usize,
    level: OptLevel,
}

impl OptimizeConfig {
    pub fn new(wave_capacity: usize, level: OptLevel) -> Result<Self, SwapError> {
        if wave_capacity == 0 {
            return Err(SwapError::ZeroWaveCapacity);
        }
        Ok(OptimizeConfig {
            wave_capacity,
            level,
        })
    }

    pub fn wave_capacity(&self) -> usize {
        self.wave_capacity
    }

    pub fn level(&self) -> OptLevel {
        self.level
    }
}

impl Default for OptimizeConfig {
    fn default() -> Self {
        OptimizeConfig {
            wave_capacity: 32,
            level: OptLevel::Default,
        }
    }
}

/// Peak-memory estimates, queried once per pass before any mutation.
pub trait MemoryOracle {
    /// Peak bytes used on `device` over the estimated schedule.
    fn peak_memory(&self, device: &str) -> Result<u64, MemoryEstimateError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no peak-memory estimate for device `{device}`")]
pub struct MemoryEstimateError {
    pub device: String,
}

/// Errors that abort the pass. Eligibility lookups are not in this set;
/// they degrade to "not swappable".
#[derive(Debug, Error)]
pub enum SwapError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("planned node `{node}` has unregistered op `{op}`")]
    UnknownOp { node: String, op: String },
    #[error("cannot resolve output {port} of planned node `{node}`: {source}")]
    TypeResolution {
        node: String,
        port: usize,
        #[source]
        source: TypeError,
    },
    #[error("planned output {port} of `{node}` has reference type {dtype:?}")]
    RefTypedPort {
        node: String,
        port: usize,
        dtype: DataType,
    },
    #[error("generated node name `{name}` already exists in the graph")]
    NameCollision { name: String },
    #[error(
        "swap-in chain for `{producer}`:{port} saw consumer priorities {prev} then {cur}"
    )]
    PriorityOrder {
        producer: String,
        port: usize,
        prev: i32,
        cur: i32,
    },
    #[error("wave capacity must be positive")]
    ZeroWaveCapacity,
}

/// Summary returned by a successful [`MemorySwapOptimizer::optimize`] run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SwapStats {
    /// Whether the partition-and-rewrite stage ran at all.
    pub ran: bool,
    /// Whether any GPU device was estimated over budget.
    pub need_swap: bool,
    pub waves: i32,
    pub swap_out_nodes: usize,
    pub swap_in_nodes: usize,
    pub rewired_inputs: usize,
}

/// The swapping pass. Owns no graph state; a single [`optimize`] call
/// mutates the supplied graph in place and returns it to the caller.
///
/// [`optimize`]: MemorySwapOptimizer::optimize
pub struct MemorySwapOptimizer<'r> {
    registry: &'r OpRegistry,
    config: OptimizeConfig,
}

impl<'r> MemorySwapOptimizer<'r> {
    pub fn new(registry: &'r OpRegistry, config: OptimizeConfig) -> Self {
        MemorySwapOptimizer { registry, config }
    }

    pub fn optimize(
        &self,
        graph: &mut GraphDef,
        devices: &DeviceCatalog,
        oracle: &dyn MemoryOracle,
    ) -> Result<SwapStats, SwapError> {
        if self.config.level() == OptLevel::Off {
            return Ok(SwapStats::default());
        }

        let need_swap;
        let partitioning;
        let plans;
        {
            let view = GraphView::build(graph)?;

            let graph_stats = stats::compute(&view);
            info!(
                num_nodes = graph_stats.num_nodes,
                depth = graph_stats.depth,
                avg_in_degree = graph_stats.avg_in_degree,
                avg_out_degree = graph_stats.avg_out_degree,
                avg_input_rank_diff = graph_stats.avg_input_rank_diff,
                avg_output_rank_diff = graph_stats.avg_output_rank_diff,
                "graph statistics"
            );

            need_swap = self.estimate_pressure(devices, oracle);
            if !need_swap && self.config.level() != OptLevel::Manual {
                debug!("device memory within budget, skipping swap rewrite");
                return Ok(SwapStats {
                    need_swap,
                    ..SwapStats::default()
                });
            }

            partitioning = partition::partition(&view, devices, self.config.wave_capacity());
            plans = swap::plan_swaps(&view, self.registry, &partitioning.priority);
        }

        partitioning.apply(graph);
        let outcome = swap::apply_swap_plan(graph, self.registry, &plans)?;

        let swap_stats = SwapStats {
            ran: true,
            need_swap,
            waves: partitioning.num_waves(),
            swap_out_nodes: outcome.swap_out_nodes,
            swap_in_nodes: outcome.swap_in_nodes,
            rewired_inputs: outcome.rewired_inputs,
        };
        info!(
            waves = swap_stats.waves,
            swap_out_nodes = swap_stats.swap_out_nodes,
            swap_in_nodes = swap_stats.swap_in_nodes,
            rewired_inputs = swap_stats.rewired_inputs,
            "swapping pass finished"
        );

        // Rebuild the view over the mutated graph; this re-validates every
        // input reference before the graph leaves the pass.
        let view = GraphView::build(graph)?;
        for i in 0..view.num_nodes() {
            let node = view.node(i);
            debug!(
                node = %node.name,
                op = %node.op,
                device = %node.device,
                num_inputs = node.input.len(),
                priority = node.priority,
                fanins = view.fanin_nodes(i, true).len(),
                fanouts = view.fanout_nodes(i, true).len(),
                "rewritten node"
            );
        }

        Ok(swap_stats)
    }

    /// True when any GPU device with a known memory size is estimated at or
    /// over capacity. Devices the oracle cannot estimate are skipped.
    fn estimate_pressure(&self, devices: &DeviceCatalog, oracle: &dyn MemoryOracle) -> bool {
        for (name, properties) in devices {
            if !properties.is_gpu() || properties.memory_size == 0 {
                continue;
            }
            match oracle.peak_memory(name) {
                Ok(peak) if peak >= properties.memory_size => {
                    debug!(
                        device = %name,
                        peak,
                        capacity = properties.memory_size,
                        "device over memory budget"
                    );
                    return true;
                }
                Ok(_) => {}
                Err(err) => {
                    debug!(device = %name, error = %err, "failed to estimate memory usage");
                }
            }
        }
        false
    }
}
