use std::collections::BTreeMap;

use tracing::debug;

use crate::graph::device::DeviceName;
use crate::graph::view::{GraphView, OutputPort};
use crate::registry::{is_swap, OpRegistry};

use super::is_swappable_output;

/// Minimum wave gap between producer and consumer before a tensor is
/// considered for offloading.
pub const MIN_FANOUT_DISTANCE: i32 = 2;

/// A consumer input slot scheduled for rewiring through a swap path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedUse {
    pub node: usize,
    pub port: usize,
}

/// Distant same-device consumers of one producer, grouped by output port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerPlan {
    pub producer: usize,
    pub ports: BTreeMap<usize, Vec<PlannedUse>>,
}

/// Selects the swap triples for every accelerator-resident producer.
///
/// `priority` is the wave assignment from the partitioner; producers are
/// visited in node-index order and ports in ascending order, so the plan
/// (and the rewrite that follows) is deterministic.
pub fn plan_swaps(
    view: &GraphView<'_>,
    registry: &OpRegistry,
    priority: &[i32],
) -> Vec<ProducerPlan> {
    let mut plans = Vec::new();

    for producer in 0..view.num_nodes() {
        let node = view.node(producer);
        if is_swap(node) {
            continue;
        }
        let Some(device) = DeviceName::parse(&node.device) else {
            continue;
        };
        if !device.is_gpu() {
            continue;
        }
        if priority[producer] == 0 {
            debug!(node = %node.name, "skipping unscheduled producer");
            continue;
        }

        let mut ports: BTreeMap<usize, Vec<PlannedUse>> = BTreeMap::new();
        for edge in view.fanout_edges(producer) {
            let consumer = view.node(edge.dst.node);
            // Cross-device edges already go through the framework's own
            // transfer machinery.
            if consumer.device != node.device {
                continue;
            }
            if priority[edge.dst.node] == 0 {
                debug!(node = %consumer.name, "skipping unscheduled consumer");
                continue;
            }
            let distance = priority[edge.dst.node] - priority[producer];
            if distance > MIN_FANOUT_DISTANCE {
                ports.entry(edge.src.port).or_default().push(PlannedUse {
                    node: edge.dst.node,
                    port: edge.dst.port,
                });
            }
        }

        ports.retain(|&port, _| {
            is_swappable_output(view, registry, OutputPort {
                node: producer,
                port,
            })
        });

        if !ports.is_empty() {
            plans.push(ProducerPlan { producer, ports });
        }
    }

    plans
}
