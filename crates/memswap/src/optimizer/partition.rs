//! Capacity-bounded per-device topological scheduler.
//!
//! Assigns each node a wave id approximating the order in which a greedy
//! scheduler would dispatch it on its device. Waves hold at most
//! `wave_capacity` nodes per device; when any device fills its quota the
//! wave closes globally, so a wave id is a cross-device time coordinate.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::graph::device::DeviceCatalog;
use crate::graph::view::GraphView;
use crate::graph::GraphDef;
use crate::registry::{is_merge, is_next_iteration};

/// Wave assignment produced by [`partition`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partitioning {
    /// Wave id per node index; 0 means the node never became ready.
    pub priority: Vec<i32>,
    /// Nodes per wave, in assignment order.
    pub waves: BTreeMap<i32, Vec<usize>>,
}

impl Partitioning {
    pub fn num_waves(&self) -> i32 {
        self.waves.keys().next_back().copied().unwrap_or(0)
    }

    /// Writes the computed wave ids into the graph's `priority` fields.
    pub fn apply(&self, graph: &mut GraphDef) {
        for (node, priority) in graph.node.iter_mut().zip(&self.priority) {
            node.priority = *priority;
        }
    }
}

pub fn partition(view: &GraphView<'_>, devices: &DeviceCatalog, wave_capacity: usize) -> Partitioning {
    // Catalog devices get stable indices first (BTreeMap order); devices that
    // appear only on nodes are appended in first-seen order.
    let mut device_index: HashMap<String, usize> = HashMap::with_capacity(devices.len());
    for name in devices.keys() {
        let next = device_index.len();
        device_index.insert(name.clone(), next);
    }
    for i in 0..view.num_nodes() {
        let device = &view.node(i).device;
        if !device_index.contains_key(device) {
            let next = device_index.len();
            device_index.insert(device.clone(), next);
        }
    }
    let num_devices = device_index.len();

    let mut ready_stacks: Vec<Vec<usize>> = vec![Vec::new(); num_devices];
    let mut wave_counts = vec![0usize; num_devices];
    let mut num_ready_inputs = vec![0usize; view.num_nodes()];
    let device_of: Vec<usize> = (0..view.num_nodes())
        .map(|i| device_index[&view.node(i).device])
        .collect();

    for i in 0..view.num_nodes() {
        if view.data_in_degree(i) == 0 {
            ready_stacks[device_of[i]].push(i);
        }
        // Loop feedback: a Merge must not wait on its NextIteration inputs,
        // otherwise the loop deadlocks the walk.
        if is_merge(view.node(i)) {
            for edge in view.fanin_edges(i) {
                if is_next_iteration(view.node(edge.src.node)) {
                    num_ready_inputs[i] += 1;
                }
            }
        }
    }

    let mut partitioning = Partitioning {
        priority: vec![0; view.num_nodes()],
        waves: BTreeMap::new(),
    };
    let mut current_wave = 1i32;
    let mut executed_all = false;
    while !executed_all {
        executed_all = true;
        for dev in 0..num_devices {
            if wave_counts[dev] == wave_capacity {
                current_wave += 1;
                wave_counts.fill(0);
            }
            if let Some(ready) = ready_stacks[dev].pop() {
                executed_all = false;
                partitioning.priority[ready] = current_wave;
                partitioning
                    .waves
                    .entry(current_wave)
                    .or_default()
                    .push(ready);
                wave_counts[dev] += 1;

                for edge in view.fanout_edges(ready) {
                    let fanout = edge.dst.node;
                    num_ready_inputs[fanout] += 1;
                    if num_ready_inputs[fanout] == view.data_in_degree(fanout) {
                        ready_stacks[device_of[fanout]].push(fanout);
                    }
                }
            }
        }
    }

    let unscheduled = partitioning.priority.iter().filter(|p| **p == 0).count();
    if unscheduled > 0 {
        debug!(unscheduled, "nodes never became ready; left unpartitioned");
    }

    partitioning
}
