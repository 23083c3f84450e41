mod common;

use std::collections::HashMap;

use common::{gpu_catalog, identity, source, variable, NoEstimate, CPU0, GPU0};
use memswap::graph::view::OutputPort;
use memswap::optimizer::{partition, swap};
use memswap::{
    AttrValue, DataType, GraphDef, GraphView, MemorySwapOptimizer, NodeDef, OpRegistry, OptLevel,
    OptimizeConfig,
};
use proptest::prelude::*;

const DEVICES: [&str; 2] = [GPU0, CPU0];

/// Random layered DAG: every input of a node comes from an earlier layer,
/// so the whole graph is reachable through forward data edges.
fn arb_layered_graph() -> impl Strategy<Value = GraphDef> {
    let node = (0usize..DEVICES.len(), prop::collection::vec(any::<u32>(), 1..3));
    let layer = prop::collection::vec(node, 1..4);
    prop::collection::vec(layer, 2..5).prop_map(|layers| {
        let mut graph = GraphDef::default();
        let mut earlier: Vec<String> = Vec::new();
        for (l, layer) in layers.into_iter().enumerate() {
            let mut this_layer = Vec::new();
            for (j, (device, picks)) in layer.into_iter().enumerate() {
                let name = format!("n{l}_{j}");
                let node = if earlier.is_empty() {
                    NodeDef::new(name.as_str(), "Placeholder")
                        .with_attr("dtype", AttrValue::Type(DataType::Float))
                } else {
                    let mut node = NodeDef::new(name.as_str(), "Add")
                        .with_attr("T", AttrValue::Type(DataType::Float));
                    for pick in picks {
                        node.add_input(earlier[pick as usize % earlier.len()].as_str());
                    }
                    node
                };
                graph.node.push(node.with_device(DEVICES[device]));
                this_layer.push(name);
            }
            earlier.extend(this_layer);
        }
        graph
    })
}

proptest! {
    /// Every reachable node is assigned, waves respect the per-device
    /// capacity, and data edges never run backwards on a device.
    #[test]
    fn partitioning_invariants_hold(graph in arb_layered_graph(), k in 1usize..4) {
        let view = GraphView::build(&graph).expect("generated graph is well-formed");
        let partitioning = partition(&view, &gpu_catalog(), k);

        for (index, &priority) in partitioning.priority.iter().enumerate() {
            prop_assert!(
                priority >= 1,
                "node {} left unassigned",
                view.node(index).name
            );
        }

        let mut per_device_wave: HashMap<(&str, i32), usize> = HashMap::new();
        for (index, &priority) in partitioning.priority.iter().enumerate() {
            *per_device_wave
                .entry((view.node(index).device.as_str(), priority))
                .or_default() += 1;
        }
        for ((device, wave), count) in &per_device_wave {
            prop_assert!(
                *count <= k,
                "device {device} holds {count} nodes in wave {wave}, capacity {k}"
            );
        }

        for index in 0..view.num_nodes() {
            for edge in view.fanout_edges(index) {
                let consumer = edge.dst.node;
                if view.node(index).device == view.node(consumer).device {
                    prop_assert!(
                        partitioning.priority[index] <= partitioning.priority[consumer],
                        "edge {} -> {} runs backwards",
                        view.node(index).name,
                        view.node(consumer).name
                    );
                }
            }
        }
    }

    /// An Identity chain is exactly as swappable as its root tensor.
    #[test]
    fn identity_chains_inherit_root_swappability(
        len in 1usize..8,
        persistent_root in any::<bool>(),
    ) {
        let registry = OpRegistry::with_core_ops();
        let mut nodes = vec![if persistent_root {
            variable("root", GPU0)
        } else {
            source("root", GPU0)
        }];
        let mut prev = "root".to_string();
        for i in 0..len {
            let name = format!("fwd{i}");
            nodes.push(identity(name.as_str(), GPU0, prev.as_str()));
            prev = name;
        }
        let graph = GraphDef::new(nodes);
        let view = GraphView::build(&graph).expect("generated graph is well-formed");

        for node in 1..=len {
            let swappable =
                swap::is_swappable_output(&view, &registry, OutputPort { node, port: 0 });
            prop_assert_eq!(swappable, !persistent_root);
        }
    }

    /// The full pass emits identical graphs across runs.
    #[test]
    fn optimize_is_deterministic(graph in arb_layered_graph()) {
        let registry = OpRegistry::with_core_ops();
        let config = OptimizeConfig::new(1, OptLevel::Manual).expect("valid config");
        let devices = gpu_catalog();

        let mut first = graph.clone();
        let mut second = graph;
        MemorySwapOptimizer::new(&registry, config.clone())
            .optimize(&mut first, &devices, &NoEstimate)
            .expect("pass succeeds");
        MemorySwapOptimizer::new(&registry, config)
            .optimize(&mut second, &devices, &NoEstimate)
            .expect("pass succeeds");

        prop_assert_eq!(first, second);
    }
}
