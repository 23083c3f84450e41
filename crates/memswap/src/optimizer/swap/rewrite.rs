use std::collections::HashSet;

use crate::graph::{AttrValue, GraphDef, NodeDef, TYPE_ATTR};
use crate::optimizer::SwapError;
use crate::registry::{DataType, OpRegistry, SWAP_IN_OP, SWAP_OUT_OP};

use super::plan::{PlannedUse, ProducerPlan};

/// Counters reported back by [`apply_swap_plan`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RewriteOutcome {
    pub swap_out_nodes: usize,
    pub swap_in_nodes: usize,
    pub rewired_inputs: usize,
}

/// One swap-in node to create, with the consumer slots it feeds.
#[derive(Debug)]
struct SwapInSpec {
    name: String,
    priority: i32,
    /// Name of the previous consumer; serialises the swap-in chain.
    control: Option<String>,
    targets: Vec<PlannedUse>,
}

/// Fully-resolved mutation for one planned output port.
#[derive(Debug)]
struct PortRewrite {
    producer: usize,
    swap_out_name: String,
    source_ref: String,
    dtype: DataType,
    device: String,
    priority: i32,
    colocation: String,
    swap_ins: Vec<SwapInSpec>,
}

/// Inserts swap-out/swap-in nodes for every planned producer port and
/// rewires the distant consumers.
///
/// The whole plan is resolved (names claimed, types checked, chain order
/// validated) before the first mutation, so a fatal error leaves the graph
/// untouched.
pub fn apply_swap_plan(
    graph: &mut GraphDef,
    registry: &OpRegistry,
    plans: &[ProducerPlan],
) -> Result<RewriteOutcome, SwapError> {
    let mut taken_names: HashSet<String> = graph.node.iter().map(|n| n.name.clone()).collect();
    let mut script = Vec::new();

    for plan in plans {
        let producer = &graph.node[plan.producer];
        let signature =
            registry
                .lookup(&producer.op)
                .ok_or_else(|| SwapError::UnknownOp {
                    node: producer.name.clone(),
                    op: producer.op.clone(),
                })?;

        for (&port, uses) in &plan.ports {
            let dtype = registry
                .output_type(producer, signature, port)
                .map_err(|source| SwapError::TypeResolution {
                    node: producer.name.clone(),
                    port,
                    source,
                })?;
            if dtype.is_ref() {
                return Err(SwapError::RefTypedPort {
                    node: producer.name.clone(),
                    port,
                    dtype,
                });
            }

            let tensor = format!("{}_{}", producer.name, port);
            let swap_out_name = format!("swap_out_{tensor}");
            claim_name(&mut taken_names, &swap_out_name)?;

            // Chain order follows consumer priority, not planner edge order.
            let mut uses = uses.clone();
            uses.sort_by_key(|u| graph.node[u.node].priority);

            let mut swap_ins: Vec<SwapInSpec> = Vec::new();
            let mut prev: Option<(String, i32)> = None;
            for u in &uses {
                let consumer = &graph.node[u.node];
                let cur_priority = consumer.priority;
                match &prev {
                    // The previous consumer is close enough that its swap-in
                    // still holds the tensor on device.
                    Some((_, prev_priority)) if prev_priority + 1 >= cur_priority => {
                        if *prev_priority != cur_priority && prev_priority + 1 != cur_priority {
                            return Err(SwapError::PriorityOrder {
                                producer: graph.node[plan.producer].name.clone(),
                                port,
                                prev: *prev_priority,
                                cur: cur_priority,
                            });
                        }
                        swap_ins
                            .last_mut()
                            .expect("a previous consumer implies an open swap-in chain")
                            .targets
                            .push(*u);
                    }
                    _ => {
                        let name = format!("swap_in_{tensor}_{}_{}", consumer.name, u.port);
                        claim_name(&mut taken_names, &name)?;
                        swap_ins.push(SwapInSpec {
                            name,
                            // One wave early, so the transfer overlaps.
                            priority: (cur_priority - 1).max(0),
                            control: prev.as_ref().map(|(name, _)| name.clone()),
                            targets: vec![*u],
                        });
                    }
                }
                prev = Some((consumer.name.clone(), cur_priority));
            }

            let producer = &graph.node[plan.producer];
            script.push(PortRewrite {
                producer: plan.producer,
                swap_out_name,
                source_ref: format!("{}:{}", producer.name, port),
                dtype,
                device: producer.device.clone(),
                priority: producer.priority,
                colocation: format!("loc@{tensor}"),
                swap_ins,
            });
        }
    }

    let mut outcome = RewriteOutcome::default();
    for rewrite in &script {
        graph.node[rewrite.producer].add_colocation_tag(rewrite.colocation.as_str());

        let mut swap_out = NodeDef::new(rewrite.swap_out_name.as_str(), SWAP_OUT_OP)
            .with_device(rewrite.device.as_str())
            .with_input(rewrite.source_ref.as_str())
            .with_attr(TYPE_ATTR, AttrValue::Type(rewrite.dtype));
        swap_out.priority = rewrite.priority;
        swap_out.add_colocation_tag(rewrite.colocation.as_str());
        graph.add_node(swap_out);
        outcome.swap_out_nodes += 1;

        for spec in &rewrite.swap_ins {
            let mut swap_in = NodeDef::new(spec.name.as_str(), SWAP_IN_OP)
                .with_device(rewrite.device.as_str())
                .with_input(rewrite.swap_out_name.as_str())
                .with_attr(TYPE_ATTR, AttrValue::Type(rewrite.dtype));
            swap_in.priority = spec.priority;
            swap_in.add_colocation_tag(rewrite.colocation.as_str());
            if let Some(control) = &spec.control {
                swap_in.add_input(format!("^{control}"));
            }
            graph.add_node(swap_in);
            outcome.swap_in_nodes += 1;

            for target in &spec.targets {
                graph.node[target.node].set_data_input(target.port, spec.name.as_str())?;
                outcome.rewired_inputs += 1;
            }
        }
    }

    Ok(outcome)
}

fn claim_name(taken: &mut HashSet<String>, name: &str) -> Result<(), SwapError> {
    if !taken.insert(name.to_string()) {
        return Err(SwapError::NameCollision {
            name: name.to_string(),
        });
    }
    Ok(())
}
