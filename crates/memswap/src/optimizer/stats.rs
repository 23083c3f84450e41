//! Structural statistics over the forward-data-edge DAG.

use std::collections::VecDeque;

use crate::graph::view::GraphView;

/// Degree and depth summary of a graph, computed before partitioning.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GraphStats {
    /// Nodes reachable through forward data edges.
    pub num_nodes: usize,
    /// Longest data-dependency chain (max rank).
    pub depth: usize,
    pub avg_in_degree: f64,
    pub avg_out_degree: f64,
    /// Mean rank gap between a node and its producers.
    pub avg_input_rank_diff: f64,
    /// Mean rank gap between a node and its consumers.
    pub avg_output_rank_diff: f64,
}

pub fn compute(view: &GraphView<'_>) -> GraphStats {
    let n = view.num_nodes();
    let mut in_degree: Vec<usize> = (0..n).map(|i| view.data_in_degree(i)).collect();
    let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut topo_order = Vec::with_capacity(n);
    let mut rank = vec![0usize; n];
    let mut depth = 0usize;

    while let Some(node) = queue.pop_front() {
        topo_order.push(node);
        for edge in view.fanout_edges(node) {
            let fanout = edge.dst.node;
            rank[fanout] = rank[fanout].max(rank[node] + 1);
            depth = depth.max(rank[fanout]);
            in_degree[fanout] -= 1;
            if in_degree[fanout] == 0 {
                queue.push_back(fanout);
            }
        }
    }

    let mut total_inputs = 0usize;
    let mut total_outputs = 0usize;
    let mut rank_diff_inputs = 0usize;
    let mut rank_diff_outputs = 0usize;
    for &node in &topo_order {
        total_inputs += view.data_in_degree(node);
        total_outputs += view.fanout_edges(node).len();
        for edge in view.fanin_edges(node) {
            rank_diff_inputs += rank[node] - rank[edge.src.node];
        }
        for edge in view.fanout_edges(node) {
            rank_diff_outputs += rank[edge.dst.node] - rank[node];
        }
    }

    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    GraphStats {
        num_nodes: topo_order.len(),
        depth,
        avg_in_degree: ratio(total_inputs, topo_order.len()),
        avg_out_degree: ratio(total_outputs, topo_order.len()),
        avg_input_rank_diff: ratio(rank_diff_inputs, total_inputs),
        avg_output_rank_diff: ratio(rank_diff_outputs, total_outputs),
    }
}
