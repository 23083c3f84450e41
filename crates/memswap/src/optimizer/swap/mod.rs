//! Swap planning and graph rewriting.
//!
//! The planner selects `(producer, output_port, consumers)` triples whose
//! pipeline distance makes host offloading profitable; the rewriter inserts
//! the transfer nodes and rewires the consumers.

mod eligibility;
mod plan;
mod rewrite;

pub use eligibility::{is_swappable_input, is_swappable_output};
pub use plan::{plan_swaps, PlannedUse, ProducerPlan, MIN_FANOUT_DISTANCE};
pub use rewrite::{apply_swap_plan, RewriteOutcome};
