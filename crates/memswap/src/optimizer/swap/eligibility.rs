use crate::graph::view::{GraphView, InputPort, OutputPort};
use crate::registry::{is_persistent, OpRegistry};

/// Whether the tensor at `output` can be copied out to host memory.
///
/// Persistent tensors keep their device memory regardless, reference types
/// alias persistent storage, and unknown ops or unresolvable port types are
/// conservatively kept on device. `Identity` and `Reshape` forward their
/// input tensor without new storage when colocated with it, so their output
/// is swappable only if the forwarded source is.
pub fn is_swappable_output(view: &GraphView<'_>, registry: &OpRegistry, output: OutputPort) -> bool {
    let node = view.node(output.node);
    if is_persistent(node) {
        return false;
    }

    let Some(signature) = registry.lookup(&node.op) else {
        return false;
    };
    let Ok(dtype) = registry.output_type(node, signature, output.port) else {
        return false;
    };
    if dtype.is_ref() {
        return false;
    }

    if node.op == "Identity" || node.op == "Reshape" {
        if let Some(fanin) = view.data_fanin(output.node, 0) {
            if view.node(fanin.node).device == node.device {
                return is_swappable_output(view, registry, fanin);
            }
        }
    }
    true
}

/// Whether the consumer slot at `input` accepts a swapped-in tensor.
pub fn is_swappable_input(view: &GraphView<'_>, registry: &OpRegistry, input: InputPort) -> bool {
    let node = view.node(input.node);
    let Some(signature) = registry.lookup(&node.op) else {
        return false;
    };
    match registry.input_type(node, signature, input.port) {
        Ok(dtype) => !dtype.is_ref(),
        Err(_) => false,
    }
}
