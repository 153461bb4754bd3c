//! Elementwise binary lowering: the 1:1 case with nothing to synthesize.

use graphrt::capability::{BackendContext, CapabilityDecision};
use graphrt::lowering::LoweringError;
use graphrt::node::PortableNode;
use graphrt::program::{GraphProgram, OperandSource};

fn native_op(op_type: &str) -> Option<&'static str> {
    match op_type {
        "Add" => Some("add"),
        "Mul" => Some("mul"),
        _ => None,
    }
}

pub(crate) fn supported(node: &PortableNode, context: &BackendContext) -> CapabilityDecision {
    if !context.graph_programs_enabled() {
        return CapabilityDecision::rejected("graph programs are disabled for this build");
    }
    if native_op(node.op_type()).is_none() {
        return CapabilityDecision::rejected(format!(
            "{} has no native elementwise mapping",
            node.op_type()
        ));
    }
    if node.inputs().len() != 2 || node.outputs().len() != 1 {
        return CapabilityDecision::rejected("elementwise ops take two inputs and one output");
    }

    let lhs = &node.inputs()[0].spec;
    let rhs = &node.inputs()[1].spec;
    if !lhs.dtype.is_float() {
        return CapabilityDecision::rejected(format!(
            "dtype {:?} is not supported for elementwise ops",
            lhs.dtype
        ));
    }
    // No broadcasting on the accelerator; shapes must agree exactly.
    // Dynamic dims are fine here, nothing below needs concrete extents.
    if lhs.dtype != rhs.dtype || lhs.shape != rhs.shape {
        return CapabilityDecision::rejected("elementwise operands must match dtype and shape");
    }

    CapabilityDecision::supported()
}

pub(crate) fn lower(
    node: &PortableNode,
    program: &mut GraphProgram,
    _context: &BackendContext,
) -> Result<(), LoweringError> {
    let native = native_op(node.op_type()).ok_or_else(|| LoweringError::InvariantViolated {
        op: node.op_type().to_string(),
        detail: "no native elementwise mapping".to_string(),
    })?;
    let missing = |what: &str| LoweringError::InvariantViolated {
        op: node.op_type().to_string(),
        detail: format!("{what} missing"),
    };
    let lhs = node.input(0).ok_or_else(|| missing("lhs input"))?;
    let rhs = node.input(1).ok_or_else(|| missing("rhs input"))?;
    let output = node.output(0).ok_or_else(|| missing("output binding"))?;

    let op = program.create_operation(node, native);
    program.bind_input(op, "x", OperandSource::GraphTensor(lhs.name.clone()))?;
    program.bind_input(op, "y", OperandSource::GraphTensor(rhs.name.clone()))?;
    program.bind_output(op, &output.name, output.spec.dtype, output.spec.shape.clone())?;
    Ok(())
}
