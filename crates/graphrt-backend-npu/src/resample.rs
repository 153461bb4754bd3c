//! GridSample capability query and lowering.
//!
//! The native `resample` primitive samples with absolute pixel coordinates,
//! while the portable operator defines normalized coordinates over the input
//! plane. Lowering therefore synthesizes the conversion (a `[W, H]` scale
//! constant, an elementwise multiply, and an integer cast) in front of the
//! native op, which is only possible when the spatial extents are statically
//! known. The capability query enforces exactly that precondition.

use graphrt::capability::{BackendContext, CapabilityDecision};
use graphrt::lowering::LoweringError;
use graphrt::node::PortableNode;
use graphrt::program::{ConstantValue, GraphProgram, OperandSource};
use graphrt::spec::DType;

const REQUIRED_RANK: usize = 4;

pub(crate) fn supported(node: &PortableNode, context: &BackendContext) -> CapabilityDecision {
    if !context.graph_programs_enabled() {
        return CapabilityDecision::rejected("graph programs are disabled for this build");
    }

    let Some(input) = node.input(0) else {
        return CapabilityDecision::rejected("GridSample requires a data input");
    };
    if node.input(1).is_none() {
        return CapabilityDecision::rejected("GridSample requires a coordinates input");
    }

    let rank = input.spec.shape.rank();
    if rank != REQUIRED_RANK {
        return CapabilityDecision::rejected(format!(
            "GridSample only supports {REQUIRED_RANK}D input, not {rank}D"
        ));
    }
    if input.spec.shape.static_dims().is_none() {
        return CapabilityDecision::rejected(
            "GridSample requires statically known spatial dimensions",
        );
    }

    let mode = node.attr_str("mode", "linear");
    if mode == "cubic" {
        return CapabilityDecision::rejected("GridSample does not support cubic interpolation");
    }

    CapabilityDecision::supported()
}

pub(crate) fn lower(
    node: &PortableNode,
    program: &mut GraphProgram,
    _context: &BackendContext,
) -> Result<(), LoweringError> {
    let invariant = |detail: &str| LoweringError::InvariantViolated {
        op: node.op_type().to_string(),
        detail: detail.to_string(),
    };

    let input = node.input(0).ok_or_else(|| invariant("data input missing"))?;
    let coords = node
        .input(1)
        .ok_or_else(|| invariant("coordinates input missing"))?;
    let output = node
        .output(0)
        .ok_or_else(|| invariant("output binding missing"))?;

    // The capability query already required fully-known dims; reaching this
    // point without them is a consistency bug, not an unsupported node.
    let dims = input
        .spec
        .shape
        .static_dims()
        .ok_or_else(|| invariant("spatial dimensions were not statically known"))?;
    let (height, width) = (dims[2], dims[3]);

    let mode = node.attr_str("mode", "linear");
    let mut padding_mode = node.attr_str("padding_mode", "zeros");
    if padding_mode == "zeros" {
        padding_mode = "constant".to_string();
    }
    let align_corners = node.attr_i64("align_corners", 0);

    // Normalized -> absolute pixel coordinates: scale by (W, H) in the
    // native axis order, then cast to the integer coordinate type.
    let scale = program.add_constant(
        DType::F32,
        &format!("{}_coord_scale", node.name()),
        ConstantValue::F32s(vec![width as f32, height as f32]),
    )?;

    let mul = program.create_operation(node, "mul");
    program.bind_input(mul, "x", OperandSource::GraphTensor(coords.name.clone()))?;
    program.bind_input(mul, "y", scale)?;
    let pixel_coords = program.unique_name(node, "coords_px");
    program.bind_output(mul, &pixel_coords, coords.spec.dtype, coords.spec.shape.clone())?;

    let cast = program.create_operation(node, "cast");
    program.bind_input(cast, "x", OperandSource::Intermediate(pixel_coords))?;
    let int_coords = program.unique_name(node, "coords_ix");
    program.bind_output(cast, &int_coords, DType::Si32, coords.spec.shape.clone())?;

    let resample = program.create_operation(node, "resample");
    program.bind_input(resample, "x", OperandSource::GraphTensor(input.name.clone()))?;
    program.bind_input(resample, "coordinates", OperandSource::Intermediate(int_coords))?;
    let sampling_mode =
        program.add_constant(DType::Str, "sampling_mode", ConstantValue::Str(mode))?;
    program.bind_input(resample, "sampling_mode", sampling_mode)?;
    let padding = program.add_constant(
        DType::Str,
        "padding_mode",
        ConstantValue::Str(padding_mode),
    )?;
    program.bind_input(resample, "padding_mode", padding)?;
    let padding_value =
        program.add_constant(DType::F32, "padding_value", ConstantValue::F32s(vec![0.0]))?;
    program.bind_input(resample, "padding_value", padding_value)?;
    let align = program.add_constant(
        DType::I1,
        "align_corners",
        ConstantValue::Bool(align_corners != 0),
    )?;
    program.bind_input(resample, "align_corners", align)?;
    program.bind_output(
        resample,
        &output.name,
        output.spec.dtype,
        output.spec.shape.clone(),
    )?;

    Ok(())
}
