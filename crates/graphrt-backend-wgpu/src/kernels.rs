//! Kernel registrations and shader dispatch.
//!
//! Registers the unary elementwise kernels this backend serves with the
//! kernel table, keyed by operator version range. Dispatch state arrives
//! type-erased; each kernel downcasts to [`WgpuKernelState`].

use std::borrow::Cow;
use std::sync::Arc;

use graphrt::capability::{BackendContext, CapabilityDecision};
use graphrt::kernels::{
    Kernel, KernelContext, KernelError, KernelRegistration, KernelTable, RegistrationError,
    VersionRange,
};
use graphrt::node::PortableNode;
use graphrt::spec::DType;

use crate::allocator::GpuBuffer;
use crate::device::WgpuContext;
use crate::BACKEND_NAME;

/// Element types this backend's kernels accept.
pub const SUPPORTED_DATA_TYPES: &[DType] = &[DType::F32, DType::F16, DType::Si32, DType::Ui32];

/// Element types accepted where a kernel is constrained to floats.
pub const SUPPORTED_FLOAT_TYPES: &[DType] = &[DType::F32, DType::F16];

const WORKGROUP_SIZE: u64 = 64;

const ABS_F32_WGSL: &str = r#"
@group(0) @binding(0) var<storage, read> input : array<f32>;
@group(0) @binding(1) var<storage, read_write> output : array<f32>;

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) gid : vec3<u32>) {
    let i = gid.x;
    if (i < arrayLength(&input)) {
        output[i] = abs(input[i]);
    }
}
"#;

const ABS_F16_WGSL: &str = r#"
enable f16;

@group(0) @binding(0) var<storage, read> input : array<f16>;
@group(0) @binding(1) var<storage, read_write> output : array<f16>;

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) gid : vec3<u32>) {
    let i = gid.x;
    if (i < arrayLength(&input)) {
        output[i] = abs(input[i]);
    }
}
"#;

/// Execution state the dispatching runtime feeds a kernel on this backend.
pub struct WgpuKernelState {
    pub context: Arc<WgpuContext>,
    pub input: Arc<GpuBuffer>,
    pub output: Arc<GpuBuffer>,
    pub dtype: DType,
}

/// Capability predicate for unary float kernels: dtype must be in the float
/// set, and f16 additionally needs the shader-f16 device feature.
fn unary_float_supported(node: &PortableNode, context: &BackendContext) -> CapabilityDecision {
    let Some(input) = node.input(0) else {
        return CapabilityDecision::rejected("unary op requires an input");
    };
    let dtype = input.spec.dtype;
    if !SUPPORTED_FLOAT_TYPES.contains(&dtype) {
        return CapabilityDecision::rejected(format!(
            "dtype {dtype:?} is not in the supported float set"
        ));
    }
    if dtype == DType::F16 {
        let has_f16 = context
            .properties()
            .map(|props| props.features.shader_f16)
            .unwrap_or(false);
        if !has_f16 {
            return CapabilityDecision::rejected("f16 requires the shader-f16 device feature");
        }
    }
    CapabilityDecision::supported()
}

struct AbsKernel;

impl Kernel for AbsKernel {
    fn name(&self) -> &str {
        "abs"
    }

    fn compute(&self, context: &mut KernelContext<'_>) -> Result<(), KernelError> {
        let state = context
            .state
            .downcast_mut::<WgpuKernelState>()
            .ok_or_else(|| KernelError::IncompatibleState {
                kernel: "abs".to_string(),
            })?;

        // Unary ops preserve the input shape, so the buffers must agree.
        if state.output.size() < state.input.size() {
            return Err(KernelError::execution(format!(
                "output buffer holds {} bytes but input holds {}",
                state.output.size(),
                state.input.size()
            )));
        }
        let source = match state.dtype {
            DType::F32 => ABS_F32_WGSL,
            DType::F16 => ABS_F16_WGSL,
            other => {
                return Err(KernelError::execution(format!(
                    "abs kernel has no shader for {other:?}"
                )));
            }
        };
        let elem_size = state
            .dtype
            .size_in_bytes()
            .expect("float dtypes have a fixed size") as u64;
        dispatch_elementwise(state, source, state.input.size() / elem_size);
        Ok(())
    }
}

fn dispatch_elementwise(state: &WgpuKernelState, source: &str, element_count: u64) {
    let device = &state.context.device;
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("graphrt.elementwise"),
        source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
    });
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some("graphrt.elementwise"),
        layout: None,
        module: &module,
        entry_point: "main",
        compilation_options: Default::default(),
        cache: None,
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("graphrt.elementwise"),
        layout: &pipeline.get_bind_group_layout(0),
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: state.input.raw().as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: state.output.raw().as_entire_binding(),
            },
        ],
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("graphrt.elementwise"),
    });
    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("graphrt.elementwise"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        let workgroups = element_count.div_ceil(WORKGROUP_SIZE) as u32;
        pass.dispatch_workgroups(workgroups.max(1), 1, 1);
    }
    state.context.submit_encoder(encoder);
}

/// Registers every kernel this backend provides. Run once at process start.
pub fn register_kernels(table: &mut KernelTable) -> Result<(), RegistrationError> {
    table.register(KernelRegistration {
        op_type: "Abs",
        versions: VersionRange::between(6, 12),
        backend: BACKEND_NAME,
        capability: unary_float_supported,
        create: || Box::new(AbsKernel),
    })?;
    table.register(KernelRegistration {
        op_type: "Abs",
        versions: VersionRange::since(13),
        backend: BACKEND_NAME,
        capability: unary_float_supported,
        create: || Box::new(AbsKernel),
    })?;
    Ok(())
}
