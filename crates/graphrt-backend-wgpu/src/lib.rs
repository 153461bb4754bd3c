//! Compute-shader accelerator backend built on wgpu.
//!
//! Owns the process-wide device context (lazily initialized exactly once),
//! the GPU buffer allocator, the host↔device↔device copy primitives, and
//! the shader kernels this backend registers with the kernel table.

mod allocator;
mod device;
mod kernels;
mod transfer;

use std::sync::Arc;

use graphrt::device::handle::DeviceInitError;

pub use allocator::{GpuBuffer, GpuBufferAllocator};
pub use device::{context, is_available, teardown, WgpuContext};
pub use kernels::{
    register_kernels, WgpuKernelState, SUPPORTED_DATA_TYPES, SUPPORTED_FLOAT_TYPES,
};
pub use transfer::WgpuTransfer;

pub const BACKEND_NAME: &str = "wgpu";

/// Factory entry point: acquiring the provider triggers device
/// initialization, so a broken environment fails here rather than at the
/// first kernel launch.
pub fn initialize() -> Result<Arc<WgpuContext>, DeviceInitError> {
    device::context()
}
