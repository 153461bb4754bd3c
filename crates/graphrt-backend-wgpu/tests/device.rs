//! Device-dependent integration tests. Each test skips when no adapter is
//! available so the suite stays runnable on headless CI machines.

use std::sync::Arc;

use graphrt::device::allocator::{AllocatorStats, DeviceAllocator};
use graphrt::device::transfer::{copy_tensor, TransferSource, TransferTarget};
use graphrt::kernels::{KernelContext, KernelTable};
use graphrt::node::{PortableNode, TensorBinding};
use graphrt::spec::{DType, Shape, TensorSpec};
use graphrt_backend_wgpu::{
    context, is_available, register_kernels, GpuBufferAllocator, WgpuKernelState, WgpuTransfer,
    BACKEND_NAME,
};

macro_rules! skip_without_device {
    () => {
        if !is_available() {
            eprintln!("skipping: no wgpu adapter available");
            return;
        }
    };
}

#[test]
fn context_is_shared_across_callers() {
    skip_without_device!();
    let first = context().unwrap();
    let second = context().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(!first.properties().name.is_empty());
}

#[test]
fn allocator_tracks_buffers_symmetrically() {
    skip_without_device!();
    let allocator = GpuBufferAllocator::new(context().unwrap());

    assert!(allocator.allocate(0).unwrap().is_none());
    allocator.release(None);
    assert_eq!(allocator.stats(), AllocatorStats::default());

    let a = allocator.allocate(1024).unwrap();
    let b = allocator.allocate(512).unwrap();
    assert_eq!(
        allocator.stats(),
        AllocatorStats {
            allocation_count: 2,
            bytes_in_use: 1536,
        }
    );
    allocator.release(a);
    allocator.release(b);
    assert_eq!(allocator.stats(), AllocatorStats::default());
}

#[test]
fn oversized_requests_fail_loudly() {
    skip_without_device!();
    let ctx = context().unwrap();
    let allocator = GpuBufferAllocator::new(ctx.clone());
    let too_big = ctx.properties().limits.max_buffer_size + 1;
    assert!(allocator.allocate(too_big).is_err());
    assert_eq!(allocator.stats(), AllocatorStats::default());
}

#[test]
fn upload_download_roundtrip() {
    skip_without_device!();
    let ctx = context().unwrap();
    let allocator = GpuBufferAllocator::new(ctx.clone());
    let transfer = WgpuTransfer::new(ctx);

    let data: Vec<f32> = (0..256).map(|i| i as f32 - 128.0).collect();
    let bytes: &[u8] = bytemuck::cast_slice(&data);
    let buffer = allocator.allocate(bytes.len() as u64).unwrap().unwrap();

    copy_tensor(
        &transfer,
        TransferSource::Host(bytes),
        TransferTarget::Device {
            buffer: &buffer,
            device: 0,
            len: bytes.len() as u64,
        },
    )
    .unwrap();

    let mut readback = vec![0u8; bytes.len()];
    copy_tensor(
        &transfer,
        TransferSource::Device {
            buffer: &buffer,
            device: 0,
            len: bytes.len() as u64,
        },
        TransferTarget::Host(&mut readback),
    )
    .unwrap();
    assert_eq!(readback, bytes);

    allocator.release(Some(buffer));
}

#[test]
fn peer_copy_moves_device_bytes() {
    skip_without_device!();
    let ctx = context().unwrap();
    let allocator = GpuBufferAllocator::new(ctx.clone());
    let transfer = WgpuTransfer::new(ctx);

    let data = [7u8; 64];
    let src = allocator.allocate(64).unwrap().unwrap();
    let dst = allocator.allocate(64).unwrap().unwrap();

    copy_tensor(
        &transfer,
        TransferSource::Host(&data),
        TransferTarget::Device {
            buffer: &src,
            device: 0,
            len: 64,
        },
    )
    .unwrap();
    copy_tensor(
        &transfer,
        TransferSource::Device {
            buffer: &src,
            device: 0,
            len: 64,
        },
        TransferTarget::Device {
            buffer: &dst,
            device: 0,
            len: 64,
        },
    )
    .unwrap();

    let mut readback = vec![0u8; 64];
    copy_tensor(
        &transfer,
        TransferSource::Device {
            buffer: &dst,
            device: 0,
            len: 64,
        },
        TransferTarget::Host(&mut readback),
    )
    .unwrap();
    assert_eq!(readback, data);

    allocator.release(Some(src));
    allocator.release(Some(dst));
}

#[test]
fn abs_kernel_runs_end_to_end() {
    skip_without_device!();
    let ctx = context().unwrap();
    let allocator = GpuBufferAllocator::new(ctx.clone());
    let transfer = WgpuTransfer::new(ctx.clone());

    let mut table = KernelTable::new();
    register_kernels(&mut table).unwrap();
    let registration = table.resolve("Abs", 13, BACKEND_NAME).unwrap();
    let kernel = (registration.create)();

    let data: Vec<f32> = (0..128).map(|i| i as f32 - 64.0).collect();
    let bytes: &[u8] = bytemuck::cast_slice(&data);
    let input = Arc::new(allocator.allocate(bytes.len() as u64).unwrap().unwrap());
    let output = Arc::new(allocator.allocate(bytes.len() as u64).unwrap().unwrap());

    copy_tensor(
        &transfer,
        TransferSource::Host(bytes),
        TransferTarget::Device {
            buffer: input.as_ref(),
            device: 0,
            len: bytes.len() as u64,
        },
    )
    .unwrap();

    let node = PortableNode::new("abs_0", "Abs", 13).with_input(TensorBinding::new(
        "x",
        TensorSpec::new(DType::F32, Shape::of_static(&[128])),
    ));
    let mut state = WgpuKernelState {
        context: ctx,
        input: Arc::clone(&input),
        output: Arc::clone(&output),
        dtype: DType::F32,
    };
    let mut kernel_context = KernelContext {
        node: &node,
        state: &mut state,
    };
    kernel.compute(&mut kernel_context).unwrap();

    let mut readback = vec![0u8; bytes.len()];
    copy_tensor(
        &transfer,
        TransferSource::Device {
            buffer: output.as_ref(),
            device: 0,
            len: bytes.len() as u64,
        },
        TransferTarget::Host(&mut readback),
    )
    .unwrap();
    let result: &[f32] = bytemuck::cast_slice(&readback);
    for (got, want) in result.iter().zip(data.iter()) {
        assert_eq!(*got, want.abs());
    }
}
