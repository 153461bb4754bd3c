//! Native copy primitives for the wgpu device.
//!
//! Upload goes through the queue's staging path, download through a
//! map-readable staging buffer whose `map_async` callback is collapsed into
//! a blocking wait, and peer copy through an encoder on the same queue.
//! This backend serves a single logical device, so peer copies never cross
//! an adapter boundary.

use std::sync::Arc;

use graphrt::device::handle::block_on_callback;
use graphrt::device::transfer::{CopyPrimitives, DeviceId, TransferError};

use crate::allocator::GpuBuffer;
use crate::device::WgpuContext;

pub struct WgpuTransfer {
    context: Arc<WgpuContext>,
}

impl WgpuTransfer {
    pub fn new(context: Arc<WgpuContext>) -> Self {
        Self { context }
    }
}

impl CopyPrimitives for WgpuTransfer {
    type Buffer = GpuBuffer;

    fn upload(&self, src: &[u8], dst: &GpuBuffer) -> Result<(), TransferError> {
        if src.len() as u64 != dst.size() {
            return Err(TransferError::SizeMismatch {
                src: src.len() as u64,
                dst: dst.size(),
            });
        }
        self.context.queue.write_buffer(dst.raw(), 0, src);
        Ok(())
    }

    fn download(&self, src: &GpuBuffer, dst: &mut [u8]) -> Result<(), TransferError> {
        if dst.len() as u64 != src.size() {
            return Err(TransferError::SizeMismatch {
                src: src.size(),
                dst: dst.len() as u64,
            });
        }
        let staging = self.context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("graphrt.download_staging"),
            size: src.size(),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("graphrt.download"),
            });
        encoder.copy_buffer_to_buffer(src.raw(), 0, &staging, 0, src.size());
        self.context.submit_encoder(encoder);

        let slice = staging.slice(..);
        let mapped = block_on_callback(|done| {
            slice.map_async(wgpu::MapMode::Read, move |result| done(result));
            self.context.device.poll(wgpu::Maintain::Wait);
        });
        mapped.map_err(|err| TransferError::Native {
            message: err.to_string(),
        })?;

        dst.copy_from_slice(&slice.get_mapped_range());
        staging.unmap();
        Ok(())
    }

    fn peer_copy(
        &self,
        src: &GpuBuffer,
        _src_device: DeviceId,
        dst: &GpuBuffer,
        _dst_device: DeviceId,
    ) -> Result<(), TransferError> {
        if src.size() != dst.size() {
            return Err(TransferError::SizeMismatch {
                src: src.size(),
                dst: dst.size(),
            });
        }
        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("graphrt.peer_copy"),
            });
        encoder.copy_buffer_to_buffer(src.raw(), 0, dst.raw(), 0, src.size());
        self.context.submit_encoder(encoder);
        Ok(())
    }
}
