//! GPU buffer allocator.

use std::sync::{Arc, Mutex};

use graphrt::device::allocator::{AllocationError, AllocatorStats, DeviceAllocator};

use crate::device::WgpuContext;

/// Storage buffer resident on the wgpu device.
#[derive(Debug)]
pub struct GpuBuffer {
    buffer: wgpu::Buffer,
    size: u64,
}

impl GpuBuffer {
    pub fn size(&self) -> u64 {
        self.size
    }

    pub(crate) fn raw(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

/// Allocator for device-resident storage buffers.
pub struct GpuBufferAllocator {
    context: Arc<WgpuContext>,
    stats: Mutex<AllocatorStats>,
}

impl GpuBufferAllocator {
    pub fn new(context: Arc<WgpuContext>) -> Self {
        Self {
            context,
            stats: Mutex::new(AllocatorStats::default()),
        }
    }
}

impl DeviceAllocator for GpuBufferAllocator {
    type Buffer = GpuBuffer;

    fn allocate(&self, size: u64) -> Result<Option<GpuBuffer>, AllocationError> {
        if size == 0 {
            return Ok(None);
        }
        // Refuse rather than hand out a handle the device cannot back.
        let max = self.context.properties().limits.max_buffer_size;
        if size > max {
            return Err(AllocationError::new(
                size,
                format!("request exceeds device max_buffer_size ({max})"),
            ));
        }
        let buffer = self.context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("graphrt.gpu_buffer"),
            size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut stats = self.stats.lock().expect("allocator stats poisoned");
        stats.allocation_count += 1;
        stats.bytes_in_use += size;
        Ok(Some(GpuBuffer { buffer, size }))
    }

    fn release(&self, buffer: Option<GpuBuffer>) {
        if let Some(buffer) = buffer {
            buffer.buffer.destroy();
            let mut stats = self.stats.lock().expect("allocator stats poisoned");
            stats.allocation_count -= 1;
            stats.bytes_in_use -= buffer.size;
        }
    }

    fn stats(&self) -> AllocatorStats {
        *self.stats.lock().expect("allocator stats poisoned")
    }
}
