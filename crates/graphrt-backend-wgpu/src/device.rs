//! wgpu device/context acquisition.
//!
//! Initialization runs in strict order (instance, adapter, device, limits)
//! and at most once per process. wgpu exposes native futures for the
//! adapter/device requests, so the blocking contract is implemented on top
//! of them with `pollster`; there is no cancellation and no timeout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use graphrt::device::handle::{DeviceHandle, DeviceInitError};
use graphrt::device::properties::{DeviceFeatures, DeviceLimits, DeviceProperties};
use graphrt::device::queue::{ExecutionQueue, SubmissionIndex};

use crate::BACKEND_NAME;

/// Optional features requested when the adapter offers them.
const DESIRED_FEATURES: wgpu::Features =
    wgpu::Features::SHADER_F16.union(wgpu::Features::TIMESTAMP_QUERY);

/// Connection to the one logical wgpu device this backend drives.
pub struct WgpuContext {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    #[allow(dead_code)]
    adapter: wgpu::Adapter,
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    properties: DeviceProperties,
    submissions: AtomicU64,
}

impl WgpuContext {
    /// Hardware descriptor cached at initialization; read-only afterwards.
    pub fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    /// Submits one finished encoder and returns its ordering token.
    pub(crate) fn submit_encoder(&self, encoder: wgpu::CommandEncoder) -> SubmissionIndex {
        self.queue.submit([encoder.finish()]);
        SubmissionIndex(self.submissions.fetch_add(1, Ordering::Relaxed))
    }
}

impl ExecutionQueue for WgpuContext {
    fn submit(&self, label: &str) -> SubmissionIndex {
        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        self.submit_encoder(encoder)
    }
}

static CONTEXT: DeviceHandle<WgpuContext> = DeviceHandle::new();

/// Returns the process-wide context, initializing it on first use.
///
/// Concurrent first callers block until the single acquisition finishes and
/// then observe the same outcome; a failure is fatal for this backend for
/// the rest of the process.
pub fn context() -> Result<Arc<WgpuContext>, DeviceInitError> {
    CONTEXT.get_or_init(init_context)
}

pub fn is_available() -> bool {
    context().is_ok()
}

/// Explicit shutdown hook; drops the cached connection if one exists.
pub fn teardown() {
    let _ = CONTEXT.teardown();
}

/// Intersection of desired and adapter-available features: the device is
/// created with exactly what both sides agree on.
pub(crate) fn select_features(
    desired: wgpu::Features,
    available: wgpu::Features,
) -> wgpu::Features {
    desired.intersection(available)
}

fn init_context() -> Result<WgpuContext, DeviceInitError> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });

    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        force_fallback_adapter: false,
        compatible_surface: None,
    }))
    .ok_or_else(|| DeviceInitError::new(BACKEND_NAME, "no suitable GPU adapter found"))?;

    let required_features = select_features(DESIRED_FEATURES, adapter.features());
    let (device, queue) = pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("graphrt-wgpu"),
            required_features,
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
        },
        None,
    ))
    .map_err(|err| DeviceInitError::new(BACKEND_NAME, err.to_string()))?;

    let limits = device.limits();
    let info = adapter.get_info();
    tracing::debug!(adapter = %info.name, backend = ?info.backend, "wgpu device ready");

    let properties = DeviceProperties::new(info.name, format!("0x{:04x}", info.vendor))
        .with_features(DeviceFeatures {
            shader_f16: required_features.contains(wgpu::Features::SHADER_F16),
            timestamp_query: required_features.contains(wgpu::Features::TIMESTAMP_QUERY),
        })
        .with_limits(DeviceLimits {
            max_buffer_size: limits.max_buffer_size,
            max_workgroup_storage: limits.max_compute_workgroup_storage_size,
        });

    Ok(WgpuContext {
        instance,
        adapter,
        device,
        queue,
        properties,
        submissions: AtomicU64::new(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_selection_is_an_intersection() {
        let available = wgpu::Features::SHADER_F16 | wgpu::Features::DEPTH_CLIP_CONTROL;
        let selected = select_features(DESIRED_FEATURES, available);
        assert_eq!(selected, wgpu::Features::SHADER_F16);

        assert_eq!(
            select_features(DESIRED_FEATURES, wgpu::Features::empty()),
            wgpu::Features::empty()
        );
        assert_eq!(
            select_features(DESIRED_FEATURES, wgpu::Features::all()),
            DESIRED_FEATURES
        );
    }
}
