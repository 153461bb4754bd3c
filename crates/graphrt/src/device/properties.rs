//! Hardware descriptor cached at context initialization.

use serde::{Deserialize, Serialize};

/// Optional device features relevant to kernel selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFeatures {
    pub shader_f16: bool,
    pub timestamp_query: bool,
}

/// Device limits queried once after device creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceLimits {
    pub max_buffer_size: u64,
    pub max_workgroup_storage: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_buffer_size: 256 << 20,
            max_workgroup_storage: 16 << 10,
        }
    }
}

/// Read-only hardware descriptor, queried once per device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProperties {
    pub name: String,
    pub vendor: String,
    /// Backend-reported hardware generation (compute capability major for
    /// data-center parts, zero where the backend has no such notion).
    pub capability_level: u32,
    pub features: DeviceFeatures,
    pub limits: DeviceLimits,
}

impl DeviceProperties {
    pub fn new(name: impl Into<String>, vendor: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vendor: vendor.into(),
            capability_level: 0,
            features: DeviceFeatures::default(),
            limits: DeviceLimits::default(),
        }
    }

    pub fn with_capability_level(mut self, level: u32) -> Self {
        self.capability_level = level;
        self
    }

    pub fn with_features(mut self, features: DeviceFeatures) -> Self {
        self.features = features;
        self
    }

    pub fn with_limits(mut self, limits: DeviceLimits) -> Self {
        self.limits = limits;
        self
    }
}
