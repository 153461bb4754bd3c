//! Per-backend, per-node capability queries.
//!
//! A capability query is pure and read-only: it never mutates the graph and
//! never allocates device resources. Checks run in a fixed order (backend
//! enablement, then structural constraints, then attribute values) and the
//! first failing check wins, because later checks presuppose earlier ones.

use std::sync::Arc;

use crate::device::properties::DeviceProperties;
use crate::node::PortableNode;

/// Outcome of one capability query. Computed per query, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityDecision {
    supported: bool,
    reason: Option<String>,
}

impl CapabilityDecision {
    pub fn supported() -> Self {
        Self {
            supported: true,
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            supported: false,
            reason: Some(reason.into()),
        }
    }

    pub fn is_supported(&self) -> bool {
        self.supported
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

/// Read-only backend state a capability query may consult.
#[derive(Debug, Clone)]
pub struct BackendContext {
    backend: String,
    graph_programs_enabled: bool,
    properties: Option<Arc<DeviceProperties>>,
}

impl BackendContext {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            graph_programs_enabled: true,
            properties: None,
        }
    }

    /// Backend-global enablement: whether this build supports whole graph
    /// programs at all. Queries check this before anything node-specific.
    pub fn with_graph_programs(mut self, enabled: bool) -> Self {
        self.graph_programs_enabled = enabled;
        self
    }

    pub fn with_properties(mut self, properties: Arc<DeviceProperties>) -> Self {
        self.properties = Some(properties);
        self
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn graph_programs_enabled(&self) -> bool {
        self.graph_programs_enabled
    }

    pub fn properties(&self) -> Option<&DeviceProperties> {
        self.properties.as_deref()
    }
}

/// Capability predicate held as data in the op-builder registration map.
pub type CapabilityFn = fn(&PortableNode, &BackendContext) -> CapabilityDecision;
