//! Kernel registration table.
//!
//! Generic dispatch (an external collaborator) resolves each portable node
//! against this table. The core only supplies the entries: one capability
//! predicate plus kernel constructor per (operator, version range, backend),
//! held as first-class data and populated by an explicit registration call
//! at process start.

use std::any::Any;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capability::CapabilityFn;
use crate::node::PortableNode;

/// Inclusive operator version range a kernel serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionRange {
    pub since: u32,
    pub until: Option<u32>,
}

impl VersionRange {
    /// Open-ended range starting at `since`.
    pub fn since(since: u32) -> Self {
        Self { since, until: None }
    }

    /// Closed range `[since, until]`.
    pub fn between(since: u32, until: u32) -> Self {
        Self {
            since,
            until: Some(until),
        }
    }

    pub fn contains(&self, version: u32) -> bool {
        version >= self.since && self.until.map_or(true, |until| version <= until)
    }

    fn overlaps(&self, other: &VersionRange) -> bool {
        let self_end = self.until.unwrap_or(u32::MAX);
        let other_end = other.until.unwrap_or(u32::MAX);
        self.since <= other_end && other.since <= self_end
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum KernelError {
    /// The kernel was handed execution state of the wrong backend.
    #[error("kernel {kernel} received incompatible execution state")]
    IncompatibleState { kernel: String },
    #[error("kernel execution failed: {message}")]
    Execution { message: String },
}

impl KernelError {
    pub fn execution(message: impl Into<String>) -> Self {
        KernelError::Execution {
            message: message.into(),
        }
    }
}

/// Per-node execution context handed to a registered kernel.
///
/// `state` is backend execution state, type-erased so the table stays
/// backend-agnostic; each kernel downcasts to the state its backend feeds it.
pub struct KernelContext<'a> {
    pub node: &'a PortableNode,
    pub state: &'a mut dyn Any,
}

/// A registered kernel entry point.
pub trait Kernel: Send + Sync {
    fn name(&self) -> &str;
    fn compute(&self, context: &mut KernelContext<'_>) -> Result<(), KernelError>;
}

/// Constructor held in the table; instantiated by dispatch on first use.
pub type KernelCreateFn = fn() -> Box<dyn Kernel>;

/// One (operator, version range, backend) registration.
pub struct KernelRegistration {
    pub op_type: &'static str,
    pub versions: VersionRange,
    pub backend: &'static str,
    pub capability: CapabilityFn,
    pub create: KernelCreateFn,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("kernel for {op_type} on {backend} overlaps an existing registration")]
pub struct RegistrationError {
    pub op_type: &'static str,
    pub backend: &'static str,
}

/// Declarative lookup table consulted by generic dispatch.
#[derive(Default)]
pub struct KernelTable {
    entries: Vec<KernelRegistration>,
}

impl KernelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one registration, rejecting version-range overlap with an
    /// existing entry for the same operator and backend.
    pub fn register(&mut self, registration: KernelRegistration) -> Result<(), RegistrationError> {
        let clash = self.entries.iter().any(|entry| {
            entry.op_type == registration.op_type
                && entry.backend == registration.backend
                && entry.versions.overlaps(&registration.versions)
        });
        if clash {
            return Err(RegistrationError {
                op_type: registration.op_type,
                backend: registration.backend,
            });
        }
        self.entries.push(registration);
        Ok(())
    }

    /// Resolves the entry serving (`op_type`, `version`) on `backend`.
    pub fn resolve(
        &self,
        op_type: &str,
        version: u32,
        backend: &str,
    ) -> Option<&KernelRegistration> {
        self.entries.iter().find(|entry| {
            entry.op_type == op_type
                && entry.backend == backend
                && entry.versions.contains(version)
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{BackendContext, CapabilityDecision};

    struct NoopKernel;

    impl Kernel for NoopKernel {
        fn name(&self) -> &str {
            "noop"
        }

        fn compute(&self, _context: &mut KernelContext<'_>) -> Result<(), KernelError> {
            Ok(())
        }
    }

    fn accept(_node: &PortableNode, _context: &BackendContext) -> CapabilityDecision {
        CapabilityDecision::supported()
    }

    fn make() -> Box<dyn Kernel> {
        Box::new(NoopKernel)
    }

    fn entry(versions: VersionRange) -> KernelRegistration {
        KernelRegistration {
            op_type: "Abs",
            versions,
            backend: "test",
            capability: accept,
            create: make,
        }
    }

    #[test]
    fn resolution_honours_version_ranges() {
        let mut table = KernelTable::new();
        table.register(entry(VersionRange::between(6, 12))).unwrap();
        table.register(entry(VersionRange::since(13))).unwrap();

        let old = table.resolve("Abs", 9, "test").unwrap();
        assert_eq!(old.versions, VersionRange::between(6, 12));
        let new = table.resolve("Abs", 17, "test").unwrap();
        assert_eq!(new.versions, VersionRange::since(13));

        assert!(table.resolve("Abs", 5, "test").is_none());
        assert!(table.resolve("Abs", 9, "other").is_none());
        assert!(table.resolve("Relu", 9, "test").is_none());
    }

    #[test]
    fn overlapping_registrations_are_rejected() {
        let mut table = KernelTable::new();
        table.register(entry(VersionRange::between(6, 12))).unwrap();
        let err = table.register(entry(VersionRange::between(10, 14))).unwrap_err();
        assert_eq!(err.op_type, "Abs");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn registered_kernels_are_constructible() {
        let mut table = KernelTable::new();
        table.register(entry(VersionRange::since(1))).unwrap();
        let registration = table.resolve("Abs", 3, "test").unwrap();
        let kernel = (registration.create)();
        assert_eq!(kernel.name(), "noop");
    }
}
