//! Execution-backend abstraction layer for a tensor-graph inference runtime.
//!
//! The core owns the contracts between the portable graph and the pluggable
//! execution backends: per-node capability queries, lowering of portable
//! nodes into backend-native operation records, the kernel registration
//! table consulted by generic dispatch, and the device-side resource model
//! (context handles, allocators, transfers, queues). Backend crates plug in
//! underneath; the graph/IR representation and dispatch policy live above.

pub mod capability;
pub mod device;
pub mod kernels;
pub mod lowering;
pub mod node;
pub mod program;
pub mod spec;

pub use capability::{BackendContext, CapabilityDecision};
pub use node::{AttrValue, PortableNode, TensorBinding};
pub use program::{GraphProgram, OperandSource, OperationRecord};
pub use spec::{DType, Dimension, Shape, TensorSpec};
