//! Neural-accelerator backend (graph-program contract).
//!
//! This backend does not execute kernels node by node: eligible subgraphs
//! are lowered into a [`graphrt::GraphProgram`] and handed to the vendor
//! runtime whole. The crate contributes the per-operator capability checks
//! and lowering rules; the generic runtime decides which nodes it gets.

mod elementwise;
mod resample;

use graphrt::capability::BackendContext;
use graphrt::lowering::{register_op_builder, OpBuilder};

pub const BACKEND_NAME: &str = "npu";

/// Build-time options for this backend.
#[derive(Debug, Clone, Copy)]
pub struct NpuOptions {
    /// Whether this build may emit whole graph programs at all. When false,
    /// every capability query answers no before looking at the node.
    pub graph_programs_enabled: bool,
}

impl Default for NpuOptions {
    fn default() -> Self {
        Self {
            graph_programs_enabled: true,
        }
    }
}

/// Builds the read-only context capability queries and lowering run against.
pub fn backend_context(options: NpuOptions) -> BackendContext {
    BackendContext::new(BACKEND_NAME).with_graph_programs(options.graph_programs_enabled)
}

/// Registers every op builder this backend provides. Run once at process
/// start, before planning consults the registry.
pub fn register_builders() {
    register_op_builder(
        BACKEND_NAME,
        "GridSample",
        OpBuilder {
            capability: resample::supported,
            lower: resample::lower,
        },
    );
    register_op_builder(
        BACKEND_NAME,
        "Add",
        OpBuilder {
            capability: elementwise::supported,
            lower: elementwise::lower,
        },
    );
    register_op_builder(
        BACKEND_NAME,
        "Mul",
        OpBuilder {
            capability: elementwise::supported,
            lower: elementwise::lower,
        },
    );
}
