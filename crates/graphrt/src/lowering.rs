//! Op-builder registration map and lowering dispatch.
//!
//! Each backend registers, per portable operator, a capability predicate and
//! a lowering function as plain data. [`lower_node`] runs the capability
//! check first and only then the lowering rule, so a rejected node never
//! reaches lowering. A lowering rule that still finds a precondition missing
//! reports [`LoweringError::InvariantViolated`]: an internal consistency
//! bug between the two, distinct from an ordinary unsupported operator.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use thiserror::Error;

use crate::capability::{BackendContext, CapabilityDecision, CapabilityFn};
use crate::node::PortableNode;
use crate::program::{GraphProgram, ProgramError};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoweringError {
    /// Capability query declined the node. Expected and frequent; the caller
    /// falls back to another backend.
    #[error("unsupported operator {op}: {reason}")]
    Unsupported { op: String, reason: String },
    /// A precondition the capability query was supposed to guarantee did not
    /// hold at lowering time.
    #[error("lowering invariant violated for {op}: {detail}")]
    InvariantViolated { op: String, detail: String },
    #[error(transparent)]
    Program(#[from] ProgramError),
}

/// Lowering rule held as data in the registration map.
pub type LowerFn = fn(&PortableNode, &mut GraphProgram, &BackendContext) -> Result<(), LoweringError>;

/// Capability predicate plus lowering rule for one (backend, operator) pair.
#[derive(Clone, Copy)]
pub struct OpBuilder {
    pub capability: CapabilityFn,
    pub lower: LowerFn,
}

struct OpBuilderRegistry {
    builders: RwLock<HashMap<(String, String), OpBuilder>>,
}

impl OpBuilderRegistry {
    fn new() -> Self {
        Self {
            builders: RwLock::new(HashMap::new()),
        }
    }

    fn register(&self, backend: &str, op_type: &str, builder: OpBuilder) {
        self.builders
            .write()
            .expect("op builder registry poisoned")
            .insert((backend.to_string(), op_type.to_string()), builder);
    }

    fn get(&self, backend: &str, op_type: &str) -> Option<OpBuilder> {
        self.builders
            .read()
            .expect("op builder registry poisoned")
            .get(&(backend.to_string(), op_type.to_string()))
            .copied()
    }

    fn ops_for(&self, backend: &str) -> Vec<String> {
        let mut ops: Vec<String> = self
            .builders
            .read()
            .expect("op builder registry poisoned")
            .keys()
            .filter(|(b, _)| b == backend)
            .map(|(_, op)| op.clone())
            .collect();
        ops.sort();
        ops
    }
}

static GLOBAL_REGISTRY: OnceLock<OpBuilderRegistry> = OnceLock::new();

fn registry() -> &'static OpBuilderRegistry {
    GLOBAL_REGISTRY.get_or_init(OpBuilderRegistry::new)
}

/// Registers the builder for one (backend, operator) pair. Backends call
/// this from their explicit `register_builders()` entry at process start.
pub fn register_op_builder(backend: &str, op_type: &str, builder: OpBuilder) {
    registry().register(backend, op_type, builder);
}

pub fn find_op_builder(backend: &str, op_type: &str) -> Option<OpBuilder> {
    registry().get(backend, op_type)
}

/// Sorted operator names registered for `backend`.
pub fn registered_ops(backend: &str) -> Vec<String> {
    registry().ops_for(backend)
}

/// Capability query entry point used by planning. Pure and idempotent; safe
/// to call many times per node across candidate backends.
pub fn supported(node: &PortableNode, context: &BackendContext) -> CapabilityDecision {
    match find_op_builder(context.backend(), node.op_type()) {
        Some(builder) => (builder.capability)(node, context),
        None => CapabilityDecision::rejected(format!(
            "no builder registered for {} on backend {}",
            node.op_type(),
            context.backend()
        )),
    }
}

/// Lowers one node into `program`, re-running the capability check so a
/// rejected node never reaches its lowering rule.
pub fn lower_node(
    node: &PortableNode,
    program: &mut GraphProgram,
    context: &BackendContext,
) -> Result<(), LoweringError> {
    let builder = find_op_builder(context.backend(), node.op_type()).ok_or_else(|| {
        LoweringError::Unsupported {
            op: node.op_type().to_string(),
            reason: format!("no builder registered on backend {}", context.backend()),
        }
    })?;

    let decision = (builder.capability)(node, context);
    if !decision.is_supported() {
        let reason = decision.reason().unwrap_or("not supported").to_string();
        tracing::debug!(
            node = node.name(),
            op = node.op_type(),
            backend = context.backend(),
            %reason,
            "capability query rejected node"
        );
        return Err(LoweringError::Unsupported {
            op: node.op_type().to_string(),
            reason,
        });
    }

    (builder.lower)(node, program, context).inspect_err(|err| {
        if let LoweringError::InvariantViolated { op, detail } = err {
            tracing::error!(node = node.name(), %op, %detail, "lowering invariant violated");
        }
    })
}
