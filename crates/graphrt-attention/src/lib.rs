//! Fused scaled-dot-product attention.
//!
//! A single high-value composite operator with its own hardware-feature
//! probe and execution entry point, independent of the generic per-backend
//! lowering path. The planner calls [`is_supported`] before any buffer is
//! allocated; [`run`](flash::run) executes the composite operation against
//! the caller's queue and allocator.

mod flash;

use graphrt::device::properties::DeviceProperties;
use thiserror::Error;

pub use flash::run;

/// Hardware generation this kernel is tuned for.
const MIN_CAPABILITY_LEVEL: u32 = 8;
/// Head sizes must stay register-resident.
const MAX_HEAD_SIZE: usize = 256;
const HEAD_SIZE_ALIGN: usize = 8;

/// Logical problem sizes of one fused attention call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttentionDims {
    pub batch: usize,
    pub num_heads_q: usize,
    pub num_heads_kv: usize,
    pub head_size_qk: usize,
    pub head_size_v: usize,
    pub seq_q: usize,
    pub seq_kv: usize,
}

/// Supported input layouts. This set is exhaustive by contract; handing
/// [`run`] a layout it does not serve is a caller error, not a fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QkvLayout {
    /// `[batch, heads, seq, head_size]`
    QkvBnsh,
    /// `[batch, seq, heads, head_size]`
    QkvBsnh,
    /// Q as BSNH with K/V as BNSH (pre-transposed cross-attention caches).
    QBsnhKvBnsh,
}

/// Additive bias applied before softmax; shape `[b or 1, h or 1, sq, skv]`.
#[derive(Debug, Clone, Copy)]
pub struct BiasView<'a> {
    pub values: &'a [f32],
    pub batch: usize,
    pub heads: usize,
}

/// Full parameter set of one fused attention call.
///
/// Bias, padding masks, and the sliding window are independently optional;
/// any combination composes.
#[derive(Debug, Clone, Copy)]
pub struct AttentionParams<'a> {
    pub dims: AttentionDims,
    pub layout: QkvLayout,
    pub q: &'a [f32],
    pub k: &'a [f32],
    pub v: &'a [f32],
    /// Softmax scale; `0.0` means the default `1/sqrt(head_size_qk)`.
    pub scale: f32,
    pub is_causal: bool,
    pub bias: Option<BiasView<'a>>,
    /// Valid query lengths per batch entry for the padding mask.
    pub mask_seq_q: Option<&'a [i32]>,
    /// Valid key/value lengths per batch entry for the padding mask.
    pub mask_seq_kv: Option<&'a [i32]>,
    /// Sliding-window width; `0` means no window.
    pub sliding_window: usize,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AttentionError {
    #[error("layout {0:?} is not served by this kernel")]
    UnsupportedLayout(QkvLayout),
    #[error("invalid attention arguments: {0}")]
    InvalidArguments(String),
    #[error("workspace allocation failed: {0}")]
    Workspace(String),
}

impl AttentionError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        AttentionError::InvalidArguments(message.into())
    }
}

/// Hardware-feature probe for the fused path.
///
/// Pure and deterministic: callable from any planning thread before any
/// buffer exists. Returning `false` routes the node to the generic
/// composed-op fallback.
pub fn is_supported(properties: &DeviceProperties, dims: &AttentionDims, is_causal: bool) -> bool {
    if properties.capability_level < MIN_CAPABILITY_LEVEL {
        return false;
    }
    if dims.num_heads_q == 0 || dims.num_heads_kv == 0 {
        return false;
    }
    if dims.num_heads_q % dims.num_heads_kv != 0 {
        return false;
    }
    for head_size in [dims.head_size_qk, dims.head_size_v] {
        if head_size == 0 || head_size > MAX_HEAD_SIZE || head_size % HEAD_SIZE_ALIGN != 0 {
            return false;
        }
    }
    if dims.seq_q == 0 || dims.seq_kv == 0 {
        return false;
    }
    // Causal masking assumes the query block is a suffix of the key block.
    if is_causal && dims.seq_q > dims.seq_kv {
        return false;
    }
    true
}
