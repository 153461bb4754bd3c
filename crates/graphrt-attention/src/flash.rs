//! Tiled online-softmax attention execution.
//!
//! Processes K/V in blocks while maintaining running softmax statistics per
//! query row, so the full `[seq_q, seq_kv]` score matrix is never
//! materialized. Causal masking, the sliding window, per-batch padding
//! masks, and the additive bias all compose; a key position survives only if
//! every enabled mask admits it.

use graphrt::device::allocator::{DeviceAllocator, HostAllocator};
use graphrt::device::queue::{ExecutionQueue, SubmissionIndex};

use crate::{AttentionError, AttentionParams, QkvLayout};

/// K/V tile width of the inner loop.
const BLOCK_SIZE: usize = 64;

#[derive(Clone, Copy)]
enum Packed {
    Bnsh,
    Bsnh,
}

impl Packed {
    fn index(self, b: usize, heads: usize, h: usize, seq: usize, s: usize, size: usize, c: usize) -> usize {
        match self {
            Packed::Bnsh => ((b * heads + h) * seq + s) * size + c,
            Packed::Bsnh => ((b * seq + s) * heads + h) * size + c,
        }
    }
}

fn validate(params: &AttentionParams<'_>, output: &[f32]) -> Result<(), AttentionError> {
    let d = &params.dims;
    if d.num_heads_kv == 0 || d.num_heads_q % d.num_heads_kv != 0 {
        return Err(AttentionError::invalid(format!(
            "{} query heads cannot share {} kv heads",
            d.num_heads_q, d.num_heads_kv
        )));
    }

    let expect = |name: &str, actual: usize, expected: usize| {
        if actual == expected {
            Ok(())
        } else {
            Err(AttentionError::invalid(format!(
                "{name} holds {actual} elements, expected {expected}"
            )))
        }
    };
    expect("q", params.q.len(), d.batch * d.num_heads_q * d.seq_q * d.head_size_qk)?;
    expect("k", params.k.len(), d.batch * d.num_heads_kv * d.seq_kv * d.head_size_qk)?;
    expect("v", params.v.len(), d.batch * d.num_heads_kv * d.seq_kv * d.head_size_v)?;
    expect("output", output.len(), d.batch * d.num_heads_q * d.seq_q * d.head_size_v)?;

    if let Some(mask) = params.mask_seq_q {
        expect("mask_seq_q", mask.len(), d.batch)?;
    }
    if let Some(mask) = params.mask_seq_kv {
        expect("mask_seq_kv", mask.len(), d.batch)?;
    }
    if let Some(bias) = &params.bias {
        if bias.batch != 1 && bias.batch != d.batch {
            return Err(AttentionError::invalid("bias batch dim must be 1 or batch"));
        }
        if bias.heads != 1 && bias.heads != d.num_heads_q {
            return Err(AttentionError::invalid("bias head dim must be 1 or num_heads_q"));
        }
        expect(
            "bias",
            bias.values.len(),
            bias.batch * bias.heads * d.seq_q * d.seq_kv,
        )?;
    }
    Ok(())
}

fn masked_len(mask: Option<&[i32]>, batch: usize, full: usize) -> usize {
    match mask {
        Some(lengths) => (lengths[batch].max(0) as usize).min(full),
        None => full,
    }
}

/// Executes one fused attention call.
///
/// The caller owns ordering between this submission and any later read of
/// `output` via the returned token. Must only be invoked for configurations
/// the planner already accepted through [`crate::is_supported`].
pub fn run(
    params: &AttentionParams<'_>,
    output: &mut [f32],
    queue: &dyn ExecutionQueue,
    allocator: &HostAllocator,
) -> Result<SubmissionIndex, AttentionError> {
    let (q_layout, kv_layout) = match params.layout {
        QkvLayout::QkvBnsh => (Packed::Bnsh, Packed::Bnsh),
        QkvLayout::QkvBsnh => (Packed::Bsnh, Packed::Bsnh),
        QkvLayout::QBsnhKvBnsh => {
            return Err(AttentionError::UnsupportedLayout(params.layout));
        }
    };
    validate(params, output)?;

    let d = params.dims;
    let workspace_bytes = ((d.head_size_v + BLOCK_SIZE) * std::mem::size_of::<f32>()) as u64;
    let mut workspace = allocator
        .allocate(workspace_bytes)
        .map_err(|err| AttentionError::Workspace(err.to_string()))?
        .ok_or_else(|| AttentionError::Workspace("empty workspace request".to_string()))?;

    let result = execute(params, output, q_layout, kv_layout, workspace.as_mut_slice());
    allocator.release(Some(workspace));
    result?;

    Ok(queue.submit("fused_attention"))
}

fn execute(
    params: &AttentionParams<'_>,
    output: &mut [f32],
    q_layout: Packed,
    kv_layout: Packed,
    workspace: &mut [u8],
) -> Result<(), AttentionError> {
    let floats: &mut [f32] = bytemuck::try_cast_slice_mut(workspace)
        .map_err(|_| AttentionError::Workspace("workspace is not f32-aligned".to_string()))?;
    let d = params.dims;
    let (acc, scores) = floats.split_at_mut(d.head_size_v);

    let scale = if params.scale == 0.0 {
        1.0 / (d.head_size_qk as f32).sqrt()
    } else {
        params.scale
    };
    let heads_per_kv = d.num_heads_q / d.num_heads_kv;

    for b in 0..d.batch {
        let seq_q_valid = masked_len(params.mask_seq_q, b, d.seq_q);
        let seq_kv_valid = masked_len(params.mask_seq_kv, b, d.seq_kv);
        // Causal masking and the sliding window anchor on the diagonal that
        // aligns the sequence ends.
        let diag_offset = seq_kv_valid as isize - seq_q_valid as isize;

        for h in 0..d.num_heads_q {
            let kv_head = h / heads_per_kv;
            for qi in 0..d.seq_q {
                let out_base = q_layout.index(b, d.num_heads_q, h, d.seq_q, qi, d.head_size_v, 0);
                if qi >= seq_q_valid {
                    output[out_base..out_base + d.head_size_v].fill(0.0);
                    continue;
                }
                let q_pos = qi as isize + diag_offset;

                let mut row_max = f32::NEG_INFINITY;
                let mut row_sum = 0.0f32;
                acc.fill(0.0);

                let mut block_start = 0usize;
                while block_start < seq_kv_valid {
                    let block_end = (block_start + BLOCK_SIZE).min(seq_kv_valid);
                    let mut block_max = f32::NEG_INFINITY;

                    for (bj, kj) in (block_start..block_end).enumerate() {
                        let k_pos = kj as isize;
                        let causal_hit = params.is_causal && k_pos > q_pos;
                        let window_hit = params.sliding_window > 0
                            && k_pos <= q_pos - params.sliding_window as isize;
                        if causal_hit || window_hit {
                            scores[bj] = f32::NEG_INFINITY;
                            continue;
                        }

                        let q_base =
                            q_layout.index(b, d.num_heads_q, h, d.seq_q, qi, d.head_size_qk, 0);
                        let k_base = kv_layout
                            .index(b, d.num_heads_kv, kv_head, d.seq_kv, kj, d.head_size_qk, 0);
                        let mut dot = 0.0f32;
                        for c in 0..d.head_size_qk {
                            dot += params.q[q_base + c] * params.k[k_base + c];
                        }
                        let mut score = dot * scale;
                        if let Some(bias) = &params.bias {
                            let bias_b = if bias.batch == 1 { 0 } else { b };
                            let bias_h = if bias.heads == 1 { 0 } else { h };
                            score += bias.values
                                [((bias_b * bias.heads + bias_h) * d.seq_q + qi) * d.seq_kv + kj];
                        }
                        scores[bj] = score;
                        if score > block_max {
                            block_max = score;
                        }
                    }

                    if block_max > f32::NEG_INFINITY {
                        let new_max = row_max.max(block_max);
                        let prev_scale = (row_max - new_max).exp();
                        row_sum *= prev_scale;
                        for value in acc.iter_mut() {
                            *value *= prev_scale;
                        }

                        for (bj, kj) in (block_start..block_end).enumerate() {
                            let weight = (scores[bj] - new_max).exp();
                            if weight == 0.0 {
                                continue;
                            }
                            row_sum += weight;
                            let v_base = kv_layout
                                .index(b, d.num_heads_kv, kv_head, d.seq_kv, kj, d.head_size_v, 0);
                            for (c, value) in acc.iter_mut().enumerate() {
                                *value += weight * params.v[v_base + c];
                            }
                        }
                        row_max = new_max;
                    }

                    block_start = block_end;
                }

                let inv_sum = if row_sum > 0.0 { 1.0 / row_sum } else { 0.0 };
                for c in 0..d.head_size_v {
                    output[out_base + c] = acc[c] * inv_sum;
                }
            }
        }
    }
    Ok(())
}
