//! Adaptive range-size controller.
//!
//! Each completed job resizes the next request toward the target duration:
//! under-target jobs grow the batch (capped at 2x per cycle so early
//! high-variance samples cannot cause runaway growth), over-target jobs
//! shrink it proportionally. The batch size never drops below 1.

pub(crate) fn next_batch_size(
    actual_seconds: f64,
    target_seconds: f64,
    batch_size: u64,
) -> u64 {
    let batch = batch_size.max(1) as f64;
    let next = if actual_seconds < target_seconds {
        ((target_seconds / actual_seconds).min(2.0) * batch).round()
    } else {
        ((target_seconds / actual_seconds) * batch).round()
    };
    (next as u64).max(1)
}
