//! Shared stride-sampling helper: every decoder that might exceed the
//! 5,000,000-point soft ceiling (spec §4.1) calls this instead of
//! reimplementing `ceil(raw / MAX_POINTS)`.

use crate::cloud::MAX_POINTS;

/// The stride to apply when downsampling `raw_count` points to at most
/// [`MAX_POINTS`]. Returns `1` (no sampling) when `raw_count` already fits.
pub fn stride_for(raw_count: usize) -> usize {
    if raw_count <= MAX_POINTS {
        1
    } else {
        raw_count.div_ceil(MAX_POINTS)
    }
}

/// Returns the 0-based indices to keep out of `raw_count`, applying
/// [`stride_for`].
pub fn sampled_indices(raw_count: usize) -> impl Iterator<Item = usize> {
    let stride = stride_for(raw_count);
    (0..raw_count).step_by(stride)
}
