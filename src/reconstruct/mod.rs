//! Greedy projection triangulation: turns an unorganized point set with
//! per-point normals into a triangle mesh on local tangent planes.
//!
//! Reconstruction is written as a sequence of phases with explicit yield
//! points rather than a hidden async state machine (spec §9). Each phase
//! boundary polls a shared cancellation flag; setting it fails the whole
//! operation with [`crate::Error::Cancelled`] at the next boundary.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::ReconstructConfig;
use crate::spatial::{estimate_normals, UniformGrid};
use crate::{Error, Result};

/// A phase boundary reached during reconstruction, with its overall progress
/// percentage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Progress {
    /// Human-readable phase name.
    pub phase: &'static str,
    /// Overall progress, `0..=100`.
    pub percent: u8,
}

/// A cooperative cancellation flag shared between the caller and an
/// in-progress reconstruction.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a fresh, unset token.
    pub fn new() -> Self {
        CancelToken(Arc::new(AtomicBool::new(false)))
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Reconstructs a triangle mesh from `positions` (flattened XYZ).
///
/// `on_progress` is invoked at each of the four phase boundaries described in
/// spec §4.7: building the spatial index (10%), estimating normals
/// (30→60%), triangulating (60→90%), and finalizing (95%) before completion
/// (100%). `cancel` is polled at each of those boundaries.
pub fn reconstruct(
    positions: &[f32],
    config: ReconstructConfig,
    cancel: &CancelToken,
    mut on_progress: impl FnMut(Progress),
) -> Result<Vec<u32>> {
    on_progress(Progress {
        phase: "Building spatial index",
        percent: 10,
    });
    check_cancelled(cancel)?;
    let grid = UniformGrid::build(positions, config.k_neighbors);
    let max_edge_length = config
        .max_edge_length
        .unwrap_or(2.0 * grid.cell_size());

    on_progress(Progress {
        phase: "Estimating normals",
        percent: 30,
    });
    check_cancelled(cancel)?;
    let normals = estimate_normals(&grid, config.k_neighbors);
    on_progress(Progress {
        phase: "Estimating normals",
        percent: 60,
    });

    on_progress(Progress {
        phase: "Triangulating",
        percent: 60,
    });
    check_cancelled(cancel)?;
    let point_count = grid.len();
    let mut triangles: HashSet<(u32, u32, u32)> = HashSet::new();
    let mut emitted: Vec<[u32; 3]> = Vec::new();

    for seed in 0..point_count as u32 {
        let p = grid.point(seed);
        let n = normals[seed as usize];

        let Some((u, v)) = tangent_frame(n) else {
            continue;
        };

        let neighbor_ids = grid.k_nearest(p, config.k_neighbors, Some(seed));
        let mut ring: Vec<(f32, u32)> = neighbor_ids
            .into_iter()
            .filter_map(|id| {
                let q = grid.point(id);
                let d2 = (q - p).length_squared();
                if d2 > max_edge_length * max_edge_length {
                    return None;
                }
                let rel = q - p;
                let angle = rel.dot(v).atan2(rel.dot(u));
                Some((angle, id))
            })
            .collect();
        ring.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

        let len = ring.len();
        if len < 2 {
            continue;
        }
        for j in 0..len {
            let (angle_j, idx_j) = ring[j];
            let (angle_next, idx_next) = ring[(j + 1) % len];
            if idx_j == idx_next {
                continue;
            }
            let q_j = grid.point(idx_j);
            let q_next = grid.point(idx_next);
            if (q_j - q_next).length_squared() > max_edge_length * max_edge_length {
                continue;
            }
            let mut gap = angle_next - angle_j;
            if gap < 0.0 {
                gap += std::f32::consts::TAU;
            }
            if gap > std::f32::consts::FRAC_PI_2 {
                continue;
            }

            let key = canonical_key(seed, idx_j, idx_next);
            if !triangles.insert(key) {
                continue;
            }

            let (b, c) = orient(seed, idx_j, idx_next, p, q_j, q_next, n);
            emitted.push([seed, b, c]);
        }
    }

    on_progress(Progress {
        phase: "Triangulating",
        percent: 90,
    });
    check_cancelled(cancel)?;

    on_progress(Progress {
        phase: "Finalizing",
        percent: 95,
    });
    if emitted.is_empty() {
        return Err(Error::EmptyResult);
    }
    let indices: Vec<u32> = emitted.into_iter().flatten().collect();

    on_progress(Progress {
        phase: "Complete",
        percent: 100,
    });
    Ok(indices)
}

fn check_cancelled(cancel: &CancelToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

/// Builds an orthonormal tangent frame `(u, v)` perpendicular to `n`. Returns
/// `None` if the chosen cross product degenerates.
fn tangent_frame(n: glam::Vec3) -> Option<(glam::Vec3, glam::Vec3)> {
    let reference = if n.x.abs() >= 0.9 {
        glam::Vec3::Y
    } else {
        glam::Vec3::X
    };
    let u = n.cross(reference);
    if u.length() < 1e-12 {
        return None;
    }
    let u = u.normalize();
    let v = n.cross(u);
    Some((u, v))
}

fn canonical_key(a: u32, b: u32, c: u32) -> (u32, u32, u32) {
    let mut v = [a, b, c];
    v.sort_unstable();
    (v[0], v[1], v[2])
}

/// Orders `(idx_j, idx_next)` so that `(p_b - p_i) x (p_c - p_i) . n >= 0`.
fn orient(
    i: u32,
    j: u32,
    next: u32,
    p_i: glam::Vec3,
    p_j: glam::Vec3,
    p_next: glam::Vec3,
    n: glam::Vec3,
) -> (u32, u32) {
    let cross = (p_j - p_i).cross(p_next - p_i);
    if cross.dot(n) >= 0.0 {
        (j, next)
    } else {
        (next, j)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planar_grid(n: usize) -> Vec<f32> {
        let mut positions = Vec::new();
        for x in 0..n {
            for z in 0..n {
                positions.extend_from_slice(&[x as f32, 0.0, z as f32]);
            }
        }
        positions
    }

    #[test]
    fn planar_grid_reconstructs_without_duplicates() {
        let positions = planar_grid(10);
        let config = ReconstructConfig {
            k_neighbors: 15,
            max_edge_length: Some(2.0),
        };
        let cancel = CancelToken::new();
        let indices = reconstruct(&positions, config, &cancel, |_| {}).unwrap();
        assert!(!indices.is_empty());

        let mut seen = HashSet::new();
        for tri in indices.chunks_exact(3) {
            assert_ne!(tri[0], tri[1]);
            assert_ne!(tri[1], tri[2]);
            assert_ne!(tri[0], tri[2]);
            let key = canonical_key(tri[0], tri[1], tri[2]);
            assert!(seen.insert(key), "triangle emitted twice: {key:?}");

            let n = positions.len() / 3;
            for &idx in tri {
                assert!((idx as usize) < n);
            }
        }
    }

    #[test]
    fn cancellation_is_observed_at_next_boundary() {
        let positions = planar_grid(10);
        let config = ReconstructConfig::default();
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = reconstruct(&positions, config, &cancel, |_| {});
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn empty_cloud_fails_with_empty_result() {
        let cancel = CancelToken::new();
        let result = reconstruct(&[], ReconstructConfig::default(), &cancel, |_| {});
        assert!(matches!(result, Err(Error::EmptyResult)));
    }
}
