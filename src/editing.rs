//! The transform/edit pipeline: translate, anisotropic scale about centroid,
//! random thinning, and in-place deletion by selection.
//!
//! Every operation here is total over "no such cloud" (a silent no-op, per
//! spec §7) and otherwise infallible. Each mutates `positions` and dependents
//! in place, re-establishes the [`crate::cloud::CanonicalCloud`] invariants,
//! and bumps [`crate::registry::CloudEntry::transform_version`]. None of them
//! yield; they run to completion on the calling (UI) thread.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::thread_rng;

use crate::cloud::CanonicalCloud;
use crate::registry::{CloudEntry, Registry};

/// Adds `(dx, dy, dz)` to every position. O(n).
pub fn translate(registry: &mut Registry, entry: &mut CloudEntry, delta: glam::Vec3) {
    let Some(cloud) = registry.get_mut(&entry.id) else {
        return;
    };
    for chunk in cloud.positions.chunks_exact_mut(3) {
        chunk[0] += delta.x;
        chunk[1] += delta.y;
        chunk[2] += delta.z;
    }
    bump(entry);
}

/// Scales anisotropically about the cloud's centroid: `p' = c + (p - c) * s`,
/// isotropic per axis regardless of axis asymmetry. Two passes: one to find
/// the centroid, one to apply the scale.
pub fn scale(registry: &mut Registry, entry: &mut CloudEntry, factors: glam::Vec3) {
    let Some(cloud) = registry.get_mut(&entry.id) else {
        return;
    };
    let n = cloud.point_count();
    if n == 0 {
        return;
    }
    let mut centroid = glam::Vec3::ZERO;
    for chunk in cloud.positions.chunks_exact(3) {
        centroid += glam::Vec3::new(chunk[0], chunk[1], chunk[2]);
    }
    centroid /= n as f32;

    for chunk in cloud.positions.chunks_exact_mut(3) {
        let p = glam::Vec3::new(chunk[0], chunk[1], chunk[2]);
        let scaled = centroid + (p - centroid) * factors;
        chunk[0] = scaled.x;
        chunk[1] = scaled.y;
        chunk[2] = scaled.z;
    }
    bump(entry);
}

/// Keeps a uniform random subset of `percent`% of points (clamped to
/// `[1, 100]`), via Fisher–Yates partial shuffle. Kept indices are sorted
/// ascending before rebuilding buffers, for cache-friendly writes. A no-op if
/// the computed keep count is `>=` the current point count.
pub fn thin(registry: &mut Registry, entry: &mut CloudEntry, percent: f32) {
    let Some(cloud) = registry.get_mut(&entry.id) else {
        return;
    };
    let n = cloud.point_count();
    if n == 0 {
        return;
    }
    let percent = percent.clamp(1.0, 100.0);
    let keep = ((n as f32 * percent / 100.0).round() as usize).max(1);
    if keep >= n {
        return;
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = thread_rng();
    // Partial Fisher-Yates: only shuffle enough of the prefix to pick `keep`
    // distinct indices.
    for i in 0..keep {
        let j = i + (rng_gen_range(&mut rng, n - i));
        indices.swap(i, j);
    }
    let mut kept: Vec<usize> = indices[..keep].to_vec();
    kept.sort_unstable();

    rebuild(cloud, &kept);
    bump(entry);
}

fn rng_gen_range(rng: &mut impl rand::Rng, bound: usize) -> usize {
    rng.gen_range(0..bound)
}

/// Deletes the given point indices (assumed already deduplicated) from the
/// cloud. If every point is deleted the cloud is removed from the registry
/// entirely; otherwise the remaining attribute arrays are compacted.
///
/// Returns `true` if the cloud was removed from the registry.
pub fn delete_selected(registry: &mut Registry, entry: &mut CloudEntry, selected: &HashSet<usize>) -> bool {
    let Some(cloud) = registry.get_mut(&entry.id) else {
        return false;
    };
    let n = cloud.point_count();
    if selected.len() >= n {
        registry.remove(&entry.id);
        return true;
    }
    let survivors: Vec<usize> = (0..n).filter(|i| !selected.contains(i)).collect();
    rebuild(cloud, &survivors);
    bump(entry);
    false
}

/// Rebuilds every per-point attribute array to contain only `keep` (already
/// sorted ascending), preserving order.
fn rebuild(cloud: &mut CanonicalCloud, keep: &[usize]) {
    let mut positions = Vec::with_capacity(keep.len() * 3);
    let mut colors = Vec::with_capacity(keep.len() * 3);
    let mut intensities = Vec::with_capacity(keep.len());
    let mut classifications = Vec::with_capacity(keep.len());
    for &i in keep {
        positions.extend_from_slice(&cloud.positions[i * 3..i * 3 + 3]);
        colors.extend_from_slice(&cloud.colors[i * 3..i * 3 + 3]);
        intensities.push(cloud.intensities[i]);
        classifications.push(cloud.classifications[i]);
    }
    cloud.positions = positions;
    cloud.colors = colors;
    cloud.intensities = intensities;
    cloud.classifications = classifications;
    // Mesh topology cannot survive an arbitrary point subset; thinning and
    // deletion drop any triangle indices.
    cloud.indices = None;
}

fn bump(entry: &mut CloudEntry) {
    entry.transform_version += 1;
    log::debug!(
        "editing: cloud {} now at transform_version {}",
        entry.id,
        entry.transform_version
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::Header;

    fn grid_cloud(n: usize) -> CanonicalCloud {
        let mut positions = Vec::with_capacity(n * 3);
        for i in 0..n {
            positions.extend_from_slice(&[i as f32, 0.0, 0.0]);
        }
        CanonicalCloud {
            colors: vec![0.8; n * 3],
            intensities: vec![0.0; n],
            classifications: vec![0.0; n],
            positions,
            indices: None,
            header: Header::default(),
            center: glam::DVec3::ZERO,
            has_color: false,
            has_intensity: false,
            has_classification: false,
        }
    }

    fn setup(n: usize) -> (Registry, CloudEntry) {
        let mut registry = Registry::new();
        let cloud = grid_cloud(n);
        let entry = CloudEntry::new("c".into(), "c".into(), "c".into(), &cloud);
        registry.put("c", cloud);
        (registry, entry)
    }

    #[test]
    fn translate_then_inverse_is_identity() {
        let (mut registry, mut entry) = setup(10);
        let before = registry.get("c").unwrap().positions.clone();
        translate(&mut registry, &mut entry, glam::Vec3::new(1.0, 2.0, 3.0));
        translate(&mut registry, &mut entry, glam::Vec3::new(-1.0, -2.0, -3.0));
        let after = &registry.get("c").unwrap().positions;
        for (a, b) in before.iter().zip(after.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
        assert_eq!(entry.transform_version, 2);
    }

    #[test]
    fn scale_one_is_identity() {
        let (mut registry, mut entry) = setup(10);
        let before = registry.get("c").unwrap().positions.clone();
        scale(&mut registry, &mut entry, glam::Vec3::ONE);
        let after = &registry.get("c").unwrap().positions;
        for (a, b) in before.iter().zip(after.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn thin_100_is_identity() {
        let (mut registry, mut entry) = setup(20);
        thin(&mut registry, &mut entry, 100.0);
        assert_eq!(registry.get("c").unwrap().point_count(), 20);
        assert_eq!(entry.transform_version, 0);
    }

    #[test]
    fn thin_exact_count() {
        let (mut registry, mut entry) = setup(1000);
        thin(&mut registry, &mut entry, 25.0);
        assert_eq!(registry.get("c").unwrap().point_count(), 250);
        thin(&mut registry, &mut entry, 25.0);
        assert_eq!(registry.get("c").unwrap().point_count(), 63); // round(250*0.25)
    }

    #[test]
    fn delete_all_removes_cloud() {
        let (mut registry, mut entry) = setup(5);
        let all: HashSet<usize> = (0..5).collect();
        let removed = delete_selected(&mut registry, &mut entry, &all);
        assert!(removed);
        assert!(registry.get("c").is_none());
    }

    #[test]
    fn delete_some_compacts() {
        let (mut registry, mut entry) = setup(5);
        let mut sel = HashSet::new();
        sel.insert(1);
        sel.insert(3);
        let removed = delete_selected(&mut registry, &mut entry, &sel);
        assert!(!removed);
        assert_eq!(registry.get("c").unwrap().point_count(), 3);
    }
}
