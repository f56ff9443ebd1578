//! The process-wide mapping from cloud id to [`CanonicalCloud`], and the
//! UI-visible metadata kept alongside it.
//!
//! The registry is the single mutable owner of canonical clouds (spec §5,
//! "Shared-resource policy"). It is modeled as one owned structure passed by
//! reference rather than a module-level singleton, per spec §9.

use std::collections::HashMap;

use crate::cloud::CanonicalCloud;

/// UI-visible metadata for a loaded cloud, held separately from the buffers
/// the [`Registry`] owns.
#[derive(Clone, Debug, PartialEq)]
pub struct CloudEntry {
    /// UUID v4 string identifying this cloud.
    pub id: String,
    /// Display name shown in the UI.
    pub display_name: String,
    /// Path or identifier the cloud was loaded from.
    pub source_path: String,
    /// Decoder tag, e.g. `"las"`, `"ply-binary"`.
    pub source_tag: &'static str,
    /// Total point count at load time.
    pub total_points: usize,
    /// Source-frame bounds.
    pub bounds: (glam::DVec3, glam::DVec3),
    /// Whether the cloud carries per-point color.
    pub has_color: bool,
    /// Whether the cloud carries per-point intensity.
    pub has_intensity: bool,
    /// Whether the cloud carries per-point classification.
    pub has_classification: bool,
    /// Whether the cloud is currently shown by the renderer.
    pub visible: bool,
    /// LOD octree build progress in `[0, 1]`.
    pub indexing_progress: f32,
    /// Human-readable LOD build phase.
    pub indexing_phase: String,
    /// Monotonic counter bumped by every mutation; downstream observers
    /// (the renderer) use this to invalidate cached GPU buffers.
    pub transform_version: u64,
}

impl CloudEntry {
    /// Builds a fresh entry from a just-decoded cloud, with `transform_version`
    /// starting at zero.
    pub fn new(id: String, display_name: String, source_path: String, cloud: &CanonicalCloud) -> Self {
        CloudEntry {
            id,
            display_name,
            source_path,
            source_tag: cloud.header.source_tag,
            total_points: cloud.point_count(),
            bounds: (cloud.header.min, cloud.header.max),
            has_color: cloud.has_color,
            has_intensity: cloud.has_intensity,
            has_classification: cloud.has_classification,
            visible: true,
            indexing_progress: 0.0,
            indexing_phase: String::new(),
            transform_version: 0,
        }
    }
}

/// Process-wide mapping from cloud id to canonical cloud.
///
/// Set operations are total: `put` always succeeds (overwriting any existing
/// entry for that id), `get`/`remove` return `Option` rather than erroring on
/// a missing id. The registry does not publish change events; callers observe
/// mutation via [`CloudEntry::transform_version`].
#[derive(Debug, Default)]
pub struct Registry {
    clouds: HashMap<String, CanonicalCloud>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Registry::default()
    }

    /// Inserts or replaces the cloud stored under `id`.
    pub fn put(&mut self, id: impl Into<String>, cloud: CanonicalCloud) {
        let id = id.into();
        log::debug!("registry: put {id}");
        self.clouds.insert(id, cloud);
    }

    /// Looks up a cloud by id.
    pub fn get(&self, id: &str) -> Option<&CanonicalCloud> {
        self.clouds.get(id)
    }

    /// Looks up a cloud by id, mutably.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut CanonicalCloud> {
        self.clouds.get_mut(id)
    }

    /// Removes and returns the cloud stored under `id`, if any.
    pub fn remove(&mut self, id: &str) -> Option<CanonicalCloud> {
        log::debug!("registry: remove {id}");
        self.clouds.remove(id)
    }

    /// Tears down the registry, dropping every owned cloud.
    pub fn clear(&mut self) {
        self.clouds.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::Header;

    fn trivial_cloud() -> CanonicalCloud {
        CanonicalCloud {
            positions: vec![0.0, 0.0, 0.0],
            colors: vec![0.8, 0.8, 0.8],
            intensities: vec![0.0],
            classifications: vec![0.0],
            indices: None,
            header: Header::default(),
            center: glam::DVec3::ZERO,
            has_color: false,
            has_intensity: false,
            has_classification: false,
        }
    }

    #[test]
    fn put_get_remove_roundtrip() {
        let mut registry = Registry::new();
        registry.put("a", trivial_cloud());
        assert!(registry.get("a").is_some());
        assert!(registry.get("missing").is_none());
        let removed = registry.remove("a");
        assert!(removed.is_some());
        assert!(registry.get("a").is_none());
    }

    #[test]
    fn remove_is_total() {
        let mut registry = Registry::new();
        assert!(registry.remove("nope").is_none());
    }
}
