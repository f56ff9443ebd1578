//! The external pre-built octree store this crate treats as an opaque
//! collaborator (spec §6). The LOD controller only ever talks to it through
//! this trait; no implementation of the backend itself lives in this crate.

use crate::Result;

/// One octree node's bookkeeping, as reported by the backend.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OctreeNode {
    /// Backend-assigned node id.
    pub node_id: String,
    /// AABB min/max in the backend's native (Z-up) frame.
    pub bounds: (glam::DVec3, glam::DVec3),
    /// Depth in the octree.
    pub level: u32,
    /// Number of points sampled into this node.
    pub point_count: u64,
    /// Whether this node has children.
    pub has_children: bool,
}

/// Metadata returned by [`LodBackend::open_pointcloud`].
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OpenResult {
    /// Backend-assigned cloud id.
    pub id: String,
    /// Source format tag.
    pub format: String,
    /// Total point count across the whole octree.
    pub total_points: u64,
    /// AABB bounds, backend-native frame.
    pub bounds: (glam::DVec3, glam::DVec3),
    /// Whether the source carries per-point color.
    pub has_color: bool,
    /// Whether the source carries per-point intensity.
    pub has_intensity: bool,
    /// Whether the source carries per-point classification.
    pub has_classification: bool,
}

/// Octree build progress, as reported by the backend.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BuildProgress {
    /// `0..=1`.
    pub progress: f32,
    /// Human-readable phase.
    pub phase: String,
}

/// A camera pose as seen by the LOD visibility query.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Camera {
    /// World-space camera position.
    pub position: glam::DVec3,
    /// Camera orientation.
    pub rotation: glam::DQuat,
    /// Vertical field of view, radians.
    pub fov: f32,
    /// Viewport aspect ratio.
    pub aspect: f32,
    /// Viewport height in pixels, used for screen-space error sizing.
    pub screen_height: f32,
}

/// The LOD backend's four operations (spec §6).
pub trait LodBackend {
    /// Opens a pre-built octree store for `path`.
    fn open_pointcloud(&mut self, path: &str) -> Result<OpenResult>;

    /// Queries which nodes are visible for `camera` under `point_budget`.
    fn get_visible_nodes(&mut self, id: &str, camera: Camera, point_budget: u64) -> Result<Vec<OctreeNode>>;

    /// Fetches the binary chunk payload (spec §4.10 wire format) for the
    /// given node ids.
    fn get_nodes_binary(&mut self, id: &str, node_ids: &[String]) -> Result<Vec<u8>>;

    /// Reports octree build progress for `id`.
    fn get_progress(&mut self, id: &str) -> Result<BuildProgress>;
}
