//! Bookkeeping for an octree-backed cloud whose full data lives in an
//! external, pre-built octree store (spec §4.8). This module never mutates
//! the [`crate::cloud::CanonicalCloud`]; it only tracks which nodes are
//! currently resident and converts the backend's binary chunk stream into
//! point data the renderer can consume.

mod backend;
pub mod wire;

pub use backend::{BuildProgress, Camera, LodBackend, OctreeNode, OpenResult};

use std::collections::HashMap;
use std::time::Instant;

use log::{debug, info, warn};

use crate::cloud::CanonicalCloud;
use crate::config::LodConfig;

/// One resident node's decoded, GPU-ready buffers.
#[derive(Clone, Debug, PartialEq)]
pub struct PointChunk {
    /// Backend-assigned node id.
    pub node_id: String,
    /// Node center in the backend's native (Z-up) frame.
    pub center: glam::DVec3,
    /// Tree depth.
    pub level: u32,
    /// Average inter-point spacing.
    pub spacing: f32,
    /// Flattened XYZ triples, already Y-up and world-offset.
    pub positions: Vec<f32>,
    /// Flattened 8-bit RGB triples.
    pub colors: Vec<u8>,
    /// Per-point 16-bit intensity.
    pub intensities: Vec<u16>,
    /// Per-point 8-bit classification.
    pub classifications: Vec<u8>,
}

impl PointChunk {
    /// Number of points in this chunk.
    pub fn point_count(&self) -> usize {
        self.positions.len() / 3
    }
}

struct LoadedNode {
    chunk: PointChunk,
    last_used: Instant,
}

/// Tracks which octree nodes are resident for one cloud, enforcing the point
/// budget and throttling backend queries (spec §4.8).
pub struct LodController<B: LodBackend> {
    backend: B,
    config: LodConfig,
    cloud_id: String,
    world_offset: glam::DVec3,
    loaded: HashMap<String, LoadedNode>,
    last_tick: Option<Instant>,
    last_camera: Option<Camera>,
    last_budget: u64,
    disposed: bool,
}

impl<B: LodBackend> std::fmt::Debug for LodController<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LodController")
            .field("cloud_id", &self.cloud_id)
            .field("loaded_count", &self.loaded.len())
            .field("disposed", &self.disposed)
            .finish()
    }
}

impl<B: LodBackend> LodController<B> {
    /// Opens `path` through `backend` and begins tracking it, per
    /// [`LodBackend::open_pointcloud`].
    pub fn open(mut backend: B, path: &str, config: LodConfig) -> crate::Result<Self> {
        let opened = backend.open_pointcloud(path)?;
        let world_offset = (opened.bounds.0 + opened.bounds.1) * 0.5;
        info!(
            "opened LOD pointcloud {} ({} points)",
            opened.id, opened.total_points
        );
        Ok(LodController {
            backend,
            config,
            cloud_id: opened.id,
            world_offset,
            loaded: HashMap::new(),
            last_tick: None,
            last_camera: None,
            last_budget: config.point_budget,
            disposed: false,
        })
    }

    /// Node ids currently resident.
    pub fn loaded_node_ids(&self) -> impl Iterator<Item = &str> {
        self.loaded.keys().map(String::as_str)
    }

    /// Total points across all resident nodes.
    pub fn resident_point_count(&self) -> u64 {
        self.loaded.values().map(|n| n.chunk.point_count() as u64).sum()
    }

    /// Octree build progress for this cloud.
    pub fn progress(&mut self) -> crate::Result<BuildProgress> {
        self.backend.get_progress(&self.cloud_id)
    }

    /// Runs one update tick: skipped unless throttled interval has elapsed and
    /// the camera or point budget has actually changed; otherwise queries
    /// visibility, unloads nodes no longer visible, and loads missing ones in
    /// batches of `config.max_concurrent_fetches`. Backend errors are
    /// absorbed: the tick is skipped and logged, never propagated.
    pub fn tick(&mut self, camera: Camera, point_budget: u64) {
        if self.disposed {
            return;
        }
        let now = Instant::now();
        if let Some(last) = self.last_tick {
            if now.duration_since(last) < self.config.tick_interval {
                return;
            }
        }
        if !self.camera_moved(camera, point_budget) {
            return;
        }
        self.last_tick = Some(now);
        self.last_camera = Some(camera);
        self.last_budget = point_budget;

        let visible = match self.backend.get_visible_nodes(&self.cloud_id, camera, point_budget) {
            Ok(nodes) => nodes,
            Err(err) => {
                warn!("LOD backend error on tick, skipping: {err}");
                return;
            }
        };

        let visible_ids: std::collections::HashSet<String> =
            visible.iter().map(|n| n.node_id.clone()).collect();
        self.loaded.retain(|id, _| visible_ids.contains(id));

        let missing: Vec<String> = visible
            .iter()
            .filter(|n| !self.loaded.contains_key(&n.node_id))
            .map(|n| n.node_id.clone())
            .collect();

        for batch in missing.chunks(self.config.max_concurrent_fetches) {
            if self.disposed {
                return;
            }
            if let Err(err) = self.load_batch(batch) {
                warn!("LOD backend error fetching chunk batch, skipping: {err}");
                return;
            }
        }
    }

    fn camera_moved(&self, camera: Camera, point_budget: u64) -> bool {
        if point_budget != self.last_budget {
            return true;
        }
        let Some(last) = self.last_camera else {
            return true;
        };
        let position_delta = (camera.position - last.position).length();
        if position_delta > self.config.position_epsilon {
            return true;
        }
        let rotation_delta = (camera.rotation.x - last.rotation.x).abs()
            + (camera.rotation.y - last.rotation.y).abs()
            + (camera.rotation.z - last.rotation.z).abs()
            + (camera.rotation.w - last.rotation.w).abs();
        rotation_delta > self.config.rotation_epsilon
    }

    fn load_batch(&mut self, node_ids: &[String]) -> crate::Result<()> {
        let bytes = self.backend.get_nodes_binary(&self.cloud_id, node_ids)?;
        let chunks = wire::decode(&bytes).map_err(|e| crate::Error::BackendError(e.to_string()))?;
        if self.disposed {
            return Ok(());
        }
        for mut chunk in chunks {
            for p in chunk.positions.chunks_exact_mut(3) {
                let source = glam::DVec3::new(p[0] as f64, p[1] as f64, p[2] as f64);
                let yup = CanonicalCloud::to_yup(source, self.world_offset);
                p[0] = yup.x;
                p[1] = yup.y;
                p[2] = yup.z;
            }
            debug!(
                "loaded LOD node {} ({} points)",
                chunk.node_id,
                chunk.point_count()
            );
            self.loaded.insert(
                chunk.node_id.clone(),
                LoadedNode {
                    chunk,
                    last_used: Instant::now(),
                },
            );
        }
        Ok(())
    }

    /// Tears the controller down: disposes all resident buffers and marks the
    /// controller so any in-flight load batch discards its results instead of
    /// resurrecting them.
    pub fn dispose(&mut self) {
        self.disposed = true;
        self.loaded.clear();
    }
}
