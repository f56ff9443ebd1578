//! Typed, defaulted configuration for the reconstructor and the LOD
//! controller. Nothing in this crate reads environment variables or config
//! files (spec §6); these structs are the entirety of the "config layer".

/// Parameters for [`crate::reconstruct::reconstruct`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReconstructConfig {
    /// Neighbors considered per seed point.
    pub k_neighbors: usize,
    /// Maximum edge length for an emitted triangle; `None` derives it as
    /// `2 * cell_size` from the spatial index at reconstruction time.
    pub max_edge_length: Option<f32>,
}

impl Default for ReconstructConfig {
    fn default() -> Self {
        ReconstructConfig {
            k_neighbors: 15,
            max_edge_length: None,
        }
    }
}

/// Parameters for [`crate::lod::LodController`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LodConfig {
    /// Maximum simultaneously resident points across all loaded nodes.
    pub point_budget: u64,
    /// Maximum outstanding chunk fetch requests per batch.
    pub max_concurrent_fetches: usize,
    /// Minimum interval between ticks.
    pub tick_interval: std::time::Duration,
    /// Minimum positional camera delta (world units) that counts as movement.
    pub position_epsilon: f64,
    /// Minimum rotational camera delta (radians, L1) that counts as movement.
    pub rotation_epsilon: f64,
}

impl Default for LodConfig {
    fn default() -> Self {
        LodConfig {
            point_budget: 5_000_000,
            max_concurrent_fetches: 15,
            tick_interval: std::time::Duration::from_millis(100), // 10 Hz
            position_epsilon: 1e-3,
            rotation_epsilon: 1e-3,
        }
    }
}
