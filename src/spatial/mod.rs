//! A uniform grid spatial index over a point cloud, and a PCA-based
//! per-point normal estimator built on top of it.

mod normals;

pub use normals::estimate_normals;

use std::collections::HashMap;

/// Integer cell coordinates.
type CellCoord = (i32, i32, i32);

/// A uniform grid indexed by integer cell coordinates, sized so the expected
/// cell occupancy is approximately `k` neighbors.
#[derive(Debug)]
pub struct UniformGrid {
    cell_size: f32,
    origin: glam::Vec3,
    cells: HashMap<CellCoord, Vec<u32>>,
    points: Vec<glam::Vec3>,
}

const MAX_RING_RADIUS: i32 = 5;

impl UniformGrid {
    /// Builds a grid over `positions` (flattened XYZ) sized for an expected
    /// neighbor count of `k`.
    ///
    /// `cellSize = extent / cbrt(n/k)`, falling back to `1.0` when the cloud
    /// is degenerate (zero extent or too few points).
    pub fn build(positions: &[f32], k: usize) -> Self {
        let points: Vec<glam::Vec3> = positions
            .chunks_exact(3)
            .map(|c| glam::Vec3::new(c[0], c[1], c[2]))
            .collect();
        let n = points.len();

        let mut min = glam::Vec3::splat(f32::INFINITY);
        let mut max = glam::Vec3::splat(f32::NEG_INFINITY);
        for p in &points {
            min = min.min(*p);
            max = max.max(*p);
        }
        let extent = if n == 0 {
            0.0
        } else {
            (max - min).max_element()
        };

        let cell_size = if n == 0 || k == 0 || extent <= 0.0 {
            1.0
        } else {
            let ratio = n as f32 / k as f32;
            if ratio <= 0.0 {
                1.0
            } else {
                extent / ratio.cbrt()
            }
        };
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 {
            cell_size
        } else {
            1.0
        };

        let origin = if n == 0 { glam::Vec3::ZERO } else { min };
        let mut grid = UniformGrid {
            cell_size,
            origin,
            cells: HashMap::new(),
            points,
        };
        for (i, p) in grid.points.clone().into_iter().enumerate() {
            grid.insert(i as u32, p);
        }
        grid
    }

    fn cell_of(&self, p: glam::Vec3) -> CellCoord {
        let rel = (p - self.origin) / self.cell_size;
        (
            rel.x.floor() as i32,
            rel.y.floor() as i32,
            rel.z.floor() as i32,
        )
    }

    /// Inserts point `i` at position `p` into the grid.
    pub fn insert(&mut self, i: u32, p: glam::Vec3) {
        self.cells.entry(self.cell_of(p)).or_default().push(i);
    }

    /// Cell size chosen at construction time.
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Returns up to `k` nearest neighbors of `query`, excluding `exclude`
    /// and sorted ascending by squared distance. Expands over concentric
    /// rings of cells up to a radius of 5; if still short, returns whatever
    /// it found.
    pub fn k_nearest(&self, query: glam::Vec3, k: usize, exclude: Option<u32>) -> Vec<u32> {
        let center = self.cell_of(query);
        let mut found: Vec<(f32, u32)> = Vec::new();

        for radius in 0..=MAX_RING_RADIUS {
            found.clear();
            for dx in -radius..=radius {
                for dy in -radius..=radius {
                    for dz in -radius..=radius {
                        // Only visit the outer shell once radius has grown past 0;
                        // re-scanning the whole cube each time keeps this simple and
                        // correct, at the cost of revisiting inner cells.
                        let cell = (center.0 + dx, center.1 + dy, center.2 + dz);
                        if let Some(ids) = self.cells.get(&cell) {
                            for &id in ids {
                                if Some(id) == exclude {
                                    continue;
                                }
                                let p = self.points[id as usize];
                                let d2 = (p - query).length_squared();
                                found.push((d2, id));
                            }
                        }
                    }
                }
            }
            if found.len() >= k || radius == MAX_RING_RADIUS {
                break;
            }
        }

        found.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        found.truncate(k);
        found.into_iter().map(|(_, id)| id).collect()
    }

    /// Position of point `i`.
    pub fn point(&self, i: u32) -> glam::Vec3 {
        self.points[i as usize]
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the grid holds no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn k_nearest_excludes_self_and_sorts_ascending() {
        let positions = vec![
            0.0, 0.0, 0.0, // 0
            1.0, 0.0, 0.0, // 1
            2.0, 0.0, 0.0, // 2
            0.5, 0.0, 0.0, // 3
        ];
        let grid = UniformGrid::build(&positions, 3);
        let neighbors = grid.k_nearest(glam::Vec3::ZERO, 3, Some(0));
        assert_eq!(neighbors[0], 3); // closest: 0.5
        assert_eq!(neighbors.len(), 3);
    }

    #[test]
    fn degenerate_cloud_falls_back_to_unit_cell() {
        let grid = UniformGrid::build(&[], 10);
        assert_eq!(grid.cell_size(), 1.0);
    }
}
