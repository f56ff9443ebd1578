//! Per-point normal estimation via PCA over a local neighborhood, solved with
//! the analytic symmetric 3x3 eigenvalue formula rather than an iterative
//! solver.

use super::UniformGrid;

/// Estimates a unit normal per point by gathering up to `k` neighbors
/// (excluding self) and taking the eigenvector of the smallest eigenvalue of
/// their covariance. Points with fewer than 3 neighbors get `(0, 1, 0)`.
pub fn estimate_normals(grid: &UniformGrid, k: usize) -> Vec<glam::Vec3> {
    (0..grid.len() as u32)
        .map(|i| estimate_one(grid, i, k))
        .collect()
}

fn estimate_one(grid: &UniformGrid, i: u32, k: usize) -> glam::Vec3 {
    let p = grid.point(i);
    let neighbor_ids = grid.k_nearest(p, k, Some(i));
    if neighbor_ids.len() < 3 {
        return glam::Vec3::Y;
    }
    let neighbors: Vec<glam::Vec3> = neighbor_ids.iter().map(|&id| grid.point(id)).collect();

    let centroid = neighbors.iter().fold(glam::Vec3::ZERO, |a, b| a + *b) / neighbors.len() as f32;

    let mut cov = [[0.0f32; 3]; 3];
    for n in &neighbors {
        let d = *n - centroid;
        let v = [d.x, d.y, d.z];
        for r in 0..3 {
            for c in 0..3 {
                cov[r][c] += v[r] * v[c];
            }
        }
    }
    let count = neighbors.len() as f32;
    for row in cov.iter_mut() {
        for v in row.iter_mut() {
            *v /= count;
        }
    }

    let normal = match smallest_eigenvector(cov) {
        Some(n) => n,
        None => return glam::Vec3::Y,
    };

    // Orient so the normal points from the neighborhood centroid toward the point.
    let to_point = p - centroid;
    if normal.dot(to_point) < 0.0 {
        -normal
    } else {
        normal
    }
}

/// Solves for the eigenvector of the smallest eigenvalue of a symmetric 3x3
/// matrix, using the trigonometric solution for the characteristic cubic
/// (spec §4.6).
fn smallest_eigenvector(m: [[f32; 3]; 3]) -> Option<glam::Vec3> {
    let (a, b, c) = (m[0][0], m[0][1], m[0][2]);
    let (d, e) = (m[1][1], m[1][2]);
    let f = m[2][2];

    let q = (a + d + f) / 3.0;
    let p_sq = ((a - q).powi(2) + (d - q).powi(2) + (f - q).powi(2) + 2.0 * (b * b + c * c + e * e)) / 6.0;
    let p = p_sq.sqrt();
    if p < 1e-15 {
        return None;
    }

    // (M - qI) / p
    let b_mat = [
        [(a - q) / p, b / p, c / p],
        [b / p, (d - q) / p, e / p],
        [c / p, e / p, (f - q) / p],
    ];
    let det_b = det3(b_mat);
    let phi = (det_b / 2.0).clamp(-1.0, 1.0).acos() / 3.0;

    let two_pi_over_3 = std::f32::consts::TAU / 3.0;
    let lambda = q + 2.0 * p * (phi + two_pi_over_3).cos();

    // Null space of M - lambda*I via cross products of rows, trying all three
    // pairs to dodge degenerate ones.
    let shifted = [
        [a - lambda, b, c],
        [b, d - lambda, e],
        [c, e, f - lambda],
    ];
    let rows = [
        glam::Vec3::new(shifted[0][0], shifted[0][1], shifted[0][2]),
        glam::Vec3::new(shifted[1][0], shifted[1][1], shifted[1][2]),
        glam::Vec3::new(shifted[2][0], shifted[2][1], shifted[2][2]),
    ];
    let pairs = [(0, 1), (0, 2), (1, 2)];
    for (i, j) in pairs {
        let cross = rows[i].cross(rows[j]);
        if cross.length() > 1e-12 {
            return Some(cross.normalize());
        }
    }
    None
}

fn det3(m: [[f32; 3]; 3]) -> f32 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planar_grid_yields_up_normals() {
        let mut positions = Vec::new();
        for x in 0..5 {
            for z in 0..5 {
                positions.extend_from_slice(&[x as f32, 0.0, z as f32]);
            }
        }
        let grid = UniformGrid::build(&positions, 8);
        let normals = estimate_normals(&grid, 8);
        for n in &normals {
            assert!(n.y.abs() > 0.9, "expected near-vertical normal, got {n:?}");
        }
    }

    #[test]
    fn sparse_point_falls_back_to_up() {
        let positions = vec![0.0, 0.0, 0.0, 100.0, 100.0, 100.0];
        let grid = UniformGrid::build(&positions, 8);
        let normals = estimate_normals(&grid, 8);
        assert_eq!(normals[0], glam::Vec3::Y);
    }
}
