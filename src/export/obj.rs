//! OBJ exporter, per spec §4.9: `v x y z [r g b]`, an optional `vn` line per
//! vertex when the cloud carries per-point normals, and 1-based `f` faces
//! (`a b c`, or `a//a b//b c//c` when normals are present).

use crate::cloud::CanonicalCloud;

/// Serializes `cloud` as OBJ text. `normals`, when given, must have one
/// `glam::Vec3` per point; OBJ has no canonical place to carry normals on a
/// point cloud's own fields, so callers that computed them (e.g. via the
/// normal estimator) pass them in explicitly.
pub fn encode(cloud: &CanonicalCloud, normals: Option<&[glam::Vec3]>) -> Vec<u8> {
    let mut out = String::new();

    for i in 0..cloud.point_count() {
        let x = cloud.positions[i * 3];
        let y = cloud.positions[i * 3 + 1];
        let z = cloud.positions[i * 3 + 2];
        if cloud.has_color {
            let rgb = super::rgb_bytes(cloud, i);
            out.push_str(&format!("v {x} {y} {z} {} {} {}\n", rgb[0], rgb[1], rgb[2]));
        } else {
            out.push_str(&format!("v {x} {y} {z}\n"));
        }
    }

    if let Some(normals) = normals {
        for n in normals {
            out.push_str(&format!("vn {} {} {}\n", n.x, n.y, n.z));
        }
    }

    if let Some(indices) = &cloud.indices {
        for face in indices.chunks_exact(3) {
            let (a, b, c) = (face[0] + 1, face[1] + 1, face[2] + 1);
            if normals.is_some() {
                out.push_str(&format!("f {a}//{a} {b}//{b} {c}//{c}\n"));
            } else {
                out.push_str(&format!("f {a} {b} {c}\n"));
            }
        }
    }

    out.into_bytes()
}
