//! OBJ decoder: `v`/`f` lines only, per spec §4.1. Faces are fan-triangulated
//! and, when present, stride sampling is disabled so triangle topology stays
//! valid against the full vertex list.

use crate::cloud::{CanonicalCloud, Header, DEFAULT_GRAY};
use crate::decode::stride;
use crate::{Error, Result};

/// Decodes an OBJ byte buffer.
pub fn decode(bytes: &[u8]) -> Result<CanonicalCloud> {
    let text = std::str::from_utf8(bytes).map_err(|_| Error::Truncated {
        format: "OBJ",
        detail: "file is not valid UTF-8".into(),
    })?;

    let mut raw_positions: Vec<glam::DVec3> = Vec::new();
    let mut raw_colors: Vec<Option<[f64; 3]>> = Vec::new();
    let mut faces: Vec<Vec<i64>> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("v") => {
                let rest: Vec<f64> = tokens.map(|t| t.parse::<f64>().unwrap_or(0.0)).collect();
                if rest.len() < 3 {
                    continue;
                }
                raw_positions.push(glam::DVec3::new(rest[0], rest[1], rest[2]));
                if rest.len() >= 6 {
                    raw_colors.push(Some([rest[3], rest[4], rest[5]]));
                } else {
                    raw_colors.push(None);
                }
            }
            Some("f") => {
                let mut indices = Vec::new();
                for token in tokens {
                    let first = token.split('/').next().unwrap_or("");
                    if let Ok(v) = first.parse::<i64>() {
                        indices.push(v);
                    }
                }
                if indices.len() >= 3 {
                    faces.push(indices);
                }
            }
            _ => {}
        }
    }

    if raw_positions.is_empty() {
        return Err(Error::EmptyCloud);
    }

    let vertex_count = raw_positions.len();
    let resolve = |v: i64| -> Option<usize> {
        if v > 0 {
            usize::try_from(v - 1).ok().filter(|i| *i < vertex_count)
        } else if v < 0 {
            let idx = vertex_count as i64 + v;
            usize::try_from(idx).ok()
        } else {
            None
        }
    };

    let has_faces = !faces.is_empty();
    let keep: Vec<usize> = if has_faces {
        (0..vertex_count).collect()
    } else {
        stride::sampled_indices(vertex_count).collect()
    };

    let mut header = Header::empty("obj");
    for &i in &keep {
        header.grow(raw_positions[i]);
    }
    let center = (header.min + header.max) * 0.5;
    header.source_tag = "obj";

    let has_color = raw_colors.iter().any(Option::is_some);
    let max_channel = raw_colors
        .iter()
        .flatten()
        .flat_map(|c| c.iter().copied())
        .fold(0.0f64, f64::max);
    let divisor = if max_channel > 1.0 { 255.0 } else { 1.0 };

    let n = keep.len();
    let mut positions = Vec::with_capacity(n * 3);
    let mut colors = Vec::with_capacity(n * 3);
    // When stride sampling is active (no faces), indices map old->new;
    // when faces are present `keep` is the identity map.
    let mut remap = vec![u32::MAX; vertex_count];
    for (new_idx, &old_idx) in keep.iter().enumerate() {
        remap[old_idx] = new_idx as u32;
        let p = CanonicalCloud::to_yup(raw_positions[old_idx], center);
        positions.push(p.x);
        positions.push(p.y);
        positions.push(p.z);
        match raw_colors[old_idx] {
            Some([r, g, b]) => {
                colors.push((r / divisor) as f32);
                colors.push((g / divisor) as f32);
                colors.push((b / divisor) as f32);
            }
            None => colors.extend_from_slice(&DEFAULT_GRAY),
        }
    }

    let indices = if has_faces {
        let mut out = Vec::new();
        for face in &faces {
            let resolved: Vec<usize> = face.iter().filter_map(|&v| resolve(v)).collect();
            if resolved.len() < 3 {
                continue;
            }
            for i in 1..resolved.len() - 1 {
                let (a, b, c) = (resolved[0], resolved[i], resolved[i + 1]);
                if remap[a] != u32::MAX && remap[b] != u32::MAX && remap[c] != u32::MAX {
                    out.push(remap[a]);
                    out.push(remap[b]);
                    out.push(remap[c]);
                }
            }
        }
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    } else {
        None
    };

    let cloud = CanonicalCloud {
        positions,
        colors,
        intensities: vec![0.0; n],
        classifications: vec![0.0; n],
        indices,
        header,
        center,
        has_color,
        has_intensity: false,
        has_classification: false,
    };
    debug_assert!(cloud.check_invariants());
    Ok(cloud)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertices_without_faces_are_a_point_cloud() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\n";
        let cloud = decode(text.as_bytes()).unwrap();
        assert_eq!(cloud.point_count(), 3);
        assert!(cloud.indices.is_none());
    }

    #[test]
    fn triangle_face_is_preserved() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let cloud = decode(text.as_bytes()).unwrap();
        assert_eq!(cloud.indices.as_ref().unwrap(), &vec![0, 1, 2]);
    }

    #[test]
    fn quad_face_is_fan_triangulated() {
        let text = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n";
        let cloud = decode(text.as_bytes()).unwrap();
        let indices = cloud.indices.unwrap();
        assert_eq!(indices.len(), 6); // 2 triangles
    }

    #[test]
    fn face_with_normal_and_texcoord_refs_uses_only_first_component() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1/1/1 2/2/2 3/3/3\n";
        let cloud = decode(text.as_bytes()).unwrap();
        assert_eq!(cloud.indices.as_ref().unwrap(), &vec![0, 1, 2]);
    }

    #[test]
    fn negative_face_indices_are_relative_to_vertex_count() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n";
        let cloud = decode(text.as_bytes()).unwrap();
        assert_eq!(cloud.indices.as_ref().unwrap(), &vec![0, 1, 2]);
    }

    #[test]
    fn vertex_colors_with_any_channel_over_one_are_treated_as_255_scale() {
        let text = "v 0 0 0 255 0 0\n";
        let cloud = decode(text.as_bytes()).unwrap();
        assert!(cloud.has_color);
        assert_eq!(cloud.colors, vec![1.0, 0.0, 0.0]);
    }
}
