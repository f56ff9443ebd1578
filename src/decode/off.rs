//! OFF / COFF / NOFF / CNOFF decoder, per spec §4.1. The magic token says
//! whether a per-vertex color triple and/or normal triple follow XYZ; vertex
//! data order is position, then color (if present), then normal (if
//! present), matching the `C`-before-`N` prefix ordering. Faces carry no
//! color of their own in this family and are fan-triangulated.

use crate::cloud::{CanonicalCloud, Header, DEFAULT_GRAY};
use crate::decode::stride;
use crate::{Error, Result};

fn next_usize<'a>(tokens: &mut impl Iterator<Item = &'a str>, what: &'static str) -> Result<usize> {
    tokens
        .next()
        .and_then(|t| t.parse::<usize>().ok())
        .ok_or(Error::Truncated { format: "OFF", detail: what.into() })
}

fn next_f64<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> f64 {
    tokens.next().and_then(|t| t.parse::<f64>().ok()).unwrap_or(0.0)
}

/// Decodes an OFF-family byte buffer.
pub fn decode(bytes: &[u8]) -> Result<CanonicalCloud> {
    let text = std::str::from_utf8(bytes).map_err(|_| Error::Truncated {
        format: "OFF",
        detail: "file is not valid UTF-8".into(),
    })?;

    let mut tokens = text
        .lines()
        .filter(|l| !l.trim_start().starts_with('#'))
        .flat_map(str::split_whitespace);

    let magic = tokens.next().ok_or(Error::InvalidSignature { format: "OFF" })?;
    let (has_color, has_normal) = match magic {
        "OFF" => (false, false),
        "COFF" => (true, false),
        "NOFF" => (false, true),
        "CNOFF" => (true, true),
        _ => return Err(Error::InvalidSignature { format: "OFF" }),
    };

    let vertex_count = next_usize(&mut tokens, "missing vertex count")?;
    let face_count = next_usize(&mut tokens, "missing face count")?;
    let _edge_count = next_usize(&mut tokens, "missing edge count")?;

    let mut raw_positions = Vec::with_capacity(vertex_count);
    let mut raw_colors: Vec<Option<[f64; 3]>> = Vec::with_capacity(vertex_count);

    for _ in 0..vertex_count {
        let x = next_f64(&mut tokens);
        let y = next_f64(&mut tokens);
        let z = next_f64(&mut tokens);
        raw_positions.push(glam::DVec3::new(x, y, z));
        if has_color {
            let r = next_f64(&mut tokens);
            let g = next_f64(&mut tokens);
            let b = next_f64(&mut tokens);
            raw_colors.push(Some([r, g, b]));
        } else {
            raw_colors.push(None);
        }
        if has_normal {
            next_f64(&mut tokens);
            next_f64(&mut tokens);
            next_f64(&mut tokens);
        }
    }

    if raw_positions.is_empty() {
        return Err(Error::EmptyCloud);
    }

    let mut faces: Vec<Vec<usize>> = Vec::with_capacity(face_count);
    for _ in 0..face_count {
        let Some(n_str) = tokens.next() else { break };
        let Ok(n) = n_str.parse::<usize>() else { continue };
        let mut face = Vec::with_capacity(n);
        for _ in 0..n {
            if let Some(idx) = tokens.next().and_then(|t| t.parse::<usize>().ok()) {
                face.push(idx);
            }
        }
        if face.len() == n && n >= 3 {
            faces.push(face);
        }
    }

    let vertex_total = raw_positions.len();
    let has_faces = !faces.is_empty();
    let keep: Vec<usize> = if has_faces {
        (0..vertex_total).collect()
    } else {
        stride::sampled_indices(vertex_total).collect()
    };

    let mut header = Header::empty("off");
    for &i in &keep {
        header.grow(raw_positions[i]);
    }
    let center = (header.min + header.max) * 0.5;
    header.source_tag = "off";

    let max_channel = raw_colors
        .iter()
        .flatten()
        .flat_map(|c| c.iter().copied())
        .fold(0.0f64, f64::max);
    let divisor = if max_channel > 1.0 { 255.0 } else { 1.0 };

    let n = keep.len();
    let mut positions = Vec::with_capacity(n * 3);
    let mut colors = Vec::with_capacity(n * 3);
    let mut remap = vec![u32::MAX; vertex_total];
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
            for i in 1..face.len() - 1 {
                let (a, b, c) = (face[0], face[i], face[i + 1]);
                if a < vertex_total && b < vertex_total && c < vertex_total {
                    out.push(remap[a]);
                    out.push(remap[b]);
                    out.push(remap[c]);
                }
            }
        }
        if out.is_empty() { None } else { Some(out) }
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
    fn plain_off_triangle() {
        let text = "OFF\n3 1 0\n0 0 0\n1 0 0\n0 1 0\n3 0 1 2\n";
        let cloud = decode(text.as_bytes()).unwrap();
        assert_eq!(cloud.point_count(), 3);
        assert_eq!(cloud.indices.as_ref().unwrap(), &vec![0, 1, 2]);
        assert!(!cloud.has_color);
    }

    #[test]
    fn coff_carries_vertex_color() {
        let text = "COFF\n1 0 0\n0 0 0 255 0 0\n";
        let cloud = decode(text.as_bytes()).unwrap();
        assert!(cloud.has_color);
        assert_eq!(cloud.colors, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn quad_face_is_fan_triangulated() {
        let text = "OFF\n4 1 0\n0 0 0\n1 0 0\n1 1 0\n0 1 0\n4 0 1 2 3\n";
        let cloud = decode(text.as_bytes()).unwrap();
        assert_eq!(cloud.indices.unwrap().len(), 6);
    }

    #[test]
    fn unknown_magic_is_rejected() {
        let err = decode(b"XOFF\n0 0 0\n").unwrap_err();
        assert!(matches!(err, Error::InvalidSignature { format: "OFF" }));
    }
}
