//! STL decoder: binary and ASCII, per spec §4.1. Vertex dedup uses a
//! canonical-string spatial hash so triangles sharing a vertex position emit
//! one shared index rather than three duplicate vertices.

use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::HashMap;
use std::io::Cursor;

use crate::cloud::{CanonicalCloud, Header, DEFAULT_GRAY};
use crate::{Error, Result};

struct RawTriangle {
    vertices: [glam::DVec3; 3],
    color: Option<[f32; 3]>,
}

/// Decodes an STL byte buffer, auto-detecting binary vs. ASCII by exact
/// byte-length match against `84 + triCount*50` (spec §4.1): a file of that
/// exact length is binary even if it begins with `solid`.
pub fn decode(bytes: &[u8]) -> Result<CanonicalCloud> {
    if bytes.len() >= 84 {
        let tri_count = u32::from_le_bytes(bytes[80..84].try_into().unwrap()) as u64;
        if bytes.len() as u64 == 84 + tri_count * 50 {
            return build_cloud(decode_binary(bytes, tri_count as usize)?);
        }
    }
    build_cloud(decode_ascii(bytes)?)
}

fn decode_binary(bytes: &[u8], tri_count: usize) -> Result<Vec<RawTriangle>> {
    let mut cursor = Cursor::new(&bytes[84..]);
    let mut triangles = Vec::with_capacity(tri_count);
    for _ in 0..tri_count {
        // Normal vector: ignored per spec.
        cursor.read_f32::<LittleEndian>()?;
        cursor.read_f32::<LittleEndian>()?;
        cursor.read_f32::<LittleEndian>()?;

        let mut vertices = [glam::DVec3::ZERO; 3];
        for v in vertices.iter_mut() {
            let x = cursor.read_f32::<LittleEndian>()? as f64;
            let y = cursor.read_f32::<LittleEndian>()? as f64;
            let z = cursor.read_f32::<LittleEndian>()? as f64;
            *v = glam::DVec3::new(x, y, z);
        }

        let attribute = cursor.read_u16::<LittleEndian>()?;
        let color = if attribute & 0x8000 != 0 {
            let b = ((attribute >> 10) & 0x1f) as f32 * 255.0 / 31.0;
            let g = ((attribute >> 5) & 0x1f) as f32 * 255.0 / 31.0;
            let r = (attribute & 0x1f) as f32 * 255.0 / 31.0;
            Some([r / 255.0, g / 255.0, b / 255.0])
        } else {
            None
        };

        triangles.push(RawTriangle { vertices, color });
    }
    Ok(triangles)
}

fn decode_ascii(bytes: &[u8]) -> Result<Vec<RawTriangle>> {
    let text = std::str::from_utf8(bytes).map_err(|_| Error::Truncated {
        format: "STL",
        detail: "ascii STL is not valid UTF-8".into(),
    })?;

    let mut triangles = Vec::new();
    let mut current: Vec<glam::DVec3> = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("vertex") {
            let values: Vec<f64> = rest
                .split_whitespace()
                .map(|t| t.parse::<f64>().unwrap_or(0.0))
                .collect();
            if values.len() >= 3 {
                current.push(glam::DVec3::new(values[0], values[1], values[2]));
            }
        } else if line.starts_with("endfacet") {
            if current.len() == 3 {
                triangles.push(RawTriangle {
                    vertices: [current[0], current[1], current[2]],
                    color: None,
                });
            }
            current.clear();
        }
    }
    Ok(triangles)
}

fn vertex_key(p: glam::DVec3) -> (i64, i64, i64) {
    let quantize = |v: f64| (v * 1_000_000.0).round() as i64;
    (quantize(p.x), quantize(p.y), quantize(p.z))
}

fn build_cloud(triangles: Vec<RawTriangle>) -> Result<CanonicalCloud> {
    if triangles.is_empty() {
        return Err(Error::EmptyCloud);
    }

    let mut header = Header::empty("stl");
    for tri in &triangles {
        for v in tri.vertices {
            header.grow(v);
        }
    }
    let center = (header.min + header.max) * 0.5;
    header.source_tag = "stl";

    let mut dedup: HashMap<(i64, i64, i64), u32> = HashMap::new();
    let mut positions = Vec::new();
    let mut vertex_colors: Vec<Option<[f32; 3]>> = Vec::new();
    let mut indices = Vec::new();

    for tri in &triangles {
        let mut face_indices = [0u32; 3];
        for (slot, &v) in tri.vertices.iter().enumerate() {
            let key = vertex_key(v);
            let idx = *dedup.entry(key).or_insert_with(|| {
                let p = CanonicalCloud::to_yup(v, center);
                positions.push(p.x);
                positions.push(p.y);
                positions.push(p.z);
                vertex_colors.push(tri.color);
                (positions.len() / 3 - 1) as u32
            });
            // If a later triangle supplies a color for an already-deduped vertex
            // that previously had none, adopt it.
            if vertex_colors[idx as usize].is_none() {
                vertex_colors[idx as usize] = tri.color;
            }
            face_indices[slot] = idx;
        }
        indices.extend_from_slice(&face_indices);
    }

    let has_color = vertex_colors.iter().any(Option::is_some);
    let n = positions.len() / 3;
    let mut colors = Vec::with_capacity(n * 3);
    for c in &vertex_colors {
        match c {
            Some([r, g, b]) => colors.extend_from_slice(&[*r, *g, *b]),
            None => colors.extend_from_slice(&DEFAULT_GRAY),
        }
    }

    let cloud = CanonicalCloud {
        positions,
        colors,
        intensities: vec![0.0; n],
        classifications: vec![0.0; n],
        indices: Some(indices),
        header,
        center,
        has_color,
        has_intensity: false,
        has_classification: false,
    };
    debug_assert!(cloud.check_invariants());
    Ok(cloud)
}
