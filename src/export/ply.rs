//! PLY exporter, binary-little-endian and ASCII variants, per spec §4.9.
//!
//! Both share one vertex schema: `float x,y,z`, `uchar red,green,blue`,
//! `float intensity`, `uchar classification`; an optional `face` element
//! carries `property list uchar int vertex_indices`.

use byteorder::{LittleEndian, WriteBytesExt};

use crate::cloud::CanonicalCloud;

fn header(cloud: &CanonicalCloud, format: &str) -> String {
    let mut header = String::new();
    header.push_str("ply\n");
    header.push_str(&format!("format {format} 1.0\n"));
    header.push_str(&format!("element vertex {}\n", cloud.point_count()));
    header.push_str("property float x\n");
    header.push_str("property float y\n");
    header.push_str("property float z\n");
    header.push_str("property uchar red\n");
    header.push_str("property uchar green\n");
    header.push_str("property uchar blue\n");
    header.push_str("property float intensity\n");
    header.push_str("property uchar classification\n");
    if let Some(indices) = &cloud.indices {
        header.push_str(&format!("element face {}\n", indices.len() / 3));
        header.push_str("property list uchar int vertex_indices\n");
    }
    header.push_str("end_header\n");
    header
}

/// Serializes `cloud` as binary-little-endian PLY.
pub fn encode_binary(cloud: &CanonicalCloud) -> Vec<u8> {
    let mut out = header(cloud, "binary_little_endian").into_bytes();

    for i in 0..cloud.point_count() {
        let rgb = super::rgb_bytes(cloud, i);
        out.write_f32::<LittleEndian>(cloud.positions[i * 3]).unwrap();
        out.write_f32::<LittleEndian>(cloud.positions[i * 3 + 1]).unwrap();
        out.write_f32::<LittleEndian>(cloud.positions[i * 3 + 2]).unwrap();
        out.write_u8(rgb[0]).unwrap();
        out.write_u8(rgb[1]).unwrap();
        out.write_u8(rgb[2]).unwrap();
        out.write_f32::<LittleEndian>(cloud.intensities.get(i).copied().unwrap_or(0.0))
            .unwrap();
        out.write_u8(cloud.classifications.get(i).copied().unwrap_or(0.0) as u8)
            .unwrap();
    }

    if let Some(indices) = &cloud.indices {
        for face in indices.chunks_exact(3) {
            out.write_u8(3).unwrap();
            out.write_i32::<LittleEndian>(face[0] as i32).unwrap();
            out.write_i32::<LittleEndian>(face[1] as i32).unwrap();
            out.write_i32::<LittleEndian>(face[2] as i32).unwrap();
        }
    }

    out
}

/// Serializes `cloud` as ASCII PLY using the same vertex/face schema.
pub fn encode_ascii(cloud: &CanonicalCloud) -> Vec<u8> {
    let mut out = header(cloud, "ascii");

    for i in 0..cloud.point_count() {
        let rgb = super::rgb_bytes(cloud, i);
        let intensity = cloud.intensities.get(i).copied().unwrap_or(0.0);
        let classification = cloud.classifications.get(i).copied().unwrap_or(0.0) as u8;
        out.push_str(&format!(
            "{} {} {} {} {} {} {} {}\n",
            cloud.positions[i * 3],
            cloud.positions[i * 3 + 1],
            cloud.positions[i * 3 + 2],
            rgb[0],
            rgb[1],
            rgb[2],
            intensity,
            classification,
        ));
    }

    if let Some(indices) = &cloud.indices {
        for face in indices.chunks_exact(3) {
            out.push_str(&format!("3 {} {} {}\n", face[0], face[1], face[2]));
        }
    }

    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::Header;

    fn triangle_cloud() -> CanonicalCloud {
        CanonicalCloud {
            positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            colors: vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            intensities: vec![0.5, 0.5, 0.5],
            classifications: vec![2.0, 2.0, 2.0],
            indices: Some(vec![0, 1, 2]),
            header: Header::default(),
            center: glam::DVec3::ZERO,
            has_color: true,
            has_intensity: true,
            has_classification: true,
        }
    }

    #[test]
    fn binary_header_declares_vertex_and_face_elements() {
        let bytes = encode_binary(&triangle_cloud());
        let text = std::str::from_utf8(&bytes[..bytes.len().min(400)]).unwrap_or("");
        assert!(text.contains("element vertex 3"));
        assert!(text.contains("element face 1"));
        assert!(text.contains("format binary_little_endian 1.0"));
    }

    #[test]
    fn binary_body_length_matches_20_bytes_per_vertex_and_13_per_face() {
        let cloud = triangle_cloud();
        let bytes = encode_binary(&cloud);
        let header_len = header(&cloud, "binary_little_endian").len();
        let body_len = bytes.len() - header_len;
        assert_eq!(body_len, 3 * 20 + 1 * 13);
    }

    #[test]
    fn ascii_encodes_readable_rows() {
        let bytes = encode_ascii(&triangle_cloud());
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.contains("format ascii 1.0"));
        assert!(text.lines().any(|l| l == "3 0 1 2"));
        assert!(text.lines().any(|l| l.starts_with("0 0 0 255 0 0")));
    }

    #[test]
    fn color_rounds_and_clamps() {
        assert_eq!(super::super::color_byte(1.5), 255);
        assert_eq!(super::super::color_byte(-0.5), 0);
        assert_eq!(super::super::color_byte(0.5), 128);
    }
}
