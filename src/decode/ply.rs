//! PLY decoder: ASCII and binary little-endian, per spec §4.1.
//!
//! The header declares a dynamic per-element property schema; rather than
//! reflecting over a generated type, it's represented as an explicit
//! [`PropertyType`]/[`Element`] schema and decoded through a small
//! interpreter, per spec §9 ("Dynamic typing in decoders").

use crate::cloud::{CanonicalCloud, Header, DEFAULT_GRAY};
use crate::decode::stride;
use crate::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ScalarType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float32,
    Float64,
}

impl ScalarType {
    fn byte_size(self) -> usize {
        match self {
            ScalarType::Int8 | ScalarType::UInt8 => 1,
            ScalarType::Int16 | ScalarType::UInt16 => 2,
            ScalarType::Int32 | ScalarType::UInt32 => 4,
            ScalarType::Float32 => 4,
            ScalarType::Float64 => 8,
        }
    }

    fn parse(token: &str) -> Option<ScalarType> {
        Some(match token {
            "char" | "int8" => ScalarType::Int8,
            "uchar" | "uint8" => ScalarType::UInt8,
            "short" | "int16" => ScalarType::Int16,
            "ushort" | "uint16" => ScalarType::UInt16,
            "int" | "int32" => ScalarType::Int32,
            "uint" | "uint32" => ScalarType::UInt32,
            "float" | "float32" => ScalarType::Float32,
            "double" | "float64" => ScalarType::Float64,
            _ => return None,
        })
    }

    fn read_binary(self, bytes: &[u8]) -> f64 {
        match self {
            ScalarType::Int8 => bytes[0] as i8 as f64,
            ScalarType::UInt8 => bytes[0] as f64,
            ScalarType::Int16 => i16::from_le_bytes(bytes[0..2].try_into().unwrap()) as f64,
            ScalarType::UInt16 => u16::from_le_bytes(bytes[0..2].try_into().unwrap()) as f64,
            ScalarType::Int32 => i32::from_le_bytes(bytes[0..4].try_into().unwrap()) as f64,
            ScalarType::UInt32 => u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as f64,
            ScalarType::Float32 => f32::from_le_bytes(bytes[0..4].try_into().unwrap()) as f64,
            ScalarType::Float64 => f64::from_le_bytes(bytes[0..8].try_into().unwrap()),
        }
    }
}

#[derive(Clone, Debug)]
enum Property {
    Scalar { name: String, ty: ScalarType },
    List { name: String, count_ty: ScalarType, value_ty: ScalarType },
}

impl Property {
    fn name(&self) -> &str {
        match self {
            Property::Scalar { name, .. } => name,
            Property::List { name, .. } => name,
        }
    }
}

struct Element {
    name: String,
    count: usize,
    properties: Vec<Property>,
}

enum Format {
    Ascii,
    BinaryLittleEndian,
}

/// Decodes a PLY byte buffer (ASCII or binary little-endian).
pub fn decode(bytes: &[u8]) -> Result<CanonicalCloud> {
    if !bytes.starts_with(b"ply") {
        return Err(Error::InvalidSignature { format: "PLY" });
    }
    let header_end = find_header_end(bytes)?;
    let header_text = std::str::from_utf8(&bytes[..header_end]).map_err(|_| Error::Truncated {
        format: "PLY",
        detail: "header is not valid UTF-8".into(),
    })?;

    let (format, elements) = parse_header(header_text)?;
    let body = &bytes[header_end..];

    let vertex_index = elements
        .iter()
        .position(|e| e.name == "vertex")
        .ok_or(Error::EmptyCloud)?;

    let rows = match format {
        Format::Ascii => parse_ascii_body(body, &elements, vertex_index)?,
        Format::BinaryLittleEndian => parse_binary_body(body, &elements, vertex_index)?,
    };

    build_cloud(&elements[vertex_index], rows)
}

fn find_header_end(bytes: &[u8]) -> Result<usize> {
    const NEEDLE: &[u8] = b"end_header";
    let pos = bytes
        .windows(NEEDLE.len())
        .position(|w| w == NEEDLE)
        .ok_or(Error::Truncated {
            format: "PLY",
            detail: "missing end_header".into(),
        })?;
    // Consume through the newline following `end_header`.
    let mut end = pos + NEEDLE.len();
    while end < bytes.len() && bytes[end] != b'\n' {
        end += 1;
    }
    Ok((end + 1).min(bytes.len()))
}

fn parse_header(text: &str) -> Result<(Format, Vec<Element>)> {
    let mut format = None;
    let mut elements: Vec<Element> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("comment") || line == "ply" {
            continue;
        }
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("format") => {
                format = match tokens.next() {
                    Some("ascii") => Some(Format::Ascii),
                    Some("binary_little_endian") => Some(Format::BinaryLittleEndian),
                    Some(other) => {
                        return Err(Error::UnsupportedVariant {
                            format: "PLY",
                            detail: format!("unsupported format {other}"),
                        })
                    }
                    None => None,
                };
            }
            Some("element") => {
                let name = tokens.next().unwrap_or_default().to_string();
                let count: usize = tokens.next().unwrap_or("0").parse().unwrap_or(0);
                elements.push(Element {
                    name,
                    count,
                    properties: Vec::new(),
                });
            }
            Some("property") => {
                let Some(element) = elements.last_mut() else {
                    continue;
                };
                let next = tokens.next().unwrap_or_default();
                if next == "list" {
                    let count_ty = ScalarType::parse(tokens.next().unwrap_or_default())
                        .unwrap_or(ScalarType::UInt8);
                    let value_ty = ScalarType::parse(tokens.next().unwrap_or_default())
                        .unwrap_or(ScalarType::Int32);
                    let name = tokens.next().unwrap_or_default().to_string();
                    element.properties.push(Property::List { name, count_ty, value_ty });
                } else {
                    let ty = ScalarType::parse(next).unwrap_or(ScalarType::Float32);
                    let name = tokens.next().unwrap_or_default().to_string();
                    element.properties.push(Property::Scalar { name, ty });
                }
            }
            _ => {}
        }
    }

    let format = format.ok_or(Error::Truncated {
        format: "PLY",
        detail: "missing format line".into(),
    })?;
    Ok((format, elements))
}

/// One vertex's named scalar fields, keyed by property name.
type Row = std::collections::HashMap<String, f64>;

fn parse_ascii_body(body: &[u8], elements: &[Element], vertex_index: usize) -> Result<Vec<Row>> {
    let text = std::str::from_utf8(body).map_err(|_| Error::Truncated {
        format: "PLY",
        detail: "ascii body is not valid UTF-8".into(),
    })?;
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let mut rows = Vec::new();

    for (ei, element) in elements.iter().enumerate() {
        for _ in 0..element.count {
            let line = lines.next().ok_or(Error::Truncated {
                format: "PLY",
                detail: "fewer data lines than declared element count".into(),
            })?;
            let mut tokens = line.split_whitespace();
            if ei == vertex_index {
                let mut row = Row::new();
                for prop in &element.properties {
                    match prop {
                        Property::Scalar { name, .. } => {
                            let v: f64 = tokens.next().unwrap_or("0").parse().unwrap_or(0.0);
                            row.insert(name.clone(), v);
                        }
                        Property::List { .. } => {
                            let count: usize = tokens.next().unwrap_or("0").parse().unwrap_or(0);
                            for _ in 0..count {
                                tokens.next();
                            }
                        }
                    }
                }
                rows.push(row);
            }
            // Non-vertex elements: tokens are simply dropped with the line.
        }
    }
    Ok(rows)
}

fn parse_binary_body(body: &[u8], elements: &[Element], vertex_index: usize) -> Result<Vec<Row>> {
    let mut cursor = 0usize;
    let mut rows = Vec::new();

    for (ei, element) in elements.iter().enumerate() {
        for _ in 0..element.count {
            if ei == vertex_index {
                let mut row = Row::new();
                for prop in &element.properties {
                    match prop {
                        Property::Scalar { name, ty } => {
                            let size = ty.byte_size();
                            let bytes = read_n(body, &mut cursor, size)?;
                            row.insert(name.clone(), ty.read_binary(bytes));
                        }
                        Property::List { count_ty, value_ty, .. } => {
                            let count_bytes = read_n(body, &mut cursor, count_ty.byte_size())?;
                            let count = count_ty.read_binary(count_bytes) as usize;
                            for _ in 0..count {
                                read_n(body, &mut cursor, value_ty.byte_size())?;
                            }
                        }
                    }
                }
                rows.push(row);
            } else {
                for prop in &element.properties {
                    match prop {
                        Property::Scalar { ty, .. } => {
                            read_n(body, &mut cursor, ty.byte_size())?;
                        }
                        Property::List { count_ty, value_ty, .. } => {
                            let count_bytes = read_n(body, &mut cursor, count_ty.byte_size())?;
                            let count = count_ty.read_binary(count_bytes) as usize;
                            for _ in 0..count {
                                read_n(body, &mut cursor, value_ty.byte_size())?;
                            }
                        }
                    }
                }
            }
        }
    }
    Ok(rows)
}

fn read_n<'a>(body: &'a [u8], cursor: &mut usize, n: usize) -> Result<&'a [u8]> {
    if *cursor + n > body.len() {
        return Err(Error::Truncated {
            format: "PLY",
            detail: "binary body ended before declared element/property count was satisfied".into(),
        });
    }
    let slice = &body[*cursor..*cursor + n];
    *cursor += n;
    Ok(slice)
}

fn build_cloud(vertex_element: &Element, rows: Vec<Row>) -> Result<CanonicalCloud> {
    if rows.is_empty() {
        return Err(Error::EmptyCloud);
    }
    let names: Vec<&str> = vertex_element.properties.iter().map(|p| p.name()).collect();
    let has_xyz = names.contains(&"x") && names.contains(&"y") && names.contains(&"z");
    if !has_xyz {
        return Err(Error::Truncated {
            format: "PLY",
            detail: "vertex element missing x/y/z".into(),
        });
    }
    let red_key = ["red", "r"].into_iter().find(|k| names.contains(k));
    let green_key = ["green", "g"].into_iter().find(|k| names.contains(k));
    let blue_key = ["blue", "b"].into_iter().find(|k| names.contains(k));
    let has_color = red_key.is_some() && green_key.is_some() && blue_key.is_some();
    let intensity_key = ["intensity", "scalar_intensity"].into_iter().find(|k| names.contains(k));

    let stride_ids: Vec<usize> = stride::sampled_indices(rows.len()).collect();

    let mut header = Header::empty("ply");
    for &i in &stride_ids {
        let row = &rows[i];
        header.grow(glam::DVec3::new(row["x"], row["y"], row["z"]));
    }
    let center = (header.min + header.max) * 0.5;
    header.source_tag = "ply";

    let mut raw_colors: Vec<[f64; 3]> = Vec::new();
    let mut max_channel = 0.0f64;

    let n = stride_ids.len();
    let mut positions = Vec::with_capacity(n * 3);
    let mut intensities = Vec::with_capacity(n);

    for &i in &stride_ids {
        let row = &rows[i];
        let source = glam::DVec3::new(row["x"], row["y"], row["z"]);
        let p = CanonicalCloud::to_yup(source, center);
        positions.push(p.x);
        positions.push(p.y);
        positions.push(p.z);

        intensities.push(match intensity_key {
            Some(key) => row.get(key).copied().unwrap_or(0.0) as f32,
            None => 0.0,
        });

        if has_color {
            let r = row[red_key.unwrap()];
            let g = row[green_key.unwrap()];
            let b = row[blue_key.unwrap()];
            max_channel = max_channel.max(r).max(g).max(b);
            raw_colors.push([r, g, b]);
        }
    }

    let colors = if has_color {
        let mut out = Vec::with_capacity(n * 3);
        let divisor = if max_channel > 1.0 { 255.0 } else { 1.0 };
        for [r, g, b] in raw_colors {
            out.push((r / divisor) as f32);
            out.push((g / divisor) as f32);
            out.push((b / divisor) as f32);
        }
        out
    } else {
        let mut out = Vec::with_capacity(n * 3);
        for _ in 0..n {
            out.extend_from_slice(&DEFAULT_GRAY);
        }
        out
    };

    let cloud = CanonicalCloud {
        positions,
        colors,
        intensities,
        classifications: vec![0.0; n],
        indices: None,
        header,
        center,
        has_color,
        has_intensity: intensity_key.is_some(),
        has_classification: false,
    };
    debug_assert!(cloud.check_invariants());
    Ok(cloud)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_signature() {
        let err = decode(b"not a ply").unwrap_err();
        assert!(matches!(err, Error::InvalidSignature { format: "PLY" }));
    }

    #[test]
    fn ascii_triangle_centers_and_converts_to_yup() {
        let text = "ply\nformat ascii 1.0\nelement vertex 3\nproperty float x\nproperty float y\nproperty float z\nend_header\n0 0 0\n1 0 0\n0 1 0\n";
        let cloud = decode(text.as_bytes()).unwrap();
        assert_eq!(cloud.point_count(), 3);
        assert!(!cloud.has_color);
        for c in cloud.colors.chunks_exact(3) {
            assert_eq!(c, [0.8, 0.8, 0.8]);
        }
        // AABB of (0,0,0),(1,0,0),(0,1,0) is min=(0,0,0), max=(1,1,0), so the
        // midpoint is (0.5,0.5,0); first vertex after centering and the
        // Y-up swap: x=0-0.5=-0.5, y=sourceZ-centerZ=0, z=-(sourceY-centerY)=0.5
        assert!((cloud.positions[0] - (-0.5)).abs() < 1e-5);
        assert!((cloud.positions[1] - 0.0).abs() < 1e-5);
        assert!((cloud.positions[2] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn ascii_with_uchar_color_normalizes_from_255() {
        let text = "ply\nformat ascii 1.0\nelement vertex 1\nproperty float x\nproperty float y\nproperty float z\nproperty uchar red\nproperty uchar green\nproperty uchar blue\nend_header\n0 0 0 255 0 0\n";
        let cloud = decode(text.as_bytes()).unwrap();
        assert!(cloud.has_color);
        assert_eq!(cloud.colors, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn binary_little_endian_roundtrips_with_face_element_skipped() {
        let header = "ply\nformat binary_little_endian 1.0\nelement vertex 2\nproperty float x\nproperty float y\nproperty float z\nelement face 1\nproperty list uchar int vertex_indices\nend_header\n";
        let mut bytes = header.as_bytes().to_vec();
        for p in [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0]] {
            for v in p {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
        }
        bytes.push(3u8); // face vertex count
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&0i32.to_le_bytes());

        let cloud = decode(&bytes).unwrap();
        assert_eq!(cloud.point_count(), 2);
        assert!(cloud.indices.is_none());
    }

    #[test]
    fn empty_vertex_element_is_rejected() {
        let text = "ply\nformat ascii 1.0\nelement vertex 0\nproperty float x\nproperty float y\nproperty float z\nend_header\n";
        let err = decode(text.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::EmptyCloud));
    }
}
