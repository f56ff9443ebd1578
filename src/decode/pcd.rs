//! PCD decoder (PCL point cloud data, v0.7), per spec §4.1. Supports the
//! three `DATA` encodings: `ascii`, `binary` (row-major) and
//! `binary_compressed` (column-major, LZF-compressed). The `VIEWPOINT` pose
//! (translation + quaternion) is applied to every point.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use crate::cloud::{CanonicalCloud, Header, DEFAULT_GRAY};
use crate::{Error, Result};

struct Field {
    name: String,
    size: usize,
    ty: char,
    count: usize,
    /// Byte offset of this field's first component within a row-major record.
    row_offset: usize,
    /// Component offset within the flattened per-point token/value list.
    component_offset: usize,
    /// Byte offset of this field's block within a column-major buffer.
    column_offset: usize,
}

struct PcdHeader {
    fields: Vec<Field>,
    width: usize,
    height: usize,
    points: usize,
    viewpoint: (glam::DVec3, glam::DQuat),
    data_mode: String,
    point_record_size: usize,
}

fn parse_header<'a>(text: &'a str) -> Result<(PcdHeader, &'a str)> {
    let mut names: Vec<String> = Vec::new();
    let mut sizes: Vec<usize> = Vec::new();
    let mut types: Vec<char> = Vec::new();
    let mut counts: Vec<usize> = Vec::new();
    let mut width = 0usize;
    let mut height = 1usize;
    let mut points = 0usize;
    let mut viewpoint = (glam::DVec3::ZERO, glam::DQuat::IDENTITY);
    let mut data_mode = String::new();

    let mut offset = 0usize;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim();
        offset += line.len();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut tokens = trimmed.split_whitespace();
        let Some(keyword) = tokens.next() else { continue };
        match keyword {
            "VERSION" => {}
            "FIELDS" => names = tokens.map(str::to_string).collect(),
            "SIZE" => sizes = tokens.filter_map(|t| t.parse().ok()).collect(),
            "TYPE" => types = tokens.filter_map(|t| t.chars().next()).collect(),
            "COUNT" => counts = tokens.filter_map(|t| t.parse().ok()).collect(),
            "WIDTH" => {
                width = tokens.next().and_then(|t| t.parse().ok()).unwrap_or(0);
            }
            "HEIGHT" => {
                height = tokens.next().and_then(|t| t.parse().ok()).unwrap_or(1);
            }
            "POINTS" => {
                points = tokens.next().and_then(|t| t.parse().ok()).unwrap_or(0);
            }
            "VIEWPOINT" => {
                let values: Vec<f64> = tokens.filter_map(|t| t.parse().ok()).collect();
                if values.len() == 7 {
                    viewpoint = (
                        glam::DVec3::new(values[0], values[1], values[2]),
                        glam::DQuat::from_xyzw(values[4], values[5], values[6], values[3])
                            .normalize(),
                    );
                }
            }
            "DATA" => {
                data_mode = tokens.next().unwrap_or("ascii").to_string();
                break;
            }
            _ => {}
        }
    }

    if names.is_empty() || sizes.len() != names.len() || types.len() != names.len() {
        return Err(Error::Truncated {
            format: "PCD",
            detail: "incomplete FIELDS/SIZE/TYPE header".into(),
        });
    }
    if counts.is_empty() {
        counts = vec![1; names.len()];
    }
    if points == 0 {
        points = width * height;
    }

    let mut fields = Vec::with_capacity(names.len());
    let mut row_offset = 0usize;
    let mut component_offset = 0usize;
    let mut column_offset = 0usize;
    for i in 0..names.len() {
        let size = sizes[i];
        let count = counts[i];
        fields.push(Field {
            name: names[i].clone(),
            size,
            ty: types[i],
            count,
            row_offset,
            component_offset,
            column_offset,
        });
        row_offset += size * count;
        component_offset += count;
        column_offset += size * count * points;
    }
    let point_record_size = row_offset;

    let header = PcdHeader {
        fields,
        width,
        height,
        points,
        viewpoint,
        data_mode,
        point_record_size,
    };
    Ok((header, &text[offset..]))
}

fn read_scalar(bytes: &[u8], offset: usize, size: usize, ty: char) -> f64 {
    let slice = &bytes[offset..offset + size];
    match (ty, size) {
        ('F', 4) => f32::from_le_bytes(slice.try_into().unwrap()) as f64,
        ('F', 8) => f64::from_le_bytes(slice.try_into().unwrap()),
        ('U', 1) => slice[0] as f64,
        ('U', 2) => u16::from_le_bytes(slice.try_into().unwrap()) as f64,
        ('U', 4) => u32::from_le_bytes(slice.try_into().unwrap()) as f64,
        ('I', 1) => slice[0] as i8 as f64,
        ('I', 2) => i16::from_le_bytes(slice.try_into().unwrap()) as f64,
        ('I', 4) => i32::from_le_bytes(slice.try_into().unwrap()) as f64,
        _ => 0.0,
    }
}

fn scalar_bits_u32(bytes: &[u8], offset: usize, size: usize, ty: char) -> u32 {
    let slice = &bytes[offset..offset + size];
    match (ty, size) {
        ('F', 4) => f32::from_le_bytes(slice.try_into().unwrap()).to_bits(),
        ('U', 4) | ('I', 4) => u32::from_le_bytes(slice.try_into().unwrap()),
        _ => 0,
    }
}

/// Decodes a PCD byte buffer.
pub fn decode(bytes: &[u8]) -> Result<CanonicalCloud> {
    // The header is ASCII regardless of DATA encoding; locate it by scanning
    // for the "DATA <mode>\n" line boundary.
    let header_end = find_data_line_end(bytes)?;
    let header_text = std::str::from_utf8(&bytes[..header_end]).map_err(|_| Error::Truncated {
        format: "PCD",
        detail: "header is not valid UTF-8".into(),
    })?;
    let (header, _) = parse_header(header_text)?;
    let body = &bytes[header_end..];

    if header.points == 0 {
        return Err(Error::EmptyCloud);
    }

    let find = |name: &str| header.fields.iter().find(|f| f.name == name);
    let x_field = find("x").ok_or(Error::Truncated {
        format: "PCD",
        detail: "missing x/y/z fields".into(),
    })?;
    let y_field = find("y").ok_or(Error::Truncated {
        format: "PCD",
        detail: "missing x/y/z fields".into(),
    })?;
    let z_field = find("z").ok_or(Error::Truncated {
        format: "PCD",
        detail: "missing x/y/z fields".into(),
    })?;
    let color_field = find("rgb").or_else(|| find("rgba"));
    let intensity_field = find("intensity");
    let class_field = find("label").or_else(|| find("classification"));

    let n = header.points;

    let (positions_raw, colors_raw, intensities_raw, classes_raw) = match header.data_mode.as_str()
    {
        "ascii" => decode_ascii(body, &header, x_field, y_field, z_field, color_field, intensity_field, class_field)?,
        "binary" => decode_binary(body, &header, x_field, y_field, z_field, color_field, intensity_field, class_field)?,
        "binary_compressed" => decode_binary_compressed(
            body, &header, x_field, y_field, z_field, color_field, intensity_field, class_field,
        )?,
        other => {
            return Err(Error::UnsupportedVariant {
                format: "PCD",
                detail: format!("unsupported DATA mode `{other}`"),
            })
        }
    };

    if positions_raw.is_empty() {
        return Err(Error::EmptyCloud);
    }

    let (translation, rotation) = header.viewpoint;
    let world_positions: Vec<glam::DVec3> = positions_raw
        .iter()
        .map(|&local| rotation * local + translation)
        .collect();

    let mut hdr = Header::empty("pcd");
    for p in &world_positions {
        hdr.grow(*p);
    }
    let center = (hdr.min + hdr.max) * 0.5;
    hdr.source_tag = "pcd";

    let has_color = color_field.is_some();
    let has_intensity = intensity_field.is_some();
    let has_classification = class_field.is_some();

    let mut positions = Vec::with_capacity(n * 3);
    for p in &world_positions {
        let yup = CanonicalCloud::to_yup(*p, center);
        positions.push(yup.x);
        positions.push(yup.y);
        positions.push(yup.z);
    }

    let colors = if has_color {
        colors_raw
    } else {
        (0..n).flat_map(|_| DEFAULT_GRAY).collect()
    };

    let cloud = CanonicalCloud {
        positions,
        colors,
        intensities: intensities_raw,
        classifications: classes_raw,
        indices: None,
        header: hdr,
        center,
        has_color,
        has_intensity,
        has_classification,
    };
    debug_assert!(cloud.check_invariants());
    Ok(cloud)
}

fn find_data_line_end(bytes: &[u8]) -> Result<usize> {
    let mut pos = 0;
    while pos < bytes.len() {
        let rest = &bytes[pos..];
        let line_len = rest.iter().position(|&b| b == b'\n').map(|i| i + 1).unwrap_or(rest.len());
        let line = &rest[..line_len];
        if let Ok(text) = std::str::from_utf8(line) {
            if text.trim_start().starts_with("DATA") {
                return Ok(pos + line_len);
            }
        }
        pos += line_len;
        if line_len == 0 {
            break;
        }
    }
    Err(Error::Truncated {
        format: "PCD",
        detail: "missing DATA line".into(),
    })
}

fn unpack_color(bits: u32) -> [f32; 3] {
    let r = ((bits >> 16) & 0xff) as f32 / 255.0;
    let g = ((bits >> 8) & 0xff) as f32 / 255.0;
    let b = (bits & 0xff) as f32 / 255.0;
    [r, g, b]
}

fn normalize_intensity(raw: f64) -> f32 {
    if raw > 1.0 {
        (raw / 255.0) as f32
    } else {
        raw as f32
    }
}

type DecodedBody = (Vec<glam::DVec3>, Vec<f32>, Vec<f32>, Vec<f32>);

#[allow(clippy::too_many_arguments)]
fn decode_ascii(
    body: &[u8],
    header: &PcdHeader,
    x: &Field,
    y: &Field,
    z: &Field,
    color: Option<&Field>,
    intensity: Option<&Field>,
    class: Option<&Field>,
) -> Result<DecodedBody> {
    let text = std::str::from_utf8(body).map_err(|_| Error::Truncated {
        format: "PCD",
        detail: "ascii body is not valid UTF-8".into(),
    })?;

    let mut positions = Vec::with_capacity(header.points);
    let mut colors = Vec::new();
    let mut intensities = Vec::new();
    let mut classes = Vec::new();

    for line in text.lines().filter(|l| !l.trim().is_empty()).take(header.points) {
        let tokens: Vec<f64> = line.split_whitespace().map(|t| t.parse::<f64>().unwrap_or(0.0)).collect();
        let get = |f: &Field| tokens.get(f.component_offset).copied().unwrap_or(0.0);
        positions.push(glam::DVec3::new(get(x), get(y), get(z)));
        if let Some(f) = color {
            let raw = get(f);
            colors.extend_from_slice(&unpack_color((raw as f32).to_bits()));
        }
        intensities.push(intensity.map(|f| normalize_intensity(get(f))).unwrap_or(0.0));
        classes.push(class.map(|f| get(f) as f32).unwrap_or(0.0));
    }
    Ok((positions, colors, intensities, classes))
}

#[allow(clippy::too_many_arguments)]
fn decode_binary(
    body: &[u8],
    header: &PcdHeader,
    x: &Field,
    y: &Field,
    z: &Field,
    color: Option<&Field>,
    intensity: Option<&Field>,
    class: Option<&Field>,
) -> Result<DecodedBody> {
    let stride = header.point_record_size;
    if body.len() < stride * header.points {
        return Err(Error::Truncated {
            format: "PCD",
            detail: "binary body shorter than POINTS * record size".into(),
        });
    }

    let mut positions = Vec::with_capacity(header.points);
    let mut colors = Vec::new();
    let mut intensities = Vec::new();
    let mut classes = Vec::new();

    for i in 0..header.points {
        let base = i * stride;
        let get = |f: &Field| read_scalar(body, base + f.row_offset, f.size, f.ty);
        positions.push(glam::DVec3::new(get(x), get(y), get(z)));
        if let Some(f) = color {
            let bits = scalar_bits_u32(body, base + f.row_offset, f.size, f.ty);
            colors.extend_from_slice(&unpack_color(bits));
        }
        intensities.push(intensity.map(|f| normalize_intensity(get(f))).unwrap_or(0.0));
        classes.push(class.map(|f| get(f) as f32).unwrap_or(0.0));
    }
    Ok((positions, colors, intensities, classes))
}

#[allow(clippy::too_many_arguments)]
fn decode_binary_compressed(
    body: &[u8],
    header: &PcdHeader,
    x: &Field,
    y: &Field,
    z: &Field,
    color: Option<&Field>,
    intensity: Option<&Field>,
    class: Option<&Field>,
) -> Result<DecodedBody> {
    let mut cursor = Cursor::new(body);
    let compressed_size = cursor.read_u32::<LittleEndian>()? as usize;
    let uncompressed_size = cursor.read_u32::<LittleEndian>()? as usize;
    let payload_start = cursor.position() as usize;
    let payload = body
        .get(payload_start..payload_start + compressed_size)
        .ok_or(Error::Truncated {
            format: "PCD",
            detail: "binary_compressed payload shorter than declared size".into(),
        })?;

    let decompressed = lzf::decompress(payload, uncompressed_size).map_err(|e| Error::Truncated {
        format: "PCD",
        detail: format!("lzf decompression failed: {e:?}"),
    })?;

    // Column-major: each field's full run of `count * points` values is
    // stored contiguously before the next field begins.
    let get = |f: &Field, component: usize, i: usize| {
        let offset = f.column_offset + (component * header.points + i) * f.size;
        read_scalar(&decompressed, offset, f.size, f.ty)
    };
    let get_bits = |f: &Field, i: usize| {
        let offset = f.column_offset + i * f.size;
        scalar_bits_u32(&decompressed, offset, f.size, f.ty)
    };

    let mut positions = Vec::with_capacity(header.points);
    let mut colors = Vec::new();
    let mut intensities = Vec::new();
    let mut classes = Vec::new();

    for i in 0..header.points {
        positions.push(glam::DVec3::new(get(x, 0, i), get(y, 0, i), get(z, 0, i)));
        if let Some(f) = color {
            colors.extend_from_slice(&unpack_color(get_bits(f, i)));
        }
        intensities.push(intensity.map(|f| normalize_intensity(get(f, 0, i))).unwrap_or(0.0));
        classes.push(class.map(|f| get(f, 0, i) as f32).unwrap_or(0.0));
    }
    Ok((positions, colors, intensities, classes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ascii_header(fields: &str, size: &str, ty: &str, count: &str, points: usize) -> String {
        format!(
            "# .PCD v0.7\nVERSION 0.7\nFIELDS {fields}\nSIZE {size}\nTYPE {ty}\nCOUNT {count}\nWIDTH {points}\nHEIGHT 1\nVIEWPOINT 0 0 0 1 0 0 0\nPOINTS {points}\nDATA ascii\n"
        )
    }

    #[test]
    fn ascii_xyz_only() {
        let mut text = ascii_header("x y z", "4 4 4", "F F F", "1 1 1", 2);
        text.push_str("0 0 0\n1 0 0\n");
        let cloud = decode(text.as_bytes()).unwrap();
        assert_eq!(cloud.point_count(), 2);
        assert!(!cloud.has_color);
    }

    #[test]
    fn ascii_with_packed_rgb_float() {
        let mut text = ascii_header("x y z rgb", "4 4 4 4", "F F F F", "1 1 1 1", 1);
        let packed = f32::from_bits(0x00ff0000u32); // pure red
        text.push_str(&format!("0 0 0 {packed}\n"));
        let cloud = decode(text.as_bytes()).unwrap();
        assert!(cloud.has_color);
        assert!((cloud.colors[0] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn binary_row_major_xyz() {
        let header = ascii_header("x y z", "4 4 4", "F F F", "1 1 1", 1).replace("DATA ascii", "DATA binary");
        let mut bytes = header.into_bytes();
        for v in [1.0f32, 2.0, 3.0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let cloud = decode(&bytes).unwrap();
        assert_eq!(cloud.point_count(), 1);
    }

    #[test]
    fn missing_data_line_is_truncated_error() {
        let err = decode(b"FIELDS x y z\n").unwrap_err();
        assert!(matches!(err, Error::Truncated { format: "PCD", .. }));
    }
}
