//! LAS point cloud decoder (uncompressed), formats 1.0 through 1.4.
//!
//! Field offsets below are the ones spec'd directly rather than derived from
//! a parsed header struct, the way the teacher's `raw::Header::read_from`
//! reads fixed offsets before building up the richer `Header` type.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Seek, SeekFrom};

use crate::cloud::{CanonicalCloud, Header, DEFAULT_GRAY};
use crate::decode::stride;
use crate::{Error, Result};

const SIGNATURE: &[u8; 4] = b"LASF";

/// Decodes an uncompressed LAS byte buffer.
pub fn decode(bytes: &[u8]) -> Result<CanonicalCloud> {
    if bytes.len() < 4 || &bytes[0..4] != SIGNATURE {
        return Err(Error::InvalidSignature { format: "LAS" });
    }
    let mut cursor = Cursor::new(bytes);

    let header_size = read_u16_at(&mut cursor, 94)?;
    let offset_to_point_data = read_u32_at(&mut cursor, 96)? as usize;
    let point_data_format = read_u8_at(&mut cursor, 104)?;
    let record_length = read_u16_at(&mut cursor, 105)? as usize;
    let legacy_count = read_u32_at(&mut cursor, 107)? as u64;

    if (bytes.len() as u64) < header_size as u64 {
        return Err(Error::Truncated {
            format: "LAS",
            detail: "buffer shorter than declared header size".into(),
        });
    }

    let point_count = if legacy_count == 0 && header_size >= 375 {
        let lo = read_u32_at(&mut cursor, 247)? as u64;
        let hi = read_u32_at(&mut cursor, 251)? as u64;
        lo | (hi << 32)
    } else {
        legacy_count
    };

    let scale = glam::DVec3::new(
        read_f64_at(&mut cursor, 131)?,
        read_f64_at(&mut cursor, 139)?,
        read_f64_at(&mut cursor, 147)?,
    );
    let offset = glam::DVec3::new(
        read_f64_at(&mut cursor, 155)?,
        read_f64_at(&mut cursor, 163)?,
        read_f64_at(&mut cursor, 171)?,
    );
    let max_x = read_f64_at(&mut cursor, 179)?;
    let min_x = read_f64_at(&mut cursor, 187)?;
    let max_y = read_f64_at(&mut cursor, 195)?;
    let min_y = read_f64_at(&mut cursor, 203)?;
    let max_z = read_f64_at(&mut cursor, 211)?;
    let min_z = read_f64_at(&mut cursor, 219)?;

    if point_count == 0 {
        return Err(Error::EmptyCloud);
    }

    let needed = offset_to_point_data + (point_count as usize).saturating_sub(1) * record_length + record_length;
    if bytes.len() < needed {
        return Err(Error::Truncated {
            format: "LAS",
            detail: format!("expected {needed} bytes of point data, found {}", bytes.len()),
        });
    }

    let header = Header {
        min: glam::DVec3::new(min_x, min_y, min_z),
        max: glam::DVec3::new(max_x, max_y, max_z),
        source_tag: "las",
        scale,
        offset,
    };

    extract_points(
        bytes,
        offset_to_point_data,
        record_length,
        point_count,
        point_data_format,
        header,
    )
}

/// Shared point-record extraction: both `decode::las` (reading straight from
/// the file buffer) and `decode::laz` (reading from a decompressed buffer
/// produced by the external decompressor) land here once they know where the
/// point records start and how the header described them.
pub(crate) fn extract_points(
    bytes: &[u8],
    offset_to_point_data: usize,
    record_length: usize,
    point_count: u64,
    point_data_format: u8,
    header: Header,
) -> Result<CanonicalCloud> {
    let scale = header.scale;
    let offset = header.offset;
    let center = (header.min + header.max) * 0.5;
    let rgb_offset = rgb_offset_for_format(point_data_format);
    let classification_offset = if point_data_format <= 5 { 15 } else { 16 };

    let indices: Vec<usize> = stride::sampled_indices(point_count as usize).collect();
    let n = indices.len();
    let mut positions = Vec::with_capacity(n * 3);
    let mut colors = Vec::with_capacity(n * 3);
    let mut intensities = Vec::with_capacity(n);
    let mut classifications = Vec::with_capacity(n);
    let mut any_color_over_255 = false;
    let mut raw_colors: Vec<[u16; 3]> = Vec::with_capacity(if rgb_offset.is_some() { n } else { 0 });

    for &i in &indices {
        let record_offset = offset_to_point_data + i * record_length;
        let record = &bytes[record_offset..record_offset + record_length];

        let raw_x = i32::from_le_bytes(record[0..4].try_into().unwrap());
        let raw_y = i32::from_le_bytes(record[4..8].try_into().unwrap());
        let raw_z = i32::from_le_bytes(record[8..12].try_into().unwrap());
        let source = glam::DVec3::new(
            raw_x as f64 * scale.x + offset.x,
            raw_y as f64 * scale.y + offset.y,
            raw_z as f64 * scale.z + offset.z,
        );
        let p = CanonicalCloud::to_yup(source, center);
        positions.push(p.x);
        positions.push(p.y);
        positions.push(p.z);

        let raw_intensity = u16::from_le_bytes(record[12..14].try_into().unwrap());
        intensities.push(raw_intensity as f32 / 65535.0);

        let raw_classification = record[classification_offset];
        let classification = if point_data_format <= 5 {
            raw_classification & 0x1f
        } else {
            raw_classification
        };
        classifications.push(classification as f32);

        if let Some(rgb_off) = rgb_offset {
            let r = u16::from_le_bytes(record[rgb_off..rgb_off + 2].try_into().unwrap());
            let g = u16::from_le_bytes(record[rgb_off + 2..rgb_off + 4].try_into().unwrap());
            let b = u16::from_le_bytes(record[rgb_off + 4..rgb_off + 6].try_into().unwrap());
            if r > 255 || g > 255 || b > 255 {
                any_color_over_255 = true;
            }
            raw_colors.push([r, g, b]);
        }
    }

    let has_color = rgb_offset.is_some();
    if has_color {
        for [r, g, b] in raw_colors {
            if any_color_over_255 {
                colors.push(r as f32 / 65535.0);
                colors.push(g as f32 / 65535.0);
                colors.push(b as f32 / 65535.0);
            } else {
                colors.push(r as f32 / 255.0);
                colors.push(g as f32 / 255.0);
                colors.push(b as f32 / 255.0);
            }
        }
    } else {
        for _ in 0..n {
            colors.extend_from_slice(&DEFAULT_GRAY);
        }
    }

    let cloud = CanonicalCloud {
        positions,
        colors,
        intensities,
        classifications,
        indices: None,
        header,
        center,
        has_color,
        has_intensity: true,
        has_classification: true,
    };
    debug_assert!(cloud.check_invariants());
    Ok(cloud)
}

/// Byte offset of the RGB triple within a point record, for the point data
/// formats that carry color.
fn rgb_offset_for_format(format: u8) -> Option<usize> {
    match format {
        2 => Some(20),
        3 | 5 => Some(28),
        7 | 8 | 10 => Some(30),
        _ => None,
    }
}

fn read_u8_at(cursor: &mut Cursor<&[u8]>, offset: u64) -> Result<u8> {
    cursor.seek(SeekFrom::Start(offset))?;
    Ok(cursor.read_u8()?)
}

fn read_u16_at(cursor: &mut Cursor<&[u8]>, offset: u64) -> Result<u16> {
    cursor.seek(SeekFrom::Start(offset))?;
    Ok(cursor.read_u16::<LittleEndian>()?)
}

fn read_u32_at(cursor: &mut Cursor<&[u8]>, offset: u64) -> Result<u32> {
    cursor.seek(SeekFrom::Start(offset))?;
    Ok(cursor.read_u32::<LittleEndian>()?)
}

fn read_f64_at(cursor: &mut Cursor<&[u8]>, offset: u64) -> Result<f64> {
    cursor.seek(SeekFrom::Start(offset))?;
    Ok(cursor.read_f64::<LittleEndian>()?)
}
