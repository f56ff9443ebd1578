//! LAZ decoder: delegates decompression to the `laz` crate (spec §4.1), an
//! external decompressor collaborator, then reuses `decode::las`'s point
//! record semantics on the resulting uncompressed buffer.
//!
//! Mirrors the teacher's own `laz`-feature-gated split (`src/laz.rs`,
//! `src/reader/laz.rs`): locate the LASzip VLR, hand its bytes to
//! `laz::LazVlr::from_buffer`, then decompress records one at a time with a
//! `laz::LasZipDecompressor` built over a cursor seeked to the compressed
//! point data.

#[cfg(feature = "laz")]
use byteorder::{LittleEndian, ReadBytesExt};
#[cfg(feature = "laz")]
use std::io::{Cursor, Read, Seek, SeekFrom};

use crate::cloud::Header;
use crate::decode::las::extract_points;
use crate::{cloud::CanonicalCloud, Error, Result};

const SIGNATURE: &[u8; 4] = b"LASF";

#[cfg(feature = "laz")]
const LASZIP_USER_ID: &str = "laszip encoded";
#[cfg(feature = "laz")]
const LASZIP_RECORD_ID: u16 = 22204;

/// Decodes a LAZ (LASzip-compressed) byte buffer.
pub fn decode(bytes: &[u8]) -> Result<CanonicalCloud> {
    if bytes.len() < 4 || &bytes[0..4] != SIGNATURE {
        return Err(Error::InvalidSignature { format: "LAZ" });
    }

    #[cfg(not(feature = "laz"))]
    {
        let _ = bytes;
        Err(Error::UnsupportedVariant {
            format: "LAZ",
            detail: "decompression requires the `laz` cargo feature".to_string(),
        })
    }

    #[cfg(feature = "laz")]
    {
        decode_compressed(bytes)
    }
}

#[cfg(feature = "laz")]
fn decode_compressed(bytes: &[u8]) -> Result<CanonicalCloud> {
    let mut cursor = Cursor::new(bytes);

    let header_size = read_u16_at(&mut cursor, 94)? as usize;
    let offset_to_point_data = read_u32_at(&mut cursor, 96)? as usize;
    let vlr_count = read_u32_at(&mut cursor, 100)?;
    let point_data_format = read_u8_at(&mut cursor, 104)? & 0x7f; // high bit marks "compressed"
    let record_length = read_u16_at(&mut cursor, 105)? as usize;
    let legacy_count = read_u32_at(&mut cursor, 107)? as u64;

    if bytes.len() < header_size {
        return Err(Error::Truncated {
            format: "LAZ",
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
    if point_count == 0 {
        return Err(Error::EmptyCloud);
    }

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

    let laz_vlr_data = find_laszip_vlr(bytes, header_size, offset_to_point_data, vlr_count)?;
    let laz_vlr = laz::LazVlr::from_buffer(&laz_vlr_data).map_err(|e| Error::UnsupportedVariant {
        format: "LAZ",
        detail: e.to_string(),
    })?;

    cursor.seek(SeekFrom::Start(offset_to_point_data as u64))?;
    let mut decompressor = laz::LasZipDecompressor::new(cursor, laz_vlr).map_err(|e| Error::UnsupportedVariant {
        format: "LAZ",
        detail: e.to_string(),
    })?;

    let mut decompressed = vec![0u8; record_length * point_count as usize];
    decompressor
        .decompress_many(&mut decompressed)
        .map_err(|e| Error::Truncated {
            format: "LAZ",
            detail: e.to_string(),
        })?;

    let header = Header {
        min: glam::DVec3::new(min_x, min_y, min_z),
        max: glam::DVec3::new(max_x, max_y, max_z),
        source_tag: "laz",
        scale,
        offset,
    };

    extract_points(&decompressed, 0, record_length, point_count, point_data_format, header)
}

/// Scans the VLR block (between the public header and point data) for the
/// LASzip VLR and returns its raw data bytes.
#[cfg(feature = "laz")]
fn find_laszip_vlr(
    bytes: &[u8],
    header_size: usize,
    offset_to_point_data: usize,
    vlr_count: u32,
) -> Result<Vec<u8>> {
    const VLR_HEADER_LEN: usize = 54;
    let mut pos = header_size;
    for _ in 0..vlr_count {
        if pos + VLR_HEADER_LEN > offset_to_point_data || pos + VLR_HEADER_LEN > bytes.len() {
            break;
        }
        let user_id_bytes = &bytes[pos + 2..pos + 18];
        let user_id = String::from_utf8_lossy(user_id_bytes);
        let user_id = user_id.trim_end_matches('\0');
        let record_id = u16::from_le_bytes(bytes[pos + 18..pos + 20].try_into().unwrap());
        let record_length = u16::from_le_bytes(bytes[pos + 20..pos + 22].try_into().unwrap()) as usize;
        let data_start = pos + VLR_HEADER_LEN;
        let data_end = data_start + record_length;
        if user_id == LASZIP_USER_ID && record_id == LASZIP_RECORD_ID {
            if data_end > bytes.len() {
                return Err(Error::Truncated {
                    format: "LAZ",
                    detail: "laszip VLR data runs past end of buffer".into(),
                });
            }
            return Ok(bytes[data_start..data_end].to_vec());
        }
        pos = data_end;
    }
    Err(Error::UnsupportedVariant {
        format: "LAZ",
        detail: "no laszip VLR found".into(),
    })
}

#[cfg(feature = "laz")]
fn read_u8_at(cursor: &mut Cursor<&[u8]>, offset: u64) -> Result<u8> {
    cursor.seek(SeekFrom::Start(offset))?;
    Ok(cursor.read_u8()?)
}

#[cfg(feature = "laz")]
fn read_u16_at(cursor: &mut Cursor<&[u8]>, offset: u64) -> Result<u16> {
    cursor.seek(SeekFrom::Start(offset))?;
    Ok(cursor.read_u16::<LittleEndian>()?)
}

#[cfg(feature = "laz")]
fn read_u32_at(cursor: &mut Cursor<&[u8]>, offset: u64) -> Result<u32> {
    cursor.seek(SeekFrom::Start(offset))?;
    Ok(cursor.read_u32::<LittleEndian>()?)
}

#[cfg(feature = "laz")]
fn read_f64_at(cursor: &mut Cursor<&[u8]>, offset: u64) -> Result<f64> {
    cursor.seek(SeekFrom::Start(offset))?;
    Ok(cursor.read_f64::<LittleEndian>()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_signature() {
        let err = decode(b"NOPE").unwrap_err();
        assert!(matches!(err, Error::InvalidSignature { format: "LAZ" }));
    }

    #[cfg(not(feature = "laz"))]
    #[test]
    fn without_the_laz_feature_reports_unsupported_variant() {
        let mut bytes = vec![0u8; 227];
        bytes[0..4].copy_from_slice(SIGNATURE);
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, Error::UnsupportedVariant { format: "LAZ", .. }));
    }
}
