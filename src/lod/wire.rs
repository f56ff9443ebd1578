//! The little-endian LOD binary chunk wire format (spec §4.10): a sequence
//! of point chunks, each padded to a 4-byte boundary, hand-packed with
//! `byteorder` the way the teacher hand-packs `raw::Header`/`raw::Point`.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use crate::lod::PointChunk;

fn pad_len(len: usize) -> usize {
    (4 - (len % 4)) % 4
}

/// Encodes a slice of chunks into the wire format.
pub fn encode(chunks: &[PointChunk]) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_u32::<LittleEndian>(chunks.len() as u32).unwrap();
    for chunk in chunks {
        encode_chunk(&mut out, chunk);
    }
    out
}

fn encode_chunk(out: &mut Vec<u8>, chunk: &PointChunk) {
    let id_bytes = chunk.node_id.as_bytes();
    out.write_u32::<LittleEndian>(id_bytes.len() as u32).unwrap();
    out.write_all(id_bytes).unwrap();
    for _ in 0..pad_len(id_bytes.len()) {
        out.write_u8(0).unwrap();
    }

    out.write_f64::<LittleEndian>(chunk.center.x).unwrap();
    out.write_f64::<LittleEndian>(chunk.center.y).unwrap();
    out.write_f64::<LittleEndian>(chunk.center.z).unwrap();
    out.write_u32::<LittleEndian>(chunk.level).unwrap();
    out.write_f32::<LittleEndian>(chunk.spacing).unwrap();
    out.write_u32::<LittleEndian>(chunk.positions.len() as u32 / 3).unwrap();

    for p in chunk.positions.chunks_exact(3) {
        out.write_f32::<LittleEndian>(p[0]).unwrap();
        out.write_f32::<LittleEndian>(p[1]).unwrap();
        out.write_f32::<LittleEndian>(p[2]).unwrap();
    }
    for c in chunk.colors.chunks_exact(3) {
        out.write_u8(c[0]).unwrap();
        out.write_u8(c[1]).unwrap();
        out.write_u8(c[2]).unwrap();
    }
    for &i in &chunk.intensities {
        out.write_u16::<LittleEndian>(i).unwrap();
    }
    for &c in &chunk.classifications {
        out.write_u8(c).unwrap();
    }

    let unpadded = TRAILER_HEADER_LEN + chunk_body_len(chunk);
    for _ in 0..pad_len(unpadded) {
        out.write_u8(0).unwrap();
    }
}

/// Bytes from `center` through `pointCount`, inclusive: 3 f64 + u32 + f32 + u32.
const TRAILER_HEADER_LEN: usize = 8 * 3 + 4 + 4 + 4;

fn chunk_body_len(chunk: &PointChunk) -> usize {
    let n = chunk.positions.len() / 3;
    n * (4 * 3) + n * 3 + n * 2 + n
}

/// Decodes the wire format into a vector of chunks.
pub fn decode(bytes: &[u8]) -> io::Result<Vec<PointChunk>> {
    let mut cursor = io::Cursor::new(bytes);
    let count = cursor.read_u32::<LittleEndian>()?;
    let mut chunks = Vec::with_capacity(count as usize);
    for _ in 0..count {
        chunks.push(decode_chunk(&mut cursor)?);
    }
    Ok(chunks)
}

fn decode_chunk(cursor: &mut io::Cursor<&[u8]>) -> io::Result<PointChunk> {
    let id_len = cursor.read_u32::<LittleEndian>()? as usize;
    let mut id_bytes = vec![0u8; id_len];
    cursor.read_exact(&mut id_bytes)?;
    let node_id = String::from_utf8_lossy(&id_bytes).into_owned();
    skip(cursor, pad_len(id_len))?;

    let cx = cursor.read_f64::<LittleEndian>()?;
    let cy = cursor.read_f64::<LittleEndian>()?;
    let cz = cursor.read_f64::<LittleEndian>()?;
    let level = cursor.read_u32::<LittleEndian>()?;
    let spacing = cursor.read_f32::<LittleEndian>()?;
    let point_count = cursor.read_u32::<LittleEndian>()? as usize;

    let mut positions = Vec::with_capacity(point_count * 3);
    for _ in 0..point_count {
        positions.push(cursor.read_f32::<LittleEndian>()?);
        positions.push(cursor.read_f32::<LittleEndian>()?);
        positions.push(cursor.read_f32::<LittleEndian>()?);
    }
    let mut colors = Vec::with_capacity(point_count * 3);
    for _ in 0..point_count {
        colors.push(cursor.read_u8()?);
        colors.push(cursor.read_u8()?);
        colors.push(cursor.read_u8()?);
    }
    let mut intensities = Vec::with_capacity(point_count);
    for _ in 0..point_count {
        intensities.push(cursor.read_u16::<LittleEndian>()?);
    }
    let mut classifications = Vec::with_capacity(point_count);
    for _ in 0..point_count {
        classifications.push(cursor.read_u8()?);
    }

    let chunk = PointChunk {
        node_id,
        center: glam::DVec3::new(cx, cy, cz),
        level,
        spacing,
        positions,
        colors,
        intensities,
        classifications,
    };
    let unpadded = TRAILER_HEADER_LEN + chunk_body_len(&chunk);
    skip(cursor, pad_len(unpadded))?;
    Ok(chunk)
}

fn skip(cursor: &mut io::Cursor<&[u8]>, n: usize) -> io::Result<()> {
    let mut buf = vec![0u8; n];
    cursor.read_exact(&mut buf)
}
