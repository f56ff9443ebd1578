//! E57 decoder, per spec §4.1. ASTM E57 files are paged (each page ending in
//! a 4-byte CRC that this decoder does not validate), carry an XML document
//! describing one or more scans, and store each scan's points as a
//! `CompressedVector` of bit-packed bytestreams. Requires the main thread's
//! XML parser (`decode::requires_main_thread`), unlike every other format in
//! this family.

use byteorder::{LittleEndian, ReadBytesExt};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::io::Cursor;

use crate::cloud::{CanonicalCloud, Header, DEFAULT_GRAY};
use crate::{Error, Result};

const MAGIC: &[u8; 8] = b"ASTM-E57";

#[derive(Clone, Copy, Debug)]
enum FieldKind {
    Float { double: bool },
    Integer { min: i64, max: i64 },
    ScaledInteger { min: i64, max: i64, scale: f64, offset: f64 },
}

#[derive(Clone, Debug)]
struct ProtoField {
    name: String,
    kind: FieldKind,
}

impl ProtoField {
    fn bits(&self) -> u32 {
        match self.kind {
            FieldKind::Float { .. } => 0,
            FieldKind::Integer { min, max } | FieldKind::ScaledInteger { min, max, .. } => {
                let range = (max - min + 1).max(1) as f64;
                range.log2().ceil() as u32
            }
        }
    }

    fn decoded_range(&self) -> (f64, f64) {
        match self.kind {
            FieldKind::Float { .. } => (0.0, 1.0),
            FieldKind::Integer { min, max } => (min as f64, max as f64),
            FieldKind::ScaledInteger { min, max, scale, offset } => {
                (min as f64 * scale + offset, max as f64 * scale + offset)
            }
        }
    }
}

struct Scan {
    point_count: usize,
    binary_physical_offset: u64,
    translation: glam::DVec3,
    rotation: glam::DQuat,
    prototype: Vec<ProtoField>,
    has_codecs: bool,
}

/// Decodes an E57 byte buffer.
pub fn decode(bytes: &[u8]) -> Result<CanonicalCloud> {
    if bytes.len() < 44 || &bytes[0..8] != MAGIC {
        return Err(Error::InvalidSignature { format: "E57" });
    }

    let file_length = read_u64(bytes, 16)?;
    let xml_physical_offset = read_u64(bytes, 24)?;
    let xml_logical_length = read_u64(bytes, 32)?;
    let page_size = read_u32(bytes, 40)? as u64;
    let _ = file_length;

    if page_size < 8 {
        return Err(Error::Truncated {
            format: "E57",
            detail: "page size too small".into(),
        });
    }

    let xml_bytes = read_physical_skipping_crc(bytes, xml_physical_offset, xml_logical_length, page_size)?;
    let xml_text = std::str::from_utf8(&xml_bytes).map_err(|_| Error::Truncated {
        format: "E57",
        detail: "XML section is not valid UTF-8".into(),
    })?;

    let scans = parse_scans(xml_text)?;
    if scans.is_empty() {
        return Err(Error::EmptyCloud);
    }

    for scan in &scans {
        if scan.has_codecs {
            return Err(Error::UnsupportedVariant {
                format: "E57",
                detail: "custom CompressedVector codecs are not supported".into(),
            });
        }
    }

    let mut world_points: Vec<(glam::DVec3, f64, bool)> = Vec::new();

    for scan in &scans {
        let Some((points, intensities)) = decode_scan(bytes, scan, page_size)? else {
            continue; // no cartesian/spherical coordinates identified
        };
        for (i, local) in points.into_iter().enumerate() {
            let world = scan.rotation * local + scan.translation;
            let (intensity, has_intensity) = intensities
                .as_ref()
                .map(|v| (v[i], true))
                .unwrap_or((0.0, false));
            world_points.push((world, intensity, has_intensity));
        }
    }

    if world_points.is_empty() {
        return Err(Error::EmptyCloud);
    }

    let mut header = Header::empty("e57");
    for (p, _, _) in &world_points {
        header.grow(*p);
    }
    let center = (header.min + header.max) * 0.5;
    header.source_tag = "e57";

    let has_intensity = world_points.iter().any(|(_, _, has)| *has);
    let n = world_points.len();
    let mut positions = Vec::with_capacity(n * 3);
    let mut intensities = Vec::with_capacity(n);
    for (p, intensity, _) in &world_points {
        let yup = CanonicalCloud::to_yup(*p, center);
        positions.push(yup.x);
        positions.push(yup.y);
        positions.push(yup.z);
        intensities.push(*intensity as f32);
    }
    let colors: Vec<f32> = (0..n).flat_map(|_| DEFAULT_GRAY).collect();

    let cloud = CanonicalCloud {
        positions,
        colors,
        intensities,
        classifications: vec![0.0; n],
        indices: None,
        header,
        center,
        has_color: false,
        has_intensity,
        has_classification: false,
    };
    debug_assert!(cloud.check_invariants());
    Ok(cloud)
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    bytes
        .get(offset..offset + 4)
        .map(|s| u32::from_le_bytes(s.try_into().unwrap()))
        .ok_or(Error::Truncated { format: "E57", detail: "header truncated".into() })
}

fn read_u64(bytes: &[u8], offset: usize) -> Result<u64> {
    bytes
        .get(offset..offset + 8)
        .map(|s| u64::from_le_bytes(s.try_into().unwrap()))
        .ok_or(Error::Truncated { format: "E57", detail: "header truncated".into() })
}

/// Reads `logical_len` bytes starting at the physical byte `physical_start`,
/// striding across `pageSize`-byte pages and skipping each page's trailing
/// 4-byte CRC (not validated), per spec §4.1.
fn read_physical_skipping_crc(bytes: &[u8], physical_start: u64, logical_len: u64, page_size: u64) -> Result<Vec<u8>> {
    let page_data = page_size - 4;
    let mut out = Vec::with_capacity(logical_len as usize);
    let mut physical = physical_start;
    let mut remaining = logical_len;
    while remaining > 0 {
        let page_index = physical / page_size;
        let offset_in_page = physical % page_size;
        if offset_in_page >= page_data {
            physical = (page_index + 1) * page_size;
            continue;
        }
        let available = page_data - offset_in_page;
        let take = remaining.min(available);
        let start = physical as usize;
        let end = start + take as usize;
        let slice = bytes.get(start..end).ok_or(Error::Truncated {
            format: "E57",
            detail: "paged read ran past end of file".into(),
        })?;
        out.extend_from_slice(slice);
        physical += take;
        remaining -= take;
    }
    Ok(out)
}

fn attr(e: &quick_xml::events::BytesStart, name: &str) -> Option<String> {
    e.attributes().filter_map(|a| a.ok()).find_map(|a| {
        if a.key.as_ref() == name.as_bytes() {
            String::from_utf8(a.value.into_owned()).ok()
        } else {
            None
        }
    })
}

fn attr_f64(e: &quick_xml::events::BytesStart, name: &str) -> Option<f64> {
    attr(e, name).and_then(|s| s.parse().ok())
}

fn attr_i64(e: &quick_xml::events::BytesStart, name: &str) -> Option<i64> {
    attr(e, name).and_then(|s| s.parse().ok())
}

fn attr_usize(e: &quick_xml::events::BytesStart, name: &str) -> Option<usize> {
    attr(e, name).and_then(|s| s.parse().ok())
}

/// Walks the XML document for `scan` elements, each describing one Data3D
/// block: point count, binary section offset, pose, prototype field list,
/// and whether non-empty codecs were declared.
fn parse_scans(xml: &str) -> Result<Vec<Scan>> {
    let mut reader = Reader::from_str(xml);

    let mut scans = Vec::new();
    let mut stack: Vec<String> = Vec::new();

    let mut point_count = 0usize;
    let mut binary_physical_offset = 0u64;
    let mut translation = glam::DVec3::ZERO;
    let mut rotation = glam::DQuat::IDENTITY;
    let mut prototype: Vec<ProtoField> = Vec::new();
    let mut codec_children = 0usize;
    let mut in_scan = false;

    loop {
        match reader.read_event().map_err(|e| Error::Truncated {
            format: "E57",
            detail: format!("malformed XML: {e}"),
        })? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "scan" {
                    in_scan = true;
                    point_count = attr_usize(&e, "pointCount").unwrap_or(0);
                    binary_physical_offset = attr(&e, "binaryPhysicalOffset")
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(0);
                    translation = glam::DVec3::ZERO;
                    rotation = glam::DQuat::IDENTITY;
                    prototype.clear();
                    codec_children = 0;
                } else if in_scan && stack.last().map(String::as_str) == Some("codecs") {
                    codec_children += 1;
                }
                stack.push(name);
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.as_str() {
                    "translation" if in_scan => {
                        translation = glam::DVec3::new(
                            attr_f64(&e, "x").unwrap_or(0.0),
                            attr_f64(&e, "y").unwrap_or(0.0),
                            attr_f64(&e, "z").unwrap_or(0.0),
                        );
                    }
                    "rotation" if in_scan => {
                        rotation = glam::DQuat::from_xyzw(
                            attr_f64(&e, "x").unwrap_or(0.0),
                            attr_f64(&e, "y").unwrap_or(0.0),
                            attr_f64(&e, "z").unwrap_or(0.0),
                            attr_f64(&e, "w").unwrap_or(1.0),
                        )
                        .normalize();
                    }
                    "field" if in_scan => {
                        let field_name = attr(&e, "name").unwrap_or_default();
                        let ty = attr(&e, "type").unwrap_or_default();
                        let kind = match ty.as_str() {
                            "float" => Some(FieldKind::Float {
                                double: attr(&e, "precision").as_deref() == Some("double"),
                            }),
                            "integer" => Some(FieldKind::Integer {
                                min: attr_i64(&e, "minimum").unwrap_or(0),
                                max: attr_i64(&e, "maximum").unwrap_or(0),
                            }),
                            "scaledInteger" => Some(FieldKind::ScaledInteger {
                                min: attr_i64(&e, "minimum").unwrap_or(0),
                                max: attr_i64(&e, "maximum").unwrap_or(0),
                                scale: attr_f64(&e, "scale").unwrap_or(1.0),
                                offset: attr_f64(&e, "offset").unwrap_or(0.0),
                            }),
                            _ => None,
                        };
                        if let Some(kind) = kind {
                            prototype.push(ProtoField { name: field_name, kind });
                        }
                    }
                    _ if in_scan && stack.last().map(String::as_str) == Some("codecs") => {
                        codec_children += 1;
                    }
                    _ => {}
                }
                // Self-closing: no matching End event, so the stack is left untouched.
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                stack.pop();
                if name == "scan" && in_scan {
                    scans.push(Scan {
                        point_count,
                        binary_physical_offset,
                        translation,
                        rotation,
                        prototype: prototype.clone(),
                        has_codecs: codec_children > 0,
                    });
                    in_scan = false;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(scans)
}

struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        BitReader { data, bit_pos: 0 }
    }

    fn read_bits(&mut self, bits: u32) -> u64 {
        let mut value: u64 = 0;
        for i in 0..bits {
            let pos = self.bit_pos + i as usize;
            let byte_idx = pos / 8;
            let bit_idx = pos % 8;
            if byte_idx < self.data.len() {
                let bit = (self.data[byte_idx] >> bit_idx) & 1;
                value |= (bit as u64) << i;
            }
        }
        self.bit_pos += bits as usize;
        value
    }
}

/// Reads the scan's data packets (spec §4.1), decoding each prototype
/// field's bytestream into `point_count` raw f64 values, then assembles
/// Cartesian points (falling back to spherical) and, if present, intensity.
/// Returns `None` when neither cartesian nor spherical coordinates were
/// declared in the prototype.
fn decode_scan(file: &[u8], scan: &Scan, page_size: u64) -> Result<Option<(Vec<glam::DVec3>, Option<Vec<f64>>)>> {
    let header_bytes = read_physical_skipping_crc(file, scan.binary_physical_offset, 32, page_size)?;
    if header_bytes.first() != Some(&1) {
        return Err(Error::Truncated {
            format: "E57",
            detail: "CompressedVector section header has unexpected id".into(),
        });
    }
    let data_physical_offset = u64::from_le_bytes(header_bytes[16..24].try_into().unwrap());

    let mut field_values: Vec<Vec<f64>> = vec![Vec::with_capacity(scan.point_count); scan.prototype.len()];
    let mut collected = 0usize;
    let mut cursor_physical = data_physical_offset;
    let mut guard = 0usize;

    while collected < scan.point_count && guard < scan.point_count + 4096 {
        guard += 1;
        let packet_header = read_physical_skipping_crc(file, cursor_physical, 6, page_size)?;
        let packet_type = packet_header[0];
        if packet_type == 0 {
            // Index packet: fixed 16-byte header per spec, no point data.
            cursor_physical += 16;
            continue;
        }
        let packet_length_minus_1 = u16::from_le_bytes(packet_header[2..4].try_into().unwrap()) as usize;
        let bytestream_count = u16::from_le_bytes(packet_header[4..6].try_into().unwrap()) as usize;
        let total_len = packet_length_minus_1 + 1;

        let full_packet = read_physical_skipping_crc(file, cursor_physical, total_len as u64, page_size)?;
        let lengths_start = 6;
        let mut stream_lengths = Vec::with_capacity(bytestream_count);
        for i in 0..bytestream_count {
            let off = lengths_start + i * 2;
            let len = u16::from_le_bytes(full_packet[off..off + 2].try_into().unwrap()) as usize;
            stream_lengths.push(len);
        }

        let mut body_offset = lengths_start + bytestream_count * 2;
        let remaining_points = scan.point_count - collected;
        let mut points_in_packet = remaining_points;
        for (field_idx, field) in scan.prototype.iter().enumerate() {
            if field_idx >= stream_lengths.len() {
                break;
            }
            let len = stream_lengths[field_idx];
            let stream = &full_packet[body_offset..(body_offset + len).min(full_packet.len())];
            body_offset += len;

            let decoded = decode_bytestream(stream, field, remaining_points)?;
            points_in_packet = points_in_packet.min(decoded.len());
            field_values[field_idx].extend(decoded);
        }
        collected += points_in_packet.max(0);
        cursor_physical += total_len as u64;
        if points_in_packet == 0 {
            break;
        }
    }

    let name_index = |target: &str| scan.prototype.iter().position(|f| f.name == target);

    let x_idx = name_index("cartesianX");
    let y_idx = name_index("cartesianY");
    let z_idx = name_index("cartesianZ");
    let r_idx = name_index("sphericalRange");
    let az_idx = name_index("sphericalAzimuth");
    let el_idx = name_index("sphericalElevation");
    let intensity_idx = name_index("intensity");

    let n = scan.point_count.min(field_values.iter().map(Vec::len).min().unwrap_or(0));

    let points: Vec<glam::DVec3> = if let (Some(xi), Some(yi), Some(zi)) = (x_idx, y_idx, z_idx) {
        (0..n)
            .map(|i| glam::DVec3::new(field_values[xi][i], field_values[yi][i], field_values[zi][i]))
            .collect()
    } else if let (Some(ri), Some(ai), Some(ei)) = (r_idx, az_idx, el_idx) {
        (0..n)
            .map(|i| {
                let r = field_values[ri][i];
                let az = field_values[ai][i];
                let el = field_values[ei][i];
                glam::DVec3::new(r * el.cos() * az.cos(), r * el.cos() * az.sin(), r * el.sin())
            })
            .collect()
    } else {
        return Ok(None);
    };

    let intensities = intensity_idx.map(|idx| field_values[idx][..n].to_vec());

    Ok(Some((points, intensities)))
}

fn decode_bytestream(stream: &[u8], field: &ProtoField, count: usize) -> Result<Vec<f64>> {
    match field.kind {
        FieldKind::Float { double } => {
            let mut cursor = Cursor::new(stream);
            let mut values = Vec::with_capacity(count);
            let size = if double { 8 } else { 4 };
            let max_from_len = stream.len() / size;
            for _ in 0..count.min(max_from_len) {
                let v = if double {
                    cursor.read_f64::<LittleEndian>()?
                } else {
                    cursor.read_f32::<LittleEndian>()? as f64
                };
                values.push(v);
            }
            Ok(values)
        }
        FieldKind::Integer { min, .. } => {
            let bits = field.bits();
            if bits == 0 {
                return Ok(vec![min as f64; count]);
            }
            let mut reader = BitReader::new(stream);
            let max_from_len = (stream.len() * 8) / bits as usize;
            Ok((0..count.min(max_from_len))
                .map(|_| reader.read_bits(bits) as f64 + min as f64)
                .collect())
        }
        FieldKind::ScaledInteger { min, scale, offset, .. } => {
            let bits = field.bits();
            if bits == 0 {
                return Ok(vec![min as f64 * scale + offset; count]);
            }
            let mut reader = BitReader::new(stream);
            let max_from_len = (stream.len() * 8) / bits as usize;
            Ok((0..count.min(max_from_len))
                .map(|_| (reader.read_bits(bits) as f64 + min as f64) * scale + offset)
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_signature() {
        let err = decode(b"not-e57-data-at-all-but-long-enough-to-pass-length-check").unwrap_err();
        assert!(matches!(err, Error::InvalidSignature { format: "E57" }));
    }

    #[test]
    fn field_bit_width_matches_range() {
        let field = ProtoField {
            name: "intensity".into(),
            kind: FieldKind::Integer { min: 0, max: 4095 },
        };
        assert_eq!(field.bits(), 12);
    }

    #[test]
    fn scaled_integer_decoded_range_applies_scale_and_offset() {
        let field = ProtoField {
            name: "intensity".into(),
            kind: FieldKind::ScaledInteger { min: 0, max: 100, scale: 0.01, offset: 0.0 },
        };
        let (lo, hi) = field.decoded_range();
        assert!((lo - 0.0).abs() < 1e-9);
        assert!((hi - 1.0).abs() < 1e-9);
    }

    #[test]
    fn bit_reader_reads_lsb_first() {
        let mut reader = BitReader::new(&[0b0000_0101]);
        assert_eq!(reader.read_bits(3), 0b101);
    }

    fn build_single_scan_file() -> Vec<u8> {
        const PAGE_SIZE: u32 = 1024;
        const XML_OFFSET: u64 = 44;
        const BINARY_OFFSET: u64 = 300;

        let xml = format!(
            "<e57Root><data3D><scan pointCount=\"2\" binaryPhysicalOffset=\"{BINARY_OFFSET}\">\
             <pose><translation x=\"1\" y=\"2\" z=\"3\"/><rotation w=\"1\" x=\"0\" y=\"0\" z=\"0\"/></pose>\
             <prototype>\
             <field name=\"cartesianX\" type=\"float\" precision=\"single\"/>\
             <field name=\"cartesianY\" type=\"float\" precision=\"single\"/>\
             <field name=\"cartesianZ\" type=\"float\" precision=\"single\"/>\
             </prototype>\
             <codecs/>\
             </scan></data3D></e57Root>"
        );

        let data_offset = BINARY_OFFSET + 32;

        let mut bytes = vec![0u8; BINARY_OFFSET as usize];
        bytes[0..8].copy_from_slice(MAGIC);
        bytes[8..12].copy_from_slice(&1u32.to_le_bytes());
        bytes[12..16].copy_from_slice(&0u32.to_le_bytes());
        bytes[24..32].copy_from_slice(&XML_OFFSET.to_le_bytes());
        bytes[32..40].copy_from_slice(&(xml.len() as u64).to_le_bytes());
        bytes[40..44].copy_from_slice(&PAGE_SIZE.to_le_bytes());
        bytes[44..44 + xml.len()].copy_from_slice(xml.as_bytes());

        // CompressedVector section header (32 bytes).
        let mut section_header = vec![0u8; 32];
        section_header[0] = 1;
        section_header[16..24].copy_from_slice(&data_offset.to_le_bytes());
        bytes.extend_from_slice(&section_header);

        // Data packet: 3 bytestreams of 2 f32 values each.
        let stream_x: Vec<u8> = [1.0f32, 0.0f32].iter().flat_map(|v| v.to_le_bytes()).collect();
        let stream_y: Vec<u8> = [0.0f32, 1.0f32].iter().flat_map(|v| v.to_le_bytes()).collect();
        let stream_z: Vec<u8> = [0.0f32, 0.0f32].iter().flat_map(|v| v.to_le_bytes()).collect();
        let body_len = stream_x.len() + stream_y.len() + stream_z.len();
        let header_len = 6 + 3 * 2;
        let total_len = header_len + body_len;

        let mut packet = Vec::with_capacity(total_len);
        packet.push(1); // data packet
        packet.push(0); // reserved
        packet.extend_from_slice(&((total_len - 1) as u16).to_le_bytes());
        packet.extend_from_slice(&3u16.to_le_bytes());
        packet.extend_from_slice(&(stream_x.len() as u16).to_le_bytes());
        packet.extend_from_slice(&(stream_y.len() as u16).to_le_bytes());
        packet.extend_from_slice(&(stream_z.len() as u16).to_le_bytes());
        packet.extend_from_slice(&stream_x);
        packet.extend_from_slice(&stream_y);
        packet.extend_from_slice(&stream_z);
        bytes.extend_from_slice(&packet);

        bytes
    }

    #[test]
    fn decodes_a_single_scan_with_float_cartesian_fields() {
        let bytes = build_single_scan_file();
        let cloud = decode(&bytes).unwrap();
        assert_eq!(cloud.point_count(), 2);
        assert!(!cloud.has_intensity);
    }
}
