//! DXF decoder, per spec §4.1. DXF is a flat stream of group-code/value
//! pairs (two lines each); only the `ENTITIES` section is parsed, and only
//! `POINT` and `3DFACE` entities contribute geometry.

use crate::cloud::{CanonicalCloud, Header, DEFAULT_GRAY};
use crate::{Error, Result};

/// The standard AutoCAD Color Index palette for indices 1..7.
const ACI_BASE: [[u8; 3]; 8] = [
    [0, 0, 0],       // 0: unused
    [255, 0, 0],     // 1: red
    [255, 255, 0],   // 2: yellow
    [0, 255, 0],     // 3: green
    [0, 255, 255],   // 4: cyan
    [0, 0, 255],     // 5: blue
    [255, 0, 255],   // 6: magenta
    [255, 255, 255], // 7: white
];

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [u8; 3] {
    let c = v * s;
    let h_prime = h / 60.0;
    let x = c * (1.0 - (h_prime.rem_euclid(2.0) - 1.0).abs());
    let (r1, g1, b1) = match h_prime as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = v - c;
    [
        (((r1 + m) * 255.0).round() as u8),
        (((g1 + m) * 255.0).round() as u8),
        (((b1 + m) * 255.0).round() as u8),
    ]
}

/// Maps an AutoCAD Color Index to an 8-bit RGB triple, per spec §4.1: the
/// standard 7-color table for 1..7, fixed grays for 8..9 and 250..255, and a
/// 24-hue × 10-shade HSV approximation for everything else in 10..249.
fn aci_to_rgb(index: i64) -> [u8; 3] {
    match index {
        1..=7 => ACI_BASE[index as usize],
        8 => [65, 65, 65],
        9 => [128, 128, 128],
        250..=255 => {
            let shade = (index - 250) as u8;
            let gray = 51 + shade * 41;
            [gray, gray, gray]
        }
        10..=249 => {
            let n = index - 10;
            let hue_step = (n / 10) % 24;
            let shade = n % 10;
            let hue = hue_step as f32 * 15.0;
            let value = 1.0 - (shade as f32 / 10.0) * 0.5;
            hsv_to_rgb(hue, 1.0, value)
        }
        _ => [255, 255, 255],
    }
}

fn unpack_true_color(value: i64) -> [u8; 3] {
    let v = value as u32;
    [((v >> 16) & 0xff) as u8, ((v >> 8) & 0xff) as u8, (v & 0xff) as u8]
}

struct Pair {
    code: i32,
    value: String,
}

fn parse_pairs(text: &str) -> Vec<Pair> {
    let mut lines = text.lines();
    let mut pairs = Vec::new();
    while let (Some(code_line), Some(value_line)) = (lines.next(), lines.next()) {
        if let Ok(code) = code_line.trim().parse::<i32>() {
            pairs.push(Pair {
                code,
                value: value_line.trim().to_string(),
            });
        }
    }
    pairs
}

struct RawPoint {
    position: glam::DVec3,
    color: [f32; 3],
}

/// Decodes a DXF byte buffer, extracting `POINT` and `3DFACE` entities from
/// the `ENTITIES` section.
pub fn decode(bytes: &[u8]) -> Result<CanonicalCloud> {
    let text = std::str::from_utf8(bytes).map_err(|_| Error::Truncated {
        format: "DXF",
        detail: "file is not valid UTF-8".into(),
    })?;
    let pairs = parse_pairs(text);

    let mut in_entities = false;
    let mut raw_points: Vec<RawPoint> = Vec::new();
    let mut indices: Vec<u32> = Vec::new();

    let mut i = 0;
    while i < pairs.len() {
        let pair = &pairs[i];
        if pair.code == 0 && pair.value == "SECTION" {
            if let Some(next) = pairs.get(i + 1) {
                if next.code == 2 {
                    in_entities = next.value == "ENTITIES";
                }
            }
            i += 1;
            continue;
        }
        if pair.code == 0 && pair.value == "ENDSEC" {
            in_entities = false;
            i += 1;
            continue;
        }
        if !in_entities || pair.code != 0 {
            i += 1;
            continue;
        }

        match pair.value.as_str() {
            "POINT" => {
                let (entity, consumed) = collect_entity(&pairs, i + 1);
                let mut coords = [0.0f64; 3];
                let mut aci: i64 = 7;
                let mut true_color: Option<i64> = None;
                for p in &entity {
                    match p.code {
                        10 => coords[0] = p.value.parse().unwrap_or(0.0),
                        20 => coords[1] = p.value.parse().unwrap_or(0.0),
                        30 => coords[2] = p.value.parse().unwrap_or(0.0),
                        62 => aci = p.value.parse().unwrap_or(7),
                        420 => true_color = p.value.parse().ok(),
                        _ => {}
                    }
                }
                let rgb = true_color
                    .map(unpack_true_color)
                    .unwrap_or_else(|| aci_to_rgb(aci));
                raw_points.push(RawPoint {
                    position: glam::DVec3::from_array(coords),
                    color: [rgb[0] as f32 / 255.0, rgb[1] as f32 / 255.0, rgb[2] as f32 / 255.0],
                });
                i += 1 + consumed;
            }
            "3DFACE" => {
                let (entity, consumed) = collect_entity(&pairs, i + 1);
                let mut corners = [[0.0f64; 3]; 4];
                let mut aci: i64 = 7;
                let mut true_color: Option<i64> = None;
                for p in &entity {
                    match p.code {
                        10 => corners[0][0] = p.value.parse().unwrap_or(0.0),
                        20 => corners[0][1] = p.value.parse().unwrap_or(0.0),
                        30 => corners[0][2] = p.value.parse().unwrap_or(0.0),
                        11 => corners[1][0] = p.value.parse().unwrap_or(0.0),
                        21 => corners[1][1] = p.value.parse().unwrap_or(0.0),
                        31 => corners[1][2] = p.value.parse().unwrap_or(0.0),
                        12 => corners[2][0] = p.value.parse().unwrap_or(0.0),
                        22 => corners[2][1] = p.value.parse().unwrap_or(0.0),
                        32 => corners[2][2] = p.value.parse().unwrap_or(0.0),
                        13 => corners[3][0] = p.value.parse().unwrap_or(0.0),
                        23 => corners[3][1] = p.value.parse().unwrap_or(0.0),
                        33 => corners[3][2] = p.value.parse().unwrap_or(0.0),
                        62 => aci = p.value.parse().unwrap_or(7),
                        420 => true_color = p.value.parse().ok(),
                        _ => {}
                    }
                }
                let rgb = true_color
                    .map(unpack_true_color)
                    .unwrap_or_else(|| aci_to_rgb(aci));
                let color = [rgb[0] as f32 / 255.0, rgb[1] as f32 / 255.0, rgb[2] as f32 / 255.0];

                // A degenerate 4th corner (equal to the 3rd) marks a
                // triangular face; otherwise fan-triangulate the quad.
                let base = raw_points.len() as u32;
                let distinct = if corners[3] == corners[2] { 3 } else { 4 };
                for corner in corners.iter().take(distinct) {
                    raw_points.push(RawPoint {
                        position: glam::DVec3::from_array(*corner),
                        color,
                    });
                }
                indices.extend_from_slice(&[base, base + 1, base + 2]);
                if distinct == 4 {
                    indices.extend_from_slice(&[base, base + 2, base + 3]);
                }
                i += 1 + consumed;
            }
            _ => {
                let (_, consumed) = collect_entity(&pairs, i + 1);
                i += 1 + consumed;
            }
        }
    }

    if raw_points.is_empty() {
        return Err(Error::EmptyCloud);
    }

    let mut header = Header::empty("dxf");
    for p in &raw_points {
        header.grow(p.position);
    }
    let center = (header.min + header.max) * 0.5;
    header.source_tag = "dxf";

    let n = raw_points.len();
    let mut positions = Vec::with_capacity(n * 3);
    let mut colors = Vec::with_capacity(n * 3);
    for p in &raw_points {
        let yup = CanonicalCloud::to_yup(p.position, center);
        positions.push(yup.x);
        positions.push(yup.y);
        positions.push(yup.z);
        colors.extend_from_slice(&p.color);
    }
    let _ = DEFAULT_GRAY; // DXF always has derived color, kept for parity with other decoders.

    let cloud = CanonicalCloud {
        positions,
        colors,
        intensities: vec![0.0; n],
        classifications: vec![0.0; n],
        indices: if indices.is_empty() { None } else { Some(indices) },
        header,
        center,
        has_color: true,
        has_intensity: false,
        has_classification: false,
    };
    debug_assert!(cloud.check_invariants());
    Ok(cloud)
}

/// Collects group codes belonging to the entity starting right after a `(0,
/// name)` pair, stopping at the next `code == 0` pair. Returns the slice of
/// pairs consumed and how many pairs were consumed (to advance the cursor).
fn collect_entity(pairs: &[Pair], start: usize) -> (Vec<&Pair>, usize) {
    let mut out = Vec::new();
    let mut idx = start;
    while idx < pairs.len() && pairs[idx].code != 0 {
        out.push(&pairs[idx]);
        idx += 1;
    }
    (out, idx - start)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap_entities(body: &str) -> String {
        format!("0\nSECTION\n2\nENTITIES\n{body}0\nENDSEC\n0\nEOF\n")
    }

    #[test]
    fn point_entity_with_aci_color() {
        let text = wrap_entities("0\nPOINT\n10\n1.0\n20\n2.0\n30\n3.0\n62\n1\n");
        let cloud = decode(text.as_bytes()).unwrap();
        assert_eq!(cloud.point_count(), 1);
        assert_eq!(cloud.colors, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn point_entity_with_true_color_overrides_aci() {
        let text = wrap_entities("0\nPOINT\n10\n0\n20\n0\n30\n0\n62\n1\n420\n65280\n");
        let cloud = decode(text.as_bytes()).unwrap();
        assert_eq!(cloud.colors, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn triangular_3dface_emits_one_triangle() {
        let text = wrap_entities(
            "0\n3DFACE\n10\n0\n20\n0\n30\n0\n11\n1\n21\n0\n31\n0\n12\n0\n22\n1\n32\n0\n13\n0\n23\n1\n33\n0\n",
        );
        let cloud = decode(text.as_bytes()).unwrap();
        assert_eq!(cloud.point_count(), 3);
        assert_eq!(cloud.indices.as_ref().unwrap(), &vec![0, 1, 2]);
    }

    #[test]
    fn non_entities_sections_are_ignored() {
        let text = "0\nSECTION\n2\nHEADER\n0\nPOINT\n10\n1\n20\n1\n30\n1\n0\nENDSEC\n0\nEOF\n";
        let err = decode(text.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::EmptyCloud));
    }

    #[test]
    fn aci_gray_band_maps_to_fixed_gray() {
        let text = wrap_entities("0\nPOINT\n10\n0\n20\n0\n30\n0\n62\n9\n");
        let cloud = decode(text.as_bytes()).unwrap();
        assert!((cloud.colors[0] - 128.0 / 255.0).abs() < 1e-3);
    }
}
