//! PTX decoder: Leica/Cyclone scan format with one or more per-scan blocks,
//! each carrying its own columns×rows grid and a 4×4 registration transform
//! (spec §4.1).

use crate::cloud::{CanonicalCloud, Header, DEFAULT_GRAY};
use crate::decode::stride;
use crate::{Error, Result};

struct ScanPoint {
    local: glam::DVec3,
    intensity: f64,
    color: Option<[f64; 3]>,
}

/// Decodes a PTX byte buffer, merging every scan's points into one cloud
/// after applying each scan's own 4×4 transform.
pub fn decode(bytes: &[u8]) -> Result<CanonicalCloud> {
    let text = std::str::from_utf8(bytes).map_err(|_| Error::Truncated {
        format: "PTX",
        detail: "file is not valid UTF-8".into(),
    })?;
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());

    let mut world_points: Vec<(glam::DVec3, f64, Option<[f64; 3]>)> = Vec::new();

    loop {
        let Some(columns_line) = lines.next() else {
            break;
        };
        let columns: usize = columns_line.trim().parse().map_err(|_| Error::Truncated {
            format: "PTX",
            detail: "expected column count".into(),
        })?;
        let rows_line = lines.next().ok_or(Error::Truncated {
            format: "PTX",
            detail: "missing row count".into(),
        })?;
        let rows: usize = rows_line.trim().parse().map_err(|_| Error::Truncated {
            format: "PTX",
            detail: "expected row count".into(),
        })?;

        // Scanner position, then three rotation-axis lines: all skipped per spec.
        for _ in 0..4 {
            lines.next().ok_or(Error::Truncated {
                format: "PTX",
                detail: "missing scanner pose lines".into(),
            })?;
        }

        let mut transform_rows = [[0.0f64; 4]; 4];
        for row in transform_rows.iter_mut() {
            let line = lines.next().ok_or(Error::Truncated {
                format: "PTX",
                detail: "missing transform row".into(),
            })?;
            let values: Vec<f64> = line
                .split_whitespace()
                .map(|t| t.parse::<f64>().unwrap_or(0.0))
                .collect();
            if values.len() < 4 {
                return Err(Error::Truncated {
                    format: "PTX",
                    detail: "transform row has fewer than 4 values".into(),
                });
            }
            row.copy_from_slice(&values[0..4]);
        }
        let transform = glam::DMat4::from_cols_array(&[
            transform_rows[0][0], transform_rows[1][0], transform_rows[2][0], transform_rows[3][0],
            transform_rows[0][1], transform_rows[1][1], transform_rows[2][1], transform_rows[3][1],
            transform_rows[0][2], transform_rows[1][2], transform_rows[2][2], transform_rows[3][2],
            transform_rows[0][3], transform_rows[1][3], transform_rows[2][3], transform_rows[3][3],
        ]);

        let mut scan_points = Vec::with_capacity(columns * rows);
        for _ in 0..(columns * rows) {
            let line = lines.next().ok_or(Error::Truncated {
                format: "PTX",
                detail: "fewer scan point lines than columns*rows".into(),
            })?;
            let tokens: Vec<f64> = line
                .split_whitespace()
                .map(|t| t.parse::<f64>().unwrap_or(0.0))
                .collect();
            if tokens.len() < 4 {
                continue;
            }
            let local = glam::DVec3::new(tokens[0], tokens[1], tokens[2]);
            if local == glam::DVec3::ZERO {
                continue; // scanner hole
            }
            let color = if tokens.len() >= 7 {
                Some([tokens[4], tokens[5], tokens[6]])
            } else {
                None
            };
            scan_points.push(ScanPoint {
                local,
                intensity: tokens[3],
                color,
            });
        }

        for point in scan_points {
            let transformed = transform.transform_point3(point.local);
            world_points.push((transformed, point.intensity, point.color));
        }
    }

    if world_points.is_empty() {
        return Err(Error::EmptyCloud);
    }

    let stride_ids: Vec<usize> = stride::sampled_indices(world_points.len()).collect();

    let mut header = Header::empty("ptx");
    for &i in &stride_ids {
        header.grow(world_points[i].0);
    }
    let center = (header.min + header.max) * 0.5;
    header.source_tag = "ptx";

    let has_color = world_points.iter().any(|(_, _, c)| c.is_some());
    let n = stride_ids.len();
    let mut positions = Vec::with_capacity(n * 3);
    let mut intensities = Vec::with_capacity(n);
    let mut colors = Vec::with_capacity(n * 3);

    let max_channel = world_points
        .iter()
        .filter_map(|(_, _, c)| *c)
        .flat_map(|c| c.into_iter())
        .fold(0.0f64, f64::max);
    let divisor = if max_channel > 1.0 { 255.0 } else { 1.0 };

    for &i in &stride_ids {
        let (world, intensity, color) = &world_points[i];
        let p = CanonicalCloud::to_yup(*world, center);
        positions.push(p.x);
        positions.push(p.y);
        positions.push(p.z);
        intensities.push(intensity.clamp(0.0, 1.0) as f32);
        if has_color {
            match color {
                Some([r, g, b]) => {
                    colors.push((r / divisor) as f32);
                    colors.push((g / divisor) as f32);
                    colors.push((b / divisor) as f32);
                }
                None => colors.extend_from_slice(&DEFAULT_GRAY),
            }
        }
    }
    if !has_color {
        for _ in 0..n {
            colors.extend_from_slice(&DEFAULT_GRAY);
        }
    }

    let cloud = CanonicalCloud {
        positions,
        colors,
        intensities,
        classifications: vec![0.0; n],
        indices: None,
        header,
        center,
        has_color,
        has_intensity: true,
        has_classification: false,
    };
    debug_assert!(cloud.check_invariants());
    Ok(cloud)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_scan_header() -> String {
        "2\n1\n0 0 0\n1 0 0\n0 1 0\n0 0 1\n1 0 0 0\n0 1 0 0\n0 0 1 0\n0 0 0 1\n".to_string()
    }

    #[test]
    fn identity_transform_preserves_local_coordinates() {
        let mut text = identity_scan_header();
        text.push_str("1 0 0 0.5\n0 1 0 0.5\n");
        let cloud = decode(text.as_bytes()).unwrap();
        assert_eq!(cloud.point_count(), 2);
    }

    #[test]
    fn scanner_holes_are_skipped() {
        let mut text = identity_scan_header();
        text.push_str("0 0 0 0\n1 0 0 0.5\n");
        let cloud = decode(text.as_bytes()).unwrap();
        assert_eq!(cloud.point_count(), 1);
    }

    #[test]
    fn rgb_columns_are_detected() {
        let mut text = identity_scan_header();
        text.push_str("1 0 0 0.5 255 0 0\n1 1 0 0.5 0 255 0\n");
        let cloud = decode(text.as_bytes()).unwrap();
        assert!(cloud.has_color);
    }

    #[test]
    fn empty_scan_fails_with_empty_cloud() {
        let text = "0\n0\n0 0 0\n1 0 0\n0 1 0\n0 0 1\n1 0 0 0\n0 1 0 0\n0 0 1 0\n0 0 0 1\n";
        let err = decode(text.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::EmptyCloud));
    }
}
