//! PTS decoder: Leica/Cyclone point cloud text format, per spec §4.1.
//! Shares the XYZ-family column layout (3/4/6/7 columns) but differs in its
//! optional leading point-count line and its intensity normalization rule.

use crate::cloud::{CanonicalCloud, Header, DEFAULT_GRAY};
use crate::decode::stride;
use crate::{Error, Result};

/// Normalizes a raw PTS intensity value per spec §4.1: negative raw values
/// are Cyclone's signed 12-bit range, values over 1 are assumed 0..255,
/// otherwise the value is already normalized.
fn normalize_intensity(raw: f64) -> f64 {
    if raw < 0.0 {
        (raw + 2048.0) / 4095.0
    } else if raw > 1.0 {
        raw / 255.0
    } else {
        raw
    }
}

/// Decodes a PTS byte buffer.
pub fn decode(bytes: &[u8]) -> Result<CanonicalCloud> {
    let text = std::str::from_utf8(bytes).map_err(|_| Error::Truncated {
        format: "PTS",
        detail: "file is not valid UTF-8".into(),
    })?;

    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let first = match lines.next() {
        Some(l) => l,
        None => return Err(Error::EmptyCloud),
    };

    let first_tokens: Vec<&str> = first.split_whitespace().collect();
    let first_is_count = first_tokens.len() == 1 && first_tokens[0].parse::<u64>().is_ok();

    let mut data_lines: Vec<&str> = Vec::new();
    if !first_is_count {
        data_lines.push(first);
    }
    data_lines.extend(lines);
    if data_lines.is_empty() {
        return Err(Error::EmptyCloud);
    }

    let column_count = data_lines[0].split_whitespace().count();
    if column_count < 3 {
        return Err(Error::Truncated {
            format: "PTS",
            detail: format!("expected at least 3 columns, found {column_count}"),
        });
    }

    let mut parsed: Vec<Vec<f64>> = Vec::with_capacity(data_lines.len());
    for line in &data_lines {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 3 {
            continue;
        }
        parsed.push(tokens.iter().map(|t| t.parse::<f64>().unwrap_or(0.0)).collect());
    }
    if parsed.is_empty() {
        return Err(Error::EmptyCloud);
    }

    let stride_ids: Vec<usize> = stride::sampled_indices(parsed.len()).collect();

    let mut header = Header::empty("pts");
    for &i in &stride_ids {
        let row = &parsed[i];
        header.grow(glam::DVec3::new(row[0], row[1], row[2]));
    }
    let center = (header.min + header.max) * 0.5;
    header.source_tag = "pts";

    let n = stride_ids.len();
    let has_intensity = column_count == 4 || column_count >= 7;
    let has_color = column_count == 6 || column_count >= 7;

    let mut positions = Vec::with_capacity(n * 3);
    let mut intensities = Vec::with_capacity(n);
    let mut colors = Vec::with_capacity(n * 3);
    let mut max_channel = 0.0f64;
    let mut raw_colors: Vec<[f64; 3]> = Vec::new();

    for &i in &stride_ids {
        let row = &parsed[i];
        let source = glam::DVec3::new(row[0], row[1], row[2]);
        let p = CanonicalCloud::to_yup(source, center);
        positions.push(p.x);
        positions.push(p.y);
        positions.push(p.z);

        if has_intensity {
            intensities.push(normalize_intensity(row[3]) as f32);
        } else {
            intensities.push(0.0);
        }

        if has_color {
            let rgb_start = if column_count == 6 { 3 } else { 4 };
            let (r, g, b) = (row[rgb_start], row[rgb_start + 1], row[rgb_start + 2]);
            max_channel = max_channel.max(r).max(g).max(b);
            raw_colors.push([r, g, b]);
        }
    }

    if has_color {
        let divisor = if max_channel > 1.0 { 255.0 } else { 1.0 };
        for [r, g, b] in raw_colors {
            colors.push((r / divisor) as f32);
            colors.push((g / divisor) as f32);
            colors.push((b / divisor) as f32);
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
        classifications: vec![0.0; n],
        indices: None,
        header,
        center,
        has_color,
        has_intensity,
        has_classification: false,
    };
    debug_assert!(cloud.check_invariants());
    Ok(cloud)
}
