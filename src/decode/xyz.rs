//! XYZ / TXT / CSV / ASC decoder: delimited plain-text point records, per
//! spec §4.1. Column count selects the schema: 3=XYZ, 4=XYZ+intensity,
//! 6=XYZ+RGB, 7+=XYZ+intensity+RGB.

use crate::cloud::{CanonicalCloud, Header, DEFAULT_GRAY};
use crate::decode::stride;
use crate::{Error, Result};

const DELIMITERS: [char; 4] = [',', ';', '\t', ' '];

fn split_line(line: &str, delimiter: char) -> Vec<&str> {
    if delimiter == ' ' {
        line.split_whitespace().collect()
    } else {
        line.split(delimiter).map(str::trim).filter(|t| !t.is_empty()).collect()
    }
}

fn detect_delimiter(line: &str) -> char {
    for &d in &DELIMITERS {
        if d == ' ' {
            continue;
        }
        if line.contains(d) {
            return d;
        }
    }
    ' '
}

/// Decodes a whitespace/comma/semicolon/tab-delimited XYZ-family text cloud.
pub fn decode(bytes: &[u8]) -> Result<CanonicalCloud> {
    let text = std::str::from_utf8(bytes).map_err(|_| Error::Truncated {
        format: "XYZ",
        detail: "file is not valid UTF-8".into(),
    })?;

    let mut lines = text.lines().filter(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'));
    let first = match lines.next() {
        Some(l) => l,
        None => return Err(Error::EmptyCloud),
    };

    let delimiter = detect_delimiter(first);
    let first_tokens = split_line(first, delimiter);
    let first_is_header = first_tokens
        .first()
        .map(|t| t.parse::<f64>().is_err())
        .unwrap_or(true);

    let mut data_lines: Vec<&str> = Vec::new();
    if !first_is_header {
        data_lines.push(first);
    }
    data_lines.extend(lines);

    if data_lines.is_empty() {
        return Err(Error::EmptyCloud);
    }

    let column_count = split_line(data_lines[0], delimiter).len();
    if column_count < 3 {
        return Err(Error::Truncated {
            format: "XYZ",
            detail: format!("expected at least 3 columns, found {column_count}"),
        });
    }

    let mut parsed: Vec<Vec<f64>> = Vec::with_capacity(data_lines.len());
    for line in &data_lines {
        let tokens = split_line(line, delimiter);
        if tokens.len() < 3 {
            continue;
        }
        let values: Vec<f64> = tokens.iter().map(|t| t.parse::<f64>().unwrap_or(0.0)).collect();
        parsed.push(values);
    }
    if parsed.is_empty() {
        return Err(Error::EmptyCloud);
    }

    let stride_ids: Vec<usize> = stride::sampled_indices(parsed.len()).collect();

    let mut header = Header::empty("xyz");
    for &i in &stride_ids {
        let row = &parsed[i];
        header.grow(glam::DVec3::new(row[0], row[1], row[2]));
    }
    let center = (header.min + header.max) * 0.5;
    header.source_tag = "xyz";

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

        match column_count {
            4 => intensities.push(((row[3] / 255.0) as f32).clamp(0.0, 1.0)),
            n if n >= 7 => intensities.push(((row[3] / 255.0) as f32).clamp(0.0, 1.0)),
            _ => intensities.push(0.0),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_column_rows_have_no_color_or_intensity() {
        let text = "0 0 0\n1 0 0\n0 1 0\n";
        let cloud = decode(text.as_bytes()).unwrap();
        assert_eq!(cloud.point_count(), 3);
        assert!(!cloud.has_color);
        assert!(!cloud.has_intensity);
    }

    #[test]
    fn header_line_is_skipped() {
        let text = "x y z\n0 0 0\n1 0 0\n";
        let cloud = decode(text.as_bytes()).unwrap();
        assert_eq!(cloud.point_count(), 2);
    }

    #[test]
    fn comma_delimited_six_columns_carries_color() {
        let text = "0,0,0,255,0,0\n1,0,0,0,255,0\n";
        let cloud = decode(text.as_bytes()).unwrap();
        assert!(cloud.has_color);
        assert_eq!(&cloud.colors[0..3], &[1.0, 0.0, 0.0]);
    }

    #[test]
    fn four_columns_is_intensity_divided_by_255() {
        let text = "0 0 0 255\n1 0 0 0\n";
        let cloud = decode(text.as_bytes()).unwrap();
        assert!(cloud.has_intensity);
        assert!((cloud.intensities[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn empty_file_fails_with_empty_cloud() {
        let err = decode(b"").unwrap_err();
        assert!(matches!(err, Error::EmptyCloud));
    }
}
