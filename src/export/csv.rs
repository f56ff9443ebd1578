//! CSV exporter, per spec §4.9: header `x,y,z,r,g,b,intensity,classification`.

use crate::cloud::CanonicalCloud;

/// Serializes `cloud` as CSV with a fixed header row.
pub fn encode(cloud: &CanonicalCloud) -> Vec<u8> {
    let mut out = String::from("x,y,z,r,g,b,intensity,classification\n");
    for i in 0..cloud.point_count() {
        let rgb = super::rgb_bytes(cloud, i);
        let intensity = cloud.intensities.get(i).copied().unwrap_or(0.0);
        let classification = cloud.classifications.get(i).copied().unwrap_or(0.0) as u8;
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{}\n",
            cloud.positions[i * 3],
            cloud.positions[i * 3 + 1],
            cloud.positions[i * 3 + 2],
            rgb[0],
            rgb[1],
            rgb[2],
            intensity,
            classification,
        ));
    }
    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::Header;

    #[test]
    fn header_row_matches_spec_column_order() {
        let cloud = CanonicalCloud {
            positions: vec![],
            colors: vec![],
            intensities: vec![],
            classifications: vec![],
            indices: None,
            header: Header::default(),
            center: glam::DVec3::ZERO,
            has_color: false,
            has_intensity: false,
            has_classification: false,
        };
        let text = String::from_utf8(encode(&cloud)).unwrap();
        assert_eq!(text, "x,y,z,r,g,b,intensity,classification\n");
    }

    #[test]
    fn data_row_matches_point_fields() {
        let cloud = CanonicalCloud {
            positions: vec![1.0, 2.0, 3.0],
            colors: vec![0.0, 1.0, 0.0],
            intensities: vec![0.75],
            classifications: vec![5.0],
            indices: None,
            header: Header::default(),
            center: glam::DVec3::ZERO,
            has_color: true,
            has_intensity: true,
            has_classification: true,
        };
        let text = String::from_utf8(encode(&cloud)).unwrap();
        assert_eq!(text.lines().nth(1), Some("1,2,3,0,255,0,0.75,5"));
    }
}
