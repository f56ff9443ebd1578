//! XYZ exporter, per spec §4.9: one `x y z R G B` line per point, RGB as
//! `0..=255` integers.

use crate::cloud::CanonicalCloud;

/// Serializes `cloud` as whitespace-separated XYZ text.
pub fn encode(cloud: &CanonicalCloud) -> Vec<u8> {
    let mut out = String::new();
    for i in 0..cloud.point_count() {
        let rgb = super::rgb_bytes(cloud, i);
        out.push_str(&format!(
            "{} {} {} {} {} {}\n",
            cloud.positions[i * 3],
            cloud.positions[i * 3 + 1],
            cloud.positions[i * 3 + 2],
            rgb[0],
            rgb[1],
            rgb[2],
        ));
    }
    out.into_bytes()
}
