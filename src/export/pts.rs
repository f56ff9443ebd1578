//! PTS exporter, per spec §4.9: a leading point-count line, then
//! `x y z intensity R G B` per point.

use crate::cloud::CanonicalCloud;

/// Serializes `cloud` in the Leica PTS layout, intensity as a raw `[0, 1]`
/// float to mirror the other exporters rather than rescaling to PTS's own
/// `0..=4095`/`0..=255` decode-side conventions, which are lossy and
/// direction-specific.
pub fn encode(cloud: &CanonicalCloud) -> Vec<u8> {
    let mut out = format!("{}\n", cloud.point_count());
    for i in 0..cloud.point_count() {
        let rgb = super::rgb_bytes(cloud, i);
        let intensity = cloud.intensities.get(i).copied().unwrap_or(0.0);
        out.push_str(&format!(
            "{} {} {} {} {} {} {}\n",
            cloud.positions[i * 3],
            cloud.positions[i * 3 + 1],
            cloud.positions[i * 3 + 2],
            intensity,
            rgb[0],
            rgb[1],
            rgb[2],
        ));
    }
    out.into_bytes()
}
