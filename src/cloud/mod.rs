//! The canonical, in-memory representation every decoder converts into.
//!
//! A [`CanonicalCloud`] is the one shared record type for parsed point data.
//! Every public operation in this crate (decode, transform, reconstruct,
//! export) must leave a `CanonicalCloud` satisfying the invariants documented
//! on its fields below.

mod header;

pub use header::Header;

/// One loaded dataset: positions plus whatever per-point attributes the
/// source format actually carried.
///
/// # Invariants
///
/// - `positions.len() % 3 == 0`
/// - `colors.len() == positions.len()`
/// - `intensities.len() == positions.len() / 3`
/// - `classifications.len() == positions.len() / 3`
/// - if `indices` is `Some`, every index is `< positions.len() / 3` and
///   `indices.len() % 3 == 0`
/// - every color component is finite and in `[0, 1]`; every intensity is in
///   `[0, 1]`; every classification is a nonnegative integer value
#[derive(Clone, Debug, PartialEq)]
pub struct CanonicalCloud {
    /// Flattened XYZ triples, right-handed Y-up, centered at `center`.
    pub positions: Vec<f32>,
    /// Flattened RGB triples in `[0, 1]`.
    pub colors: Vec<f32>,
    /// Per-point intensity in `[0, 1]`.
    pub intensities: Vec<f32>,
    /// Per-point ASPRS classification code, stored as `f32` per spec.
    pub classifications: Vec<f32>,
    /// Triangle indices, present only for mesh sources or after reconstruction.
    pub indices: Option<Vec<u32>>,
    /// Metadata carried from the source format.
    pub header: Header,
    /// The offset subtracted from source coordinates to produce `positions`.
    pub center: glam::DVec3,
    /// Whether the source actually carried per-point color.
    pub has_color: bool,
    /// Whether the source actually carried per-point intensity.
    pub has_intensity: bool,
    /// Whether the source actually carried per-point classification.
    pub has_classification: bool,
}

/// Uniform gray used when a source has no per-point color.
pub const DEFAULT_GRAY: [f32; 3] = [0.8, 0.8, 0.8];

/// Soft output ceiling every decoder applies via stride sampling.
pub const MAX_POINTS: usize = 5_000_000;

impl CanonicalCloud {
    /// Number of points (`positions.len() / 3`).
    pub fn point_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Checks every invariant documented on the struct; used by decoders and
    /// tests to assert a cloud is well-formed before it's handed to the
    /// registry.
    pub fn check_invariants(&self) -> bool {
        let n = self.positions.len();
        if n % 3 != 0 {
            return false;
        }
        let point_count = n / 3;
        if self.colors.len() != n {
            return false;
        }
        if self.intensities.len() != point_count || self.classifications.len() != point_count {
            return false;
        }
        if !self
            .colors
            .iter()
            .all(|c| c.is_finite() && (0.0..=1.0).contains(c))
        {
            return false;
        }
        if !self
            .intensities
            .iter()
            .all(|i| i.is_finite() && (0.0..=1.0).contains(i))
        {
            return false;
        }
        if !self
            .classifications
            .iter()
            .all(|c| c.is_finite() && *c >= 0.0)
        {
            return false;
        }
        if let Some(indices) = &self.indices {
            if indices.len() % 3 != 0 {
                return false;
            }
            if !indices.iter().all(|i| (*i as usize) < point_count) {
                return false;
            }
        }
        true
    }

    /// Converts a source-frame point into this cloud's Y-up, centered frame,
    /// per spec §3: `y = sourceZ - centerZ`, `z = -(sourceY - centerY)`.
    pub fn to_yup(source: glam::DVec3, center: glam::DVec3) -> glam::Vec3 {
        glam::Vec3::new(
            (source.x - center.x) as f32,
            (source.z - center.z) as f32,
            -(source.y - center.y) as f32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_cloud() -> CanonicalCloud {
        CanonicalCloud {
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
        }
    }

    #[test]
    fn empty_cloud_satisfies_invariants() {
        assert!(empty_cloud().check_invariants());
    }

    #[test]
    fn mismatched_lengths_fail_invariants() {
        let mut cloud = empty_cloud();
        cloud.positions = vec![0.0, 0.0, 0.0];
        assert!(!cloud.check_invariants());
    }

    #[test]
    fn yup_conversion_matches_spec_formula() {
        let center = glam::DVec3::new(1.0, 2.0, 3.0);
        let source = glam::DVec3::new(5.0, 10.0, 20.0);
        let p = CanonicalCloud::to_yup(source, center);
        assert_eq!(p.x, 4.0);
        assert_eq!(p.y, 17.0); // sourceZ - centerZ
        assert_eq!(p.z, -8.0); // -(sourceY - centerY)
    }
}
