//! Metadata carried over from the source file, distinct from the canonical
//! per-point buffers it describes.

/// Original bounds and legacy scale/offset, preserved in source-frame units.
///
/// `scale`/`offset` are only meaningful for sources with a legacy
/// LAS-style fixed-point encoding; other decoders leave them at the
/// identity/zero default.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Header {
    /// Minimum XYZ in source frame.
    pub min: glam::DVec3,
    /// Maximum XYZ in source frame.
    pub max: glam::DVec3,
    /// Human-readable tag identifying the decoder that produced this cloud
    /// (e.g. `"las"`, `"ply-ascii"`, `"e57"`).
    pub source_tag: &'static str,
    /// Legacy LAS-like scale factor, identity (`1.0`) for non-LAS sources.
    pub scale: glam::DVec3,
    /// Legacy LAS-like offset, zero for non-LAS sources.
    pub offset: glam::DVec3,
}

impl Default for Header {
    fn default() -> Self {
        Header {
            min: glam::DVec3::ZERO,
            max: glam::DVec3::ZERO,
            source_tag: "unknown",
            scale: glam::DVec3::ONE,
            offset: glam::DVec3::ZERO,
        }
    }
}

impl Header {
    /// An empty header whose bounds are ready to be grown with [`Header::grow`]
    /// (min at `+inf`, max at `-inf`), for decoders that must compute bounds
    /// from the points themselves rather than reading them from a file header.
    pub fn empty(source_tag: &'static str) -> Self {
        Header {
            min: glam::DVec3::splat(f64::INFINITY),
            max: glam::DVec3::splat(f64::NEG_INFINITY),
            source_tag,
            scale: glam::DVec3::ONE,
            offset: glam::DVec3::ZERO,
        }
    }

    /// Grows `min`/`max` to include `point` (source-frame coordinates).
    pub fn grow(&mut self, point: glam::DVec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }
}
