//! Format decoders: each maps an immutable byte range to a
//! [`crate::cloud::CanonicalCloud`] satisfying every invariant documented
//! there, with `has_color`/`has_intensity`/`has_classification` set from
//! what the source actually carried (spec §4.1).
//!
//! Decoders never partially commit: every decode function returns
//! `crate::Result<CanonicalCloud>`, so a `?` on any read failure discards all
//! work so far, mirroring the teacher's build-then-convert-in-one-shot
//! pattern (`Header::from_raw`, `Builder::into_reader`).

pub mod dxf;
pub mod e57;
pub mod las;
pub mod laz;
pub mod obj;
pub mod off;
pub mod pcd;
pub mod ply;
pub mod pts;
pub mod ptx;
pub mod stl;
pub mod stride;
pub mod xyz;

use crate::cloud::CanonicalCloud;
use crate::Error;

/// Decodes `bytes` by dispatching on `extension` (case-insensitive, without
/// the leading dot). Closed family, per spec §9: no runtime registration.
pub fn decode_by_extension(extension: &str, bytes: &[u8]) -> crate::Result<CanonicalCloud> {
    match extension.to_ascii_lowercase().as_str() {
        "las" => las::decode(bytes),
        "laz" => laz::decode(bytes),
        "ply" => ply::decode(bytes),
        "xyz" | "txt" | "csv" | "asc" => xyz::decode(bytes),
        "pts" => pts::decode(bytes),
        "ptx" => ptx::decode(bytes),
        "obj" => obj::decode(bytes),
        "off" | "coff" | "noff" | "cnoff" => off::decode(bytes),
        "stl" => stl::decode(bytes),
        "pcd" => pcd::decode(bytes),
        "dxf" => dxf::decode(bytes),
        "e57" => e57::decode(bytes),
        "rcp" => Err(Error::ProprietaryFormat {
            extension: ".rcp",
            hint: "E57",
        }),
        "rcs" => Err(Error::ProprietaryFormat {
            extension: ".rcs",
            hint: "E57",
        }),
        "fls" => Err(Error::ProprietaryFormat {
            extension: ".fls",
            hint: "E57",
        }),
        other => Err(Error::UnsupportedExtension(other.to_string())),
    }
}

/// Whether a format requires a main-thread XML parser (spec §4.2: only E57).
pub fn requires_main_thread(extension: &str) -> bool {
    extension.eq_ignore_ascii_case("e57")
}
