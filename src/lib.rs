//! Core data plane for an interactive viewer/editor for large 3D point clouds.
//!
//! This crate owns the parts of that kind of application that are genuinely hard
//! engineering: a family of format decoders that normalize heterogeneous point
//! cloud sources into one [`cloud::CanonicalCloud`], a level-of-detail subsystem
//! that keeps interactive frame rates on clouds too large for GPU memory, a
//! greedy-projection surface reconstructor, and the transform/edit pipeline that
//! mutates clouds in place while preserving the invariants the renderer and LOD
//! controller rely on.
//!
//! The 3D renderer, window/UI shell, and remote building-download client are
//! external collaborators and are only specified here at their interfaces (see
//! [`lod::backend`] and the decoder [`Error`] kinds).
//!
//! # Reading a cloud
//!
//! ```no_run
//! use pcloud_core::decode;
//!
//! let bytes = std::fs::read("scan.las").unwrap();
//! let cloud = decode::decode_by_extension("las", &bytes).unwrap();
//! println!("{} points", cloud.point_count());
//! ```

#![deny(missing_debug_implementations)]

pub mod cloud;
pub mod config;
pub mod decode;
pub mod dispatch;
pub mod editing;
pub mod export;
pub mod lod;
pub mod reconstruct;
pub mod registry;
pub mod selection;
pub mod spatial;

mod error;

pub use error::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;
