//! Crate-wide error kinds.
//!
//! Variants map 1:1 onto the failure taxonomy used across decoders, the
//! reconstructor, and the LOD controller: decoder-time failures are
//! non-retryable and surfaced to the user, `Cancelled` is an expected outcome
//! suppressed from error UI, and `BackendError` is absorbed by the LOD
//! controller and never propagated further.

use thiserror::Error as ThisError;

/// Crate-specific errors.
#[derive(Debug, ThisError)]
pub enum Error {
    /// The byte stream did not start with the format's expected magic bytes.
    #[error("invalid signature for format {format}")]
    InvalidSignature {
        /// The format the decoder was attempting to parse.
        format: &'static str,
    },

    /// The file uses a variant of the format this decoder does not support
    /// (e.g. a compressed E57 codec).
    #[error("unsupported variant of {format}: {detail}")]
    UnsupportedVariant {
        /// The format the decoder was attempting to parse.
        format: &'static str,
        /// Human-readable detail about what made the variant unsupported.
        detail: String,
    },

    /// No decoder is registered for this file extension.
    #[error("unsupported file extension: {0}")]
    UnsupportedExtension(String),

    /// The file belongs to a proprietary format with no open decoder; a
    /// conversion hint is provided.
    #[error("{extension} is a proprietary format; convert it to {hint} first")]
    ProprietaryFormat {
        /// The rejected extension, e.g. `.rcp`.
        extension: &'static str,
        /// A suggested interchange format to convert to.
        hint: &'static str,
    },

    /// The byte stream ended before the format's declared content did.
    #[error("truncated {format} data: {detail}")]
    Truncated {
        /// The format being parsed.
        format: &'static str,
        /// What was being read when the stream ran out.
        detail: String,
    },

    /// A decoder produced zero points.
    #[error("decoded cloud is empty")]
    EmptyCloud,

    /// The surface reconstructor produced zero triangles.
    #[error("reconstruction produced no triangles")]
    EmptyResult,

    /// A cancellable operation (reconstruction) was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// The LOD backend collaborator failed; the controller logs this and
    /// skips the tick rather than propagating it to the UI.
    #[error("LOD backend error: {0}")]
    BackendError(String),

    /// Wraps I/O errors from the `Read`/`byteorder` plumbing shared by every
    /// binary decoder.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
