//! JSON-shaped messages crossing the dispatcher/worker boundary, per spec
//! §4.10. These are small and infrequent (one request, a handful of
//! progress ticks, one terminal message) so `serde_json` round-trips them
//! directly rather than hand-packing a binary layout, unlike the LOD chunk
//! wire format in [`crate::lod::wire`].

use serde::{Deserialize, Serialize};

/// A single parse request: decode `buffer` as `extension`, keyed by a
/// caller-chosen `id` so responses can be matched back up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseRequest {
    /// Caller-chosen correlation id.
    pub id: String,
    /// File extension, case-insensitive, without the leading dot.
    pub extension: String,
    /// The file's raw bytes. Conceptually transferred (moved), not copied,
    /// to the worker with the request and back as the result's buffers.
    pub buffer: Vec<u8>,
}

/// One message emitted over the course of handling a [`ParseRequest`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParseMessage {
    /// A progress tick; the dispatcher emits at least `Reading file`,
    /// `Parsing`, `Transferring data`, and `Complete`.
    Progress {
        /// The request this message belongs to.
        id: String,
        /// Human-readable phase name.
        phase: String,
        /// Overall progress, `0..=100`.
        percent: u8,
    },
    /// The request completed; the decoded cloud itself is handed back as
    /// the caller's `dispatch` return value, not re-serialized here.
    Result {
        /// The request this message belongs to.
        id: String,
    },
    /// The request failed.
    Error {
        /// The request this message belongs to.
        id: String,
        /// A human-readable error message.
        message: String,
    },
}
