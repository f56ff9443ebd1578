//! Parse Dispatcher (spec §4.2): picks a decoder by case-insensitive
//! extension, emits the `Reading file` → `Parsing` → `Transferring data` →
//! `Complete` progress sequence, and hands the Canonical Cloud back as the
//! result of a single-shot request keyed by `id`.
//!
//! Every format decoder here runs synchronously; `requires_main_thread`
//! tells a caller which extensions (only E57) need to run on the thread
//! that owns the XML parser rather than a worker.

pub mod protocol;

use log::info;

use crate::cloud::CanonicalCloud;
use crate::decode;
use crate::Result;
use protocol::{ParseMessage, ParseRequest};

/// Runs `request` through the decoder family, invoking `on_message` with
/// every progress/result/error message along the way and returning the
/// decoded cloud (or propagating the decode error) to the caller.
pub fn dispatch(request: ParseRequest, mut on_message: impl FnMut(ParseMessage)) -> Result<CanonicalCloud> {
    let id = request.id;
    info!("dispatching parse request {id} for extension `{}`", request.extension);

    on_message(ParseMessage::Progress {
        id: id.clone(),
        phase: "Reading file".into(),
        percent: 0,
    });
    on_message(ParseMessage::Progress {
        id: id.clone(),
        phase: "Parsing".into(),
        percent: 20,
    });

    match decode::decode_by_extension(&request.extension, &request.buffer) {
        Ok(cloud) => {
            on_message(ParseMessage::Progress {
                id: id.clone(),
                phase: "Transferring data".into(),
                percent: 90,
            });
            on_message(ParseMessage::Progress {
                id: id.clone(),
                phase: "Complete".into(),
                percent: 100,
            });
            on_message(ParseMessage::Result { id });
            Ok(cloud)
        }
        Err(err) => {
            on_message(ParseMessage::Error {
                id,
                message: err.to_string(),
            });
            Err(err)
        }
    }
}

/// Whether `extension` requires a main-thread XML parser (spec §4.2: only
/// E57) rather than running on the parse worker.
pub fn requires_main_thread(extension: &str) -> bool {
    decode::requires_main_thread(extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_parse_emits_full_progress_sequence_then_result() {
        let request = ParseRequest {
            id: "req-1".into(),
            extension: "off".into(),
            buffer: b"OFF\n3 1 0\n0 0 0\n1 0 0\n0 1 0\n3 0 1 2\n".to_vec(),
        };
        let mut messages = Vec::new();
        let cloud = dispatch(request, |m| messages.push(m)).unwrap();
        assert_eq!(cloud.point_count(), 3);

        let phases: Vec<String> = messages
            .iter()
            .filter_map(|m| match m {
                ParseMessage::Progress { phase, .. } => Some(phase.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(phases, vec!["Reading file", "Parsing", "Transferring data", "Complete"]);
        assert!(matches!(messages.last(), Some(ParseMessage::Result { id }) if id == "req-1"));
    }

    #[test]
    fn unsupported_extension_emits_error_message_and_propagates() {
        let request = ParseRequest {
            id: "req-2".into(),
            extension: "bin".into(),
            buffer: vec![],
        };
        let mut messages = Vec::new();
        let err = dispatch(request, |m| messages.push(m)).unwrap_err();
        assert!(matches!(err, crate::Error::UnsupportedExtension(ext) if ext == "bin"));
        assert!(matches!(messages.last(), Some(ParseMessage::Error { id, .. }) if id == "req-2"));
    }

    #[test]
    fn e57_is_the_only_main_thread_extension() {
        assert!(requires_main_thread("E57"));
        assert!(!requires_main_thread("obj"));
    }
}
