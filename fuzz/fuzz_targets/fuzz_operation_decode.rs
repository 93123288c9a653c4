//! Fuzz target for queued operation decoding.
//!
//! Queue payloads are read back from disk, so decoding must never panic and
//! anything that decodes must survive a re-encode unchanged.

#![no_main]

use libfuzzer_sys::fuzz_target;
use offline_sync_engine::Operation;

fuzz_target!(|data: &[u8]| {
    let Ok(op) = serde_json::from_slice::<Operation>(data) else {
        return;
    };

    let _ = op.describe();
    let encoded = serde_json::to_vec(&op).expect("decoded operation re-encodes");
    let again: Operation = serde_json::from_slice(&encoded).expect("re-encoded operation decodes");
    assert_eq!(op, again);
});
