//! Fuzz target for finance row parsing.
//!
//! This tests that `amount_of`, `created_on` and `Commitment::from_row`
//! never panic on arbitrary backend rows.

#![no_main]

use libfuzzer_sys::fuzz_target;
use offline_sync_engine::finance::{amount_of, created_on};
use offline_sync_engine::Commitment;
use serde_json::Value;

fuzz_target!(|data: &str| {
    let Ok(row) = serde_json::from_str::<Value>(data) else {
        return;
    };

    // Should never panic
    let _ = amount_of(&row);
    let _ = created_on(&row);
    if let Some(commitment) = Commitment::from_row(&row) {
        assert!(row.get("id").is_some());
        let _ = commitment.pay_date;
    }
});
