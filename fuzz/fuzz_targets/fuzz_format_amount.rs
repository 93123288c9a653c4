//! Fuzz target for reminder amount formatting.
//!
//! This tests that `format_amount` never panics, including on NaN and
//! infinities, and only ever emits digits, dots and a leading sign.

#![no_main]

use libfuzzer_sys::fuzz_target;
use offline_sync_engine::reminders::format_amount;

fuzz_target!(|amount: f64| {
    let formatted = format_amount(amount);
    let body = formatted.strip_prefix('-').unwrap_or(&formatted);
    assert!(!body.is_empty());
    assert!(body.chars().all(|c| c.is_ascii_digit() || c == '.'));
});
