// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use libfuzzer_sys::fuzz_target;
use microclimate::Envelope;

fuzz_target!(|data: &[u8]| {
    if let Ok(envelope) = serde_json::from_slice::<Envelope>(data) {
        let json = serde_json::to_string(&envelope).unwrap();
        let again: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(again, envelope);
    }
});
