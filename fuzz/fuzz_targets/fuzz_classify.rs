// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use arbitrary::Arbitrary;
use chrono::{TimeZone, Utc};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    source_id: &'a str,
    seconds: u32,
    bytes: &'a [u8],
}

fuzz_target!(|input: Input| {
    let Some(timestamp) = Utc.timestamp_opt(i64::from(input.seconds), 0).single() else {
        return;
    };

    // Any byte string either fails to decode or yields in-range scores
    if let Ok(result) = microclimate::analysis::classify(input.bytes, input.source_id, timestamp) {
        for score in [
            result.sun_exposure,
            result.shadow_exposure,
            result.wetness_score,
            result.brightness,
        ] {
            assert!((0.0..=1.0).contains(&score));
        }
        assert!((result.sun_exposure + result.shadow_exposure - 1.0).abs() < 1e-9);
        assert_eq!(result.source_id, input.source_id);
    }
});
