// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Plausible readings for demo sources
//!
//! Synthetic sources never hit the network. Each cycle they get a small
//! random walk around a fixed baseline so the map has something to show.

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::models::{AnalysisResult, Provenance, Source, SyntheticProfile};

/// Centre and spread of the synthetic readings for one profile
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    pub sun: f64,
    pub sun_spread: f64,
    pub wetness: f64,
    pub wetness_spread: f64,
}

const BRIGHTNESS_FLOOR: f64 = 0.4;
const BRIGHTNESS_PER_SUN: f64 = 0.4;
const BRIGHTNESS_SPREAD: f64 = 0.1;

impl SyntheticProfile {
    pub fn baseline(self) -> Baseline {
        match self {
            Self::Sunny => Baseline { sun: 0.7, sun_spread: 0.1, wetness: 0.1, wetness_spread: 0.05 },
            Self::Shadowed => Baseline { sun: 0.2, sun_spread: 0.1, wetness: 0.15, wetness_spread: 0.05 },
            Self::Wet => Baseline { sun: 0.5, sun_spread: 0.1, wetness: 0.8, wetness_spread: 0.1 },
            Self::Neutral => Baseline { sun: 0.5, sun_spread: 0.2, wetness: 0.3, wetness_spread: 0.2 },
        }
    }
}

/// Generate one reading for `source` from its configured profile
pub fn generate<R: Rng + ?Sized>(
    source: &Source,
    rng: &mut R,
    timestamp: DateTime<Utc>,
) -> AnalysisResult {
    let baseline = source.profile.baseline();

    let sun_exposure = jitter(rng, baseline.sun, baseline.sun_spread);
    let wetness_score = jitter(rng, baseline.wetness, baseline.wetness_spread);
    let brightness = jitter(
        rng,
        BRIGHTNESS_FLOOR + BRIGHTNESS_PER_SUN * sun_exposure,
        BRIGHTNESS_SPREAD,
    );

    AnalysisResult {
        source_id: source.id.clone(),
        timestamp,
        sun_exposure,
        shadow_exposure: 1.0 - sun_exposure,
        wetness_score,
        brightness,
        provenance: Provenance::Synthetic,
        image_url: None,
    }
}

fn jitter<R: Rng + ?Sized>(rng: &mut R, centre: f64, spread: f64) -> f64 {
    (centre + rng.gen_range(-spread..=spread)).clamp(0.0, 1.0)
}
