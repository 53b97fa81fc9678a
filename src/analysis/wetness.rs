// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Wet-surface heuristic
//!
//! Wet pavement tends to look saturated, throws specular highlights, and
//! loses fine texture under a reflective film. Each cue is scored in `[0, 1]`
//! and blended with fixed weights.

use image::{GrayImage, RgbImage};

use super::edges;

/// HSV value strictly above this (~78% of full scale) counts as a highlight
pub const BRIGHT_SPOT_CUTOFF: u8 = 200;

const SATURATION_WEIGHT: f64 = 0.3;
const BRIGHT_SPOT_WEIGHT: f64 = 0.4;
const SMOOTHNESS_WEIGHT: f64 = 0.3;

/// Edge density at which an image counts as fully textured
const EDGE_DENSITY_SCALE: f64 = 10.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Wetness {
    pub avg_saturation: f64,
    pub bright_spot_fraction: f64,
    pub edge_density: f64,
    pub smoothness: f64,
    pub score: f64,
}

pub fn measure(rgb: &RgbImage, luma: &GrayImage) -> Wetness {
    let total = rgb.pixels().len();

    let (avg_saturation, bright_spot_fraction) = if total == 0 {
        (0.0, 0.0)
    } else {
        let mut saturation_sum = 0.0f64;
        let mut bright_spots = 0usize;

        for pixel in rgb.pixels() {
            let (saturation, value) = saturation_value(pixel.0);
            saturation_sum += saturation;
            if value > BRIGHT_SPOT_CUTOFF {
                bright_spots += 1;
            }
        }

        (saturation_sum / total as f64, bright_spots as f64 / total as f64)
    };

    let edge_density = edges::detect(luma).density();
    let smoothness = 1.0 - (edge_density * EDGE_DENSITY_SCALE).min(1.0);

    Wetness {
        avg_saturation,
        bright_spot_fraction,
        edge_density,
        smoothness,
        score: score(avg_saturation, bright_spot_fraction, smoothness),
    }
}

/// Weighted blend of the three cues, clamped to `[0, 1]`
pub fn score(avg_saturation: f64, bright_spot_fraction: f64, smoothness: f64) -> f64 {
    (SATURATION_WEIGHT * avg_saturation
        + BRIGHT_SPOT_WEIGHT * bright_spot_fraction
        + SMOOTHNESS_WEIGHT * smoothness)
        .clamp(0.0, 1.0)
}

/// HSV saturation in `[0, 1]` and 8-bit value for one RGB pixel
fn saturation_value([r, g, b]: [u8; 3]) -> (f64, u8) {
    let value = r.max(g).max(b);
    let min = r.min(g).min(b);
    let saturation = if value == 0 {
        0.0
    } else {
        f64::from(value - min) / f64::from(value)
    };
    (saturation, value)
}
