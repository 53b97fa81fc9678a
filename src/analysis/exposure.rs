// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Sun/shadow split and overall brightness from luminance

use image::GrayImage;

/// Luminance strictly above this (60% of full scale) counts as sun
pub const SUN_CUTOFF: u8 = 153;

/// Luminance strictly below this (40% of full scale) counts as shadow
pub const SHADOW_CUTOFF: u8 = 102;

#[derive(Debug, Clone, PartialEq)]
pub struct Exposure {
    /// Mean luminance in `[0, 1]`
    pub brightness: f64,
    /// Fraction of all pixels above [`SUN_CUTOFF`]
    pub sun_ratio: f64,
    /// Fraction of all pixels below [`SHADOW_CUTOFF`]
    pub shadow_ratio: f64,
    pub sun_exposure: f64,
    pub shadow_exposure: f64,
}

pub fn measure(luma: &GrayImage) -> Exposure {
    let pixels = luma.as_raw();
    let total = pixels.len();

    if total == 0 {
        return Exposure {
            brightness: 0.0,
            sun_ratio: 0.0,
            shadow_ratio: 0.0,
            sun_exposure: 0.5,
            shadow_exposure: 0.5,
        };
    }

    let mut sum: u64 = 0;
    let mut sun: usize = 0;
    let mut shadow: usize = 0;

    for &value in pixels {
        sum += u64::from(value);
        if value > SUN_CUTOFF {
            sun += 1;
        } else if value < SHADOW_CUTOFF {
            shadow += 1;
        }
    }

    let total = total as f64;
    let sun_ratio = sun as f64 / total;
    let shadow_ratio = shadow as f64 / total;
    let (sun_exposure, shadow_exposure) = normalize(sun_ratio, shadow_ratio);

    Exposure {
        brightness: sum as f64 / total / 255.0,
        sun_ratio,
        shadow_ratio,
        sun_exposure,
        shadow_exposure,
    }
}

/// Rescale the two ratios so they sum to one, or split evenly when nothing
/// was classified.
pub fn normalize(sun_ratio: f64, shadow_ratio: f64) -> (f64, f64) {
    let classified = sun_ratio + shadow_ratio;
    if classified > 0.0 {
        let sun = (sun_ratio / classified).clamp(0.0, 1.0);
        (sun, 1.0 - sun)
    } else {
        (0.5, 0.5)
    }
}
