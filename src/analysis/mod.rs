// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Heuristic image classification
//!
//! Turns raw image bytes into an [`AnalysisResult`]: how much of the frame is
//! in sun versus shadow, how bright it is overall, and how likely the visible
//! surfaces are to be wet. Everything here is synchronous and free of I/O, so
//! callers on an async runtime should run it on a blocking worker.

pub mod edges;
pub mod exposure;
pub mod synthetic;
pub mod wetness;

use chrono::{DateTime, Utc};
use image::{DynamicImage, GrayImage, Luma, RgbImage};

use crate::error::DecodeError;
use crate::models::{AnalysisResult, Provenance};

pub use exposure::Exposure;
pub use wetness::Wetness;

/// Intermediate measurements behind a classification
#[derive(Debug, Clone, PartialEq)]
pub struct ImageMetrics {
    pub width: u32,
    pub height: u32,
    pub exposure: Exposure,
    pub wetness: Wetness,
}

impl ImageMetrics {
    /// Package the measurements as a live analysis result
    pub fn into_result(self, source_id: &str, timestamp: DateTime<Utc>) -> AnalysisResult {
        AnalysisResult {
            source_id: source_id.to_string(),
            timestamp,
            sun_exposure: self.exposure.sun_exposure,
            shadow_exposure: self.exposure.shadow_exposure,
            wetness_score: self.wetness.score,
            brightness: self.exposure.brightness,
            provenance: Provenance::Live,
            image_url: None,
        }
    }
}

/// Decode image bytes in any format the `image` crate understands
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, DecodeError> {
    Ok(image::load_from_memory(bytes)?)
}

/// Run every heuristic over an already decoded image
pub fn measure(img: &DynamicImage) -> ImageMetrics {
    let rgb = img.to_rgb8();
    let luma = luma601(&rgb);

    ImageMetrics {
        width: img.width(),
        height: img.height(),
        exposure: exposure::measure(&luma),
        wetness: wetness::measure(&rgb, &luma),
    }
}

/// Rec. 601 luminance in 14-bit fixed point, rounded to nearest
pub fn luma601(rgb: &RgbImage) -> GrayImage {
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let y = (4899 * u32::from(r) + 9617 * u32::from(g) + 1868 * u32::from(b) + 8192) >> 14;
        Luma([y as u8])
    })
}

/// Classify raw image bytes.
///
/// `source_id` and `timestamp` are copied into the result unchanged; the
/// numeric fields depend only on the bytes.
pub fn classify(
    bytes: &[u8],
    source_id: &str,
    timestamp: DateTime<Utc>,
) -> Result<AnalysisResult, DecodeError> {
    let img = decode(bytes)?;
    Ok(measure(&img).into_result(source_id, timestamp))
}
