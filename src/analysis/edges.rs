// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Canny edge detection over luminance
//!
//! 3x3 Sobel gradients with replicated borders, L1 gradient magnitude,
//! non-maximum suppression along the quantized gradient direction, and
//! hysteresis between a low and a high threshold.

use image::GrayImage;

/// Gradient magnitude below which a pixel is never an edge
pub const LOW_THRESHOLD: f32 = 50.0;

/// Gradient magnitude above which a pixel always seeds an edge
pub const HIGH_THRESHOLD: f32 = 150.0;

// tan(22.5°) and tan(67.5°)
const TAN_22_5: f32 = 0.414_213_56;
const TAN_67_5: f32 = 2.414_213_6;

/// Binary edge map, row-major
#[derive(Debug, Clone)]
pub struct EdgeMap {
    width: u32,
    height: u32,
    edges: Vec<bool>,
}

impl EdgeMap {
    pub fn is_edge(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.edges[(y * self.width + x) as usize]
    }

    pub fn count(&self) -> usize {
        self.edges.iter().filter(|&&e| e).count()
    }

    /// Fraction of pixels marked as edges
    pub fn density(&self) -> f64 {
        if self.edges.is_empty() {
            0.0
        } else {
            self.count() as f64 / self.edges.len() as f64
        }
    }
}

/// Run the detector with the default thresholds
pub fn detect(luma: &GrayImage) -> EdgeMap {
    canny(luma, LOW_THRESHOLD, HIGH_THRESHOLD)
}

pub fn canny(luma: &GrayImage, low: f32, high: f32) -> EdgeMap {
    let (width, height) = luma.dimensions();
    let w = width as usize;
    let h = height as usize;
    let len = w * h;

    if len == 0 {
        return EdgeMap { width, height, edges: Vec::new() };
    }

    let (gx, gy, magnitude) = sobel(luma, w, h);
    let candidates = suppress_non_maxima(&gx, &gy, &magnitude, w, h, low);
    let edges = hysteresis(&candidates, &magnitude, w, h, high);

    EdgeMap { width, height, edges }
}

fn sobel(luma: &GrayImage, w: usize, h: usize) -> (Vec<f32>, Vec<f32>, Vec<f32>) {
    let raw = luma.as_raw();
    let px = |x: isize, y: isize| -> f32 {
        let cx = x.clamp(0, w as isize - 1) as usize;
        let cy = y.clamp(0, h as isize - 1) as usize;
        f32::from(raw[cy * w + cx])
    };

    let len = w * h;
    let mut gx = vec![0.0f32; len];
    let mut gy = vec![0.0f32; len];
    let mut magnitude = vec![0.0f32; len];

    for y in 0..h {
        for x in 0..w {
            let (xi, yi) = (x as isize, y as isize);
            let dx = (px(xi + 1, yi - 1) + 2.0 * px(xi + 1, yi) + px(xi + 1, yi + 1))
                - (px(xi - 1, yi - 1) + 2.0 * px(xi - 1, yi) + px(xi - 1, yi + 1));
            let dy = (px(xi - 1, yi + 1) + 2.0 * px(xi, yi + 1) + px(xi + 1, yi + 1))
                - (px(xi - 1, yi - 1) + 2.0 * px(xi, yi - 1) + px(xi + 1, yi - 1));

            let i = y * w + x;
            gx[i] = dx;
            gy[i] = dy;
            magnitude[i] = dx.abs() + dy.abs();
        }
    }

    (gx, gy, magnitude)
}

/// Keep only pixels that are a local maximum across the edge and above `low`
fn suppress_non_maxima(
    gx: &[f32],
    gy: &[f32],
    magnitude: &[f32],
    w: usize,
    h: usize,
    low: f32,
) -> Vec<bool> {
    // Out-of-image neighbours have zero magnitude
    let mag_at = |x: isize, y: isize| -> f32 {
        if x < 0 || y < 0 || x >= w as isize || y >= h as isize {
            0.0
        } else {
            magnitude[y as usize * w + x as usize]
        }
    };

    let mut keep = vec![false; w * h];

    for y in 0..h {
        for x in 0..w {
            let i = y * w + x;
            let m = magnitude[i];
            if m <= low {
                continue;
            }

            let (xi, yi) = (x as isize, y as isize);
            let ax = gx[i].abs();
            let ay = gy[i].abs();

            keep[i] = if ay <= ax * TAN_22_5 {
                // Gradient is horizontal, edge runs vertically
                m > mag_at(xi - 1, yi) && m >= mag_at(xi + 1, yi)
            } else if ay >= ax * TAN_67_5 {
                m > mag_at(xi, yi - 1) && m >= mag_at(xi, yi + 1)
            } else if (gx[i] > 0.0) == (gy[i] > 0.0) {
                m > mag_at(xi - 1, yi - 1) && m > mag_at(xi + 1, yi + 1)
            } else {
                m > mag_at(xi + 1, yi - 1) && m > mag_at(xi - 1, yi + 1)
            };
        }
    }

    keep
}

/// Grow edges from strong pixels through 8-connected candidates
fn hysteresis(candidates: &[bool], magnitude: &[f32], w: usize, h: usize, high: f32) -> Vec<bool> {
    let mut edges = vec![false; w * h];
    let mut stack: Vec<usize> = Vec::new();

    for (i, (&candidate, &m)) in candidates.iter().zip(magnitude).enumerate() {
        if candidate && m > high {
            edges[i] = true;
            stack.push(i);
        }
    }

    while let Some(i) = stack.pop() {
        let (x, y) = ((i % w) as isize, (i / w) as isize);
        for dy in -1..=1isize {
            for dx in -1..=1isize {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                    continue;
                }
                let j = ny as usize * w + nx as usize;
                if candidates[j] && !edges[j] {
                    edges[j] = true;
                    stack.push(j);
                }
            }
        }
    }

    edges
}
