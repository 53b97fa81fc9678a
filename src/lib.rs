// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Microclimate: urban micro-climate readings from public webcams
//!
//! A fixed-interval pipeline fetches an image per source, classifies it into
//! sun exposure, shadow exposure and a wetness score, keeps the latest result
//! per source, and pushes every new result to WebSocket subscribers. New
//! subscribers are sent the current cache before any live update.

pub mod analysis;
pub mod broadcast;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod pipeline;
pub mod scheduler;
pub mod web;

pub use config::AppConfig;
pub use error::{MicroclimateError, Result};
pub use models::{AnalysisResult, Envelope, Source};
pub use pipeline::Pipeline;
