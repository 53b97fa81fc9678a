// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for Microclimate
//!
//! [`MicroclimateError`] covers setup and interactive failures. The per-source
//! failure types ([`FetchFailure`], [`DecodeError`], [`SourceFailure`]) and the
//! per-connection [`DeliveryFailure`] never leave the pipeline as errors: the
//! scheduler logs them and the broadcaster drops the offending connection.

use thiserror::Error;

/// Result type alias for Microclimate operations
pub type Result<T> = std::result::Result<T, MicroclimateError>;

/// Microclimate error types
#[derive(Error, Debug)]
pub enum MicroclimateError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Server error: {0}")]
    Server(String),
}

/// Why a fetch for one source produced no image.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    #[error("request timed out")]
    Timeout,

    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),

    #[error("response is not an image (Content-Type: {0})")]
    WrongContentType(String),

    #[error("network error: {0}")]
    Network(String),
}

impl FetchFailure {
    /// Stable machine-readable reason code.
    pub fn reason_code(&self) -> String {
        match self {
            Self::Timeout => "timeout".to_string(),
            Self::HttpStatus(status) => format!("http_status:{}", status),
            Self::WrongContentType(_) => "wrong_content_type".to_string(),
            Self::Network(_) => "network_error".to_string(),
        }
    }
}

/// The image bytes could not be decoded into pixels.
#[derive(Error, Debug)]
#[error("failed to decode image: {0}")]
pub struct DecodeError(#[from] pub image::ImageError);

/// A message could not be handed to a subscriber connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryFailure {
    #[error("connection closed")]
    Closed,

    #[error("connection send queue is full")]
    Backpressure,

    #[error("send timed out")]
    Timeout,
}

/// Everything that can suppress one source's result for one cycle.
#[derive(Error, Debug)]
pub enum SourceFailure {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchFailure),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("analysis worker failed: {0}")]
    Worker(String),
}
