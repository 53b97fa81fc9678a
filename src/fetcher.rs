// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Image fetching for live sources

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

use crate::error::FetchFailure;
use crate::models::Source;
use crate::Result;

/// Something that can pull the current image for a source
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetch the image bytes, giving up after `timeout`.
    ///
    /// Never retries; the next scheduled cycle is the retry.
    async fn fetch(&self, source: &Source, timeout: Duration) -> std::result::Result<Vec<u8>, FetchFailure>;
}

/// HTTP fetcher backed by a pooled `reqwest` client
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a new fetcher sending `user_agent` with every request
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, source: &Source, timeout: Duration) -> std::result::Result<Vec<u8>, FetchFailure> {
        debug!("Fetching image from {} at {}", source.id, source.url);

        let response = self.client
            .get(&source.url)
            .timeout(timeout)
            .send()
            .await
            .map_err(request_failure)?;

        let status = response.status();
        debug!("Response status for {}: {}", source.id, status);

        if status != StatusCode::OK {
            return Err(FetchFailure::HttpStatus(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !content_type.to_ascii_lowercase().contains("image") {
            return Err(FetchFailure::WrongContentType(content_type));
        }

        let body = response.bytes().await.map_err(request_failure)?;
        debug!("Fetched {} bytes from {}", body.len(), source.id);

        Ok(body.to_vec())
    }
}

fn request_failure(err: reqwest::Error) -> FetchFailure {
    if err.is_timeout() {
        FetchFailure::Timeout
    } else {
        FetchFailure::Network(err.to_string())
    }
}
