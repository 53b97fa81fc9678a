// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Wiring for the fetch, classify, cache and broadcast pipeline

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::broadcast::Broadcaster;
use crate::cache::LatestCache;
use crate::config::AppConfig;
use crate::fetcher::{HttpFetcher, SourceFetcher};
use crate::models::{AnalysisResult, Source};
use crate::scheduler::{Clock, Scheduler, SchedulerConfig, SystemClock};
use crate::{MicroclimateError, Result};

/// Result of a one-off manual fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestFetchOutcome {
    Success { image_size: usize },
    /// Synthetic source; nothing was fetched
    Demo,
    Failure { reason: String, message: String },
}

/// Shared pipeline state: sources, fetcher, cache and subscribers
pub struct Pipeline {
    sources: Vec<Source>,
    fetcher: Arc<dyn SourceFetcher>,
    broadcaster: Arc<Broadcaster>,
    scheduler_config: SchedulerConfig,
}

impl Pipeline {
    /// Build a pipeline from configuration using the HTTP fetcher
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        let fetcher = HttpFetcher::new(&config.fetch.user_agent)?;
        Ok(Self::new(config, Arc::new(fetcher)))
    }

    pub fn new(config: &AppConfig, fetcher: Arc<dyn SourceFetcher>) -> Self {
        let broadcaster = Broadcaster::new(
            LatestCache::new(),
            Duration::from_millis(config.fetch.delivery_timeout_ms),
        );

        Self {
            sources: config.sources.clone(),
            fetcher,
            broadcaster: Arc::new(broadcaster),
            scheduler_config: SchedulerConfig::from(&config.fetch),
        }
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn source(&self, id: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.id == id)
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Scheduler over this pipeline's sources, timestamped with wall-clock time
    pub fn scheduler(&self) -> Scheduler {
        self.scheduler_with_clock(Arc::new(SystemClock))
    }

    pub fn scheduler_with_clock(&self, clock: Arc<dyn Clock>) -> Scheduler {
        Scheduler::new(
            &self.sources,
            Arc::clone(&self.fetcher),
            Arc::clone(&self.broadcaster),
            clock,
            self.scheduler_config.clone(),
        )
    }

    /// Latest result for every source that has one
    pub async fn latest(&self) -> HashMap<String, AnalysisResult> {
        self.broadcaster.cache().snapshot().await
    }

    pub async fn latest_for(&self, source_id: &str) -> Option<AnalysisResult> {
        self.broadcaster.cache().get(source_id).await
    }

    /// Fetch one source right now without classifying or publishing anything
    pub async fn test_fetch(&self, source_id: &str) -> Result<TestFetchOutcome> {
        let source = self
            .source(source_id)
            .ok_or_else(|| MicroclimateError::UnknownSource(source_id.to_string()))?;

        if source.is_synthetic() {
            return Ok(TestFetchOutcome::Demo);
        }

        info!("Test fetch requested for {}", source.id);
        match self.fetcher.fetch(source, self.scheduler_config.fetch_timeout).await {
            Ok(bytes) => Ok(TestFetchOutcome::Success { image_size: bytes.len() }),
            Err(failure) => {
                warn!("Test fetch for {} failed: {}", source.id, failure);
                Ok(TestFetchOutcome::Failure {
                    reason: failure.reason_code(),
                    message: failure.to_string(),
                })
            }
        }
    }
}
