// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Latest analysis result per source

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::models::AnalysisResult;

/// Most recent result for every source that has produced one.
///
/// Entries are overwritten in place and never removed; a missing entry means
/// the source has not produced a result since startup.
#[derive(Clone, Default)]
pub struct LatestCache {
    entries: Arc<RwLock<HashMap<String, AnalysisResult>>>,
}

impl LatestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `result`, replacing any earlier entry for its source
    pub async fn insert(&self, result: AnalysisResult) {
        self.entries
            .write()
            .await
            .insert(result.source_id.clone(), result);
    }

    pub async fn get(&self, source_id: &str) -> Option<AnalysisResult> {
        self.entries.read().await.get(source_id).cloned()
    }

    /// Copy of every entry
    pub async fn snapshot(&self) -> HashMap<String, AnalysisResult> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
