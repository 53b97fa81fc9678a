// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Data model shared by the pipeline and the HTTP layer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How readings for a source are produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Fetch an image over HTTP and classify it
    #[default]
    Live,
    /// Never touch the network; generate a plausible reading instead
    Synthetic,
}

/// Baseline used by the synthetic generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyntheticProfile {
    Sunny,
    Shadowed,
    Wet,
    #[default]
    Neutral,
}

/// A configured image source (usually a public webcam)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub url: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub kind: SourceKind,
    /// Only consulted for synthetic sources
    #[serde(default)]
    pub profile: SyntheticProfile,
}

fn default_true() -> bool { true }

impl Source {
    pub fn is_synthetic(&self) -> bool {
        self.kind == SourceKind::Synthetic
    }
}

/// Where an analysis result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Live,
    Synthetic,
}

/// Heuristic micro-climate reading for one source at one point in time.
///
/// All scores lie in `[0, 1]`. `sun_exposure + shadow_exposure` is `1.0`
/// whenever any pixel was confidently classified, otherwise both are `0.5`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(rename = "webcam_id")]
    pub source_id: String,
    pub timestamp: DateTime<Utc>,
    pub sun_exposure: f64,
    pub shadow_exposure: f64,
    pub wetness_score: f64,
    pub brightness: f64,
    pub provenance: Provenance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Out-of-band control message for subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub status: String,
    pub message: String,
}

/// Body of a message pushed to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Payload {
    Update(AnalysisResult),
    Status(StatusPayload),
}

/// Wire envelope: `{ "type": "update" | "status", "data": ..., "timestamp": ... }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub payload: Payload,
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    pub fn update(result: AnalysisResult) -> Self {
        Self {
            payload: Payload::Update(result),
            timestamp: Utc::now(),
        }
    }

    pub fn status(status: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            payload: Payload::Status(StatusPayload {
                status: status.into(),
                message: message.into(),
            }),
            timestamp: Utc::now(),
        }
    }

    /// Source id for update messages
    pub fn source_id(&self) -> Option<&str> {
        match &self.payload {
            Payload::Update(result) => Some(&result.source_id),
            Payload::Status(_) => None,
        }
    }
}
