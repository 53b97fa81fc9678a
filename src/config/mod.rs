// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for Microclimate

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::models::{Source, SourceKind, SyntheticProfile};

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// HTTP/WebSocket server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Fetch cycle settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Image sources to monitor
    #[serde(default = "default_sources")]
    pub sources: Vec<Source>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
    #[serde(default = "default_delivery_timeout")]
    pub delivery_timeout_ms: u64,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8000 }
fn default_interval() -> u64 { 60 }
fn default_timeout() -> u64 { 10 }
fn default_shutdown_grace() -> u64 { 5 }
fn default_delivery_timeout() -> u64 { 2000 }

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000", "http://localhost:3001", "http://127.0.0.1:3000"]
        .into_iter().map(String::from).collect()
}

fn default_sources() -> Vec<Source> {
    vec![
        demo_source("demo_1", "Downtown Demo", 40.7128, -74.0060, SyntheticProfile::Sunny),
        demo_source("demo_2", "Park Area Demo", 40.7829, -73.9654, SyntheticProfile::Shadowed),
        demo_source("demo_3", "Waterfront Demo", 40.6892, -74.0445, SyntheticProfile::Wet),
        Source {
            id: "webcam_1".to_string(),
            name: "Times Square, NYC".to_string(),
            url: "https://www.earthcam.com/cams/newyork/timessquare/?cam=tsrobo1".to_string(),
            latitude: 40.7580,
            longitude: -73.9855,
            enabled: false,
            kind: SourceKind::Live,
            profile: SyntheticProfile::Neutral,
        },
    ]
}

fn demo_source(id: &str, name: &str, latitude: f64, longitude: f64, profile: SyntheticProfile) -> Source {
    Source {
        id: id.to_string(),
        name: name.to_string(),
        url: format!("demo://{}", id),
        latitude,
        longitude,
        enabled: true,
        kind: SourceKind::Synthetic,
        profile,
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            fetch: FetchConfig::default(),
            sources: default_sources(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
            shutdown_grace_secs: default_shutdown_grace(),
            delivery_timeout_ms: default_delivery_timeout(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| crate::MicroclimateError::Config(format!("Failed to parse config: {}", e)))?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        let invalid = |msg: String| Err(crate::MicroclimateError::Config(msg));

        if self.fetch.interval_secs == 0 {
            return invalid("fetch.interval_secs must be greater than zero".to_string());
        }
        if self.fetch.timeout_secs == 0 {
            return invalid("fetch.timeout_secs must be greater than zero".to_string());
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.id.trim().is_empty() {
                return invalid(format!("source '{}' has an empty id", source.name));
            }
            if !seen.insert(source.id.as_str()) {
                return invalid(format!("duplicate source id '{}'", source.id));
            }
        }

        Ok(())
    }

    pub fn enabled_sources(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter().filter(|s| s.enabled)
    }
}
