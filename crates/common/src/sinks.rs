//! Minimal pluggable interfaces for side-channel signals the pipeline emits
//! on high/critical findings and ban actions, and for geolocation
//! enrichment of a Fingerprint's `metadata` map. Deliberately thin:
//! anything richer than "write a line" is out of scope.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub target: String,
    pub action: String,
    pub outcome: String,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEntry {
    pub timestamp: DateTime<Utc>,
    pub severity: String,
    pub summary: String,
    pub address: String,
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, entry: AlertEntry);
}

/// Optional enrichment; the core is correct with no `GeoLocator` installed.
#[async_trait]
pub trait GeoLocator: Send + Sync {
    async fn locate(&self, address: &str) -> Option<GeoInfo>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoInfo {
    pub country: Option<String>,
    pub city: Option<String>,
}

/// Append-only JSON-lines file sink, the default for both audit and alert
/// channels. Write failures are logged and otherwise swallowed: a sink
/// outage must never block the pipeline.
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn append_line(&self, line: &str) {
        let result = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            file.write_all(line.as_bytes()).await?;
            file.write_all(b"\n").await?;
            Ok::<(), std::io::Error>(())
        }
        .await;

        if let Err(err) = result {
            tracing::error!(path = %self.path.display(), %err, "sink write failed");
        }
    }
}

#[async_trait]
impl AuditSink for FileSink {
    async fn record(&self, entry: AuditEntry) {
        match serde_json::to_string(&entry) {
            Ok(line) => self.append_line(&line).await,
            Err(err) => tracing::error!(%err, "failed to serialize audit entry"),
        }
    }
}

#[async_trait]
impl AlertSink for FileSink {
    async fn notify(&self, entry: AlertEntry) {
        match serde_json::to_string(&entry) {
            Ok(line) => self.append_line(&line).await,
            Err(err) => tracing::error!(%err, "failed to serialize alert entry"),
        }
    }
}

/// No-op locator used when no geolocation provider is configured.
pub struct NullGeoLocator;

#[async_trait]
impl GeoLocator for NullGeoLocator {
    async fn locate(&self, _address: &str) -> Option<GeoInfo> {
        None
    }
}
