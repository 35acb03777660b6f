//! Host packet-filter backend abstraction. The Executor hides
//! Linux/Windows/dry-run differences behind this single interface.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("command timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("command failed: {0}")]
    CommandFailed(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct BannedRule {
    pub address: String,
    pub comment: String,
}

/// Core lifecycle operations (`ban`, `unban`, `is_installed`, `list_banned`,
/// `health_check`) plus the port/rate-limit operations the admin surface
/// drives through the same backend.
#[async_trait]
pub trait FirewallBackend: Send + Sync {
    async fn ban(&self, address: &str, reason: &str, expiry_comment: &str) -> Result<(), BackendError>;
    async fn unban(&self, address: &str) -> Result<(), BackendError>;
    async fn is_installed(&self, address: &str) -> Result<bool, BackendError>;
    async fn list_banned(&self) -> Result<Vec<BannedRule>, BackendError>;
    async fn health_check(&self) -> Result<bool, BackendError>;

    async fn open_port(&self, port: u16, protocol: &str, source: Option<&str>) -> Result<(), BackendError>;
    async fn close_port(&self, port: u16, protocol: &str) -> Result<(), BackendError>;
    async fn block_port(&self, port: u16, protocol: &str) -> Result<(), BackendError>;
    async fn add_rate_limit(&self, limit: u32, period_seconds: u32, port: Option<u16>) -> Result<(), BackendError>;

    async fn save_rules(&self) -> Result<(), BackendError>;
    async fn restore_rules(&self) -> Result<(), BackendError>;
}
