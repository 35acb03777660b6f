//! In-memory backend for tests and environments without root/admin
//! privileges: records the same effects a real backend would install
//! without ever shelling out.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::backend::{BackendError, BannedRule, FirewallBackend};

#[derive(Default)]
pub struct DryRunBackend {
    banned: Mutex<Vec<BannedRule>>,
    open_ports: Mutex<HashSet<(u16, String)>>,
}

impl DryRunBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FirewallBackend for DryRunBackend {
    async fn ban(&self, address: &str, reason: &str, expiry_comment: &str) -> Result<(), BackendError> {
        let mut banned = self.banned.lock().unwrap();
        banned.retain(|rule| rule.address != address);
        banned.push(BannedRule {
            address: address.to_string(),
            comment: format!("{reason} | {expiry_comment}"),
        });
        Ok(())
    }

    async fn unban(&self, address: &str) -> Result<(), BackendError> {
        self.banned.lock().unwrap().retain(|rule| rule.address != address);
        Ok(())
    }

    async fn is_installed(&self, address: &str) -> Result<bool, BackendError> {
        Ok(self.banned.lock().unwrap().iter().any(|rule| rule.address == address))
    }

    async fn list_banned(&self) -> Result<Vec<BannedRule>, BackendError> {
        Ok(self.banned.lock().unwrap().clone())
    }

    async fn health_check(&self) -> Result<bool, BackendError> {
        Ok(true)
    }

    async fn open_port(&self, port: u16, protocol: &str, _source: Option<&str>) -> Result<(), BackendError> {
        self.open_ports.lock().unwrap().insert((port, protocol.to_string()));
        Ok(())
    }

    async fn close_port(&self, port: u16, protocol: &str) -> Result<(), BackendError> {
        self.open_ports.lock().unwrap().remove(&(port, protocol.to_string()));
        Ok(())
    }

    async fn block_port(&self, port: u16, protocol: &str) -> Result<(), BackendError> {
        self.open_ports.lock().unwrap().remove(&(port, protocol.to_string()));
        Ok(())
    }

    async fn add_rate_limit(&self, _limit: u32, _period_seconds: u32, _port: Option<u16>) -> Result<(), BackendError> {
        Ok(())
    }

    async fn save_rules(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn restore_rules(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ban_then_unban_round_trips() {
        let backend = DryRunBackend::new();
        backend.ban("1.2.3.4", "test", "permanent").await.unwrap();
        assert!(backend.is_installed("1.2.3.4").await.unwrap());
        backend.unban("1.2.3.4").await.unwrap();
        assert!(!backend.is_installed("1.2.3.4").await.unwrap());
    }

    #[tokio::test]
    async fn re_ban_replaces_rather_than_duplicates() {
        let backend = DryRunBackend::new();
        backend.ban("1.2.3.4", "first", "temporary").await.unwrap();
        backend.ban("1.2.3.4", "second", "permanent").await.unwrap();
        let rules = backend.list_banned().await.unwrap();
        assert_eq!(rules.len(), 1);
        assert!(rules[0].comment.contains("second"));
    }
}
