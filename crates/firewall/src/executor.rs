//! Firewall executor: whitelist/blacklist gate, idempotent ban/unban,
//! update-in-place re-banning, permanent escalation, grounded in
//! `original_source/core/firewall.py::FirewallExecutor` (`ban_ip`,
//! `unban_ip`, `is_whitelisted`, `is_blacklisted`).

use std::net::IpAddr;
use std::sync::Arc;

use chrono::Utc;
use ipnet::IpNet;
use thiserror::Error;
use tracing::{info, warn};

use security_common::config::ScoringConfig;
use security_common::error::StoreError;
use security_common::model::{BanAction, BanRecord};
use security_common::store::Store;

use crate::backend::{BackendError, BannedRule, FirewallBackend};

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("address is whitelisted: {0}")]
    Whitelisted(String),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

/// Outcome of an enforcement attempt, distinguishing a no-op (already
/// banned, nothing changed) from a fresh install so callers can decide
/// whether to emit an alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BanOutcome {
    Installed,
    AlreadyActive,
    Whitelisted,
}

pub struct Executor {
    store: Arc<Store>,
    backend: Arc<dyn FirewallBackend>,
    scoring_cfg: ScoringConfig,
}

impl Executor {
    pub fn new(store: Arc<Store>, backend: Arc<dyn FirewallBackend>, scoring_cfg: ScoringConfig) -> Self {
        Self { store, backend, scoring_cfg }
    }

    fn parse_address(address: &str) -> Result<IpAddr, ExecutorError> {
        address
            .parse()
            .map_err(|_| ExecutorError::InvalidAddress(address.to_string()))
    }

    fn matches_any(address: IpAddr, cidrs: &[String]) -> bool {
        cidrs.iter().any(|entry| {
            if let Ok(net) = entry.parse::<IpNet>() {
                net.contains(&address)
            } else if let Ok(single) = entry.parse::<IpAddr>() {
                single == address
            } else {
                false
            }
        })
    }

    pub async fn is_whitelisted(&self, address: &str) -> Result<bool, ExecutorError> {
        let ip = Self::parse_address(address)?;
        let entries = self.store.list_allow_entries().await?;
        let cidrs: Vec<String> = entries.into_iter().map(|e| e.cidr).collect();
        Ok(Self::matches_any(ip, &cidrs))
    }

    pub async fn is_blacklisted(&self, address: &str) -> Result<bool, ExecutorError> {
        let ip = Self::parse_address(address)?;
        let entries = self.store.list_deny_entries().await?;
        let cidrs: Vec<String> = entries.into_iter().map(|e| e.cidr).collect();
        Ok(Self::matches_any(ip, &cidrs))
    }

    /// Enforce `action` against `address`. Whitelisted addresses are never
    /// banned even under `BanAction::Permanent`. A repeat offense
    /// re-activates the existing row in place and bumps `ban_count` rather
    /// than appending a new one; once `ban_count` reaches
    /// `permanent_escalation_threshold` the ban is upgraded to permanent
    /// regardless of the action that triggered this call.
    pub async fn enforce(
        &self,
        address: &str,
        action: BanAction,
        reason: &str,
        threat_event_id: Option<i64>,
    ) -> Result<BanOutcome, ExecutorError> {
        if action == BanAction::None {
            return Ok(BanOutcome::AlreadyActive);
        }

        Self::parse_address(address)?;

        if self.is_whitelisted(address).await? {
            warn!(address, "ban suppressed: address is whitelisted");
            return Ok(BanOutcome::Whitelisted);
        }

        let already_installed = self.backend.is_installed(address).await?;
        let now = Utc::now();
        let is_permanent = matches!(action, BanAction::Permanent);
        let ban_until = action.duration_seconds(&self.scoring_cfg).map(|secs| now + chrono::Duration::seconds(secs));

        let record = self
            .store
            .upsert_ban(address, reason, ban_until, threat_event_id, is_permanent)
            .await?;

        if record.ban_count >= self.scoring_cfg.permanent_escalation_threshold && !record.is_permanent {
            self.store.escalate_to_permanent(address).await?;
        }

        if !already_installed {
            let expiry_comment = match ban_until {
                Some(until) => format!("until {}", until.to_rfc3339()),
                None => "permanent".to_string(),
            };
            self.backend.ban(address, reason, &expiry_comment).await?;
            info!(address, reason, "firewall ban installed");
            Ok(BanOutcome::Installed)
        } else {
            info!(address, "firewall ban already active, record updated in place");
            Ok(BanOutcome::AlreadyActive)
        }
    }

    pub async fn unban(&self, address: &str) -> Result<(), ExecutorError> {
        Self::parse_address(address)?;
        self.backend.unban(address).await?;
        self.store.deactivate_ban(address).await?;
        info!(address, "firewall ban lifted");
        Ok(())
    }

    /// Sweep store-side expired bans (non-permanent, `ban_until` in the
    /// past) and lift them from the backend. Run by the scheduler.
    pub async fn reconcile_expired(&self) -> Result<Vec<String>, ExecutorError> {
        let expired = self.store.expired_active_bans().await?;
        let mut lifted = Vec::with_capacity(expired.len());
        for record in expired {
            self.unban(&record.address).await?;
            lifted.push(record.address);
        }
        Ok(lifted)
    }

    pub async fn list_active_bans(&self) -> Result<Vec<BanRecord>, ExecutorError> {
        Ok(self.store.list_active_bans().await?)
    }

    pub async fn list_backend_bans(&self) -> Result<Vec<BannedRule>, ExecutorError> {
        Ok(self.backend.list_banned().await?)
    }

    pub async fn health_check(&self) -> Result<bool, ExecutorError> {
        Ok(self.backend.health_check().await?)
    }

    pub async fn open_port(&self, port: u16, protocol: &str, source: Option<&str>) -> Result<(), ExecutorError> {
        Ok(self.backend.open_port(port, protocol, source).await?)
    }

    pub async fn close_port(&self, port: u16, protocol: &str) -> Result<(), ExecutorError> {
        Ok(self.backend.close_port(port, protocol).await?)
    }

    pub async fn block_port(&self, port: u16, protocol: &str) -> Result<(), ExecutorError> {
        Ok(self.backend.block_port(port, protocol).await?)
    }

    pub async fn add_rate_limit(&self, limit: u32, period_seconds: u32, port: Option<u16>) -> Result<(), ExecutorError> {
        Ok(self.backend.add_rate_limit(limit, period_seconds, port).await?)
    }

    pub async fn save_rules(&self) -> Result<(), ExecutorError> {
        Ok(self.backend.save_rules().await?)
    }

    pub async fn restore_rules(&self) -> Result<(), ExecutorError> {
        Ok(self.backend.restore_rules().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_any_accepts_exact_address() {
        let ip: IpAddr = "10.0.0.5".parse().unwrap();
        assert!(Executor::matches_any(ip, &["10.0.0.5".to_string()]));
        assert!(!Executor::matches_any(ip, &["10.0.0.6".to_string()]));
    }

    #[test]
    fn matches_any_accepts_cidr_block() {
        let ip: IpAddr = "192.168.1.42".parse().unwrap();
        assert!(Executor::matches_any(ip, &["192.168.1.0/24".to_string()]));
        assert!(!Executor::matches_any(ip, &["192.168.2.0/24".to_string()]));
    }

    #[test]
    fn matches_any_ignores_unparseable_entries() {
        let ip: IpAddr = "10.0.0.5".parse().unwrap();
        assert!(!Executor::matches_any(ip, &["not-an-ip".to_string()]));
    }
}
