//! Windows backend: `netsh advfirewall` rules keyed by a name prefix,
//! grounded in `original_source/core/firewall.py::_ban_windows`.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::backend::{BackendError, BannedRule, FirewallBackend};

pub struct WindowsNetshBackend {
    rule_prefix: String,
    command_timeout: Duration,
}

impl WindowsNetshBackend {
    pub fn new(rule_prefix: String, command_timeout: Duration) -> Self {
        Self { rule_prefix, command_timeout }
    }

    fn ban_rule_name(&self, address: &str) -> String {
        format!("{}_ban_{}", self.rule_prefix, address.replace('.', "_").replace(':', "_"))
    }

    async fn run(&self, args: &[&str]) -> Result<String, BackendError> {
        let fut = Command::new("netsh").args(args).output();
        let output = tokio::time::timeout(self.command_timeout, fut)
            .await
            .map_err(|_| BackendError::Timeout(self.command_timeout))??;
        if !output.status.success() {
            return Err(BackendError::CommandFailed(format!(
                "netsh {:?}: {}",
                args,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl FirewallBackend for WindowsNetshBackend {
    async fn ban(&self, address: &str, reason: &str, _expiry_comment: &str) -> Result<(), BackendError> {
        let name = self.ban_rule_name(address);
        let name_arg = format!("name={name}");
        let remote_ip = format!("remoteip={address}");
        let description = format!("description={reason}");
        self.run(&[
            "advfirewall",
            "firewall",
            "add",
            "rule",
            &name_arg,
            "dir=in",
            "action=block",
            &remote_ip,
            &description,
        ])
        .await
        .map(|_| ())
    }

    async fn unban(&self, address: &str) -> Result<(), BackendError> {
        let name_arg = format!("name={}", self.ban_rule_name(address));
        self.run(&["advfirewall", "firewall", "delete", "rule", &name_arg])
            .await
            .map(|_| ())
    }

    async fn is_installed(&self, address: &str) -> Result<bool, BackendError> {
        let name_arg = format!("name={}", self.ban_rule_name(address));
        match self.run(&["advfirewall", "firewall", "show", "rule", &name_arg]).await {
            Ok(output) => Ok(output.contains(&self.ban_rule_name(address))),
            Err(_) => Ok(false),
        }
    }

    async fn list_banned(&self) -> Result<Vec<BannedRule>, BackendError> {
        let name_arg = format!("name=all");
        let output = self.run(&["advfirewall", "firewall", "show", "rule", &name_arg]).await?;
        let prefix = format!("{}_ban_", self.rule_prefix);
        Ok(output
            .lines()
            .filter(|line| line.contains(&prefix))
            .filter_map(|line| {
                line.split(':').nth(1).map(|name| BannedRule {
                    address: name.trim().to_string(),
                    comment: line.to_string(),
                })
            })
            .collect())
    }

    async fn health_check(&self) -> Result<bool, BackendError> {
        Ok(self.run(&["advfirewall", "show", "allprofiles"]).await.is_ok())
    }

    async fn open_port(&self, port: u16, protocol: &str, _source: Option<&str>) -> Result<(), BackendError> {
        let name_arg = format!("name={}_open_{port}_{protocol}", self.rule_prefix);
        let protocol_arg = format!("protocol={protocol}");
        let localport_arg = format!("localport={port}");
        self.run(&[
            "advfirewall",
            "firewall",
            "add",
            "rule",
            &name_arg,
            "dir=in",
            "action=allow",
            &protocol_arg,
            &localport_arg,
        ])
        .await
        .map(|_| ())
    }

    async fn close_port(&self, port: u16, protocol: &str) -> Result<(), BackendError> {
        let name_arg = format!("name={}_open_{port}_{protocol}", self.rule_prefix);
        self.run(&["advfirewall", "firewall", "delete", "rule", &name_arg])
            .await
            .map(|_| ())
    }

    async fn block_port(&self, port: u16, protocol: &str) -> Result<(), BackendError> {
        let name_arg = format!("name={}_block_{port}_{protocol}", self.rule_prefix);
        let protocol_arg = format!("protocol={protocol}");
        let localport_arg = format!("localport={port}");
        self.run(&[
            "advfirewall",
            "firewall",
            "add",
            "rule",
            &name_arg,
            "dir=in",
            "action=block",
            &protocol_arg,
            &localport_arg,
        ])
        .await
        .map(|_| ())
    }

    async fn add_rate_limit(&self, _limit: u32, _period_seconds: u32, _port: Option<u16>) -> Result<(), BackendError> {
        Err(BackendError::CommandFailed(
            "netsh advfirewall has no hashlimit equivalent; rate limiting is unsupported on this backend".to_string(),
        ))
    }

    async fn save_rules(&self) -> Result<(), BackendError> {
        Err(BackendError::CommandFailed("rule export is unsupported on the netsh backend".to_string()))
    }

    async fn restore_rules(&self) -> Result<(), BackendError> {
        Err(BackendError::CommandFailed("rule import is unsupported on the netsh backend".to_string()))
    }
}
