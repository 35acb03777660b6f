//! Linux backend: three owned `iptables` chains (bans, rate-limits, port
//! rules), each jumped from `INPUT` at startup, grounded in
//! `original_source/core/firewall.py` (`_create_chain`, `_ensure_chain_jump`,
//! `_ban_linux_iptables`, `unban_ip`, `save_rules`/`restore_rules`).

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::backend::{BackendError, BannedRule, FirewallBackend};

pub struct LinuxIptablesBackend {
    bans_chain: String,
    rate_limit_chain: String,
    port_rules_chain: String,
    command_timeout: Duration,
    rules_file: String,
}

impl LinuxIptablesBackend {
    pub fn new(bans_chain: String, rate_limit_chain: String, port_rules_chain: String, command_timeout: Duration) -> Self {
        Self {
            bans_chain,
            rate_limit_chain,
            port_rules_chain,
            command_timeout,
            rules_file: "/etc/iptables/rules.v4".to_string(),
        }
    }

    /// Create the three owned chains and jump `INPUT` into each at position
    /// 1, idempotently.
    pub async fn ensure_chains(&self) -> Result<(), BackendError> {
        for chain in [&self.bans_chain, &self.rate_limit_chain, &self.port_rules_chain] {
            let _ = self.run(&["-N", chain]).await; // already exists -> non-zero, ignored
            self.ensure_jump("INPUT", chain).await?;
        }
        Ok(())
    }

    async fn ensure_jump(&self, from_chain: &str, to_chain: &str) -> Result<(), BackendError> {
        let check = self.run(&["-C", from_chain, "-j", to_chain]).await;
        if check.is_ok() {
            return Ok(());
        }
        self.run(&["-I", from_chain, "1", "-j", to_chain]).await.map(|_| ())
    }

    async fn run(&self, args: &[&str]) -> Result<String, BackendError> {
        let fut = Command::new("iptables").args(args).output();
        let output = tokio::time::timeout(self.command_timeout, fut)
            .await
            .map_err(|_| BackendError::Timeout(self.command_timeout))??;
        if !output.status.success() {
            return Err(BackendError::CommandFailed(format!(
                "iptables {:?}: {}",
                args,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run_raw(&self, program: &str, args: &[&str]) -> Result<String, BackendError> {
        let fut = Command::new(program).args(args).output();
        let output = tokio::time::timeout(self.command_timeout, fut)
            .await
            .map_err(|_| BackendError::Timeout(self.command_timeout))??;
        if !output.status.success() {
            return Err(BackendError::CommandFailed(format!(
                "{program} {:?}: {}",
                args,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl FirewallBackend for LinuxIptablesBackend {
    async fn ban(&self, address: &str, reason: &str, expiry_comment: &str) -> Result<(), BackendError> {
        let comment = format!("{reason} | {expiry_comment}");
        self.run(&[
            "-A",
            &self.bans_chain,
            "-s",
            address,
            "-j",
            "DROP",
            "-m",
            "comment",
            "--comment",
            &comment,
        ])
        .await
        .map(|_| ())
    }

    /// Enumerate rule line numbers via `--line-numbers`, delete bottom-up so
    /// earlier line numbers stay valid.
    async fn unban(&self, address: &str) -> Result<(), BackendError> {
        let listing = self
            .run(&["-L", &self.bans_chain, "-n", "--line-numbers"])
            .await?;

        let mut rule_numbers: Vec<u32> = listing
            .lines()
            .filter(|line| line.contains(address) && line.contains("DROP"))
            .filter_map(|line| line.split_whitespace().next())
            .filter_map(|n| n.parse().ok())
            .collect();
        rule_numbers.sort_unstable_by(|a, b| b.cmp(a));

        for line_number in rule_numbers {
            self.run(&["-D", &self.bans_chain, &line_number.to_string()])
                .await?;
        }
        Ok(())
    }

    async fn is_installed(&self, address: &str) -> Result<bool, BackendError> {
        let listing = self.run(&["-L", &self.bans_chain, "-n"]).await?;
        Ok(listing.contains(address) && listing.contains("DROP"))
    }

    async fn list_banned(&self) -> Result<Vec<BannedRule>, BackendError> {
        let listing = self.run(&["-L", &self.bans_chain, "-n"]).await?;
        Ok(listing
            .lines()
            .skip(2)
            .filter(|line| line.contains("DROP"))
            .filter_map(|line| {
                let parts: Vec<&str> = line.split_whitespace().collect();
                parts.get(3).map(|addr| BannedRule {
                    address: addr.to_string(),
                    comment: line.to_string(),
                })
            })
            .collect())
    }

    async fn health_check(&self) -> Result<bool, BackendError> {
        if self.run_raw("which", &["iptables"]).await.is_err() {
            return Ok(false);
        }
        for chain in [&self.bans_chain, &self.rate_limit_chain, &self.port_rules_chain] {
            if self.run(&["-L", chain, "-n"]).await.is_err() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn open_port(&self, port: u16, protocol: &str, source: Option<&str>) -> Result<(), BackendError> {
        let port_str = port.to_string();
        let comment = format!("allow port {port}/{protocol}");
        let mut args = vec!["-A", &self.port_rules_chain, "-p", protocol, "--dport", &port_str, "-j", "ACCEPT"];
        if let Some(source_ip) = source {
            args.splice(2..2, ["-s", source_ip]);
        }
        args.extend(["-m", "comment", "--comment", &comment]);
        self.run(&args).await.map(|_| ())
    }

    async fn close_port(&self, port: u16, protocol: &str) -> Result<(), BackendError> {
        let port_str = port.to_string();
        let listing = self
            .run(&["-L", &self.port_rules_chain, "-n", "--line-numbers"])
            .await?;
        let mut rule_numbers: Vec<u32> = listing
            .lines()
            .filter(|line| line.contains(&port_str) && line.contains(&protocol.to_uppercase()))
            .filter_map(|line| line.split_whitespace().next())
            .filter_map(|n| n.parse().ok())
            .collect();
        rule_numbers.sort_unstable_by(|a, b| b.cmp(a));
        for line_number in rule_numbers {
            self.run(&["-D", &self.port_rules_chain, &line_number.to_string()])
                .await?;
        }
        Ok(())
    }

    async fn block_port(&self, port: u16, protocol: &str) -> Result<(), BackendError> {
        let port_str = port.to_string();
        let comment = format!("block port {port}/{protocol}");
        self.run(&[
            "-A",
            &self.port_rules_chain,
            "-p",
            protocol,
            "--dport",
            &port_str,
            "-j",
            "DROP",
            "-m",
            "comment",
            "--comment",
            &comment,
        ])
        .await
        .map(|_| ())
    }

    async fn add_rate_limit(&self, limit: u32, period_seconds: u32, port: Option<u16>) -> Result<(), BackendError> {
        let name = format!("ratelimit_{}", port.map(|p| p.to_string()).unwrap_or_else(|| "all".to_string()));
        let above = format!("{limit}/{period_seconds}");
        let comment = format!("rate limit {limit}/{period_seconds}s");
        let port_str = port.map(|p| p.to_string());
        let mut args = vec!["-A", &self.rate_limit_chain];
        if let (Some(port_str), true) = (port_str.as_deref(), port.is_some()) {
            args.extend(["-p", "tcp", "--dport", port_str]);
        }
        args.extend([
            "-m",
            "hashlimit",
            "--hashlimit-name",
            &name,
            "--hashlimit-mode",
            "srcip",
            "--hashlimit-above",
            &above,
            "-j",
            "DROP",
            "-m",
            "comment",
            "--comment",
            &comment,
        ]);
        self.run(&args).await.map(|_| ())
    }

    async fn save_rules(&self) -> Result<(), BackendError> {
        let output = self.run_raw("iptables-save", &[]).await?;
        tokio::fs::write(&self.rules_file, output).await?;
        Ok(())
    }

    async fn restore_rules(&self) -> Result<(), BackendError> {
        let contents = tokio::fs::read(&self.rules_file).await?;
        let mut child = Command::new("iptables-restore")
            .stdin(Stdio::piped())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&contents).await?;
        }
        let status = tokio::time::timeout(self.command_timeout, child.wait())
            .await
            .map_err(|_| BackendError::Timeout(self.command_timeout))??;
        if !status.success() {
            return Err(BackendError::CommandFailed("iptables-restore failed".to_string()));
        }
        Ok(())
    }
}
