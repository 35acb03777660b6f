//! Firewall executor: host packet-filter abstraction plus the
//! ban/unban state machine sitting in front of it.

pub mod backend;
pub mod dry_run;
pub mod executor;
pub mod linux;
pub mod windows;

pub use backend::{BackendError, BannedRule, FirewallBackend};
pub use dry_run::DryRunBackend;
pub use executor::{BanOutcome, Executor, ExecutorError};
pub use linux::LinuxIptablesBackend;
pub use windows::WindowsNetshBackend;

use std::sync::Arc;
use std::time::Duration;

use security_common::config::FirewallConfig;

/// Build the concrete backend named by `cfg.backend` (`linux`, `windows`, or
/// `dry_run`), matching the three implementations the original tool ships.
/// For the Linux backend this also ensures the three owned chains exist and
/// are jumped from `INPUT`, idempotently; a failure here is logged, not
/// fatal, since the backend's own commands will surface the same problem on
/// first use.
pub async fn backend_from_config(cfg: &FirewallConfig) -> Arc<dyn FirewallBackend> {
    let timeout = Duration::from_secs(cfg.command_timeout_seconds);
    match cfg.backend.as_str() {
        "linux" => {
            let backend = LinuxIptablesBackend::new(
                cfg.bans_chain.clone(),
                cfg.rate_limit_chain.clone(),
                cfg.port_rules_chain.clone(),
                timeout,
            );
            if let Err(err) = backend.ensure_chains().await {
                tracing::warn!(%err, "failed to ensure iptables chains at startup");
            }
            Arc::new(backend)
        }
        "windows" => Arc::new(WindowsNetshBackend::new(cfg.bans_chain.clone(), timeout)),
        other => {
            if other != "dry_run" {
                tracing::warn!(backend = other, "unknown firewall backend, falling back to dry_run");
            }
            Arc::new(DryRunBackend::new())
        }
    }
}
