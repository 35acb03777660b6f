//! Typed application configuration, loaded once at startup from a single
//! YAML document and passed by value or shared reference to each component.
//!
//! Replaces the nested option-bag the original tool threads through every
//! call (`config: Dict`); each component here takes only the narrow view it
//! needs (`ScoringConfig`, `DetectorConfig`, ...) rather than the whole tree.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::CommonError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub log_source: LogSourceConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub firewall: FirewallConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub lists: ListsConfig,
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CommonError> {
        let text = std::fs::read_to_string(path).map_err(CommonError::Io)?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, CommonError> {
        serde_yaml::from_str(text).map_err(CommonError::Misconfiguration)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSourceConfig {
    pub path: String,
    /// `combined` or `combined_time`.
    #[serde(default = "default_profile")]
    pub profile: String,
}

fn default_profile() -> String {
    "combined".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

fn default_retention_days() -> i64 {
    3
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    #[serde(default = "default_rate_window")]
    pub rate_limit_window_seconds: i64,
    #[serde(default = "default_rate_max")]
    pub rate_limit_max_requests: u32,
    #[serde(default = "default_scan_window")]
    pub path_scan_window_seconds: i64,
    #[serde(default = "default_scan_max")]
    pub path_scan_max_404s: u32,
    #[serde(default = "default_sqli_patterns")]
    pub sql_injection_patterns: Vec<String>,
    #[serde(default = "default_xss_patterns")]
    pub xss_patterns: Vec<String>,
    #[serde(default = "default_sensitive_paths")]
    pub sensitive_paths: Vec<String>,
    #[serde(default = "default_bad_ua_patterns")]
    pub bad_user_agent_patterns: Vec<String>,
    #[serde(default = "default_window_cap")]
    pub request_window_capacity: usize,
    #[serde(default = "default_404_window_cap")]
    pub status_404_window_capacity: usize,
}

fn default_rate_window() -> i64 {
    60
}
fn default_rate_max() -> u32 {
    100
}
fn default_scan_window() -> i64 {
    300
}
fn default_scan_max() -> u32 {
    20
}
fn default_window_cap() -> usize {
    1000
}
fn default_404_window_cap() -> usize {
    100
}
fn default_sqli_patterns() -> Vec<String> {
    vec![
        r"(?i)union\s+select".to_string(),
        r"(?i)or\s+1\s*=\s*1".to_string(),
        r"(?i)'\s*or\s*'1'\s*=\s*'1".to_string(),
        r"(?i);\s*drop\s+table".to_string(),
        r"(?i)sleep\(\d+\)".to_string(),
    ]
}
fn default_xss_patterns() -> Vec<String> {
    vec![
        r"(?i)<script".to_string(),
        r"(?i)javascript:".to_string(),
        r"(?i)onerror\s*=".to_string(),
        r"(?i)onload\s*=".to_string(),
    ]
}
fn default_sensitive_paths() -> Vec<String> {
    vec![
        "/.env".to_string(),
        "/.git".to_string(),
        "/admin".to_string(),
        "/wp-admin".to_string(),
        "/.ssh".to_string(),
    ]
}
fn default_bad_ua_patterns() -> Vec<String> {
    vec![
        r"(?i)sqlmap".to_string(),
        r"(?i)nikto".to_string(),
        r"(?i)nmap".to_string(),
        r"(?i)masscan".to_string(),
        r"(?i)nessus".to_string(),
        r"(?i)acunetix".to_string(),
    ]
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            rate_limit_window_seconds: default_rate_window(),
            rate_limit_max_requests: default_rate_max(),
            path_scan_window_seconds: default_scan_window(),
            path_scan_max_404s: default_scan_max(),
            sql_injection_patterns: default_sqli_patterns(),
            xss_patterns: default_xss_patterns(),
            sensitive_paths: default_sensitive_paths(),
            bad_user_agent_patterns: default_bad_ua_patterns(),
            request_window_capacity: default_window_cap(),
            status_404_window_capacity: default_404_window_cap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_base_scores")]
    pub base_scores: HashMap<String, i32>,
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,
    #[serde(default = "default_decay_hours")]
    pub decay_hours: i64,
    #[serde(default = "default_temporary_threshold")]
    pub temporary_threshold: i32,
    #[serde(default = "default_extended_threshold")]
    pub extended_threshold: i32,
    #[serde(default = "default_permanent_threshold")]
    pub permanent_threshold: i32,
    #[serde(default = "default_temporary_ban_seconds")]
    pub temporary_ban_seconds: i64,
    #[serde(default = "default_extended_ban_seconds")]
    pub extended_ban_seconds: i64,
    #[serde(default = "default_permanent_escalation")]
    pub permanent_escalation_threshold: i64,
}

fn default_base_scores() -> HashMap<String, i32> {
    [
        ("sql_injection", 50),
        ("xss", 40),
        ("rate_limit", 25),
        ("path_scan", 30),
        ("sensitive_path", 15),
        ("bad_user_agent", 20),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}
fn default_decay_rate() -> f64 {
    0.5
}
fn default_decay_hours() -> i64 {
    24
}
fn default_temporary_threshold() -> i32 {
    60
}
fn default_extended_threshold() -> i32 {
    100
}
fn default_permanent_threshold() -> i32 {
    150
}
fn default_temporary_ban_seconds() -> i64 {
    3600
}
fn default_extended_ban_seconds() -> i64 {
    86_400
}
fn default_permanent_escalation() -> i64 {
    5
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base_scores: default_base_scores(),
            decay_rate: default_decay_rate(),
            decay_hours: default_decay_hours(),
            temporary_threshold: default_temporary_threshold(),
            extended_threshold: default_extended_threshold(),
            permanent_threshold: default_permanent_threshold(),
            temporary_ban_seconds: default_temporary_ban_seconds(),
            extended_ban_seconds: default_extended_ban_seconds(),
            permanent_escalation_threshold: default_permanent_escalation(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirewallConfig {
    /// `linux`, `windows`, or `dry_run`.
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,
    #[serde(default = "default_bans_chain")]
    pub bans_chain: String,
    #[serde(default = "default_rate_limit_chain")]
    pub rate_limit_chain: String,
    #[serde(default = "default_port_rules_chain")]
    pub port_rules_chain: String,
}

fn default_backend() -> String {
    "dry_run".to_string()
}
fn default_command_timeout() -> u64 {
    8
}
fn default_bans_chain() -> String {
    "FIREWALL_BANS".to_string()
}
fn default_rate_limit_chain() -> String {
    "FIREWALL_RATE_LIMIT".to_string()
}
fn default_port_rules_chain() -> String {
    "FIREWALL_PORT_RULES".to_string()
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            command_timeout_seconds: default_command_timeout(),
            bans_chain: default_bans_chain(),
            rate_limit_chain: default_rate_limit_chain(),
            port_rules_chain: default_port_rules_chain(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_expired_ban_interval")]
    pub expired_ban_sweep_interval_seconds: u64,
    /// Local hour (0-23) at which the retention sweep runs.
    #[serde(default = "default_retention_hour")]
    pub retention_sweep_hour: u32,
}

fn default_expired_ban_interval() -> u64 {
    300
}
fn default_retention_hour() -> u32 {
    3
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            expired_ban_sweep_interval_seconds: default_expired_ban_interval(),
            retention_sweep_hour: default_retention_hour(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListsConfig {
    #[serde(default)]
    pub allow: Vec<ListEntryConfig>,
    #[serde(default)]
    pub deny: Vec<ListEntryConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListEntryConfig {
    pub cidr: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_worker_count() -> usize {
    4
}
fn default_queue_capacity() -> usize {
    10_000
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
        }
    }
}
