//! Shared entity types for the analytics pipeline and its store.
//!
//! These mirror the relational schema one-for-one: each durable type here
//! has a matching table in `store`, and `sqlx::FromRow` impls live next to
//! the query functions that produce them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A freshly parsed log line, before any hashing or persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub timestamp: DateTime<Utc>,
    pub address: String,
    pub user_agent: String,
    pub method: String,
    /// Query-stripped request path.
    pub path: String,
    pub query_string: String,
    pub status: u16,
    pub response_size: u64,
    pub referer: String,
    pub request_duration: Option<f64>,
    pub raw_line: String,
    pub base_hash: Option<String>,
    pub behavior_hash: Option<String>,
}

impl Record {
    /// Panics are not used here; callers stamp hashes once C2 has run.
    pub fn with_hashes(mut self, base_hash: String, behavior_hash: String) -> Self {
        self.base_hash = Some(base_hash);
        self.behavior_hash = Some(behavior_hash);
        self
    }
}

/// Durable, write-mostly log of every accepted request.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AccessLog {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub address: String,
    pub user_agent: String,
    pub method: String,
    pub path: String,
    pub query_string: String,
    pub status: i32,
    pub response_size: i64,
    pub referer: String,
    pub request_duration: Option<f64>,
    pub raw_line: String,
    pub base_hash: String,
    pub behavior_hash: String,
    pub chain_id: Option<i64>,
}

/// One row per distinct `base_hash`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Fingerprint {
    pub id: i64,
    pub base_hash: String,
    pub last_address: String,
    pub last_user_agent: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub visit_count: i64,
    pub distinct_behavior_count: i64,
    pub threat_score: i32,
    pub last_score_update: DateTime<Utc>,
    pub chain_id: Option<i64>,
    pub is_chain_root: bool,
    /// Opaque cache (geolocation, etc). Structured in-memory, JSON at rest.
    pub metadata: serde_json::Value,
}

impl Fingerprint {
    pub fn assert_invariants(&self) {
        debug_assert!(self.first_seen <= self.last_seen);
        debug_assert!(self.visit_count >= 1);
        debug_assert!((0..=200).contains(&self.threat_score));
    }
}

/// One entry in an identity chain's append-only evolution history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionEntry {
    pub base_hash: String,
    pub timestamp: DateTime<Utc>,
    pub cause: String,
    pub diversity: f64,
}

/// A group of related client identities, keyed by content-addressed root hash.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IdentityChain {
    pub id: i64,
    pub root_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub member_count: i64,
    pub aggregate_visit_count: i64,
    pub threat_score: i32,
    /// Stored as JSON at the store boundary; structured everywhere else.
    #[sqlx(json)]
    pub evolution_history: sqlx::types::Json<Vec<EvolutionEntry>>,
    pub description: String,
}

/// Kind of abusive pattern recognized by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatType {
    RateLimit,
    PathScan,
    SqlInjection,
    Xss,
    SensitivePath,
    BadUserAgent,
}

impl ThreatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatType::RateLimit => "rate_limit",
            ThreatType::PathScan => "path_scan",
            ThreatType::SqlInjection => "sql_injection",
            ThreatType::Xss => "xss",
            ThreatType::SensitivePath => "sensitive_path",
            ThreatType::BadUserAgent => "bad_user_agent",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "rate_limit" => Some(ThreatType::RateLimit),
            "path_scan" => Some(ThreatType::PathScan),
            "sql_injection" => Some(ThreatType::SqlInjection),
            "xss" => Some(ThreatType::Xss),
            "sensitive_path" => Some(ThreatType::SensitivePath),
            "bad_user_agent" => Some(ThreatType::BadUserAgent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn multiplier(&self) -> f64 {
        match self {
            Severity::Low => 0.5,
            Severity::Medium => 1.0,
            Severity::High => 1.5,
            Severity::Critical => 2.0,
        }
    }
}

/// A single detector hit, not yet persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub threat_type: ThreatType,
    pub severity: Severity,
    pub description: String,
    pub details: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ThreatEvent {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub address: String,
    pub base_hash: String,
    pub chain_id: Option<i64>,
    pub threat_type: String,
    pub severity: String,
    pub description: String,
    #[sqlx(json)]
    pub details: sqlx::types::Json<HashMap<String, serde_json::Value>>,
    pub handled: bool,
    pub action_taken: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BanRecord {
    pub id: i64,
    pub address: String,
    pub banned_at: DateTime<Utc>,
    pub ban_until: Option<DateTime<Utc>>,
    pub reason: String,
    pub threat_event_id: Option<i64>,
    pub is_permanent: bool,
    pub is_active: bool,
    pub unbanned_at: Option<DateTime<Utc>>,
    pub ban_count: i64,
}

impl BanRecord {
    pub fn assert_invariants(&self) {
        debug_assert!(!self.is_permanent || self.ban_until.is_none());
        debug_assert!(self.ban_count >= 1);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    System,
    Admin,
}

impl Actor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Actor::System => "system",
            Actor::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScoreHistory {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub fingerprint_id: i64,
    pub base_hash: String,
    pub delta: i32,
    pub total_after: i32,
    pub reason: String,
    pub threat_event_id: Option<i64>,
    pub actor: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AllowEntry {
    pub id: i64,
    /// Single address or CIDR block.
    pub cidr: String,
    pub description: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DenyEntry {
    pub id: i64,
    pub cidr: String,
    pub description: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Previous-hour rollup produced by the scheduler's hourly job.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Statistics {
    pub id: i64,
    pub hour_start: DateTime<Utc>,
    pub total_requests: i64,
    pub unique_addresses: i64,
    #[sqlx(json)]
    pub status_histogram: sqlx::types::Json<HashMap<String, i64>>,
}

/// An admin-defined additive scoring condition, evaluated by the optional
/// custom rule engine (pipeline step 5).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScoringRule {
    pub id: i64,
    pub name: String,
    /// e.g. "threat_type=sql_injection && severity=critical"
    pub condition: String,
    pub score_delta: i32,
    pub enabled: bool,
}

/// Outcome of a scoring read: advisory, applied by the coordinator through C7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BanAction {
    None,
    Temporary,
    Extended,
    Permanent,
}

impl BanAction {
    pub fn duration_seconds(&self, cfg: &crate::config::ScoringConfig) -> Option<i64> {
        match self {
            BanAction::None => None,
            BanAction::Temporary => Some(cfg.temporary_ban_seconds),
            BanAction::Extended => Some(cfg.extended_ban_seconds),
            BanAction::Permanent => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreDecision {
    pub score: i32,
    pub risk_level: RiskLevel,
    pub action: BanAction,
}
