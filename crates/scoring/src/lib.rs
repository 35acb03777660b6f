//! Scoring engine: per-fingerprint threat score with time decay,
//! ban-escalation thresholds, grounded in
//! `original_source/core/scoring_system.py::ThreatScoringSystem`
//! (`_apply_score_decay`, `calculate_threat_score`, `should_ban`,
//! `add_behavior_pattern_score`, `add_reward_score`).
//!
//! Decay is applied before any addition, and every multiplication is
//! floored to an integer before the result is clamped.

use chrono::{DateTime, Utc};
use thiserror::Error;

use security_common::config::ScoringConfig;
use security_common::error::StoreError;
use security_common::model::{Actor, BanAction, Fingerprint, RiskLevel, ScoreDecision, Severity, ThreatType};
use security_common::store::Store;

const SCORE_MIN: i32 = 0;
const SCORE_MAX: i32 = 200;
/// Below every ban threshold but above zero, the original still reports a
/// "low" risk tier (`scoring_system.py::_determine_risk_level`'s `>= 30`
/// branch) though it never drives a ban.
const LOW_RISK_FLOOR: i32 = 30;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no fingerprint for base_hash {0}")]
    UnknownFingerprint(String),
}

pub struct ScoringEngine<'a> {
    store: &'a Store,
    cfg: ScoringConfig,
}

impl<'a> ScoringEngine<'a> {
    pub fn new(store: &'a Store, cfg: ScoringConfig) -> Self {
        Self { store, cfg }
    }

    /// Decay rule: if `hours_since_last_update >= decay_hours`,
    /// `k = floor(hours / decay_hours)`, score *= `decay_rate^k`. Returns the
    /// (possibly unchanged) score and the timestamp it should be stored
    /// under. Idempotent for repeated calls within one decay cycle because
    /// the timestamp only advances when decay actually fires.
    fn decay(score: i32, last_update: DateTime<Utc>, now: DateTime<Utc>, cfg: &ScoringConfig) -> (i32, DateTime<Utc>) {
        let hours_since = (now - last_update).num_seconds() as f64 / 3600.0;
        if cfg.decay_hours <= 0 || hours_since < cfg.decay_hours as f64 {
            return (score, last_update);
        }
        let k = (hours_since / cfg.decay_hours as f64).floor();
        let decayed = (score as f64 * cfg.decay_rate.powf(k)).floor();
        ((decayed.max(0.0) as i32).clamp(SCORE_MIN, SCORE_MAX), now)
    }

    fn base_score(&self, threat_type: ThreatType) -> i32 {
        *self
            .cfg
            .base_scores
            .get(threat_type.as_str())
            .unwrap_or(&10)
    }

    fn risk_level(&self, score: i32) -> RiskLevel {
        if score >= self.cfg.permanent_threshold {
            RiskLevel::Critical
        } else if score >= self.cfg.extended_threshold {
            RiskLevel::High
        } else if score >= self.cfg.temporary_threshold {
            RiskLevel::Medium
        } else if score >= LOW_RISK_FLOOR {
            RiskLevel::Low
        } else {
            RiskLevel::None
        }
    }

    /// Ban decision. Thresholds are evaluated highest-first so a score
    /// crossing multiple tiers lands on the strictest one.
    fn ban_action(&self, score: i32) -> BanAction {
        if score >= self.cfg.permanent_threshold {
            BanAction::Permanent
        } else if score >= self.cfg.extended_threshold {
            BanAction::Extended
        } else if score >= self.cfg.temporary_threshold {
            BanAction::Temporary
        } else {
            BanAction::None
        }
    }

    fn decide(&self, score: i32) -> ScoreDecision {
        ScoreDecision {
            score,
            risk_level: self.risk_level(score),
            action: self.ban_action(score),
        }
    }

    async fn load(&self, base_hash: &str) -> Result<Fingerprint, ScoringError> {
        self.store
            .get_fingerprint(base_hash)
            .await?
            .ok_or_else(|| ScoringError::UnknownFingerprint(base_hash.to_string()))
    }

    /// Read the current score, applying decay but adding nothing, and
    /// persisting the decayed value if it moved.
    pub async fn read_score(&self, base_hash: &str) -> Result<ScoreDecision, ScoringError> {
        let fp = self.load(base_hash).await?;
        let now = Utc::now();
        let (decayed, new_update) = Self::decay(fp.threat_score, fp.last_score_update, now, &self.cfg);
        if decayed != fp.threat_score || new_update != fp.last_score_update {
            self.store
                .update_fingerprint_score(base_hash, decayed, new_update)
                .await?;
        }
        Ok(self.decide(decayed))
    }

    /// Apply decay, then add `delta` (clamped to `[0, 200]` via floor after
    /// the multiply has already happened at the call site), append a
    /// `ScoreHistory` row, and return the resulting ban decision.
    async fn apply_delta(
        &self,
        base_hash: &str,
        delta: i32,
        reason: &str,
        threat_event_id: Option<i64>,
        actor: Actor,
    ) -> Result<ScoreDecision, ScoringError> {
        let fp = self.load(base_hash).await?;
        let now = Utc::now();
        let (decayed, _) = Self::decay(fp.threat_score, fp.last_score_update, now, &self.cfg);
        let total = (decayed + delta).clamp(SCORE_MIN, SCORE_MAX);

        self.store
            .update_fingerprint_score(base_hash, total, now)
            .await?;
        self.store
            .insert_score_history(fp.id, base_hash, delta, total, reason, threat_event_id, actor)
            .await?;

        Ok(self.decide(total))
    }

    /// Per-finding addition:
    /// `delta = base_score(threat_type) * severity_multiplier(severity)`,
    /// floored to an integer before clamping.
    pub async fn add_finding(
        &self,
        base_hash: &str,
        threat_type: ThreatType,
        severity: Severity,
        threat_event_id: Option<i64>,
    ) -> Result<ScoreDecision, ScoringError> {
        let delta = (self.base_score(threat_type) as f64 * severity.multiplier()).floor() as i32;
        let reason = format!("threat: {}", threat_type.as_str());
        self.apply_delta(base_hash, delta, &reason, threat_event_id, Actor::System)
            .await
    }

    /// Positive delta for a named behavior pattern (e.g. tool-switching,
    /// geo-anomaly), audited the same way as a detector finding.
    pub async fn add_behavior_pattern(
        &self,
        base_hash: &str,
        pattern_name: &str,
        delta: i32,
    ) -> Result<ScoreDecision, ScoringError> {
        let reason = format!("behavior pattern: {pattern_name}");
        self.apply_delta(base_hash, delta, &reason, None, Actor::System)
            .await
    }

    /// Negative delta for a named reward, lowering the score through the
    /// same audited path.
    pub async fn add_reward(
        &self,
        base_hash: &str,
        reward_name: &str,
        delta: i32,
    ) -> Result<ScoreDecision, ScoringError> {
        let reason = format!("reward: {reward_name}");
        self.apply_delta(base_hash, -delta.abs(), &reason, None, Actor::System)
            .await
    }

    /// Admin-triggered reset to zero, audited with `Actor::Admin`.
    pub async fn reset_score(&self, base_hash: &str, reason: &str) -> Result<(), ScoringError> {
        let fp = self.load(base_hash).await?;
        let now = Utc::now();
        self.store.update_fingerprint_score(base_hash, 0, now).await?;
        self.store
            .insert_score_history(fp.id, base_hash, -fp.threat_score, 0, reason, None, Actor::Admin)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decay_is_noop_inside_one_cycle() {
        let now = Utc::now();
        let last_update = now - chrono::Duration::hours(5);
        let cfg = ScoringConfig::default();
        let (score, update) = ScoringEngine::decay(100, last_update, now, &cfg);
        assert_eq!(score, 100);
        assert_eq!(update, last_update);
    }

    #[test]
    fn decay_halves_score_after_one_cycle() {
        let now = Utc::now();
        let last_update = now - chrono::Duration::hours(24);
        let cfg = ScoringConfig::default();
        let (score, update) = ScoringEngine::decay(100, last_update, now, &cfg);
        assert_eq!(score, 50);
        assert_eq!(update, now);
    }

    #[test]
    fn decay_applies_multiple_cycles() {
        let now = Utc::now();
        let last_update = now - chrono::Duration::hours(48);
        let cfg = ScoringConfig::default();
        let (score, _) = ScoringEngine::decay(100, last_update, now, &cfg);
        // floor(100 * 0.5^2) = 25
        assert_eq!(score, 25);
    }

    #[test]
    fn decay_idempotent_on_repeated_read_same_cycle() {
        let now = Utc::now();
        let last_update = now - chrono::Duration::hours(30);
        let cfg = ScoringConfig::default();
        let (first, new_update) = ScoringEngine::decay(100, last_update, now, &cfg);
        let (second, new_update2) = ScoringEngine::decay(first, new_update, now, &cfg);
        assert_eq!(first, second);
        assert_eq!(new_update, new_update2);
    }
}
