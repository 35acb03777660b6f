//! Behavior analyzer and identity chain manager.
//!
//! Tracks behavior diversity per `base_hash` and creates/extends/merges
//! identity chains when evolution is detected, grounded in
//! `original_source/core/fingerprint.py::BehaviorAnalyzer` and
//! `original_source/core/identity_chain.py::IdentityChainManager`.

use chrono::Utc;
use thiserror::Error;

use security_common::error::StoreError;
use security_common::fingerprint::{extract_path_pattern, identity_hash};
use security_common::model::{AccessLog, EvolutionEntry, IdentityChain};
use security_common::store::Store;

pub use security_common::fingerprint::extract_path_pattern as path_pattern;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy)]
pub struct AnalyzerConfig {
    /// Minimum number of recent records before diversity is even considered.
    pub same_base_count: i64,
    /// Diversity ratio (distinct behavior_hash / count) that triggers an episode.
    pub behavior_change_rate: f64,
    /// How many of the most recent records to examine.
    pub window: i64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            same_base_count: 10,
            behavior_change_rate: 0.3,
            window: 1000,
        }
    }
}

/// Outcome of examining one `base_hash`'s recent behavior.
#[derive(Debug, Clone)]
pub struct BehaviorAnalysis {
    pub should_trigger_episode: bool,
    pub log_count: i64,
    pub unique_behaviors: i64,
    pub diversity: f64,
    pub path_patterns: Vec<String>,
}

/// Examine the last `cfg.window` records for `base_hash`: compute diversity,
/// and decide whether a chain episode should fire.
pub fn analyze_behavior(logs: &[AccessLog], cfg: &AnalyzerConfig) -> BehaviorAnalysis {
    let count = logs.len() as i64;
    if count < cfg.same_base_count {
        return BehaviorAnalysis {
            should_trigger_episode: false,
            log_count: count,
            unique_behaviors: 0,
            diversity: 0.0,
            path_patterns: Vec::new(),
        };
    }

    let mut behavior_hashes: Vec<&str> = logs.iter().map(|l| l.behavior_hash.as_str()).collect();
    behavior_hashes.sort_unstable();
    behavior_hashes.dedup();
    let unique_behaviors = behavior_hashes.len() as i64;

    let diversity = unique_behaviors as f64 / count as f64;

    let mut path_patterns: Vec<String> = logs
        .iter()
        .map(|l| extract_path_pattern(&l.path))
        .collect();
    path_patterns.sort();
    path_patterns.dedup();

    BehaviorAnalysis {
        should_trigger_episode: diversity >= cfg.behavior_change_rate,
        log_count: count,
        unique_behaviors,
        diversity,
        path_patterns,
    }
}

/// Identity Chain Manager: create/extend chains on a detected episode,
/// and merge two chains administratively.
pub struct ChainManager<'a> {
    store: &'a Store,
}

impl<'a> ChainManager<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Handle a detected episode for `base_hash`. `existing_chain_id` is the
    /// Fingerprint's current `chain_id`, if any.
    pub async fn handle_episode(
        &self,
        base_hash: &str,
        existing_chain_id: Option<i64>,
        analysis: &BehaviorAnalysis,
    ) -> Result<i64, IdentityError> {
        match existing_chain_id {
            Some(chain_id) => self.extend_chain(chain_id, base_hash, analysis).await,
            None => self.create_chain(base_hash, analysis).await,
        }
    }

    async fn create_chain(
        &self,
        base_hash: &str,
        analysis: &BehaviorAnalysis,
    ) -> Result<i64, IdentityError> {
        let root_hash = identity_hash(std::iter::once(base_hash.to_string()));
        let entry = EvolutionEntry {
            base_hash: base_hash.to_string(),
            timestamp: Utc::now(),
            cause: "behavior_evolution_detected".to_string(),
            diversity: analysis.diversity,
        };
        let description = format!(
            "identity chain created: behavior evolution detected (diversity {:.2})",
            analysis.diversity
        );

        let chain_id = self
            .store
            .insert_identity_chain(&root_hash, std::slice::from_ref(&entry), &description)
            .await?;

        self.store
            .set_fingerprint_chain(base_hash, chain_id, true)
            .await?;
        self.store
            .relink_access_logs_to_chain(base_hash, chain_id)
            .await?;

        Ok(chain_id)
    }

    async fn extend_chain(
        &self,
        chain_id: i64,
        base_hash: &str,
        analysis: &BehaviorAnalysis,
    ) -> Result<i64, IdentityError> {
        let chain = self
            .store
            .get_identity_chain(chain_id)
            .await?
            .ok_or_else(|| IdentityError::Store(StoreError::NotFound(format!("chain {chain_id}"))))?;

        let mut history = chain.evolution_history.0.clone();
        history.push(EvolutionEntry {
            base_hash: base_hash.to_string(),
            timestamp: Utc::now(),
            cause: "behavior_continued_evolution".to_string(),
            diversity: analysis.diversity,
        });

        let all_hashes: Vec<String> = history.iter().map(|e| e.base_hash.clone()).collect();
        let new_root_hash = identity_hash(all_hashes);

        self.store
            .update_identity_chain_history(chain_id, &history, &new_root_hash)
            .await?;

        Ok(chain_id)
    }

    /// Concatenate histories sorted by timestamp, recompute `root_hash`, sum
    /// visit counts, take max threat score, re-parent every Fingerprint /
    /// AccessLog / ThreatEvent from `from_id` onto `to_id`, delete `from_id`.
    /// Atomic.
    pub async fn merge_chains(&self, to_id: i64, from_id: i64) -> Result<IdentityChain, IdentityError> {
        let to_chain = self
            .store
            .get_identity_chain(to_id)
            .await?
            .ok_or_else(|| IdentityError::Store(StoreError::NotFound(format!("chain {to_id}"))))?;
        let from_chain = self
            .store
            .get_identity_chain(from_id)
            .await?
            .ok_or_else(|| IdentityError::Store(StoreError::NotFound(format!("chain {from_id}"))))?;

        let mut merged_history = to_chain.evolution_history.0.clone();
        merged_history.extend(from_chain.evolution_history.0.clone());
        merged_history.sort_by_key(|e| e.timestamp);

        let all_hashes: Vec<String> = merged_history.iter().map(|e| e.base_hash.clone()).collect();
        let merged_root_hash = identity_hash(all_hashes);
        let merged_visit_count = to_chain.aggregate_visit_count + from_chain.aggregate_visit_count;
        let merged_member_count = to_chain.member_count + from_chain.member_count;
        let merged_threat_score = to_chain.threat_score.max(from_chain.threat_score);

        self.store
            .merge_chains(
                to_id,
                from_id,
                &merged_root_hash,
                &merged_history,
                merged_visit_count,
                merged_member_count,
                merged_threat_score,
            )
            .await?;

        self.store
            .get_identity_chain(to_id)
            .await?
            .ok_or_else(|| IdentityError::Store(StoreError::NotFound(format!("chain {to_id}"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn log(base_hash: &str, behavior_hash: &str, path: &str) -> AccessLog {
        AccessLog {
            id: 0,
            timestamp: Utc::now(),
            address: "192.0.2.5".to_string(),
            user_agent: "curl/7.88".to_string(),
            method: "GET".to_string(),
            path: path.to_string(),
            query_string: String::new(),
            status: 200,
            response_size: 0,
            referer: String::new(),
            request_duration: None,
            raw_line: String::new(),
            base_hash: base_hash.to_string(),
            behavior_hash: behavior_hash.to_string(),
            chain_id: None,
        }
    }

    #[test]
    fn insufficient_records_never_trigger() {
        let logs: Vec<AccessLog> = (0..5).map(|i| log("h", &format!("b{i}"), "/x")).collect();
        let analysis = analyze_behavior(&logs, &AnalyzerConfig::default());
        assert!(!analysis.should_trigger_episode);
    }

    #[test]
    fn diversity_above_threshold_triggers_episode() {
        // 15 records, 8 distinct behavior_hash values -> diversity ~0.533 >= 0.3.
        let mut logs = Vec::new();
        for i in 0..15 {
            let behavior = format!("b{}", i % 8);
            logs.push(log("h", &behavior, "/x"));
        }
        let analysis = analyze_behavior(&logs, &AnalyzerConfig::default());
        assert_eq!(analysis.log_count, 15);
        assert_eq!(analysis.unique_behaviors, 8);
        assert!((analysis.diversity - (8.0 / 15.0)).abs() < 1e-9);
        assert!(analysis.should_trigger_episode);
    }

    #[test]
    fn low_diversity_does_not_trigger() {
        let logs: Vec<AccessLog> = (0..20).map(|_| log("h", "same", "/x")).collect();
        let analysis = analyze_behavior(&logs, &AnalyzerConfig::default());
        assert!(!analysis.should_trigger_episode);
    }
}
