//! Pipeline coordinator: routes each parsed record through allow/deny
//! checks, fingerprinting, identity chaining, detection, scoring, and
//! enforcement in turn, grounded in
//! `original_source/main.py::FirewallSystem.process_log_entry`/`handle_threats`.
//!
//! Hash-to-worker sharding replaces the original's implicit per-identity
//! DB-row locking: each worker owns one shard of `base_hash` space and
//! processes it strictly in arrival order, so no locks are needed around a
//! single identity's AccessLog/Fingerprint/chain/score writes.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use security_common::config::AppConfig;
use security_common::error::StoreError;
use security_common::model::{Actor, BanAction, Record};
use security_common::sinks::{AlertEntry, AlertSink, AuditEntry, AuditSink};
use security_common::store::Store;
use security_detector::Detector;
use security_firewall::{BanOutcome, Executor, ExecutorError};
use security_identity::{analyze_behavior, AnalyzerConfig, ChainManager};
use security_scoring::{ScoringEngine, ScoringError};

use crate::rule_engine;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Scoring(#[from] ScoringError),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    #[error(transparent)]
    Identity(#[from] security_identity::IdentityError),
}

pub struct Pipeline {
    senders: Vec<mpsc::Sender<Record>>,
}

impl Pipeline {
    /// Submit a freshly-parsed record for processing. Sharding key is the
    /// canonical `base_hash` (computed here, cheaply, purely to route —
    /// the worker recomputes nothing it can't get from the stamped record).
    pub async fn submit(&self, mut record: Record) {
        let base_hash = security_common::fingerprint::base_hash(&record.address, &record.user_agent);
        let shard = shard_for(&base_hash, self.senders.len());
        record.base_hash = Some(base_hash);
        if self.senders[shard].send(record).await.is_err() {
            tracing::error!("pipeline worker shard {shard} is gone, dropping record");
        }
    }
}

fn shard_for(base_hash: &str, worker_count: usize) -> usize {
    let prefix = &base_hash[..16.min(base_hash.len())];
    let n = u64::from_str_radix(prefix, 16).unwrap_or(0);
    (n % worker_count.max(1) as u64) as usize
}

/// Spawn `worker_count` long-lived tasks, each draining its own bounded
/// channel, and return a `Pipeline` handle plus the `JoinSet` owning them.
pub fn spawn(
    store: Arc<Store>,
    executor: Arc<Executor>,
    cfg: Arc<AppConfig>,
    audit: Arc<dyn AuditSink>,
    alert: Arc<dyn AlertSink>,
    cancel: CancellationToken,
) -> (Pipeline, JoinSet<()>) {
    let worker_count = cfg.concurrency.worker_count.max(1);
    let mut senders = Vec::with_capacity(worker_count);
    let mut joins = JoinSet::new();

    for worker_id in 0..worker_count {
        let (tx, rx) = mpsc::channel(cfg.concurrency.queue_capacity.max(1) / worker_count.max(1));
        senders.push(tx);
        let worker = Worker {
            store: store.clone(),
            executor: executor.clone(),
            detector: Detector::new(cfg.detector.clone()),
            analyzer_cfg: AnalyzerConfig::default(),
            scoring_cfg: cfg.scoring.clone(),
            audit: audit.clone(),
            alert: alert.clone(),
            cancel: cancel.clone(),
        };
        joins.spawn(worker.run(worker_id, rx));
    }

    (Pipeline { senders }, joins)
}

struct Worker {
    store: Arc<Store>,
    executor: Arc<Executor>,
    detector: Detector,
    analyzer_cfg: AnalyzerConfig,
    scoring_cfg: security_common::config::ScoringConfig,
    audit: Arc<dyn AuditSink>,
    alert: Arc<dyn AlertSink>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(mut self, worker_id: usize, mut rx: mpsc::Receiver<Record>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!(worker_id, "pipeline worker draining remaining records before shutdown");
                    while let Ok(record) = rx.try_recv() {
                        self.process(record).await;
                    }
                    return;
                }
                maybe_record = rx.recv() => {
                    match maybe_record {
                        Some(record) => self.process(record).await,
                        None => return,
                    }
                }
            }
        }
    }

    async fn process(&mut self, mut record: Record) {
        if let Err(err) = self.process_inner(&mut record).await {
            tracing::error!(address = %record.address, %err, "pipeline step failed, record isolated");
        }
    }

    async fn process_inner(&mut self, record: &mut Record) -> Result<(), PipelineError> {
        // Step 1: allow-list short-circuit.
        if self.executor.is_whitelisted(&record.address).await.unwrap_or(false) {
            return Ok(());
        }

        // Step 2: hashes (base_hash already stamped by the dispatcher for
        // sharding; behavior_hash is computed here).
        let base_hash = record
            .base_hash
            .clone()
            .unwrap_or_else(|| security_common::fingerprint::base_hash(&record.address, &record.user_agent));
        let behavior_hash = security_common::fingerprint::behavior_hash(&record.path, &record.method, record.status);
        record.base_hash = Some(base_hash.clone());
        record.behavior_hash = Some(behavior_hash.clone());

        // Step 3: AccessLog + Fingerprint, one transaction at the store layer.
        let (_, fingerprint) = self.store.record_visit(record).await?;

        // Step 4: behavior analysis / identity chain.
        let recent = self
            .store
            .recent_access_logs_for_base_hash(&base_hash, self.analyzer_cfg.window)
            .await?;
        let analysis = analyze_behavior(&recent, &self.analyzer_cfg);
        self.store
            .bump_distinct_behavior_count(&base_hash, analysis.unique_behaviors)
            .await?;
        if analysis.should_trigger_episode {
            let chains = ChainManager::new(&self.store);
            chains
                .handle_episode(&base_hash, fingerprint.chain_id, &analysis)
                .await?;
        }

        // Step 6: detector (step 5, the rule engine, runs per finding below).
        let findings = self.detector.detect(record);
        let rules = self.store.list_enabled_scoring_rules().await.unwrap_or_default();

        for mut finding in findings {
            let cvss = security_common::cvss::reference_for(finding.threat_type);
            finding
                .details
                .insert("cvss".to_string(), serde_json::json!(cvss));

            let threat_event_id = self
                .store
                .insert_threat_event(&record.address, &base_hash, fingerprint.chain_id, &finding)
                .await
                .ok();

            // Step 7: scoring, then enforcement if a ban is warranted.
            let decision = self
                .scoring_engine()
                .add_finding(&base_hash, finding.threat_type, finding.severity, threat_event_id)
                .await?;

            let rule_delta = rule_engine::evaluate(&rules, record, &finding);
            let decision = if rule_delta != 0 {
                self.scoring_engine()
                    .add_behavior_pattern(&base_hash, "custom_rule_match", rule_delta)
                    .await?
            } else {
                decision
            };

            let mut action_taken = "none".to_string();
            if decision.action != BanAction::None {
                let outcome = self
                    .executor
                    .enforce(&record.address, decision.action, &finding.description, threat_event_id)
                    .await?;
                action_taken = format!("{outcome:?}");
                if matches!(outcome, BanOutcome::Installed) {
                    self.alert
                        .notify(AlertEntry {
                            timestamp: Utc::now(),
                            severity: "ban".to_string(),
                            summary: format!("{} banned: {}", record.address, finding.description),
                            address: record.address.clone(),
                        })
                        .await;
                }
            }

            if let Some(id) = threat_event_id {
                let _ = self.store.mark_threat_event_handled(id, &action_taken).await;
            }

            // Step 8: side-channel signals for high/critical findings.
            if matches!(finding.severity, security_common::model::Severity::High | security_common::model::Severity::Critical) {
                self.alert
                    .notify(AlertEntry {
                        timestamp: Utc::now(),
                        severity: finding.severity.as_str().to_string(),
                        summary: finding.description.clone(),
                        address: record.address.clone(),
                    })
                    .await;
            }

            self.audit
                .record(AuditEntry {
                    timestamp: Utc::now(),
                    actor: Actor::System.as_str().to_string(),
                    target: record.address.clone(),
                    action: format!("threat:{}", finding.threat_type.as_str()),
                    outcome: action_taken,
                })
                .await;
        }

        Ok(())
    }

    fn scoring_engine(&self) -> ScoringEngine<'_> {
        ScoringEngine::new(&self.store, self.scoring_cfg.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_for_is_deterministic_and_in_range() {
        let hash = security_common::fingerprint::base_hash("203.0.113.10", "Mozilla/5.0");
        let a = shard_for(&hash, 4);
        let b = shard_for(&hash, 4);
        assert_eq!(a, b);
        assert!(a < 4);
    }

    #[test]
    fn shard_for_spreads_distinct_hashes() {
        let shards: std::collections::HashSet<usize> = (0..32)
            .map(|i| {
                let hash = security_common::fingerprint::base_hash(&format!("10.0.0.{i}"), "curl/7.88");
                shard_for(&hash, 8)
            })
            .collect();
        assert!(shards.len() > 1, "32 distinct addresses should not all land on one shard");
    }

    #[test]
    fn shard_for_handles_single_worker() {
        let hash = security_common::fingerprint::base_hash("203.0.113.10", "Mozilla/5.0");
        assert_eq!(shard_for(&hash, 1), 0);
    }
}
