//! Durable record of access logs, fingerprints, identity chains, threat
//! events, bans, and score history.
//!
//! All queries are runtime-checked (`sqlx::query`/`sqlx::query_as::<_, T>`
//! with `.bind(..)`), never the compile-time `sqlx::query!` macro — this
//! crate has no `DATABASE_URL` available to validate against at build time.

mod access_log;
mod bans;
mod chains;
mod fingerprints;
mod lists;
mod rules;
mod score_history;
mod statistics;
mod threat_events;

use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;

use crate::error::StoreError;

#[derive(Clone)]
pub struct Store {
    pool: MySqlPool,
}

impl Store {
    /// Connecting at startup is the one place a store failure is fatal: the
    /// initial database connection is surfaced to `main` and aborts the
    /// process, never retried silently.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    /// Delete all Fingerprints with `last_seen` older than the retention
    /// horizon, cascade-delete their AccessLogs/ThreatEvents, then delete
    /// any IdentityChain whose member count has fallen to zero. One
    /// transaction per sweep.
    pub async fn retention_sweep(&self, retention_days: i64) -> Result<RetentionReport, StoreError> {
        let mut tx = self.pool.begin().await?;
        let cutoff = chrono::Utc::now() - chrono::Duration::days(retention_days);

        let expired_hashes: Vec<(String,)> = sqlx::query_as(
            "SELECT base_hash FROM fingerprints WHERE last_seen < ?",
        )
        .bind(cutoff)
        .fetch_all(&mut *tx)
        .await?;
        let expired_hashes: Vec<String> = expired_hashes.into_iter().map(|(h,)| h).collect();

        let mut access_logs_deleted = 0u64;
        let mut threat_events_deleted = 0u64;
        for hash in &expired_hashes {
            let res = sqlx::query("DELETE FROM access_logs WHERE base_hash = ?")
                .bind(hash)
                .execute(&mut *tx)
                .await?;
            access_logs_deleted += res.rows_affected();

            let res = sqlx::query("DELETE FROM threat_events WHERE base_hash = ?")
                .bind(hash)
                .execute(&mut *tx)
                .await?;
            threat_events_deleted += res.rows_affected();
        }

        let fingerprints_result = sqlx::query("DELETE FROM fingerprints WHERE last_seen < ?")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;

        let chains_result = sqlx::query(
            r#"
            DELETE c FROM identity_chains c
            LEFT JOIN fingerprints f ON f.chain_id = c.id
            WHERE f.chain_id IS NULL
            "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(RetentionReport {
            fingerprints_deleted: fingerprints_result.rows_affected(),
            access_logs_deleted,
            threat_events_deleted,
            chains_deleted: chains_result.rows_affected(),
        })
    }
}

#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct RetentionReport {
    pub fingerprints_deleted: u64,
    pub access_logs_deleted: u64,
    pub threat_events_deleted: u64,
    pub chains_deleted: u64,
}
