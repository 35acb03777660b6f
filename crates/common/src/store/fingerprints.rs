use chrono::{DateTime, Utc};
use serde_json::json;

use crate::error::StoreError;
use crate::model::Fingerprint;

use super::Store;

impl Store {
    /// Create if absent; else bump `last_seen` to the record's timestamp and
    /// increment visit count.
    pub async fn upsert_fingerprint(
        &self,
        base_hash: &str,
        address: &str,
        user_agent: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Fingerprint, StoreError> {
        let existing = self.get_fingerprint(base_hash).await?;
        if let Some(fp) = existing {
            let last_seen = timestamp.max(fp.last_seen);
            sqlx::query(
                r#"
                UPDATE fingerprints
                SET last_address = ?, last_user_agent = ?, last_seen = ?, visit_count = visit_count + 1
                WHERE base_hash = ?
                "#,
            )
            .bind(address)
            .bind(user_agent)
            .bind(last_seen)
            .bind(base_hash)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                r#"
                INSERT INTO fingerprints
                (base_hash, last_address, last_user_agent, first_seen, last_seen, visit_count,
                 distinct_behavior_count, threat_score, last_score_update, chain_id,
                 is_chain_root, metadata)
                VALUES (?, ?, ?, ?, ?, 1, 0, 0, ?, NULL, FALSE, ?)
                "#,
            )
            .bind(base_hash)
            .bind(address)
            .bind(user_agent)
            .bind(timestamp)
            .bind(timestamp)
            .bind(timestamp)
            .bind(sqlx::types::Json(json!({})))
            .execute(&self.pool)
            .await?;
        }

        self.get_fingerprint(base_hash)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("fingerprint {base_hash}")))
    }

    pub async fn get_fingerprint(&self, base_hash: &str) -> Result<Option<Fingerprint>, StoreError> {
        let row = sqlx::query_as::<_, Fingerprint>(
            r#"
            SELECT id, base_hash, last_address, last_user_agent, first_seen, last_seen,
                   visit_count, distinct_behavior_count, threat_score, last_score_update,
                   chain_id, is_chain_root, metadata
            FROM fingerprints
            WHERE base_hash = ?
            "#,
        )
        .bind(base_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn update_fingerprint_score(
        &self,
        base_hash: &str,
        score: i32,
        last_score_update: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE fingerprints SET threat_score = ?, last_score_update = ? WHERE base_hash = ?",
        )
        .bind(score)
        .bind(last_score_update)
        .bind(base_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_fingerprint_chain(
        &self,
        base_hash: &str,
        chain_id: i64,
        is_chain_root: bool,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE fingerprints SET chain_id = ?, is_chain_root = ? WHERE base_hash = ?",
        )
        .bind(chain_id)
        .bind(is_chain_root)
        .bind(base_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn bump_distinct_behavior_count(
        &self,
        base_hash: &str,
        count: i64,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE fingerprints SET distinct_behavior_count = ? WHERE base_hash = ?")
            .bind(count)
            .bind(base_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn reparent_fingerprints(
        &self,
        from_chain_id: i64,
        to_chain_id: i64,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE fingerprints SET chain_id = ?, is_chain_root = FALSE WHERE chain_id = ?")
            .bind(to_chain_id)
            .bind(from_chain_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn top_fingerprints_by_score(&self, limit: i64) -> Result<Vec<Fingerprint>, StoreError> {
        let rows = sqlx::query_as::<_, Fingerprint>(
            r#"
            SELECT id, base_hash, last_address, last_user_agent, first_seen, last_seen,
                   visit_count, distinct_behavior_count, threat_score, last_score_update,
                   chain_id, is_chain_root, metadata
            FROM fingerprints
            ORDER BY threat_score DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
