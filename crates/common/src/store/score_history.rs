use crate::error::StoreError;
use crate::model::{Actor, ScoreHistory};

use super::Store;

impl Store {
    pub async fn insert_score_history(
        &self,
        fingerprint_id: i64,
        base_hash: &str,
        delta: i32,
        total_after: i32,
        reason: &str,
        threat_event_id: Option<i64>,
        actor: Actor,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO score_history
            (timestamp, fingerprint_id, base_hash, delta, total_after, reason,
             threat_event_id, actor)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(chrono::Utc::now())
        .bind(fingerprint_id)
        .bind(base_hash)
        .bind(delta)
        .bind(total_after)
        .bind(reason)
        .bind(threat_event_id)
        .bind(actor.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_id() as i64)
    }

    pub async fn score_history_for(
        &self,
        base_hash: &str,
        limit: i64,
    ) -> Result<Vec<ScoreHistory>, StoreError> {
        let rows = sqlx::query_as::<_, ScoreHistory>(
            r#"
            SELECT id, timestamp, fingerprint_id, base_hash, delta, total_after, reason,
                   threat_event_id, actor
            FROM score_history
            WHERE base_hash = ?
            ORDER BY timestamp DESC
            LIMIT ?
            "#,
        )
        .bind(base_hash)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
