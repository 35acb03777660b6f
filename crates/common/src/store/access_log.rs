use chrono::{DateTime, Utc};
use serde_json::json;

use crate::error::StoreError;
use crate::model::{AccessLog, Fingerprint, Record};

use super::Store;

impl Store {
    pub async fn insert_access_log(&self, record: &Record) -> Result<i64, StoreError> {
        let base_hash = record
            .base_hash
            .as_deref()
            .ok_or_else(|| StoreError::StateInconsistency("record missing base_hash".into()))?;
        let behavior_hash = record.behavior_hash.as_deref().ok_or_else(|| {
            StoreError::StateInconsistency("record missing behavior_hash".into())
        })?;

        let result = sqlx::query(
            r#"
            INSERT INTO access_logs
            (timestamp, address, user_agent, method, path, query_string, status,
             response_size, referer, request_duration, raw_line, base_hash, behavior_hash)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.timestamp)
        .bind(&record.address)
        .bind(&record.user_agent)
        .bind(&record.method)
        .bind(&record.path)
        .bind(&record.query_string)
        .bind(record.status as i32)
        .bind(record.response_size as i64)
        .bind(&record.referer)
        .bind(record.request_duration)
        .bind(&record.raw_line)
        .bind(base_hash)
        .bind(behavior_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_id() as i64)
    }

    /// Spec §4.9 step 3: the AccessLog insert and the Fingerprint upsert
    /// for one record happen in a single transaction. Mirrors
    /// `insert_access_log` and `upsert_fingerprint` but runs both
    /// statements against the same `Transaction` instead of the pool.
    pub async fn record_visit(&self, record: &Record) -> Result<(i64, Fingerprint), StoreError> {
        let base_hash = record
            .base_hash
            .as_deref()
            .ok_or_else(|| StoreError::StateInconsistency("record missing base_hash".into()))?;
        let behavior_hash = record.behavior_hash.as_deref().ok_or_else(|| {
            StoreError::StateInconsistency("record missing behavior_hash".into())
        })?;

        let mut tx = self.pool.begin().await?;

        let access_log_result = sqlx::query(
            r#"
            INSERT INTO access_logs
            (timestamp, address, user_agent, method, path, query_string, status,
             response_size, referer, request_duration, raw_line, base_hash, behavior_hash)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.timestamp)
        .bind(&record.address)
        .bind(&record.user_agent)
        .bind(&record.method)
        .bind(&record.path)
        .bind(&record.query_string)
        .bind(record.status as i32)
        .bind(record.response_size as i64)
        .bind(&record.referer)
        .bind(record.request_duration)
        .bind(&record.raw_line)
        .bind(base_hash)
        .bind(behavior_hash)
        .execute(&mut *tx)
        .await?;
        let access_log_id = access_log_result.last_insert_id() as i64;

        let existing = sqlx::query_as::<_, Fingerprint>(
            r#"
            SELECT id, base_hash, last_address, last_user_agent, first_seen, last_seen,
                   visit_count, distinct_behavior_count, threat_score, last_score_update,
                   chain_id, is_chain_root, metadata
            FROM fingerprints
            WHERE base_hash = ?
            "#,
        )
        .bind(base_hash)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(fp) = &existing {
            let last_seen: DateTime<Utc> = record.timestamp.max(fp.last_seen);
            sqlx::query(
                r#"
                UPDATE fingerprints
                SET last_address = ?, last_user_agent = ?, last_seen = ?, visit_count = visit_count + 1
                WHERE base_hash = ?
                "#,
            )
            .bind(&record.address)
            .bind(&record.user_agent)
            .bind(last_seen)
            .bind(base_hash)
            .execute(&mut *tx)
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
            .bind(&record.address)
            .bind(&record.user_agent)
            .bind(record.timestamp)
            .bind(record.timestamp)
            .bind(record.timestamp)
            .bind(sqlx::types::Json(json!({})))
            .execute(&mut *tx)
            .await?;
        }

        let fingerprint = sqlx::query_as::<_, Fingerprint>(
            r#"
            SELECT id, base_hash, last_address, last_user_agent, first_seen, last_seen,
                   visit_count, distinct_behavior_count, threat_score, last_score_update,
                   chain_id, is_chain_root, metadata
            FROM fingerprints
            WHERE base_hash = ?
            "#,
        )
        .bind(base_hash)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("fingerprint {base_hash}")))?;

        tx.commit().await?;

        Ok((access_log_id, fingerprint))
    }

    pub async fn recent_access_logs_for_base_hash(
        &self,
        base_hash: &str,
        limit: i64,
    ) -> Result<Vec<AccessLog>, StoreError> {
        let rows = sqlx::query_as::<_, AccessLog>(
            r#"
            SELECT id, timestamp, address, user_agent, method, path, query_string, status,
                   response_size, referer, request_duration, raw_line, base_hash, behavior_hash,
                   chain_id
            FROM access_logs
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

    pub async fn recent_access_logs_for_address(
        &self,
        address: &str,
        limit: i64,
    ) -> Result<Vec<AccessLog>, StoreError> {
        let rows = sqlx::query_as::<_, AccessLog>(
            r#"
            SELECT id, timestamp, address, user_agent, method, path, query_string, status,
                   response_size, referer, request_duration, raw_line, base_hash, behavior_hash,
                   chain_id
            FROM access_logs
            WHERE address = ?
            ORDER BY timestamp DESC
            LIMIT ?
            "#,
        )
        .bind(address)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn relink_access_logs_to_chain(
        &self,
        base_hash: &str,
        chain_id: i64,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE access_logs SET chain_id = ? WHERE base_hash = ?")
            .bind(chain_id)
            .bind(base_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn reparent_access_logs(
        &self,
        from_chain_id: i64,
        to_chain_id: i64,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE access_logs SET chain_id = ? WHERE chain_id = ?")
            .bind(to_chain_id)
            .bind(from_chain_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
