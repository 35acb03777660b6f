use chrono::Utc;

use crate::error::StoreError;
use crate::model::{EvolutionEntry, IdentityChain};

use super::Store;

impl Store {
    pub async fn insert_identity_chain(
        &self,
        root_hash: &str,
        history: &[EvolutionEntry],
        description: &str,
    ) -> Result<i64, StoreError> {
        let now = Utc::now();
        let visit_count: i64 = 1;
        let result = sqlx::query(
            r#"
            INSERT INTO identity_chains
            (root_hash, created_at, updated_at, member_count, aggregate_visit_count,
             threat_score, evolution_history, description)
            VALUES (?, ?, ?, 1, ?, 0, ?, ?)
            "#,
        )
        .bind(root_hash)
        .bind(now)
        .bind(now)
        .bind(visit_count)
        .bind(sqlx::types::Json(history.to_vec()))
        .bind(description)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_id() as i64)
    }

    pub async fn get_identity_chain(&self, id: i64) -> Result<Option<IdentityChain>, StoreError> {
        let row = sqlx::query_as::<_, IdentityChain>(
            r#"
            SELECT id, root_hash, created_at, updated_at, member_count, aggregate_visit_count,
                   threat_score, evolution_history, description
            FROM identity_chains
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Append an entry, recompute `root_hash` from the union of all hashes in
    /// history, refresh `updated_at`.
    pub async fn update_identity_chain_history(
        &self,
        id: i64,
        history: &[EvolutionEntry],
        root_hash: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE identity_chains
            SET evolution_history = ?, root_hash = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(sqlx::types::Json(history.to_vec()))
        .bind(root_hash)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_all_chains(&self) -> Result<Vec<IdentityChain>, StoreError> {
        let rows = sqlx::query_as::<_, IdentityChain>(
            r#"
            SELECT id, root_hash, created_at, updated_at, member_count, aggregate_visit_count,
                   threat_score, evolution_history, description
            FROM identity_chains
            ORDER BY updated_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Merge chain `from_id` into `to_id`: caller has already concatenated
    /// histories, recomputed `root_hash`, summed visits and taken the max
    /// threat score; this persists the result, re-parents FKs, and deletes
    /// the absorbed chain, all atomically.
    pub async fn merge_chains(
        &self,
        to_id: i64,
        from_id: i64,
        merged_root_hash: &str,
        merged_history: &[EvolutionEntry],
        merged_visit_count: i64,
        merged_member_count: i64,
        merged_threat_score: i32,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE identity_chains
            SET root_hash = ?, evolution_history = ?, aggregate_visit_count = ?,
                member_count = ?, threat_score = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(merged_root_hash)
        .bind(sqlx::types::Json(merged_history.to_vec()))
        .bind(merged_visit_count)
        .bind(merged_member_count)
        .bind(merged_threat_score)
        .bind(Utc::now())
        .bind(to_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE fingerprints SET chain_id = ?, is_chain_root = FALSE WHERE chain_id = ?")
            .bind(to_id)
            .bind(from_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE access_logs SET chain_id = ? WHERE chain_id = ?")
            .bind(to_id)
            .bind(from_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE threat_events SET chain_id = ? WHERE chain_id = ?")
            .bind(to_id)
            .bind(from_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM identity_chains WHERE id = ?")
            .bind(from_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
