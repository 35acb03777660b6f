use crate::error::StoreError;
use crate::model::ScoringRule;

use super::Store;

impl Store {
    pub async fn list_enabled_scoring_rules(&self) -> Result<Vec<ScoringRule>, StoreError> {
        // `condition` is a MySQL reserved word; the column is `match_condition`,
        // aliased back to `condition` here to match the `ScoringRule` field name.
        let rows = sqlx::query_as::<_, ScoringRule>(
            "SELECT id, name, match_condition AS condition, score_delta, enabled FROM scoring_rules WHERE enabled = TRUE",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn add_scoring_rule(
        &self,
        name: &str,
        condition: &str,
        score_delta: i32,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO scoring_rules (name, match_condition, score_delta, enabled) VALUES (?, ?, ?, TRUE)",
        )
        .bind(name)
        .bind(condition)
        .bind(score_delta)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_id() as i64)
    }
}
