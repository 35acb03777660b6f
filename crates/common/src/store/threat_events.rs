use crate::error::StoreError;
use crate::model::{Finding, ThreatEvent};

use super::Store;

impl Store {
    pub async fn insert_threat_event(
        &self,
        address: &str,
        base_hash: &str,
        chain_id: Option<i64>,
        finding: &Finding,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO threat_events
            (timestamp, address, base_hash, chain_id, threat_type, severity, description,
             details, handled, action_taken)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, FALSE, NULL)
            "#,
        )
        .bind(chrono::Utc::now())
        .bind(address)
        .bind(base_hash)
        .bind(chain_id)
        .bind(finding.threat_type.as_str())
        .bind(finding.severity.as_str())
        .bind(&finding.description)
        .bind(sqlx::types::Json(finding.details.clone()))
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_id() as i64)
    }

    pub async fn mark_threat_event_handled(
        &self,
        id: i64,
        action_taken: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE threat_events SET handled = TRUE, action_taken = ? WHERE id = ?")
            .bind(action_taken)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn recent_threats_for_address(
        &self,
        address: &str,
        limit: i64,
    ) -> Result<Vec<ThreatEvent>, StoreError> {
        let rows = sqlx::query_as::<_, ThreatEvent>(
            r#"
            SELECT id, timestamp, address, base_hash, chain_id, threat_type, severity,
                   description, details, handled, action_taken
            FROM threat_events
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
}
