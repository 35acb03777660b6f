use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::model::BanRecord;

use super::Store;

impl Store {
    pub async fn get_active_ban(&self, address: &str) -> Result<Option<BanRecord>, StoreError> {
        let row = sqlx::query_as::<_, BanRecord>(
            r#"
            SELECT id, address, banned_at, ban_until, reason, threat_event_id, is_permanent,
                   is_active, unbanned_at, ban_count
            FROM ban_records
            WHERE address = ? AND is_active = TRUE
            "#,
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// If an inactive historical row exists for `address`, reactivate it and
    /// increment `ban_count` in place rather than inserting a new row.
    pub async fn upsert_ban(
        &self,
        address: &str,
        reason: &str,
        ban_until: Option<DateTime<Utc>>,
        threat_event_id: Option<i64>,
        is_permanent: bool,
    ) -> Result<BanRecord, StoreError> {
        let existing = sqlx::query_as::<_, BanRecord>(
            r#"
            SELECT id, address, banned_at, ban_until, reason, threat_event_id, is_permanent,
                   is_active, unbanned_at, ban_count
            FROM ban_records
            WHERE address = ?
            "#,
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;

        let now = Utc::now();
        match existing {
            Some(row) => {
                sqlx::query(
                    r#"
                    UPDATE ban_records
                    SET banned_at = ?, ban_until = ?, reason = ?, threat_event_id = ?,
                        is_permanent = ?, is_active = TRUE, unbanned_at = NULL,
                        ban_count = ban_count + 1
                    WHERE id = ?
                    "#,
                )
                .bind(now)
                .bind(ban_until)
                .bind(reason)
                .bind(threat_event_id)
                .bind(is_permanent)
                .bind(row.id)
                .execute(&self.pool)
                .await?;
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO ban_records
                    (address, banned_at, ban_until, reason, threat_event_id, is_permanent,
                     is_active, unbanned_at, ban_count)
                    VALUES (?, ?, ?, ?, ?, ?, TRUE, NULL, 1)
                    "#,
                )
                .bind(address)
                .bind(now)
                .bind(ban_until)
                .bind(reason)
                .bind(threat_event_id)
                .bind(is_permanent)
                .execute(&self.pool)
                .await?;
            }
        }

        self.get_active_ban(address)
            .await?
            .ok_or_else(|| StoreError::StateInconsistency(format!("ban upsert for {address} did not take")))
    }

    /// If `ban_count` has reached the permanent-escalation threshold, flip
    /// `is_permanent` and clear `ban_until`.
    pub async fn escalate_to_permanent(&self, address: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE ban_records SET is_permanent = TRUE, ban_until = NULL WHERE address = ? AND is_active = TRUE",
        )
        .bind(address)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn deactivate_ban(&self, address: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE ban_records SET is_active = FALSE, unbanned_at = ? WHERE address = ? AND is_active = TRUE",
        )
        .bind(Utc::now())
        .bind(address)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn expired_active_bans(&self) -> Result<Vec<BanRecord>, StoreError> {
        let rows = sqlx::query_as::<_, BanRecord>(
            r#"
            SELECT id, address, banned_at, ban_until, reason, threat_event_id, is_permanent,
                   is_active, unbanned_at, ban_count
            FROM ban_records
            WHERE is_active = TRUE AND is_permanent = FALSE AND ban_until < ?
            "#,
        )
        .bind(Utc::now())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn list_active_bans(&self) -> Result<Vec<BanRecord>, StoreError> {
        let rows = sqlx::query_as::<_, BanRecord>(
            r#"
            SELECT id, address, banned_at, ban_until, reason, threat_event_id, is_permanent,
                   is_active, unbanned_at, ban_count
            FROM ban_records
            WHERE is_active = TRUE
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
