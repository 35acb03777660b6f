use crate::error::StoreError;
use crate::model::{AllowEntry, DenyEntry};

use super::Store;

impl Store {
    pub async fn list_allow_entries(&self) -> Result<Vec<AllowEntry>, StoreError> {
        let rows = sqlx::query_as::<_, AllowEntry>(
            "SELECT id, cidr, description, reason, created_at FROM allow_list",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn list_deny_entries(&self) -> Result<Vec<DenyEntry>, StoreError> {
        let rows = sqlx::query_as::<_, DenyEntry>(
            "SELECT id, cidr, description, reason, created_at FROM deny_list",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn add_allow_entry(
        &self,
        cidr: &str,
        description: &str,
        reason: &str,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO allow_list (cidr, description, reason, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(cidr)
        .bind(description)
        .bind(reason)
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_id() as i64)
    }

    pub async fn add_deny_entry(
        &self,
        cidr: &str,
        description: &str,
        reason: &str,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO deny_list (cidr, description, reason, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(cidr)
        .bind(description)
        .bind(reason)
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_id() as i64)
    }

    /// Seed config-declared allow/deny entries at startup. `cidr` is
    /// unique, so a config entry already present in the store (from a
    /// previous run, or admin-added since) is left untouched.
    pub async fn seed_lists(
        &self,
        allow: &[(String, String, String)],
        deny: &[(String, String, String)],
    ) -> Result<(), StoreError> {
        for (cidr, description, reason) in allow {
            sqlx::query(
                "INSERT IGNORE INTO allow_list (cidr, description, reason, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(cidr)
            .bind(description)
            .bind(reason)
            .bind(chrono::Utc::now())
            .execute(&self.pool)
            .await?;
        }
        for (cidr, description, reason) in deny {
            sqlx::query(
                "INSERT IGNORE INTO deny_list (cidr, description, reason, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(cidr)
            .bind(description)
            .bind(reason)
            .bind(chrono::Utc::now())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }
}
