use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::error::StoreError;
use crate::model::Statistics;

use super::Store;

impl Store {
    pub async fn insert_statistics(
        &self,
        hour_start: DateTime<Utc>,
        total_requests: i64,
        unique_addresses: i64,
        status_histogram: &HashMap<String, i64>,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO statistics (hour_start, total_requests, unique_addresses, status_histogram)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(hour_start)
        .bind(total_requests)
        .bind(unique_addresses)
        .bind(sqlx::types::Json(status_histogram.clone()))
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_id() as i64)
    }

    pub async fn statistics_for_hour(
        &self,
        hour_start: DateTime<Utc>,
    ) -> Result<Option<Statistics>, StoreError> {
        let row = sqlx::query_as::<_, Statistics>(
            r#"
            SELECT id, hour_start, total_requests, unique_addresses, status_histogram
            FROM statistics
            WHERE hour_start = ?
            "#,
        )
        .bind(hour_start)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Used by the scheduler's hourly job to compute the previous whole
    /// hour's aggregates directly from access_logs.
    pub async fn aggregate_access_logs_for_hour(
        &self,
        hour_start: DateTime<Utc>,
        hour_end: DateTime<Utc>,
    ) -> Result<(i64, i64, HashMap<String, i64>), StoreError> {
        use sqlx::Row;

        let totals_row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total_requests, COUNT(DISTINCT address) AS unique_addresses
            FROM access_logs
            WHERE timestamp >= ? AND timestamp < ?
            "#,
        )
        .bind(hour_start)
        .bind(hour_end)
        .fetch_one(&self.pool)
        .await?;
        let total_requests: i64 = totals_row.try_get("total_requests").unwrap_or(0);
        let unique_addresses: i64 = totals_row.try_get("unique_addresses").unwrap_or(0);

        let status_rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS count
            FROM access_logs
            WHERE timestamp >= ? AND timestamp < ?
            GROUP BY status
            "#,
        )
        .bind(hour_start)
        .bind(hour_end)
        .fetch_all(&self.pool)
        .await?;

        let mut histogram = HashMap::new();
        for row in status_rows {
            let status: i32 = row.try_get("status").unwrap_or(0);
            let count: i64 = row.try_get("count").unwrap_or(0);
            histogram.insert(status.to_string(), count);
        }

        Ok((total_requests, unique_addresses, histogram))
    }
}
