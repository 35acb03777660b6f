//! Scheduler: three periodic jobs, grounded in
//! `original_source/main.py::FirewallSystem.setup_scheduled_tasks` (APScheduler
//! `interval`/`cron` jobs). `tokio-cron-scheduler` is the Rust equivalent;
//! each job is additionally guarded by its own mutex so a slow run defers
//! only its own next trigger, never the other jobs.

use std::sync::Arc;

use chrono::{Datelike, Duration as ChronoDuration, TimeZone, Timelike, Utc};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};

use security_common::config::AppConfig;
use security_common::store::Store;
use security_firewall::Executor;

pub struct Scheduler {
    inner: JobScheduler,
}

impl Scheduler {
    pub async fn start(
        store: Arc<Store>,
        executor: Arc<Executor>,
        cfg: Arc<AppConfig>,
    ) -> Result<Self, anyhow::Error> {
        let inner = JobScheduler::new().await?;

        let expired_ban_lock = Arc::new(Mutex::new(()));
        let interval = format!("1/{} * * * * *", cfg.scheduler.expired_ban_sweep_interval_seconds.max(1));
        let ban_executor = executor.clone();
        inner
            .add(Job::new_async(interval.as_str(), move |_uuid, _lock| {
                let executor = ban_executor.clone();
                let guard = expired_ban_lock.clone();
                Box::pin(async move {
                    let Ok(_permit) = guard.try_lock() else {
                        tracing::debug!("expired-ban sweep still running, skipping this tick");
                        return;
                    };
                    match executor.reconcile_expired().await {
                        Ok(lifted) if !lifted.is_empty() => {
                            tracing::info!(count = lifted.len(), "expired bans lifted");
                        }
                        Ok(_) => {}
                        Err(err) => tracing::error!(%err, "expired-ban sweep failed"),
                    }
                })
            })?)
            .await?;

        let retention_lock = Arc::new(Mutex::new(()));
        let retention_cron = format!("0 0 {} * * *", cfg.scheduler.retention_sweep_hour.min(23));
        let retention_store = store.clone();
        let retention_days = cfg.retention.retention_days;
        inner
            .add(Job::new_async(retention_cron.as_str(), move |_uuid, _lock| {
                let store = retention_store.clone();
                let guard = retention_lock.clone();
                Box::pin(async move {
                    let Ok(_permit) = guard.try_lock() else {
                        tracing::debug!("retention sweep still running, skipping this tick");
                        return;
                    };
                    match store.retention_sweep(retention_days).await {
                        Ok(report) => tracing::info!(?report, "retention sweep complete"),
                        Err(err) => tracing::error!(%err, "retention sweep failed"),
                    }
                })
            })?)
            .await?;

        let statistics_lock = Arc::new(Mutex::new(()));
        let statistics_store = store.clone();
        inner
            .add(Job::new_async("0 0 * * * *", move |_uuid, _lock| {
                let store = statistics_store.clone();
                let guard = statistics_lock.clone();
                Box::pin(async move {
                    let Ok(_permit) = guard.try_lock() else {
                        tracing::debug!("statistics job still running, skipping this tick");
                        return;
                    };
                    if let Err(err) = generate_statistics(&store).await {
                        tracing::error!(%err, "hourly statistics job failed");
                    }
                })
            })?)
            .await?;

        inner.start().await?;
        Ok(Self { inner })
    }

    pub async fn shutdown(mut self) -> Result<(), anyhow::Error> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

/// Aggregate the previous whole hour's access logs into one `Statistics`
/// row, matching `original_source/main.py::FirewallSystem.generate_statistics`.
async fn generate_statistics(store: &Store) -> Result<(), security_common::error::StoreError> {
    let now = Utc::now();
    let hour_start = Utc
        .with_ymd_and_hms(now.year(), now.month(), now.day(), now.hour(), 0, 0)
        .single()
        .unwrap_or(now)
        - ChronoDuration::hours(1);
    let hour_end = hour_start + ChronoDuration::hours(1);

    let (total_requests, unique_addresses, histogram) =
        store.aggregate_access_logs_for_hour(hour_start, hour_end).await?;
    store
        .insert_statistics(hour_start, total_requests, unique_addresses, &histogram)
        .await?;
    Ok(())
}
