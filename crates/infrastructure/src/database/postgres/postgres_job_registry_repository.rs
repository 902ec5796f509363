use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use scheduler_core::{RegistryParam, SchedulerError, SchedulerResult};
use scheduler_domain::{JobRegistry, JobRegistryRepository};
use sqlx::PgPool;
use tracing::debug;

use crate::database::mapping::{
    job_registry_from_row, DELETE_REGISTRY, INSERT_REGISTRY, JOB_REGISTRY_COLUMNS,
    UPDATE_REGISTRY,
};

pub struct PostgresJobRegistryRepository {
    pool: PgPool,
}

impl PostgresJobRegistryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn query_by_update_time(
        &self,
        condition: &str,
        threshold: DateTime<Utc>,
    ) -> SchedulerResult<Vec<JobRegistry>> {
        let sql = format!(
            "SELECT {JOB_REGISTRY_COLUMNS} FROM job_registry WHERE update_time {condition} $1 ORDER BY id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(threshold.timestamp_millis())
            .fetch_all(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        rows.iter().map(job_registry_from_row).collect()
    }
}

#[async_trait]
impl JobRegistryRepository for PostgresJobRegistryRepository {
    async fn upsert(&self, param: &RegistryParam, now: DateTime<Utc>) -> SchedulerResult<()> {
        let updated = sqlx::query(UPDATE_REGISTRY)
            .bind(&param.registry_group)
            .bind(&param.registry_key)
            .bind(&param.registry_value)
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        if updated.rows_affected() == 0 {
            sqlx::query(INSERT_REGISTRY)
                .bind(&param.registry_group)
                .bind(&param.registry_key)
                .bind(&param.registry_value)
                .bind(now.timestamp_millis())
                .execute(&self.pool)
                .await
                .map_err(SchedulerError::Database)?;
            debug!(
                "新增执行器注册: {} -> {}",
                param.registry_key, param.registry_value
            );
        }
        Ok(())
    }

    async fn remove(&self, param: &RegistryParam) -> SchedulerResult<u64> {
        let result = sqlx::query(DELETE_REGISTRY)
            .bind(&param.registry_group)
            .bind(&param.registry_key)
            .bind(&param.registry_value)
            .execute(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;
        Ok(result.rows_affected())
    }

    async fn find_dead(
        &self,
        timeout_seconds: i64,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Vec<JobRegistry>> {
        self.query_by_update_time("<", now - Duration::seconds(timeout_seconds))
            .await
    }

    async fn find_alive(
        &self,
        timeout_seconds: i64,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Vec<JobRegistry>> {
        self.query_by_update_time(">=", now - Duration::seconds(timeout_seconds))
            .await
    }

    async fn delete_by_id(&self, id: i64) -> SchedulerResult<()> {
        sqlx::query("DELETE FROM job_registry WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;
        Ok(())
    }
}
