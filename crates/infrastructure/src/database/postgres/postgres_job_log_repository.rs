use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_core::{SchedulerError, SchedulerResult};
use scheduler_domain::{JobLog, JobLogRepository};
use sqlx::{PgPool, Row};

use crate::database::mapping::{
    job_log_from_row, INSERT_JOB_LOG, JOB_LOG_COLUMNS, UPDATE_JOB_LOG_HANDLE,
    UPDATE_JOB_LOG_TRIGGER,
};

pub struct PostgresJobLogRepository {
    pool: PgPool,
}

impl PostgresJobLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobLogRepository for PostgresJobLogRepository {
    async fn create(&self, log: &JobLog) -> SchedulerResult<JobLog> {
        let row = sqlx::query(INSERT_JOB_LOG)
            .bind(log.job_group)
            .bind(log.job_id)
            .bind(&log.executor_address)
            .bind(&log.executor_handler)
            .bind(&log.executor_param)
            .bind(&log.executor_sharding_param)
            .bind(log.executor_fail_retry_count)
            .bind(log.trigger_time.timestamp_millis())
            .bind(log.trigger_code)
            .bind(&log.trigger_msg)
            .bind(log.handle_time.map(|t| t.timestamp_millis()).unwrap_or(0))
            .bind(log.handle_code)
            .bind(&log.handle_msg)
            .fetch_one(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        let mut created = log.clone();
        created.id = row.try_get("id")?;
        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<JobLog>> {
        let sql = format!("SELECT {JOB_LOG_COLUMNS} FROM job_log WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        row.as_ref().map(job_log_from_row).transpose()
    }

    async fn update_trigger_info(&self, log: &JobLog) -> SchedulerResult<()> {
        let result = sqlx::query(UPDATE_JOB_LOG_TRIGGER)
            .bind(log.id)
            .bind(&log.executor_address)
            .bind(&log.executor_handler)
            .bind(&log.executor_param)
            .bind(&log.executor_sharding_param)
            .bind(log.executor_fail_retry_count)
            .bind(log.trigger_code)
            .bind(&log.trigger_msg)
            .execute(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::JobLogNotFound { id: log.id });
        }
        Ok(())
    }

    async fn update_handle_info(
        &self,
        log_id: i64,
        handle_code: i32,
        handle_msg: &str,
        handle_time: DateTime<Utc>,
    ) -> SchedulerResult<bool> {
        let result = sqlx::query(UPDATE_JOB_LOG_HANDLE)
            .bind(log_id)
            .bind(handle_time.timestamp_millis())
            .bind(handle_code)
            .bind(handle_msg)
            .execute(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
