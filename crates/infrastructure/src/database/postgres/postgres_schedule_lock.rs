use async_trait::async_trait;
use scheduler_core::{SchedulerError, SchedulerResult};
use scheduler_domain::{JobInfo, ScheduleLockGuard, ScheduleLockManager};
use sqlx::{PgPool, Postgres, Transaction};

use crate::database::mapping::{
    job_info_from_row, JOB_INFO_COLUMNS, SCHEDULE_LOCK_NAME, UPDATE_JOB_TRIGGER_TIME,
};

/// 基于 `SELECT ... FOR UPDATE` 的行锁，多个调度中心实例共享同一个锁记录
pub struct PostgresScheduleLockManager {
    pool: PgPool,
}

impl PostgresScheduleLockManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

struct PostgresScheduleLockGuard {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ScheduleLockManager for PostgresScheduleLockManager {
    async fn acquire(&self) -> SchedulerResult<Box<dyn ScheduleLockGuard>> {
        let mut tx = self.pool.begin().await.map_err(SchedulerError::Database)?;
        sqlx::query("SELECT lock_name FROM job_lock WHERE lock_name = $1 FOR UPDATE")
            .bind(SCHEDULE_LOCK_NAME)
            .fetch_optional(&mut *tx)
            .await
            .map_err(SchedulerError::Database)?;
        Ok(Box::new(PostgresScheduleLockGuard { tx }))
    }
}

#[async_trait]
impl ScheduleLockGuard for PostgresScheduleLockGuard {
    async fn find_schedulable(&mut self, max_next_time: i64) -> SchedulerResult<Vec<JobInfo>> {
        let sql = format!(
            "SELECT {JOB_INFO_COLUMNS} FROM job_info \
             WHERE trigger_status = 1 AND trigger_next_time < $1 ORDER BY id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(max_next_time)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(SchedulerError::Database)?;

        rows.iter().map(job_info_from_row).collect()
    }

    async fn find_job(&mut self, id: i64) -> SchedulerResult<Option<JobInfo>> {
        let sql = format!("SELECT {JOB_INFO_COLUMNS} FROM job_info WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(SchedulerError::Database)?;
        row.as_ref().map(job_info_from_row).transpose()
    }

    async fn update_trigger_time(&mut self, job: &JobInfo) -> SchedulerResult<()> {
        let result = sqlx::query(UPDATE_JOB_TRIGGER_TIME)
            .bind(job.id)
            .bind(job.trigger_last_time)
            .bind(job.trigger_next_time)
            .bind(job.trigger_status.as_i32())
            .execute(&mut *self.tx)
            .await
            .map_err(SchedulerError::Database)?;
        if result.rows_affected() == 0 {
            return Err(SchedulerError::JobNotFound { id: job.id });
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> SchedulerResult<()> {
        self.tx.commit().await.map_err(SchedulerError::Database)
    }
}
