use async_trait::async_trait;
use scheduler_core::{SchedulerError, SchedulerResult};
use scheduler_domain::{JobInfo, ScheduleLockGuard, ScheduleLockManager};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::database::mapping::{
    job_info_from_row, JOB_INFO_COLUMNS, SCHEDULE_LOCK_NAME, UPDATE_JOB_TRIGGER_TIME,
};

/// SQLite 没有 `SELECT ... FOR UPDATE`，通过对锁记录的一次空写拿到数据库写锁，
/// 其他实例的同类写入会阻塞到本事务结束。
pub struct SqliteScheduleLockManager {
    pool: SqlitePool,
}

impl SqliteScheduleLockManager {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

struct SqliteScheduleLockGuard {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl ScheduleLockManager for SqliteScheduleLockManager {
    async fn acquire(&self) -> SchedulerResult<Box<dyn ScheduleLockGuard>> {
        let mut tx = self.pool.begin().await.map_err(SchedulerError::Database)?;
        sqlx::query("UPDATE job_lock SET lock_name = lock_name WHERE lock_name = $1")
            .bind(SCHEDULE_LOCK_NAME)
            .execute(&mut *tx)
            .await
            .map_err(SchedulerError::Database)?;
        Ok(Box::new(SqliteScheduleLockGuard { tx }))
    }
}

#[async_trait]
impl ScheduleLockGuard for SqliteScheduleLockGuard {
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
