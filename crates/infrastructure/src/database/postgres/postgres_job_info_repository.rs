use async_trait::async_trait;
use scheduler_core::{SchedulerError, SchedulerResult};
use scheduler_domain::{JobInfo, JobInfoRepository};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

use crate::database::mapping::{job_info_from_row, INSERT_JOB_INFO, JOB_INFO_COLUMNS};

pub struct PostgresJobInfoRepository {
    pool: PgPool,
}

impl PostgresJobInfoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobInfoRepository for PostgresJobInfoRepository {
    #[instrument(skip(self, job), fields(job_group = %job.job_group, handler = %job.executor_handler))]
    async fn create(&self, job: &JobInfo) -> SchedulerResult<JobInfo> {
        let row = sqlx::query(INSERT_JOB_INFO)
            .bind(job.job_group)
            .bind(&job.job_desc)
            .bind(job.schedule_type.as_str())
            .bind(&job.schedule_conf)
            .bind(job.misfire_strategy.as_str())
            .bind(job.executor_route_strategy.as_str())
            .bind(&job.executor_handler)
            .bind(&job.executor_param)
            .bind(job.executor_block_strategy.as_str())
            .bind(job.executor_timeout)
            .bind(job.executor_fail_retry_count)
            .bind(job.glue_type.as_str())
            .bind(&job.glue_source)
            .bind(job.glue_updatetime)
            .bind(job.trigger_status.as_i32())
            .bind(job.trigger_last_time)
            .bind(job.trigger_next_time)
            .fetch_one(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        let mut created = job.clone();
        created.id = row.try_get("id")?;
        debug!("创建任务成功: ID {}", created.id);
        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<JobInfo>> {
        let sql = format!("SELECT {JOB_INFO_COLUMNS} FROM job_info WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        match row {
            Some(row) => Ok(Some(job_info_from_row(&row)?)),
            None => Ok(None),
        }
    }

}
