use async_trait::async_trait;
use scheduler_core::{SchedulerError, SchedulerResult};
use scheduler_domain::{AddressType, JobGroup, JobGroupRepository};
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::database::mapping::{job_group_from_row, INSERT_JOB_GROUP, JOB_GROUP_COLUMNS};

pub struct PostgresJobGroupRepository {
    pool: PgPool,
}

impl PostgresJobGroupRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobGroupRepository for PostgresJobGroupRepository {
    async fn create(&self, group: &JobGroup) -> SchedulerResult<JobGroup> {
        let row = sqlx::query(INSERT_JOB_GROUP)
            .bind(&group.app_name)
            .bind(&group.title)
            .bind(group.address_type.as_i32())
            .bind(&group.address_list)
            .fetch_one(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        let mut created = group.clone();
        created.id = row.try_get("id")?;
        debug!("创建执行器分组成功: {} (ID {})", created.app_name, created.id);
        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<JobGroup>> {
        let sql = format!("SELECT {JOB_GROUP_COLUMNS} FROM job_group WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        row.as_ref().map(job_group_from_row).transpose()
    }

    async fn find_by_address_type(
        &self,
        address_type: AddressType,
    ) -> SchedulerResult<Vec<JobGroup>> {
        let sql = format!(
            "SELECT {JOB_GROUP_COLUMNS} FROM job_group WHERE address_type = $1 ORDER BY id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(address_type.as_i32())
            .fetch_all(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        rows.iter().map(job_group_from_row).collect()
    }

    async fn update_address_list(&self, id: i64, address_list: &str) -> SchedulerResult<()> {
        let result = sqlx::query("UPDATE job_group SET address_list = $2 WHERE id = $1")
            .bind(id)
            .bind(address_list)
            .execute(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::JobGroupNotFound { id });
        }
        Ok(())
    }
}
