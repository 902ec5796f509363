//! 行映射与共享 SQL
//!
//! SQLite 与 PostgreSQL 共用同一套列定义与 `$n` 占位符，时间统一以毫秒 BIGINT 存储。

use chrono::{DateTime, Utc};
use scheduler_core::{SchedulerError, SchedulerResult};
use scheduler_domain::{AddressType, JobGroup, JobInfo, JobLog, JobRegistry, TriggerStatus};
use sqlx::{ColumnIndex, Decode, Row, Type};

pub const SCHEDULE_LOCK_NAME: &str = "schedule_lock";

pub const JOB_INFO_COLUMNS: &str = "id, job_group, job_desc, schedule_type, schedule_conf, \
    misfire_strategy, executor_route_strategy, executor_handler, executor_param, \
    executor_block_strategy, executor_timeout, executor_fail_retry_count, glue_type, \
    glue_source, glue_updatetime, trigger_status, trigger_last_time, trigger_next_time";

pub const JOB_GROUP_COLUMNS: &str = "id, app_name, title, address_type, address_list";

pub const JOB_REGISTRY_COLUMNS: &str =
    "id, registry_group, registry_key, registry_value, update_time";

pub const JOB_LOG_COLUMNS: &str = "id, job_group, job_id, executor_address, executor_handler, \
    executor_param, executor_sharding_param, executor_fail_retry_count, trigger_time, \
    trigger_code, trigger_msg, handle_time, handle_code, handle_msg";

pub const INSERT_JOB_INFO: &str = r#"
    INSERT INTO job_info (job_group, job_desc, schedule_type, schedule_conf, misfire_strategy,
        executor_route_strategy, executor_handler, executor_param, executor_block_strategy,
        executor_timeout, executor_fail_retry_count, glue_type, glue_source, glue_updatetime,
        trigger_status, trigger_last_time, trigger_next_time)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
    RETURNING id
"#;

pub const UPDATE_JOB_TRIGGER_TIME: &str = r#"
    UPDATE job_info SET trigger_last_time = $2, trigger_next_time = $3, trigger_status = $4
    WHERE id = $1
"#;

pub const INSERT_JOB_GROUP: &str = r#"
    INSERT INTO job_group (app_name, title, address_type, address_list)
    VALUES ($1, $2, $3, $4)
    RETURNING id
"#;

pub const UPDATE_REGISTRY: &str = r#"
    UPDATE job_registry SET update_time = $4
    WHERE registry_group = $1 AND registry_key = $2 AND registry_value = $3
"#;

pub const INSERT_REGISTRY: &str = r#"
    INSERT INTO job_registry (registry_group, registry_key, registry_value, update_time)
    VALUES ($1, $2, $3, $4)
"#;

pub const DELETE_REGISTRY: &str = r#"
    DELETE FROM job_registry
    WHERE registry_group = $1 AND registry_key = $2 AND registry_value = $3
"#;

pub const INSERT_JOB_LOG: &str = r#"
    INSERT INTO job_log (job_group, job_id, executor_address, executor_handler, executor_param,
        executor_sharding_param, executor_fail_retry_count, trigger_time, trigger_code,
        trigger_msg, handle_time, handle_code, handle_msg)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
    RETURNING id
"#;

pub const UPDATE_JOB_LOG_TRIGGER: &str = r#"
    UPDATE job_log SET executor_address = $2, executor_handler = $3, executor_param = $4,
        executor_sharding_param = $5, executor_fail_retry_count = $6, trigger_code = $7,
        trigger_msg = $8
    WHERE id = $1
"#;

pub const UPDATE_JOB_LOG_HANDLE: &str = r#"
    UPDATE job_log SET handle_time = $2, handle_code = $3, handle_msg = $4
    WHERE id = $1
"#;

pub fn millis_to_datetime(millis: i64) -> SchedulerResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| SchedulerError::DatabaseOperation(format!("无效的时间戳: {millis}")))
}

pub fn job_info_from_row<'r, R>(row: &'r R) -> SchedulerResult<JobInfo>
where
    R: Row,
    &'r str: ColumnIndex<R>,
    String: Decode<'r, R::Database> + Type<R::Database>,
    i64: Decode<'r, R::Database> + Type<R::Database>,
    i32: Decode<'r, R::Database> + Type<R::Database>,
{
    Ok(JobInfo {
        id: row.try_get("id")?,
        job_group: row.try_get("job_group")?,
        job_desc: row.try_get("job_desc")?,
        schedule_type: row.try_get::<String, _>("schedule_type")?.parse()?,
        schedule_conf: row.try_get("schedule_conf")?,
        misfire_strategy: row.try_get::<String, _>("misfire_strategy")?.parse()?,
        executor_route_strategy: row.try_get::<String, _>("executor_route_strategy")?.parse()?,
        executor_handler: row.try_get("executor_handler")?,
        executor_param: row.try_get("executor_param")?,
        executor_block_strategy: row.try_get::<String, _>("executor_block_strategy")?.parse()?,
        executor_timeout: row.try_get("executor_timeout")?,
        executor_fail_retry_count: row.try_get("executor_fail_retry_count")?,
        glue_type: row.try_get::<String, _>("glue_type")?.parse()?,
        glue_source: row.try_get("glue_source")?,
        glue_updatetime: row.try_get("glue_updatetime")?,
        trigger_status: TriggerStatus::from_i32(row.try_get("trigger_status")?),
        trigger_last_time: row.try_get("trigger_last_time")?,
        trigger_next_time: row.try_get("trigger_next_time")?,
    })
}

pub fn job_group_from_row<'r, R>(row: &'r R) -> SchedulerResult<JobGroup>
where
    R: Row,
    &'r str: ColumnIndex<R>,
    String: Decode<'r, R::Database> + Type<R::Database>,
    i64: Decode<'r, R::Database> + Type<R::Database>,
    i32: Decode<'r, R::Database> + Type<R::Database>,
{
    Ok(JobGroup {
        id: row.try_get("id")?,
        app_name: row.try_get("app_name")?,
        title: row.try_get("title")?,
        address_type: AddressType::from_i32(row.try_get("address_type")?),
        address_list: row.try_get("address_list")?,
    })
}

pub fn job_registry_from_row<'r, R>(row: &'r R) -> SchedulerResult<JobRegistry>
where
    R: Row,
    &'r str: ColumnIndex<R>,
    String: Decode<'r, R::Database> + Type<R::Database>,
    i64: Decode<'r, R::Database> + Type<R::Database>,
{
    Ok(JobRegistry {
        id: row.try_get("id")?,
        registry_group: row.try_get("registry_group")?,
        registry_key: row.try_get("registry_key")?,
        registry_value: row.try_get("registry_value")?,
        update_time: millis_to_datetime(row.try_get("update_time")?)?,
    })
}

pub fn job_log_from_row<'r, R>(row: &'r R) -> SchedulerResult<JobLog>
where
    R: Row,
    &'r str: ColumnIndex<R>,
    String: Decode<'r, R::Database> + Type<R::Database>,
    i64: Decode<'r, R::Database> + Type<R::Database>,
    i32: Decode<'r, R::Database> + Type<R::Database>,
{
    let handle_time: i64 = row.try_get("handle_time")?;
    Ok(JobLog {
        id: row.try_get("id")?,
        job_group: row.try_get("job_group")?,
        job_id: row.try_get("job_id")?,
        executor_address: row.try_get("executor_address")?,
        executor_handler: row.try_get("executor_handler")?,
        executor_param: row.try_get("executor_param")?,
        executor_sharding_param: row.try_get("executor_sharding_param")?,
        executor_fail_retry_count: row.try_get("executor_fail_retry_count")?,
        trigger_time: millis_to_datetime(row.try_get("trigger_time")?)?,
        trigger_code: row.try_get("trigger_code")?,
        trigger_msg: row.try_get("trigger_msg")?,
        handle_time: if handle_time > 0 {
            Some(millis_to_datetime(handle_time)?)
        } else {
            None
        },
        handle_code: row.try_get("handle_code")?,
        handle_msg: row.try_get("handle_msg")?,
    })
}
