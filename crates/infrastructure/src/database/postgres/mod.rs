pub mod postgres_job_group_repository;
pub mod postgres_job_info_repository;
pub mod postgres_job_log_repository;
pub mod postgres_job_registry_repository;
pub mod postgres_schedule_lock;

pub use postgres_job_group_repository::PostgresJobGroupRepository;
pub use postgres_job_info_repository::PostgresJobInfoRepository;
pub use postgres_job_log_repository::PostgresJobLogRepository;
pub use postgres_job_registry_repository::PostgresJobRegistryRepository;
pub use postgres_schedule_lock::PostgresScheduleLockManager;

use scheduler_core::{SchedulerError, SchedulerResult};
use sqlx::PgPool;
use tracing::debug;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS job_group (
        id BIGSERIAL PRIMARY KEY,
        app_name VARCHAR(64) NOT NULL,
        title VARCHAR(128) NOT NULL DEFAULT '',
        address_type INT NOT NULL DEFAULT 0,
        address_list TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS job_info (
        id BIGSERIAL PRIMARY KEY,
        job_group BIGINT NOT NULL,
        job_desc VARCHAR(255) NOT NULL DEFAULT '',
        schedule_type VARCHAR(32) NOT NULL DEFAULT 'NONE',
        schedule_conf VARCHAR(128) NOT NULL DEFAULT '',
        misfire_strategy VARCHAR(32) NOT NULL DEFAULT 'DO_NOTHING',
        executor_route_strategy VARCHAR(32) NOT NULL DEFAULT 'FIRST',
        executor_handler VARCHAR(255) NOT NULL DEFAULT '',
        executor_param TEXT NOT NULL DEFAULT '',
        executor_block_strategy VARCHAR(32) NOT NULL DEFAULT 'SERIAL_EXECUTION',
        executor_timeout INT NOT NULL DEFAULT 0,
        executor_fail_retry_count INT NOT NULL DEFAULT 0,
        glue_type VARCHAR(32) NOT NULL DEFAULT 'BEAN',
        glue_source TEXT NOT NULL DEFAULT '',
        glue_updatetime BIGINT NOT NULL DEFAULT 0,
        trigger_status INT NOT NULL DEFAULT 0,
        trigger_last_time BIGINT NOT NULL DEFAULT 0,
        trigger_next_time BIGINT NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_job_info_schedule ON job_info (trigger_status, trigger_next_time)",
    r#"
    CREATE TABLE IF NOT EXISTS job_registry (
        id BIGSERIAL PRIMARY KEY,
        registry_group VARCHAR(50) NOT NULL,
        registry_key VARCHAR(255) NOT NULL,
        registry_value VARCHAR(255) NOT NULL,
        update_time BIGINT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_job_registry_key ON job_registry (registry_group, registry_key, registry_value)",
    r#"
    CREATE TABLE IF NOT EXISTS job_log (
        id BIGSERIAL PRIMARY KEY,
        job_group BIGINT NOT NULL,
        job_id BIGINT NOT NULL,
        executor_address VARCHAR(255) NOT NULL DEFAULT '',
        executor_handler VARCHAR(255) NOT NULL DEFAULT '',
        executor_param TEXT NOT NULL DEFAULT '',
        executor_sharding_param VARCHAR(20) NOT NULL DEFAULT '',
        executor_fail_retry_count INT NOT NULL DEFAULT 0,
        trigger_time BIGINT NOT NULL,
        trigger_code INT NOT NULL DEFAULT 0,
        trigger_msg TEXT NOT NULL DEFAULT '',
        handle_time BIGINT NOT NULL DEFAULT 0,
        handle_code INT NOT NULL DEFAULT 0,
        handle_msg TEXT NOT NULL DEFAULT ''
    )
    "#,
    "CREATE TABLE IF NOT EXISTS job_lock (lock_name VARCHAR(50) PRIMARY KEY)",
    "INSERT INTO job_lock (lock_name) VALUES ('schedule_lock') ON CONFLICT DO NOTHING",
];

/// 创建表结构与调度锁记录，可重复执行
pub async fn migrate(pool: &PgPool) -> SchedulerResult<()> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(SchedulerError::Database)?;
    }
    debug!("PostgreSQL表结构初始化完成");
    Ok(())
}
