pub mod sqlite_job_group_repository;
pub mod sqlite_job_info_repository;
pub mod sqlite_job_log_repository;
pub mod sqlite_job_registry_repository;
pub mod sqlite_schedule_lock;

pub use sqlite_job_group_repository::SqliteJobGroupRepository;
pub use sqlite_job_info_repository::SqliteJobInfoRepository;
pub use sqlite_job_log_repository::SqliteJobLogRepository;
pub use sqlite_job_registry_repository::SqliteJobRegistryRepository;
pub use sqlite_schedule_lock::SqliteScheduleLockManager;

use scheduler_core::{SchedulerError, SchedulerResult};
use sqlx::SqlitePool;
use tracing::debug;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS job_group (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        app_name TEXT NOT NULL,
        title TEXT NOT NULL DEFAULT '',
        address_type INTEGER NOT NULL DEFAULT 0,
        address_list TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS job_info (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        job_group INTEGER NOT NULL,
        job_desc TEXT NOT NULL DEFAULT '',
        schedule_type TEXT NOT NULL DEFAULT 'NONE',
        schedule_conf TEXT NOT NULL DEFAULT '',
        misfire_strategy TEXT NOT NULL DEFAULT 'DO_NOTHING',
        executor_route_strategy TEXT NOT NULL DEFAULT 'FIRST',
        executor_handler TEXT NOT NULL DEFAULT '',
        executor_param TEXT NOT NULL DEFAULT '',
        executor_block_strategy TEXT NOT NULL DEFAULT 'SERIAL_EXECUTION',
        executor_timeout INTEGER NOT NULL DEFAULT 0,
        executor_fail_retry_count INTEGER NOT NULL DEFAULT 0,
        glue_type TEXT NOT NULL DEFAULT 'BEAN',
        glue_source TEXT NOT NULL DEFAULT '',
        glue_updatetime INTEGER NOT NULL DEFAULT 0,
        trigger_status INTEGER NOT NULL DEFAULT 0,
        trigger_last_time INTEGER NOT NULL DEFAULT 0,
        trigger_next_time INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_job_info_schedule ON job_info (trigger_status, trigger_next_time)",
    r#"
    CREATE TABLE IF NOT EXISTS job_registry (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        registry_group TEXT NOT NULL,
        registry_key TEXT NOT NULL,
        registry_value TEXT NOT NULL,
        update_time INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_job_registry_key ON job_registry (registry_group, registry_key, registry_value)",
    r#"
    CREATE TABLE IF NOT EXISTS job_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        job_group INTEGER NOT NULL,
        job_id INTEGER NOT NULL,
        executor_address TEXT NOT NULL DEFAULT '',
        executor_handler TEXT NOT NULL DEFAULT '',
        executor_param TEXT NOT NULL DEFAULT '',
        executor_sharding_param TEXT NOT NULL DEFAULT '',
        executor_fail_retry_count INTEGER NOT NULL DEFAULT 0,
        trigger_time INTEGER NOT NULL,
        trigger_code INTEGER NOT NULL DEFAULT 0,
        trigger_msg TEXT NOT NULL DEFAULT '',
        handle_time INTEGER NOT NULL DEFAULT 0,
        handle_code INTEGER NOT NULL DEFAULT 0,
        handle_msg TEXT NOT NULL DEFAULT ''
    )
    "#,
    "CREATE TABLE IF NOT EXISTS job_lock (lock_name TEXT PRIMARY KEY)",
    "INSERT INTO job_lock (lock_name) VALUES ('schedule_lock') ON CONFLICT DO NOTHING",
];

/// 创建表结构与调度锁记录，可重复执行
pub async fn migrate(pool: &SqlitePool) -> SchedulerResult<()> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(SchedulerError::Database)?;
    }
    debug!("SQLite表结构初始化完成");
    Ok(())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    migrate(&pool).await.unwrap();
    pool
}
