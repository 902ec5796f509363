use std::sync::Arc;
use std::time::Duration;

use scheduler_core::{config::models::DatabaseConfig, SchedulerError, SchedulerResult};
use scheduler_domain::{
    JobGroupRepository, JobInfoRepository, JobLogRepository, JobRegistryRepository,
    ScheduleLockManager,
};
use tracing::info;

use super::memory::InMemoryStore;
use super::postgres::{
    self, PostgresJobGroupRepository, PostgresJobInfoRepository, PostgresJobLogRepository,
    PostgresJobRegistryRepository, PostgresScheduleLockManager,
};
use super::sqlite::{
    self, SqliteJobGroupRepository, SqliteJobInfoRepository, SqliteJobLogRepository,
    SqliteJobRegistryRepository, SqliteScheduleLockManager,
};

/// Database type detection
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseType {
    PostgreSQL,
    SQLite,
    Memory,
}

impl DatabaseType {
    pub fn from_url(url: &str) -> Option<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Some(DatabaseType::PostgreSQL)
        } else if url.starts_with("sqlite:") {
            Some(DatabaseType::SQLite)
        } else if url.starts_with("memory://") {
            Some(DatabaseType::Memory)
        } else {
            None
        }
    }
}

/// Database connection pool enum
pub enum DatabasePool {
    PostgreSQL(sqlx::PgPool),
    SQLite(sqlx::SqlitePool),
    Memory(InMemoryStore),
}

impl DatabasePool {
    /// Create pool from configuration with automatic type detection
    pub async fn new(config: &DatabaseConfig) -> SchedulerResult<Self> {
        let db_type = DatabaseType::from_url(&config.url).ok_or_else(|| {
            SchedulerError::config_error(format!("不支持的数据库URL: {}", config.url))
        })?;

        match db_type {
            DatabaseType::PostgreSQL => {
                let pool = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .min_connections(config.min_connections)
                    .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
                    .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
                    .connect(&config.url)
                    .await
                    .map_err(SchedulerError::Database)?;
                Ok(DatabasePool::PostgreSQL(pool))
            }
            DatabaseType::SQLite => {
                let pool = sqlx::sqlite::SqlitePoolOptions::new()
                    .max_connections(config.max_connections)
                    .min_connections(config.min_connections)
                    .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
                    .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
                    .connect(&config.url)
                    .await
                    .map_err(SchedulerError::Database)?;
                Ok(DatabasePool::SQLite(pool))
            }
            DatabaseType::Memory => Ok(DatabasePool::Memory(InMemoryStore::new())),
        }
    }

    pub fn database_type(&self) -> DatabaseType {
        match self {
            DatabasePool::PostgreSQL(_) => DatabaseType::PostgreSQL,
            DatabasePool::SQLite(_) => DatabaseType::SQLite,
            DatabasePool::Memory(_) => DatabaseType::Memory,
        }
    }

    pub async fn health_check(&self) -> SchedulerResult<()> {
        match self {
            DatabasePool::PostgreSQL(pool) => {
                sqlx::query("SELECT 1")
                    .execute(pool)
                    .await
                    .map_err(SchedulerError::Database)?;
            }
            DatabasePool::SQLite(pool) => {
                sqlx::query("SELECT 1")
                    .execute(pool)
                    .await
                    .map_err(SchedulerError::Database)?;
            }
            DatabasePool::Memory(_) => {}
        }
        Ok(())
    }

    pub async fn close(&self) {
        match self {
            DatabasePool::PostgreSQL(pool) => pool.close().await,
            DatabasePool::SQLite(pool) => pool.close().await,
            DatabasePool::Memory(_) => {}
        }
    }
}

/// Unified database manager
///
/// 连接、建表，并为调度中心各组件提供仓储实例。
pub struct DatabaseManager {
    pool: DatabasePool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> SchedulerResult<Self> {
        let pool = DatabasePool::new(config).await?;
        let manager = Self { pool };
        manager.migrate().await?;
        info!("数据库初始化完成: {:?}", manager.database_type());
        Ok(manager)
    }

    pub fn database_type(&self) -> DatabaseType {
        self.pool.database_type()
    }

    pub async fn migrate(&self) -> SchedulerResult<()> {
        match &self.pool {
            DatabasePool::PostgreSQL(pool) => postgres::migrate(pool).await,
            DatabasePool::SQLite(pool) => sqlite::migrate(pool).await,
            DatabasePool::Memory(_) => Ok(()),
        }
    }

    pub async fn health_check(&self) -> SchedulerResult<()> {
        self.pool.health_check().await
    }

    pub async fn close(&self) {
        self.pool.close().await
    }

    pub fn job_info_repository(&self) -> Arc<dyn JobInfoRepository> {
        match &self.pool {
            DatabasePool::PostgreSQL(pool) => Arc::new(PostgresJobInfoRepository::new(pool.clone())),
            DatabasePool::SQLite(pool) => Arc::new(SqliteJobInfoRepository::new(pool.clone())),
            DatabasePool::Memory(store) => Arc::new(store.clone()),
        }
    }

    pub fn job_group_repository(&self) -> Arc<dyn JobGroupRepository> {
        match &self.pool {
            DatabasePool::PostgreSQL(pool) => {
                Arc::new(PostgresJobGroupRepository::new(pool.clone()))
            }
            DatabasePool::SQLite(pool) => Arc::new(SqliteJobGroupRepository::new(pool.clone())),
            DatabasePool::Memory(store) => Arc::new(store.clone()),
        }
    }

    pub fn job_registry_repository(&self) -> Arc<dyn JobRegistryRepository> {
        match &self.pool {
            DatabasePool::PostgreSQL(pool) => {
                Arc::new(PostgresJobRegistryRepository::new(pool.clone()))
            }
            DatabasePool::SQLite(pool) => {
                Arc::new(SqliteJobRegistryRepository::new(pool.clone()))
            }
            DatabasePool::Memory(store) => Arc::new(store.clone()),
        }
    }

    pub fn job_log_repository(&self) -> Arc<dyn JobLogRepository> {
        match &self.pool {
            DatabasePool::PostgreSQL(pool) => Arc::new(PostgresJobLogRepository::new(pool.clone())),
            DatabasePool::SQLite(pool) => Arc::new(SqliteJobLogRepository::new(pool.clone())),
            DatabasePool::Memory(store) => Arc::new(store.clone()),
        }
    }

    pub fn schedule_lock_manager(&self) -> Arc<dyn ScheduleLockManager> {
        match &self.pool {
            DatabasePool::PostgreSQL(pool) => {
                Arc::new(PostgresScheduleLockManager::new(pool.clone()))
            }
            DatabasePool::SQLite(pool) => Arc::new(SqliteScheduleLockManager::new(pool.clone())),
            DatabasePool::Memory(store) => Arc::new(store.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_domain::{AddressType, JobGroup};

    #[test]
    fn test_database_type_from_url() {
        assert_eq!(
            DatabaseType::from_url("postgresql://localhost/jobs"),
            Some(DatabaseType::PostgreSQL)
        );
        assert_eq!(
            DatabaseType::from_url("sqlite::memory:"),
            Some(DatabaseType::SQLite)
        );
        assert_eq!(DatabaseType::from_url("memory://"), Some(DatabaseType::Memory));
        assert_eq!(DatabaseType::from_url("mysql://localhost"), None);
    }

    #[tokio::test]
    async fn test_sqlite_manager_migrates_and_serves_repositories() {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };
        let manager = DatabaseManager::new(&config).await.unwrap();
        assert_eq!(manager.database_type(), DatabaseType::SQLite);
        manager.health_check().await.unwrap();
        // 迁移可重复执行
        manager.migrate().await.unwrap();

        let groups = manager.job_group_repository();
        let created = groups
            .create(&JobGroup::new("app", AddressType::Auto))
            .await
            .unwrap();
        assert!(groups.find_by_id(created.id).await.unwrap().is_some());
    }
}
