pub mod manager;
pub mod mapping;
pub mod memory;
pub mod postgres;
pub mod sqlite;

pub use manager::{DatabaseManager, DatabasePool, DatabaseType};
pub use memory::InMemoryStore;
pub use postgres::{
    PostgresJobGroupRepository, PostgresJobInfoRepository, PostgresJobLogRepository,
    PostgresJobRegistryRepository, PostgresScheduleLockManager,
};
pub use sqlite::{
    SqliteJobGroupRepository, SqliteJobInfoRepository, SqliteJobLogRepository,
    SqliteJobRegistryRepository, SqliteScheduleLockManager,
};
