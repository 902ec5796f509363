pub mod database;
pub mod observability;
pub mod transport;

pub use database::{DatabaseManager, DatabaseType, InMemoryStore};
pub use observability::MetricsCollector;
pub use transport::{HttpExecutorClient, TransportClient};
