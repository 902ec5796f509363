pub mod admin_client;
pub mod callback_reporter;
pub mod heartbeat_manager;

pub use admin_client::HttpAdminClient;
pub use callback_reporter::CallbackReporter;
pub use heartbeat_manager::RegistryHeartbeat;
