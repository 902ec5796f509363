pub mod transport;

pub use transport::{AdminClient, ExecutorClient};
