//! SQLite document store and the gateway contract built on it.

mod connection;
mod gateway;
mod queries;
mod store;

pub use connection::Database;
pub use gateway::Gateway;
pub use store::Store;
