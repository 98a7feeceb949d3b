//! SQLite adapter for the Fenestra estimation core: connection pool,
//! embedded migrations, the history repository, and deterministic demo
//! fixtures.

pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_url, DbPool};
pub use fixtures::{SeedDataset, SeedReport};
pub use repositories::SqlHistoryRepository;
