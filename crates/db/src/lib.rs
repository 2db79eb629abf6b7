pub mod connection;
pub mod executor;
pub mod fixtures;
pub mod schema_loader;

pub use connection::{connect_admin, connect_warehouse, DbPool};
pub use executor::SqliteQueryPort;
pub use fixtures::{DemoWarehouse, SeedSummary, TableSeedInfo, VerificationReport};
pub use schema_loader::load_snapshot;
