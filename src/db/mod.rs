pub mod bank_queries;
pub mod gold_queries;
pub mod pool;
pub mod reconciliation_queries;

pub use pool::{create_pool, run_migrations};
