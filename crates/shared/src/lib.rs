//! Shared infrastructure for the atelje platform services.
//!
//! Database pool construction, embedded migrations, and payment-reference
//! generation used by both the API server and the background worker.

pub mod db;
pub mod reference;

pub use db::{create_migration_pool, create_pool, run_migrations};
pub use reference::new_payment_reference;
