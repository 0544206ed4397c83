//! Database layer
//!
//! Storage for listings, leads and the admin back office. Two backends are
//! supported:
//! - SQLite (default, for development, tests and single-binary deployment)
//! - Postgres (production)
//!
//! The driver is selected from configuration and hidden behind the
//! `DatabasePool` trait. Repositories match on [`PoolRef`] to run the
//! backend-specific query.
//!
//! # Usage
//!
//! ```ignore
//! use brokerage::config::DatabaseConfig;
//! use brokerage::db::{create_pool, migrations};
//!
//! let config = DatabaseConfig::default();
//! let pool = create_pool(&config).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, PoolRef, PostgresDatabase,
    SqliteDatabase,
};
