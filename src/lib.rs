//! # sqlx-sqlite-datasource-mgr
//!
//! Manages the lifecycle of a single lazily-created, shared data source
//! (connection-and-session handle) built on SQLx, plus the execution of
//! schema migrations against it.
//!
//! ## Core Types
//!
//! - **[`DataSourceManager`]**: lifecycle manager; configure once, then every
//!   caller shares one lazily-initialized data source
//! - **[`DataSourceConfig`]**: user configuration resolved into an immutable plan
//! - **[`DataSource`]**: contract a managed handle implements
//! - **[`SqliteDataSource`]**: default handle with pooled reads and exclusive writes
//! - **[`Migration`] / [`AppliedMigration`]**: SQL migrations with `all | each |
//!   none` transaction-mode execution
//! - **[`Scope`] / [`use_data_source`]**: explicit singleton registration for
//!   host applications
//! - **[`Error`]**: error type for lifecycle and database operations
//!
//! ## Architecture
//!
//! - **Coalesced initialization**: at most one construction-and-initialization
//!   sequence is in flight per manager; concurrent callers join it and observe
//!   the same outcome
//! - **Background reconfiguration**: replacing the configuration disposes the
//!   superseded handle detached from the caller, with failures logged
//! - **Lazy everything**: nothing touches the database until a caller (or the
//!   `auto_initialize` flag) asks for the handle
//! - **Migration control**: per-call transaction-mode override on top of a
//!   configured default
//!
//! ## Usage
//!
//! ```no_run
//! use sqlx_sqlite_datasource_mgr::{
//!     ConfigureOptions, DataSourceConfig, DataSourceManager, DataSourceOptions, Migration,
//!     TransactionMode,
//! };
//!
//! #[tokio::main]
//! async fn main() -> sqlx_sqlite_datasource_mgr::Result<()> {
//!     let manager = DataSourceManager::new();
//!
//!     let options = DataSourceOptions {
//!         migrations: vec![Migration::new(
//!             "0001_users",
//!             "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
//!             "DROP TABLE users",
//!         )],
//!         ..DataSourceOptions::new("example.db")
//!     };
//!
//!     manager.configure(
//!         DataSourceConfig {
//!             run_migrations_on_init: true,
//!             migrations_transaction: Some(TransactionMode::Each),
//!             ..DataSourceConfig::new(options)
//!         },
//!         ConfigureOptions::default(),
//!     )?;
//!
//!     // Concurrent callers share one initialization; all of them get this handle.
//!     let db = manager.get_data_source().await?;
//!
//!     manager.destroy().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Design Principles
//!
//! - Uses sqlx's `SqlitePoolOptions` / `SqliteConnectOptions` for all pool and
//!   connection configuration in the default handle
//! - The manager owns its handle exclusively; application code borrows it as
//!   `Arc<dyn DataSource>` and never mutates manager state directly
//! - Best-effort background work (superseded-handle disposal, auto-init) fails
//!   into the log only; awaited operations propagate errors unwrapped
//!
mod config;
mod database;
mod error;
mod handle;
mod manager;
mod migrations;
mod plan;
mod scope;

// Re-export public types
pub use config::{DataSourceConfig, DataSourceOptions, OptionsInput, TransactionMode};
pub use database::{SqliteDataSource, WriteGuard};
pub use error::Error;
pub use handle::DataSource;
pub use manager::{
   ConfigureOptions, DataSourceManager, MigrationOptions, create_managed_data_source,
};
pub use migrations::{AppliedMigration, Migration};
pub use scope::{Scope, UseDataSourceOptions, use_data_source};

/// A type alias for Results with our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
