//! Contract implemented by managed data sources

use crate::Result;
use crate::config::TransactionMode;
use crate::migrations::AppliedMigration;
use async_trait::async_trait;

/// A database connection-and-session handle whose lifecycle is owned by a
/// [`DataSourceManager`](crate::DataSourceManager).
///
/// The manager only ever interacts with a data source through this contract:
/// it queries [`is_initialized`](DataSource::is_initialized) to decide whether
/// a cached handle is still usable, drives [`initialize`](DataSource::initialize)
/// and [`destroy`](DataSource::destroy) around the handle's lifetime, and
/// delegates migration execution. Everything else a concrete implementation
/// exposes (query APIs, pools, ...) is its own business.
///
/// The default implementation is [`SqliteDataSource`](crate::SqliteDataSource);
/// a custom one can be supplied through
/// [`DataSourceConfig::data_source_factory`](crate::DataSourceConfig).
#[async_trait]
pub trait DataSource: Send + Sync {
   /// Whether the data source is currently open and usable.
   ///
   /// A handle reporting `false` is treated by the manager as absent.
   fn is_initialized(&self) -> bool;

   /// Open the underlying connections. Must be a no-op when already initialized.
   async fn initialize(&self) -> Result<()>;

   /// Release the underlying connections and return to the un-initialized state.
   async fn destroy(&self) -> Result<()>;

   /// Apply all pending migrations with the given transaction mode, returning
   /// the records applied by this call.
   async fn run_migrations(&self, mode: TransactionMode) -> Result<Vec<AppliedMigration>>;

   /// Revert the most recently applied migration with the given transaction mode.
   async fn revert_last_migration(&self, mode: TransactionMode) -> Result<()>;
}
