//! User-facing configuration for the data-source lifecycle manager

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::handle::DataSource;
use crate::migrations::Migration;

/// Transaction policy for migration execution.
///
/// `All` wraps every pending migration in a single transaction, `Each` gives
/// every migration its own transaction, and `None` runs without explicit
/// transactions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionMode {
   #[default]
   All,
   Each,
   None,
}

impl std::str::FromStr for TransactionMode {
   type Err = std::convert::Infallible;

   /// Parses `"all"`, `"each"`, or `"none"`; anything unrecognized falls back
   /// to the `All` default.
   fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
      Ok(match value {
         "each" => TransactionMode::Each,
         "none" => TransactionMode::None,
         _ => TransactionMode::All,
      })
   }
}

/// Connection options for the default [`SqliteDataSource`](crate::SqliteDataSource)
///
/// # Examples
///
/// ```
/// use sqlx_sqlite_datasource_mgr::DataSourceOptions;
///
/// // Defaults: 6 read connections, 30 second idle timeout, create the file if missing
/// let options = DataSourceOptions::new("app.db");
///
/// // Override individual fields with struct-update syntax
/// let options = DataSourceOptions {
///    max_read_connections: 3,
///    ..DataSourceOptions::new("app.db")
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceOptions {
   /// Path to the SQLite database file, or `:memory:`
   pub filename: PathBuf,

   /// Maximum number of concurrent read-only connections
   ///
   /// Default: 6
   pub max_read_connections: u32,

   /// Idle timeout for read and write connections (in seconds)
   ///
   /// Default: 30
   pub idle_timeout_secs: u64,

   /// Create the database file when it does not exist yet
   ///
   /// Default: true
   pub create_if_missing: bool,

   /// Ordered migrations available to `run_migrations` / `revert_last_migration`
   pub migrations: Vec<Migration>,
}

impl DataSourceOptions {
   pub fn new(filename: impl Into<PathBuf>) -> Self {
      Self {
         filename: filename.into(),
         max_read_connections: 6,
         idle_timeout_secs: 30,
         create_if_missing: true,
         migrations: Vec::new(),
      }
   }
}

pub(crate) type OptionsFuture = BoxFuture<'static, Result<DataSourceOptions>>;
pub(crate) type DataSourceFuture = BoxFuture<'static, Result<Arc<dyn DataSource>>>;
pub(crate) type HookFuture = BoxFuture<'static, Result<()>>;

type OptionsFactoryFn = dyn Fn() -> OptionsFuture + Send + Sync;
type DataSourceFactoryFn = dyn Fn(DataSourceOptions) -> DataSourceFuture + Send + Sync;
type InitHookFn = dyn Fn(Arc<dyn DataSource>) -> HookFuture + Send + Sync;

/// Source of connection options: a literal value or an async factory that
/// produces them on demand when initialization actually runs.
pub enum OptionsInput {
   Value(DataSourceOptions),
   Factory(Box<OptionsFactoryFn>),
}

impl OptionsInput {
   /// Wrap an async closure producing options lazily.
   pub fn factory<F, Fut>(factory: F) -> Self
   where
      F: Fn() -> Fut + Send + Sync + 'static,
      Fut: Future<Output = Result<DataSourceOptions>> + Send + 'static,
   {
      OptionsInput::Factory(Box::new(move || factory().boxed()))
   }
}

impl From<DataSourceOptions> for OptionsInput {
   fn from(options: DataSourceOptions) -> Self {
      OptionsInput::Value(options)
   }
}

impl std::fmt::Debug for OptionsInput {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      match self {
         OptionsInput::Value(options) => f.debug_tuple("Value").field(options).finish(),
         OptionsInput::Factory(_) => f.debug_tuple("Factory").finish(),
      }
   }
}

/// Configuration accepted by [`DataSourceManager::configure`](crate::DataSourceManager::configure)
///
/// Immutable once submitted. All fields other than `data_source` are optional;
/// build one with struct-update syntax or the `with_*` helpers:
///
/// ```
/// use sqlx_sqlite_datasource_mgr::{DataSourceConfig, DataSourceOptions, TransactionMode};
///
/// let config = DataSourceConfig {
///    run_migrations_on_init: true,
///    migrations_transaction: Some(TransactionMode::Each),
///    ..DataSourceConfig::new(DataSourceOptions::new("app.db"))
/// };
/// ```
#[derive(Default)]
pub struct DataSourceConfig {
   /// Connection options, or a factory returning them lazily. Required.
   pub data_source: Option<OptionsInput>,

   /// Optional factory constructing the data source from resolved options.
   /// Defaults to constructing a [`SqliteDataSource`](crate::SqliteDataSource)
   /// and initializing it.
   pub data_source_factory: Option<Box<DataSourceFactoryFn>>,

   /// Initialize the data source in the background right after configuration
   pub auto_initialize: bool,

   /// Execute pending migrations immediately after initialization
   pub run_migrations_on_init: bool,

   /// Default transaction behaviour for migration commands; absent means
   /// [`TransactionMode::All`]
   pub migrations_transaction: Option<TransactionMode>,

   /// Callback fired once the data source has been initialized successfully
   pub on_initialized: Option<Box<InitHookFn>>,

   /// Allow this configuration to replace an existing one
   pub allow_reconfigure: bool,
}

impl DataSourceConfig {
   pub fn new(options: DataSourceOptions) -> Self {
      Self {
         data_source: Some(OptionsInput::Value(options)),
         ..Self::default()
      }
   }

   /// Supply the connection options through an async factory instead of a
   /// literal value.
   pub fn with_options_factory<F, Fut>(mut self, factory: F) -> Self
   where
      F: Fn() -> Fut + Send + Sync + 'static,
      Fut: Future<Output = Result<DataSourceOptions>> + Send + 'static,
   {
      self.data_source = Some(OptionsInput::factory(factory));
      self
   }

   /// Replace the default data-source constructor with a custom factory.
   pub fn with_factory<F, Fut>(mut self, factory: F) -> Self
   where
      F: Fn(DataSourceOptions) -> Fut + Send + Sync + 'static,
      Fut: Future<Output = Result<Arc<dyn DataSource>>> + Send + 'static,
   {
      self.data_source_factory = Some(Box::new(move |options| factory(options).boxed()));
      self
   }

   /// Register a hook invoked with the data source after initialization (and
   /// after on-init migrations, when those are enabled).
   pub fn with_on_initialized<F, Fut>(mut self, hook: F) -> Self
   where
      F: Fn(Arc<dyn DataSource>) -> Fut + Send + Sync + 'static,
      Fut: Future<Output = Result<()>> + Send + 'static,
   {
      self.on_initialized = Some(Box::new(move |data_source| hook(data_source).boxed()));
      self
   }
}

impl std::fmt::Debug for DataSourceConfig {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("DataSourceConfig")
         .field("data_source", &self.data_source)
         .field("data_source_factory", &self.data_source_factory.as_ref().map(|_| ".."))
         .field("auto_initialize", &self.auto_initialize)
         .field("run_migrations_on_init", &self.run_migrations_on_init)
         .field("migrations_transaction", &self.migrations_transaction)
         .field("on_initialized", &self.on_initialized.as_ref().map(|_| ".."))
         .field("allow_reconfigure", &self.allow_reconfigure)
         .finish()
   }
}
