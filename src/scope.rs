//! Composition surface: scoped registration of a shared manager
//!
//! Host applications usually want exactly one [`DataSourceManager`] per
//! process or per dependency-injection scope. [`Scope`] provides that without
//! hidden global state: the caller owns the scope, clones it wherever the
//! manager is needed, and every [`resolve`](Scope::resolve) returns the same
//! shared instance. [`use_data_source`] is the one-stop helper wiring
//! configuration and eager initialization through a scope.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::Result;
use crate::config::DataSourceConfig;
use crate::manager::{ConfigureOptions, DataSourceManager};

/// A registration scope holding a single shared [`DataSourceManager`].
///
/// Cloning the scope is cheap and clones observe the same singleton.
#[derive(Clone, Default)]
pub struct Scope {
   inner: Arc<ScopeInner>,
}

#[derive(Default)]
struct ScopeInner {
   manager: OnceLock<DataSourceManager>,

   /// Whether a configuration has been applied through this scope's helper
   configured: AtomicBool,
}

impl Scope {
   pub fn new() -> Self {
      Self::default()
   }

   /// Return the scope's manager, creating it on first resolution.
   pub fn resolve(&self) -> DataSourceManager {
      self.inner.manager.get_or_init(DataSourceManager::new).clone()
   }
}

/// Options accepted by [`use_data_source`].
#[derive(Default)]
pub struct UseDataSourceOptions {
   /// Configuration to apply to the resolved manager
   pub config: Option<DataSourceConfig>,

   /// Await initialization before returning, regardless of the
   /// configuration's own `auto_initialize` flag
   pub auto_initialize: bool,

   /// Callback run against the manager after configuration is applied
   pub configure: Option<Box<dyn FnOnce(&DataSourceManager) + Send>>,
}

/// Resolve the scope's shared manager, applying configuration and optional
/// eager initialization.
///
/// The first configuration applied through a scope is applied plainly; later
/// ones pass the configuration's own `allow_reconfigure` flag as the override
/// permit, so repeated wiring calls only replace state when the new
/// configuration says they may. When eager initialization is requested (here
/// or by the configuration) it is awaited and its failure propagates.
///
/// # Example
///
/// ```no_run
/// use sqlx_sqlite_datasource_mgr::{
///    DataSourceConfig, DataSourceOptions, Scope, UseDataSourceOptions, use_data_source,
/// };
///
/// # async fn example() -> sqlx_sqlite_datasource_mgr::Result<()> {
/// let scope = Scope::new();
/// let manager = use_data_source(&scope, UseDataSourceOptions {
///    config: Some(DataSourceConfig::new(DataSourceOptions::new("app.db"))),
///    auto_initialize: true,
///    ..UseDataSourceOptions::default()
/// })
/// .await?;
///
/// let db = manager.get_data_source_or_fail()?;
/// # Ok(())
/// # }
/// ```
pub async fn use_data_source(
   scope: &Scope,
   options: UseDataSourceOptions,
) -> Result<DataSourceManager> {
   let manager = scope.resolve();
   let mut eager = options.auto_initialize;

   if let Some(config) = options.config {
      eager = eager || config.auto_initialize;
      let allow_override = config.allow_reconfigure;

      if scope.inner.configured.swap(true, Ordering::SeqCst) {
         manager.configure(config, ConfigureOptions { allow_override })?;
      } else {
         manager.configure(config, ConfigureOptions::default())?;
      }
   }

   if let Some(callback) = options.configure {
      callback(&manager);
   }

   if eager {
      manager.ensure_initialized().await?;
   }

   Ok(manager)
}
