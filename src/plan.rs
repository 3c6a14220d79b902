//! Resolution of a [`DataSourceConfig`] into an immutable execution plan
//!
//! Resolution validates the configuration and normalizes its two polymorphic
//! inputs (options source, data-source factory) into uniform async functions.
//! It has no side effects; nothing touches connection state until the manager
//! executes the plan.

use std::sync::Arc;

use futures::FutureExt;

use crate::Result;
use crate::config::{
   DataSourceConfig, DataSourceFuture, DataSourceOptions, HookFuture, OptionsFuture, OptionsInput,
   TransactionMode,
};
use crate::database::SqliteDataSource;
use crate::error::Error;
use crate::handle::DataSource;

type ResolveOptionsFn = dyn Fn() -> OptionsFuture + Send + Sync;
type CreateDataSourceFn = dyn Fn(DataSourceOptions) -> DataSourceFuture + Send + Sync;
type InitHookFn = dyn Fn(Arc<dyn DataSource>) -> HookFuture + Send + Sync;

/// Immutable execution plan derived from a [`DataSourceConfig`].
///
/// Built once per `configure()` call and shared by every initialization
/// attempt made under that configuration.
pub(crate) struct ResolvedPlan {
   resolve_options: Box<ResolveOptionsFn>,
   create_data_source: Box<CreateDataSourceFn>,
   pub(crate) auto_initialize: bool,
   pub(crate) run_migrations_on_init: bool,
   pub(crate) migrations_transaction: TransactionMode,
   on_initialized: Option<Box<InitHookFn>>,
}

impl ResolvedPlan {
   pub(crate) fn resolve_options(&self) -> OptionsFuture {
      (self.resolve_options)()
   }

   pub(crate) fn create_data_source(&self, options: DataSourceOptions) -> DataSourceFuture {
      (self.create_data_source)(options)
   }

   pub(crate) fn on_initialized(&self, data_source: Arc<dyn DataSource>) -> Option<HookFuture> {
      self.on_initialized.as_ref().map(|hook| hook(data_source))
   }
}

async fn default_create_data_source(options: DataSourceOptions) -> Result<Arc<dyn DataSource>> {
   let data_source: Arc<dyn DataSource> = Arc::new(SqliteDataSource::new(options));
   data_source.initialize().await?;
   Ok(data_source)
}

/// Validate `config` and normalize it into a [`ResolvedPlan`].
pub(crate) fn resolve(config: DataSourceConfig) -> Result<ResolvedPlan> {
   let DataSourceConfig {
      data_source,
      data_source_factory,
      auto_initialize,
      run_migrations_on_init,
      migrations_transaction,
      on_initialized,
      allow_reconfigure: _,
   } = config;

   let Some(options_input) = data_source else {
      return Err(Error::InvalidConfiguration(
         "`data_source` options or an options factory is required",
      ));
   };

   let resolve_options: Box<ResolveOptionsFn> = match options_input {
      OptionsInput::Value(options) => Box::new(move || {
         let options = options.clone();
         async move { Ok(options) }.boxed()
      }),
      OptionsInput::Factory(factory) => factory,
   };

   let create_data_source: Box<CreateDataSourceFn> = match data_source_factory {
      Some(factory) => Box::new(move |options| {
         let constructed = factory(options);
         async move {
            let data_source = constructed.await?;
            if !data_source.is_initialized() {
               data_source.initialize().await?;
            }
            // A factory result that still reports un-initialized after being
            // initialized is not a usable handle.
            if !data_source.is_initialized() {
               return Err(Error::InvalidFactoryResult);
            }
            Ok(data_source)
         }
         .boxed()
      }),
      None => Box::new(|options| default_create_data_source(options).boxed()),
   };

   Ok(ResolvedPlan {
      resolve_options,
      create_data_source,
      auto_initialize,
      run_migrations_on_init,
      migrations_transaction: migrations_transaction.unwrap_or_default(),
      on_initialized,
   })
}
