//! Lifecycle manager for a shared, lazily-initialized data source

use std::sync::{Arc, Mutex, MutexGuard};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::{debug, error, warn};

use crate::Result;
use crate::config::{DataSourceConfig, TransactionMode};
use crate::error::Error;
use crate::handle::DataSource;
use crate::migrations::AppliedMigration;
use crate::plan::{self, ResolvedPlan};

/// Call-level options for [`DataSourceManager::configure`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigureOptions {
   /// Replace an existing configuration even when it does not permit
   /// reconfiguration itself
   pub allow_override: bool,
}

/// Call-level options for [`DataSourceManager::run_migrations`] and
/// [`DataSourceManager::revert_last_migration`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MigrationOptions {
   /// Transaction mode for this call only; absent falls back to the configured
   /// default, then to [`TransactionMode::All`]
   pub transaction: Option<TransactionMode>,
}

/// The in-flight initialization operation. `Shared` lets every concurrent
/// caller await the same construction and observe the same outcome.
type InitFuture = Shared<BoxFuture<'static, Result<Arc<dyn DataSource>>>>;

#[derive(Default)]
struct ManagerState {
   plan: Option<Arc<ResolvedPlan>>,
   data_source: Option<Arc<dyn DataSource>>,
   in_flight: Option<InitFuture>,

   /// Bumped by `configure` and `destroy` so the epilogue of a superseded
   /// initialization cannot install its result over newer state
   epoch: u64,
}

/// Manages the lifecycle of a single shared data source: configuration intake,
/// concurrency-safe lazy initialization, migration execution, reconfiguration,
/// and teardown.
///
/// The manager is cheaply cloneable; clones share the same state. At most one
/// initialization is ever in flight per manager; concurrent
/// [`get_data_source`](Self::get_data_source) callers join it instead of
/// racing to construct duplicate handles.
///
/// # Example
///
/// ```no_run
/// use sqlx_sqlite_datasource_mgr::{
///    ConfigureOptions, DataSourceConfig, DataSourceManager, DataSourceOptions,
/// };
///
/// # async fn example() -> sqlx_sqlite_datasource_mgr::Result<()> {
/// let manager = DataSourceManager::new();
/// manager.configure(
///    DataSourceConfig::new(DataSourceOptions::new("app.db")),
///    ConfigureOptions::default(),
/// )?;
///
/// // First call constructs and initializes the data source; later calls
/// // (and concurrent ones) reuse it.
/// let db = manager.get_data_source().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct DataSourceManager {
   state: Arc<Mutex<ManagerState>>,
}

impl DataSourceManager {
   pub fn new() -> Self {
      Self::default()
   }

   fn state(&self) -> MutexGuard<'_, ManagerState> {
      self.state.lock().expect("manager state poisoned")
   }

   /// Resolve and store a new configuration.
   ///
   /// When a configuration already exists and neither `options.allow_override`
   /// nor the configuration's own `allow_reconfigure` flag is set, the call
   /// warns and leaves existing state untouched.
   ///
   /// Reconfiguration discards the current data source immediately and
   /// disposes it in the background; disposal failures are logged, never
   /// returned. Likewise `auto_initialize` runs in the background and only
   /// ever fails into the log, so this method errors solely on an unusable
   /// configuration.
   pub fn configure(&self, config: DataSourceConfig, options: ConfigureOptions) -> Result<()> {
      let allow_reconfigure = config.allow_reconfigure;
      let plan = plan::resolve(config)?;

      let mut state = self.state();

      if state.plan.is_some() && !options.allow_override && !allow_reconfigure {
         warn!("configure() called more than once; ignoring the new configuration");
         return Ok(());
      }

      let auto_initialize = plan.auto_initialize;
      state.plan = Some(Arc::new(plan));
      state.in_flight = None;
      state.epoch += 1;

      if let Some(previous) = state.data_source.take()
         && previous.is_initialized()
      {
         tokio::spawn(async move {
            if let Err(err) = previous.destroy().await {
               error!(error = %err, "failed to dispose superseded data source during reconfiguration");
            }
         });
      }

      drop(state);

      if auto_initialize {
         let manager = self.clone();
         tokio::spawn(async move {
            if let Err(err) = manager.ensure_initialized().await {
               error!(error = %err, "auto-initialization failed");
            }
         });
      }

      Ok(())
   }

   /// Whether `configure()` has stored a plan.
   pub fn is_configured(&self) -> bool {
      self.state().plan.is_some()
   }

   /// Whether an initialized data source is currently held.
   pub fn is_initialized(&self) -> bool {
      self
         .state()
         .data_source
         .as_ref()
         .is_some_and(|data_source| data_source.is_initialized())
   }

   /// Alias of [`get_data_source`](Self::get_data_source), for call sites
   /// that only care about the side effect.
   pub async fn ensure_initialized(&self) -> Result<Arc<dyn DataSource>> {
      self.get_data_source().await
   }

   /// Return the shared data source, initializing it first when necessary.
   ///
   /// The fast path returns the cached handle without suspending. Otherwise
   /// the caller either starts the initialization sequence (resolve options,
   /// construct the handle, optionally run migrations, optionally await the
   /// post-init hook) or joins the one already in flight. Every concurrent
   /// caller observes the same outcome: the identical handle, or the same
   /// error.
   ///
   /// A failed initialization clears the in-flight marker, so a later call
   /// retries from scratch.
   pub async fn get_data_source(&self) -> Result<Arc<dyn DataSource>> {
      let (future, epoch) = {
         let mut state = self.state();

         if let Some(data_source) = &state.data_source
            && data_source.is_initialized()
         {
            return Ok(Arc::clone(data_source));
         }

         let epoch = state.epoch;
         let future = match &state.in_flight {
            Some(in_flight) => in_flight.clone(),
            None => {
               let plan = Arc::clone(state.plan.as_ref().ok_or(Error::NotConfigured)?);
               let future = initialize(plan).boxed().shared();
               state.in_flight = Some(future.clone());
               future
            }
         };

         (future, epoch)
      };

      let result = future.await;

      // Clear the in-flight marker whether initialization succeeded or
      // failed. The epoch check keeps a superseded attempt from clobbering
      // state that an interleaved configure()/destroy() already replaced.
      let mut state = self.state();
      if state.epoch == epoch {
         state.in_flight = None;
         if let Ok(data_source) = &result {
            state.data_source = Some(Arc::clone(data_source));
         }
      }

      result
   }

   /// Return the data source only if it is already initialized.
   ///
   /// Never suspends and never triggers initialization; fails with
   /// [`Error::NotInitialized`] otherwise.
   pub fn get_data_source_or_fail(&self) -> Result<Arc<dyn DataSource>> {
      let state = self.state();
      match &state.data_source {
         Some(data_source) if data_source.is_initialized() => Ok(Arc::clone(data_source)),
         _ => Err(Error::NotInitialized),
      }
   }

   /// Apply pending migrations, initializing the data source first when
   /// necessary.
   ///
   /// The transaction mode is resolved per call: explicit option, then the
   /// configured default, then [`TransactionMode::All`].
   pub async fn run_migrations(&self, options: MigrationOptions) -> Result<Vec<AppliedMigration>> {
      let data_source = self.get_data_source().await?;
      let mode = self.effective_transaction_mode(options.transaction);
      data_source.run_migrations(mode).await
   }

   /// Revert the most recently applied migration. Transaction-mode resolution
   /// matches [`run_migrations`](Self::run_migrations).
   pub async fn revert_last_migration(&self, options: MigrationOptions) -> Result<()> {
      let data_source = self.get_data_source().await?;
      let mode = self.effective_transaction_mode(options.transaction);
      data_source.revert_last_migration(mode).await
   }

   /// Tear down the current data source, if any.
   ///
   /// Unlike disposal during reconfiguration this is awaited and NOT
   /// best-effort: a failure propagates and leaves the handle in place so the
   /// caller may retry. On success the handle and any in-flight marker are
   /// cleared.
   pub async fn destroy(&self) -> Result<()> {
      let data_source = {
         let state = self.state();
         match &state.data_source {
            None => return Ok(()),
            Some(data_source) => Arc::clone(data_source),
         }
      };

      if data_source.is_initialized() {
         data_source.destroy().await?;
      }

      let mut state = self.state();
      state.data_source = None;
      state.in_flight = None;
      state.epoch += 1;

      debug!("data source manager destroyed its handle");
      Ok(())
   }

   fn effective_transaction_mode(&self, explicit: Option<TransactionMode>) -> TransactionMode {
      if let Some(mode) = explicit {
         return mode;
      }
      self
         .state()
         .plan
         .as_ref()
         .map(|plan| plan.migrations_transaction)
         .unwrap_or_default()
   }
}

/// The single construction-and-initialization sequence. Runs behind the
/// `Shared` in-flight future; everything it touches is owned by the plan.
async fn initialize(plan: Arc<ResolvedPlan>) -> Result<Arc<dyn DataSource>> {
   let options = plan.resolve_options().await?;
   let data_source = plan.create_data_source(options).await?;

   if plan.run_migrations_on_init {
      data_source.run_migrations(plan.migrations_transaction).await?;
   }

   if let Some(hook) = plan.on_initialized(Arc::clone(&data_source)) {
      hook.await?;
   }

   Ok(data_source)
}

/// Configure a fresh manager and return its initialized data source, for
/// callers that want a one-shot handle without retaining the manager.
pub async fn create_managed_data_source(config: DataSourceConfig) -> Result<Arc<dyn DataSource>> {
   let manager = DataSourceManager::new();
   manager.configure(config, ConfigureOptions { allow_override: true })?;
   manager.get_data_source().await
}
