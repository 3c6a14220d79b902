//! Default SQLite data source with connection pooling

use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePoolOptions};
use sqlx::{ConnectOptions, Pool, Sqlite};
use tracing::debug;

use crate::Result;
use crate::config::{DataSourceOptions, TransactionMode};
use crate::error::Error;
use crate::handle::DataSource;
use crate::migrations::{self, AppliedMigration};

/// Connection pools backing an initialized data source.
#[derive(Debug)]
struct Pools {
   /// Pool of read-only connections for concurrent reads
   read_pool: Pool<Sqlite>,

   /// Single read-write connection pool (max_connections=1) for serialized writes
   write_conn: Pool<Sqlite>,
}

/// SQLite data source with a read-only connection pool and exclusive writes.
///
/// Instances start out un-initialized: construction records the options but
/// opens nothing. [`initialize`](DataSource::initialize) opens the pools,
/// [`destroy`](DataSource::destroy) closes them again, and the instance can be
/// re-initialized afterwards. WAL mode is enabled lazily on the first write.
///
/// This is the handle type the manager constructs when no custom
/// `data_source_factory` is configured, but it is equally usable standalone:
///
/// ```no_run
/// use sqlx_sqlite_datasource_mgr::{DataSource, DataSourceOptions, SqliteDataSource};
///
/// # async fn example() -> sqlx_sqlite_datasource_mgr::Result<()> {
/// let db = SqliteDataSource::new(DataSourceOptions::new("test.db"));
/// db.initialize().await?;
///
/// // Use read_pool for SELECT queries (concurrent reads)
/// let rows = sqlx::query("SELECT * FROM users")
///     .fetch_all(&db.read_pool()?)
///     .await?;
///
/// // Acquire the writer for INSERT/UPDATE/DELETE (exclusive)
/// let mut writer = db.acquire_writer().await?;
/// sqlx::query("INSERT INTO users (name) VALUES (?)")
///     .bind("Alice")
///     .execute(&mut *writer)
///     .await?;
///
/// db.destroy().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SqliteDataSource {
   options: DataSourceOptions,

   /// Open pools while initialized, `None` otherwise
   pools: Mutex<Option<Pools>>,

   /// Tracks if WAL mode has been initialized (set on first write)
   wal_initialized: AtomicBool,
}

fn is_memory_database(path: &Path) -> bool {
   path == Path::new(":memory:")
}

impl SqliteDataSource {
   /// Create an un-initialized data source from connection options.
   pub fn new(options: DataSourceOptions) -> Self {
      Self {
         options,
         pools: Mutex::new(None),
         wal_initialized: AtomicBool::new(false),
      }
   }

   /// The options this data source was constructed with.
   pub fn options(&self) -> &DataSourceOptions {
      &self.options
   }

   /// Get a handle to the connection pool for executing read queries.
   ///
   /// Multiple readers can query the pool simultaneously. Fails with
   /// [`Error::NotInitialized`] while the data source is not initialized.
   pub fn read_pool(&self) -> Result<Pool<Sqlite>> {
      let pools = self.pools.lock().expect("pool state poisoned");
      pools
         .as_ref()
         .map(|pools| pools.read_pool.clone())
         .ok_or(Error::NotInitialized)
   }

   /// Acquire exclusive write access to the database.
   ///
   /// The returned [`WriteGuard`] holds the single read-write connection, so
   /// only one writer can exist at a time. On the first call, WAL mode and
   /// `synchronous=NORMAL` are enabled on the database.
   pub async fn acquire_writer(&self) -> Result<WriteGuard> {
      let write_conn = {
         let pools = self.pools.lock().expect("pool state poisoned");
         pools
            .as_ref()
            .map(|pools| pools.write_conn.clone())
            .ok_or(Error::NotInitialized)?
      };

      // Acquire connection from pool (max=1 ensures exclusive access)
      let mut conn = write_conn.acquire().await?;

      // Initialize WAL mode on first use (idempotent and safe)
      if !self.wal_initialized.load(Ordering::SeqCst) {
         sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;

         // https://www.sqlite.org/wal.html#performance_considerations
         sqlx::query("PRAGMA synchronous = NORMAL").execute(&mut *conn).await?;

         self.wal_initialized.store(true, Ordering::SeqCst);
      }

      Ok(WriteGuard::new(conn))
   }

   async fn open_pools(&self) -> Result<Pools> {
      let path = self.options.filename.as_path();

      if path.as_os_str().is_empty() {
         return Err(
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "Database path cannot be empty")
               .into(),
         );
      }

      // If the database doesn't exist yet, create it with a temporary
      // connection. We can't leave creation to the pools: the read pool's
      // connections are read-only and cannot create the file, and the very
      // first query may be a read.
      if self.options.create_if_missing && !path.exists() && !is_memory_database(path) {
         let create_options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .read_only(false);

         let conn = create_options.connect().await?;
         drop(conn); // Close immediately after creating the file
      }

      let idle_timeout = Duration::from_secs(self.options.idle_timeout_secs);

      let read_options = SqliteConnectOptions::new().filename(path).read_only(true);

      let read_pool = SqlitePoolOptions::new()
         .max_connections(self.options.max_read_connections)
         .min_connections(0)
         .idle_timeout(Some(idle_timeout))
         .connect_with(read_options)
         .await?;

      let write_options = SqliteConnectOptions::new().filename(path).read_only(false);

      let write_conn = SqlitePoolOptions::new()
         .max_connections(1)
         .min_connections(0)
         .idle_timeout(Some(idle_timeout))
         .connect_with(write_options)
         .await?;

      Ok(Pools {
         read_pool,
         write_conn,
      })
   }
}

#[async_trait]
impl DataSource for SqliteDataSource {
   fn is_initialized(&self) -> bool {
      self.pools.lock().expect("pool state poisoned").is_some()
   }

   async fn initialize(&self) -> Result<()> {
      if self.is_initialized() {
         return Ok(());
      }

      let pools = self.open_pools().await?;

      let mut slot = self.pools.lock().expect("pool state poisoned");
      if slot.is_none() {
         debug!(filename = %self.options.filename.display(), "data source initialized");
         *slot = Some(pools);
      }
      // A racing initializer already installed pools; ours are dropped and
      // their connections closed lazily. The manager serializes initialization
      // so this only covers direct standalone misuse.

      Ok(())
   }

   async fn destroy(&self) -> Result<()> {
      let Some(pools) = self.pools.lock().expect("pool state poisoned").take() else {
         return Ok(());
      };

      // This will await all readers to be returned
      pools.read_pool.close().await;

      // Checkpoint WAL before closing the write connection to flush changes
      // and truncate the WAL file. Only attempted if WAL was initialized.
      if self.wal_initialized.swap(false, Ordering::SeqCst)
         && let Ok(mut conn) = pools.write_conn.acquire().await
      {
         let _ = sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&mut *conn)
            .await;
      }

      pools.write_conn.close().await;

      debug!(filename = %self.options.filename.display(), "data source destroyed");
      Ok(())
   }

   async fn run_migrations(&self, mode: TransactionMode) -> Result<Vec<AppliedMigration>> {
      let mut writer = self.acquire_writer().await?;
      migrations::run_pending(&mut writer, &self.options.migrations, mode).await
   }

   async fn revert_last_migration(&self, mode: TransactionMode) -> Result<()> {
      let mut writer = self.acquire_writer().await?;
      migrations::revert_last(&mut writer, &self.options.migrations, mode).await
   }
}

/// RAII guard for exclusive write access to the database
///
/// Wraps the single pooled read-write connection and returns it to the pool on
/// drop. Derefs to [`SqliteConnection`] for direct use with sqlx queries.
#[derive(Debug)]
pub struct WriteGuard {
   conn: PoolConnection<Sqlite>,
}

impl WriteGuard {
   fn new(conn: PoolConnection<Sqlite>) -> Self {
      Self { conn }
   }
}

impl Deref for WriteGuard {
   type Target = SqliteConnection;

   fn deref(&self) -> &Self::Target {
      &self.conn
   }
}

impl DerefMut for WriteGuard {
   fn deref_mut(&mut self) -> &mut Self::Target {
      &mut self.conn
   }
}
