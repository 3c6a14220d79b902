//! End-to-end smoke test for the data-source lifecycle manager.
//!
//! Run with `cargo run --example smoke`. Exercises both the long-lived
//! manager flow and the one-shot `create_managed_data_source` helper against
//! a temporary SQLite database, then prints `OK`.

use std::path::Path;
use std::sync::Arc;

use sqlx_sqlite_datasource_mgr::{
   ConfigureOptions, DataSource, DataSourceConfig, DataSourceManager, DataSourceOptions,
   Migration, MigrationOptions, Result, TransactionMode, create_managed_data_source,
};

fn demo_options(path: &Path) -> DataSourceOptions {
   DataSourceOptions {
      migrations: vec![Migration::new(
         "0001_notes",
         "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL)",
         "DROP TABLE notes",
      )],
      ..DataSourceOptions::new(path)
   }
}

async fn smoke_manager(path: &Path) -> Result<()> {
   let manager = DataSourceManager::new();
   manager.configure(
      DataSourceConfig {
         run_migrations_on_init: true,
         migrations_transaction: Some(TransactionMode::Each),
         ..DataSourceConfig::new(demo_options(path))
      },
      ConfigureOptions::default(),
   )?;

   let handle = manager.ensure_initialized().await?;
   assert!(handle.is_initialized(), "ensure_initialized should yield a ready data source");

   let same = manager.get_data_source_or_fail()?;
   assert!(
      Arc::ptr_eq(&handle, &same),
      "get_data_source_or_fail should return the shared instance"
   );

   let pending = manager.run_migrations(MigrationOptions::default()).await?;
   assert!(pending.is_empty(), "on-init migrations should leave nothing pending");

   manager.destroy().await?;
   assert!(!handle.is_initialized(), "destroy() should dispose the data source");

   Ok(())
}

async fn smoke_one_shot(path: &Path) -> Result<()> {
   let path = path.to_path_buf();
   let config = DataSourceConfig {
      run_migrations_on_init: true,
      ..DataSourceConfig::default()
   }
   .with_options_factory(move || {
      let path = path.clone();
      async move { Ok(demo_options(&path)) }
   });

   let handle = create_managed_data_source(config).await?;
   assert!(handle.is_initialized(), "one-shot handle should come back initialized");

   handle.destroy().await?;
   Ok(())
}

#[tokio::main]
async fn main() {
   tracing_subscriber::fmt::init();

   let temp_dir = tempfile::tempdir().expect("failed to create temp dir");

   if let Err(error) = smoke_manager(&temp_dir.path().join("manager.db")).await {
      eprintln!("Smoke test failed (manager flow): {error}");
      std::process::exit(1);
   }

   if let Err(error) = smoke_one_shot(&temp_dir.path().join("oneshot.db")).await {
      eprintln!("Smoke test failed (one-shot flow): {error}");
      std::process::exit(1);
   }

   println!("OK: smoke test passed");
}
